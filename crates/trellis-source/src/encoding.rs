use std::fmt;

use thiserror::Error;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";
const UTF16_LE_BOM: &[u8] = b"\xFF\xFE";
const UTF16_BE_BOM: &[u8] = b"\xFE\xFF";

/// Character encodings markup sources may be stored in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Encoding {
    Utf8,
    Ascii,
    Latin1,
    Utf16Le,
    Utf16Be,
}

impl Encoding {
    /// Resolve an encoding label the way XML declarations spell them.
    #[must_use]
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "utf-8" | "utf8" => Some(Self::Utf8),
            "us-ascii" | "ascii" => Some(Self::Ascii),
            "iso-8859-1" | "iso8859-1" | "latin1" | "latin-1" => Some(Self::Latin1),
            "utf-16le" | "utf16le" => Some(Self::Utf16Le),
            "utf-16be" | "utf16be" => Some(Self::Utf16Be),
            _ => None,
        }
    }

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Utf8 => "UTF-8",
            Self::Ascii => "US-ASCII",
            Self::Latin1 => "ISO-8859-1",
            Self::Utf16Le => "UTF-16LE",
            Self::Utf16Be => "UTF-16BE",
        }
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum EncodingError {
    #[error("Unsupported encoding '{0}'")]
    Unsupported(String),
    #[error("Invalid {encoding} byte sequence at offset {position}")]
    InvalidBytes {
        encoding: Encoding,
        position: usize,
    },
}

/// Text decoded from a markup source, with what the decoder observed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecodedText {
    pub text: String,
    pub encoding: Encoding,
    pub xml_declaration: Option<String>,
}

/// Decode raw markup bytes.
///
/// A byte order mark wins, then a UTF-16 `<` in the first code unit, then
/// the `encoding` pseudo attribute of a leading `<?xml ...?>` declaration,
/// then `default`. The byte order mark is stripped; the declaration stays in
/// the text.
pub fn decode(bytes: &[u8], default: Encoding) -> Result<DecodedText, EncodingError> {
    if let Some((encoding, rest)) = sniff_unicode(bytes) {
        let text = decode_with(rest, encoding)?;
        let xml_declaration = xml_declaration(&text).map(str::to_string);
        return Ok(DecodedText {
            text,
            encoding,
            xml_declaration,
        });
    }

    let (encoding, xml_declaration) = match ascii_xml_declaration(bytes) {
        Some(declaration) => {
            let encoding = match declared_encoding(declaration) {
                Some(label) => Encoding::from_label(label)
                    .ok_or_else(|| EncodingError::Unsupported(label.to_string()))?,
                None => default,
            };
            (encoding, Some(declaration.to_string()))
        }
        None => (default, None),
    };

    Ok(DecodedText {
        text: decode_with(bytes, encoding)?,
        encoding,
        xml_declaration,
    })
}

fn sniff_unicode(bytes: &[u8]) -> Option<(Encoding, &[u8])> {
    if let Some(rest) = bytes.strip_prefix(UTF8_BOM) {
        return Some((Encoding::Utf8, rest));
    }
    if let Some(rest) = bytes.strip_prefix(UTF16_LE_BOM) {
        return Some((Encoding::Utf16Le, rest));
    }
    if let Some(rest) = bytes.strip_prefix(UTF16_BE_BOM) {
        return Some((Encoding::Utf16Be, rest));
    }
    match bytes {
        [b'<', 0, ..] => Some((Encoding::Utf16Le, bytes)),
        [0, b'<', ..] => Some((Encoding::Utf16Be, bytes)),
        _ => None,
    }
}

fn decode_utf16(
    bytes: &[u8],
    encoding: Encoding,
    unit: fn([u8; 2]) -> u16,
) -> Result<String, EncodingError> {
    let pairs = bytes.chunks_exact(2);
    if !pairs.remainder().is_empty() {
        return Err(EncodingError::InvalidBytes {
            encoding,
            position: bytes.len() - 1,
        });
    }
    let units: Vec<u16> = pairs.map(|pair| unit([pair[0], pair[1]])).collect();
    String::from_utf16(&units).map_err(|_| EncodingError::InvalidBytes {
        encoding,
        position: first_unpaired_surrogate(&units) * 2,
    })
}

/// Unit index of the first surrogate without its partner.
fn first_unpaired_surrogate(units: &[u16]) -> usize {
    let mut index = 0;
    for decoded in char::decode_utf16(units.iter().copied()) {
        match decoded {
            Ok(c) => index += c.len_utf16(),
            Err(_) => break,
        }
    }
    index
}

fn decode_with(bytes: &[u8], encoding: Encoding) -> Result<String, EncodingError> {
    match encoding {
        Encoding::Utf8 => String::from_utf8(bytes.to_vec()).map_err(|err| {
            EncodingError::InvalidBytes {
                encoding,
                position: err.utf8_error().valid_up_to(),
            }
        }),
        Encoding::Ascii => match bytes.iter().position(|b| !b.is_ascii()) {
            Some(position) => Err(EncodingError::InvalidBytes { encoding, position }),
            None => Ok(bytes.iter().map(|&b| char::from(b)).collect()),
        },
        Encoding::Latin1 => Ok(bytes.iter().map(|&b| char::from(b)).collect()),
        Encoding::Utf16Le => decode_utf16(bytes, encoding, u16::from_le_bytes),
        Encoding::Utf16Be => decode_utf16(bytes, encoding, u16::from_be_bytes),
    }
}

fn xml_declaration(text: &str) -> Option<&str> {
    let trimmed = text.trim_start();
    if !trimmed.starts_with("<?xml") {
        return None;
    }
    let end = trimmed.find("?>")?;
    Some(&trimmed[..end + 2])
}

/// The declaration is ASCII in every encoding we accept, so it can be read
/// before the body is decoded.
fn ascii_xml_declaration(bytes: &[u8]) -> Option<&str> {
    let start = bytes.iter().position(|b| !b.is_ascii_whitespace())?;
    let rest = &bytes[start..];
    if !rest.starts_with(b"<?xml") {
        return None;
    }
    let end = rest.windows(2).position(|w| w == b"?>")?;
    std::str::from_utf8(&rest[..end + 2]).ok()
}

fn declared_encoding(declaration: &str) -> Option<&str> {
    let after = &declaration[declaration.find("encoding")? + "encoding".len()..];
    let after = after.trim_start().strip_prefix('=')?.trim_start();
    let quote = after.chars().next().filter(|c| *c == '"' || *c == '\'')?;
    let value = &after[1..];
    let end = value.find(quote)?;
    Some(&value[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    mod labels {
        use super::*;

        #[test]
        fn known_labels() {
            assert_eq!(Encoding::from_label("UTF-8"), Some(Encoding::Utf8));
            assert_eq!(Encoding::from_label("UTF-16LE"), Some(Encoding::Utf16Le));
            assert_eq!(Encoding::from_label("us-ascii"), Some(Encoding::Ascii));
            assert_eq!(Encoding::from_label(" ISO-8859-1 "), Some(Encoding::Latin1));
        }

        #[test]
        fn unknown_label() {
            assert_eq!(Encoding::from_label("Shift_JIS"), None);
        }
    }

    mod sniffing {
        use super::*;

        #[test]
        fn default_when_nothing_declared() {
            let decoded = decode(b"<p>plain</p>", Encoding::Utf8).unwrap();
            assert_eq!(decoded.encoding, Encoding::Utf8);
            assert_eq!(decoded.text, "<p>plain</p>");
            assert_eq!(decoded.xml_declaration, None);
        }

        #[test]
        fn bom_is_stripped() {
            let decoded = decode(b"\xEF\xBB\xBF<p>x</p>", Encoding::Latin1).unwrap();
            assert_eq!(decoded.encoding, Encoding::Utf8);
            assert_eq!(decoded.text, "<p>x</p>");
        }

        #[test]
        fn declaration_selects_latin1() {
            let bytes = b"<?xml version=\"1.0\" encoding=\"ISO-8859-1\"?><p>caf\xE9</p>";
            let decoded = decode(bytes, Encoding::Utf8).unwrap();
            assert_eq!(decoded.encoding, Encoding::Latin1);
            assert!(decoded.text.ends_with("<p>caf\u{e9}</p>"));
            assert_eq!(
                decoded.xml_declaration.as_deref(),
                Some("<?xml version=\"1.0\" encoding=\"ISO-8859-1\"?>")
            );
        }

        #[test]
        fn declaration_without_encoding_uses_default() {
            let decoded = decode(b"<?xml version='1.0'?><a/>", Encoding::Ascii).unwrap();
            assert_eq!(decoded.encoding, Encoding::Ascii);
            assert!(decoded.xml_declaration.is_some());
        }

        #[test]
        fn unsupported_declared_encoding() {
            let err = decode(b"<?xml version='1.0' encoding='EBCDIC'?>", Encoding::Utf8)
                .unwrap_err();
            assert_eq!(err, EncodingError::Unsupported("EBCDIC".to_string()));
        }

        #[test]
        fn invalid_utf8_reports_offset() {
            let err = decode(b"<p>\xFF</p>", Encoding::Utf8).unwrap_err();
            assert_eq!(
                err,
                EncodingError::InvalidBytes {
                    encoding: Encoding::Utf8,
                    position: 3
                }
            );
        }

        fn utf16(text: &str, unit: fn(u16) -> [u8; 2]) -> Vec<u8> {
            text.encode_utf16().flat_map(unit).collect()
        }

        #[test]
        fn utf16_byte_order_marks() {
            let mut le = UTF16_LE_BOM.to_vec();
            le.extend(utf16("<p>caf\u{e9} \u{1F600}</p>", u16::to_le_bytes));
            let decoded = decode(&le, Encoding::Latin1).unwrap();
            assert_eq!(decoded.encoding, Encoding::Utf16Le);
            assert_eq!(decoded.text, "<p>caf\u{e9} \u{1F600}</p>");

            let mut be = UTF16_BE_BOM.to_vec();
            be.extend(utf16("<?xml version=\"1.0\"?><p/>", u16::to_be_bytes));
            let decoded = decode(&be, Encoding::Utf8).unwrap();
            assert_eq!(decoded.encoding, Encoding::Utf16Be);
            assert_eq!(decoded.xml_declaration.as_deref(), Some("<?xml version=\"1.0\"?>"));
        }

        #[test]
        fn utf16_without_bom() {
            let decoded = decode(&utf16("<a/>", u16::to_le_bytes), Encoding::Utf8).unwrap();
            assert_eq!(decoded.encoding, Encoding::Utf16Le);
            assert_eq!(decoded.text, "<a/>");

            let decoded = decode(&utf16("<a/>", u16::to_be_bytes), Encoding::Utf8).unwrap();
            assert_eq!(decoded.encoding, Encoding::Utf16Be);
        }

        #[test]
        fn invalid_utf16() {
            let mut odd = utf16("<a/>", u16::to_le_bytes);
            odd.push(b'x');
            let err = decode(&odd, Encoding::Utf8).unwrap_err();
            assert!(matches!(err, EncodingError::InvalidBytes { position: 8, .. }));

            let mut lone = utf16("<a>", u16::to_le_bytes);
            lone.extend(0xD800u16.to_le_bytes());
            lone.extend(utf16("</a>", u16::to_le_bytes));
            let err = decode(&lone, Encoding::Utf8).unwrap_err();
            assert_eq!(
                err,
                EncodingError::InvalidBytes {
                    encoding: Encoding::Utf16Le,
                    position: 6
                }
            );
        }

        #[test]
        fn non_ascii_byte_in_ascii_source() {
            let err = decode(b"ab\xC3", Encoding::Ascii).unwrap_err();
            assert!(matches!(err, EncodingError::InvalidBytes { position: 2, .. }));
        }
    }
}
