use std::collections::VecDeque;

use indexmap::IndexMap;
use trellis_source::ByteOffset;
use trellis_source::Encoding;
use trellis_source::EncodingError;
use trellis_source::LineIndex;
use trellis_source::MarkupSource;
use trellis_source::Span;

use crate::error::MarkupError;
use crate::tag::ComponentTag;
use crate::tag::TagKind;

/// Anything the head of a filter chain can pull tags from.
pub trait TagSource {
    fn next_tag(&mut self) -> Result<Option<ComponentTag>, MarkupError>;
}

/// A prepared tag sequence, for driving filters without a tokenizer.
impl TagSource for VecDeque<ComponentTag> {
    fn next_tag(&mut self) -> Result<Option<ComponentTag>, MarkupError> {
        Ok(self.pop_front())
    }
}

/// Pull tokenizer over decoded markup text.
///
/// Only tags are returned; the text between them is left in the input and
/// read back through the position marker, so every byte of raw text is
/// copied exactly once.
pub struct XmlPullParser {
    input: String,
    pos: usize,
    marker: usize,
    skip_body_of: Option<&'static str>,
    encoding: Encoding,
    xml_declaration: Option<String>,
    doctype: Option<String>,
}

impl XmlPullParser {
    #[must_use]
    pub fn new(input: impl Into<String>) -> Self {
        let input = input.into();
        let xml_declaration = leading_xml_declaration(&input);
        Self {
            input,
            pos: 0,
            marker: 0,
            skip_body_of: None,
            encoding: Encoding::Utf8,
            xml_declaration,
            doctype: None,
        }
    }

    pub fn from_source(source: &MarkupSource, default: Encoding) -> Result<Self, MarkupError> {
        let decoded = source
            .decode(default)
            .map_err(|err| encoding_error(source.bytes(), &err))?;

        Ok(Self {
            input: decoded.text,
            pos: 0,
            marker: 0,
            skip_body_of: None,
            encoding: decoded.encoding,
            xml_declaration: decoded.xml_declaration,
            doctype: None,
        })
    }

    #[must_use]
    pub fn input(&self) -> &str {
        &self.input
    }

    #[must_use]
    pub fn position(&self) -> usize {
        self.pos
    }

    #[must_use]
    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    #[must_use]
    pub fn xml_declaration(&self) -> Option<&str> {
        self.xml_declaration.as_deref()
    }

    #[must_use]
    pub fn doctype(&self) -> Option<&str> {
        self.doctype.as_deref()
    }

    pub fn set_position_marker(&mut self, pos: usize) {
        self.marker = pos.min(self.input.len());
    }

    pub fn mark_current(&mut self) {
        self.marker = self.pos;
    }

    /// Text from the position marker up to `to`, or to the end of input.
    /// Empty when `to` lies before the marker.
    #[must_use]
    pub fn input_from_marker(&self, to: Option<usize>) -> &str {
        let to = to.unwrap_or(self.input.len());
        self.input_range(self.marker, to)
    }

    #[must_use]
    pub fn input_range(&self, from: usize, to: usize) -> &str {
        self.input.get(from..to).unwrap_or("")
    }

    fn malformed(&self, position: usize, message: impl Into<String>) -> MarkupError {
        let at = LineIndex::from_text(&self.input).to_line_col(ByteOffset::from_usize(position));
        MarkupError::MalformedSource {
            position,
            line: at.line(),
            column: at.column(),
            message: message.into(),
        }
    }

    fn find(&self, needle: &str, from: usize) -> Option<usize> {
        self.input
            .get(from..)
            .and_then(|rest| rest.find(needle))
            .map(|found| from + found)
    }

    fn find_byte(&self, byte: u8, from: usize) -> Option<usize> {
        memchr::memchr(byte, self.input.as_bytes().get(from..)?).map(|found| from + found)
    }

    /// Position of the next `>` that is not inside a quoted attribute value.
    fn find_tag_end(&self, from: usize) -> Option<usize> {
        let bytes = self.input.as_bytes();
        let mut quote: Option<u8> = None;
        for (offset, &byte) in bytes.get(from..)?.iter().enumerate() {
            match (quote, byte) {
                (None, b'"' | b'\'') => quote = Some(byte),
                (Some(open), _) if open == byte => quote = None,
                (None, b'>') => return Some(from + offset),
                _ => {}
            }
        }
        None
    }

    fn skip_comment(&mut self, open: usize) -> Result<(), MarkupError> {
        if self.input[open..].starts_with("<!--[if ") {
            let close = self
                .find_byte(b'>', open)
                .ok_or_else(|| self.malformed(open, "Unclosed conditional comment"))?;
            // The body of a conditional comment is live markup for the
            // browsers it targets, so keep tokenizing inside it.
            if self.input[..close].ends_with(']') {
                if self.find("]-->", open).is_none() {
                    return Err(self.malformed(open, "Conditional comment has no end marker"));
                }
                self.pos = close + 1;
                return Ok(());
            }
        }

        let end = self
            .find("-->", open + 2)
            .ok_or_else(|| self.malformed(open, "Unclosed comment"))?;
        self.pos = end + 3;
        Ok(())
    }

    /// Move to the `</name` that ends a raw text element.
    fn skip_raw_body(&mut self, name: &str) -> Result<(), MarkupError> {
        let mut from = self.pos;
        loop {
            let Some(found) = self.find("</", from) else {
                return Err(self.malformed(
                    self.pos,
                    format!("Tag <{name}> does not have a close tag"),
                ));
            };
            let after = found + 2;
            let matches_name = self
                .input
                .get(after..after + name.len())
                .is_some_and(|candidate| candidate.eq_ignore_ascii_case(name));
            let terminated = self
                .input
                .as_bytes()
                .get(after + name.len())
                .is_some_and(|b| *b == b'>' || b.is_ascii_whitespace());
            if matches_name && terminated {
                self.pos = found;
                return Ok(());
            }
            from = after;
        }
    }

    fn read_tag(&mut self, open: usize) -> Result<ComponentTag, MarkupError> {
        let close = self
            .find_tag_end(open + 1)
            .ok_or_else(|| self.malformed(open, "No matching close bracket for tag"))?;
        let text = &self.input[open + 1..close];
        if text.trim().is_empty() {
            return Err(self.malformed(open, "Found empty tag: '<>'"));
        }

        let (kind, body, body_start) = if let Some(body) = text.strip_prefix('/') {
            (TagKind::Close, body, open + 2)
        } else if let Some(body) = text.strip_suffix('/') {
            (TagKind::OpenClose, body, open + 1)
        } else {
            (TagKind::Open, text, open + 1)
        };

        let name_end = body
            .find(|c: char| c.is_ascii_whitespace())
            .unwrap_or(body.len());
        let qualified = &body[..name_end];
        let Some((namespace, name)) = split_qualified_name(qualified) else {
            return Err(self.malformed(body_start, format!("Malformed tag name '{qualified}'")));
        };

        let attributes = parse_attributes(&body[name_end..])
            .map_err(|(offset, message)| self.malformed(body_start + name_end + offset, message))?;

        let is_javascript = attributes
            .get("type")
            .is_none_or(|ty| ty.trim().to_ascii_lowercase().starts_with("text/javascript"));

        if kind == TagKind::Open && namespace.is_none() {
            if name.eq_ignore_ascii_case("script") && is_javascript {
                self.skip_body_of = Some("script");
            } else if name.eq_ignore_ascii_case("style") {
                self.skip_body_of = Some("style");
            }
        }

        let tag = ComponentTag::new(kind, name, namespace, Span::from_bounds(open, close + 1))
            .with_attributes(attributes);
        self.pos = close + 1;
        Ok(tag)
    }
}

impl TagSource for XmlPullParser {
    fn next_tag(&mut self) -> Result<Option<ComponentTag>, MarkupError> {
        loop {
            if let Some(name) = self.skip_body_of.take() {
                self.skip_raw_body(name)?;
            }

            let Some(open) = self.find_byte(b'<', self.pos) else {
                self.pos = self.input.len();
                return Ok(None);
            };
            let rest = &self.input[open..];

            if rest.starts_with("<!--") {
                self.skip_comment(open)?;
                continue;
            }

            if starts_with_ignore_case(rest, "<![CDATA[") {
                let end = self
                    .find("]]>", open)
                    .ok_or_else(|| self.malformed(open, "Unclosed CDATA section"))?;
                self.pos = end + 3;
                continue;
            }

            if rest.starts_with("<!") || rest.starts_with("<?") {
                let close = self
                    .find_byte(b'>', open)
                    .ok_or_else(|| self.malformed(open, "Unterminated declaration"))?;
                if starts_with_ignore_case(rest, "<!DOCTYPE") {
                    self.doctype = Some(self.input[open..=close].to_string());
                }
                self.pos = close + 1;
                continue;
            }

            return self.read_tag(open).map(Some);
        }
    }
}

fn starts_with_ignore_case(text: &str, prefix: &str) -> bool {
    text.get(..prefix.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
}

fn leading_xml_declaration(text: &str) -> Option<String> {
    let trimmed = text.trim_start();
    if !trimmed.starts_with("<?xml") {
        return None;
    }
    trimmed
        .find("?>")
        .map(|end| trimmed[..end + 2].to_string())
}

fn encoding_error(bytes: &[u8], err: &EncodingError) -> MarkupError {
    let position = match err {
        EncodingError::Unsupported(_) => 0,
        EncodingError::InvalidBytes { position, .. } => *position,
    };
    let prefix = String::from_utf8_lossy(&bytes[..position.min(bytes.len())]);
    let at = LineIndex::from_text(&prefix).to_line_col(ByteOffset::from_usize(prefix.len()));
    MarkupError::MalformedSource {
        position,
        line: at.line(),
        column: at.column(),
        message: err.to_string(),
    }
}

fn is_name_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.')
}

fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    chars.next().is_some_and(is_name_start) && chars.all(is_name_char)
}

/// Split `ns:name` into its parts; `None` when either part is not a name.
fn split_qualified_name(qualified: &str) -> Option<(Option<String>, String)> {
    match qualified.split_once(':') {
        Some((ns, name)) if is_valid_name(ns) && is_valid_name(name) => {
            Some((Some(ns.to_string()), name.to_string()))
        }
        None if is_valid_name(qualified) => Some((None, qualified.to_string())),
        _ => None,
    }
}

fn unescape(value: &str) -> String {
    if !value.contains('&') {
        return value.to_string();
    }
    value
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

/// Parse the attribute part of a tag. Errors carry the byte offset into
/// `text` where the problem starts.
fn parse_attributes(text: &str) -> Result<IndexMap<String, String>, (usize, String)> {
    let bytes = text.as_bytes();
    let len = bytes.len();
    let mut attributes = IndexMap::new();
    let mut i = 0;

    let skip_whitespace = |mut i: usize| {
        while i < len && bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        i
    };

    loop {
        i = skip_whitespace(i);
        if i >= len {
            break;
        }

        let key_start = i;
        while i < len && !bytes[i].is_ascii_whitespace() && bytes[i] != b'=' {
            i += 1;
        }
        let key = &text[key_start..i];
        if key.is_empty() || key.starts_with(['"', '\'']) {
            return Err((key_start, "Malformed attribute".to_string()));
        }

        i = skip_whitespace(i);
        let value = if i < len && bytes[i] == b'=' {
            i = skip_whitespace(i + 1);
            if i >= len {
                return Err((key_start, format!("Attribute '{key}' has no value")));
            }
            let quote = bytes[i];
            if quote == b'"' || quote == b'\'' {
                let start = i + 1;
                let Some(end) = text[start..].find(char::from(quote)) else {
                    return Err((i, format!("Unterminated value of attribute '{key}'")));
                };
                i = start + end + 1;
                &text[start..start + end]
            } else {
                let start = i;
                while i < len && !bytes[i].is_ascii_whitespace() {
                    i += 1;
                }
                &text[start..i]
            }
        } else {
            ""
        };

        if attributes.contains_key(key) {
            return Err((key_start, format!("Same attribute found twice: '{key}'")));
        }
        attributes.insert(key.to_string(), unescape(value));
    }

    Ok(attributes)
}
