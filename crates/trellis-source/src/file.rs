use std::fmt;
use std::sync::Arc;

use camino::Utf8Path;
use camino::Utf8PathBuf;

use crate::encoding::decode;
use crate::encoding::DecodedText;
use crate::encoding::Encoding;
use crate::encoding::EncodingError;

/// Identity of a markup source: where its bytes come from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SourceId {
    Path(Utf8PathBuf),
    /// Sources that do not live on disk, e.g. markup handed in by a test or
    /// generated by a component.
    Named(String),
}

impl SourceId {
    #[must_use]
    pub fn path(&self) -> Option<&Utf8Path> {
        match self {
            Self::Path(path) => Some(path),
            Self::Named(_) => None,
        }
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Path(path) => write!(f, "{path}"),
            Self::Named(name) => write!(f, "<{name}>"),
        }
    }
}

impl From<Utf8PathBuf> for SourceId {
    fn from(path: Utf8PathBuf) -> Self {
        Self::Path(path)
    }
}

impl From<&Utf8Path> for SourceId {
    fn from(path: &Utf8Path) -> Self {
        Self::Path(path.to_owned())
    }
}

/// The bytes of one markup source plus its identity. Cheap to clone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkupSource(Arc<MarkupSourceInner>);

#[derive(Debug, PartialEq, Eq)]
struct MarkupSourceInner {
    id: SourceId,
    bytes: Vec<u8>,
}

impl MarkupSource {
    #[must_use]
    pub fn new(id: SourceId, bytes: Vec<u8>) -> Self {
        Self(Arc::new(MarkupSourceInner { id, bytes }))
    }

    #[must_use]
    pub fn from_text(id: SourceId, text: impl Into<String>) -> Self {
        Self::new(id, text.into().into_bytes())
    }

    #[must_use]
    pub fn id(&self) -> &SourceId {
        &self.0.id
    }

    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.0.bytes
    }

    pub fn decode(&self, default: Encoding) -> Result<DecodedText, EncodingError> {
        decode(&self.0.bytes, default)
    }
}
