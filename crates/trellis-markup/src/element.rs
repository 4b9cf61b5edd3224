use std::fmt;

use crate::tag::ComponentTag;

/// Markup text with no meaning to the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMarkup(String);

impl RawMarkup {
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RawMarkup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone)]
pub enum MarkupElement {
    Raw(RawMarkup),
    Tag(ComponentTag),
}

impl MarkupElement {
    #[must_use]
    pub fn as_tag(&self) -> Option<&ComponentTag> {
        match self {
            Self::Tag(tag) => Some(tag),
            Self::Raw(_) => None,
        }
    }

    pub(crate) fn as_tag_mut(&mut self) -> Option<&mut ComponentTag> {
        match self {
            Self::Tag(tag) => Some(tag),
            Self::Raw(_) => None,
        }
    }

    #[must_use]
    pub fn as_raw(&self) -> Option<&RawMarkup> {
        match self {
            Self::Raw(raw) => Some(raw),
            Self::Tag(_) => None,
        }
    }

    #[must_use]
    pub fn is_tag(&self) -> bool {
        matches!(self, Self::Tag(_))
    }

    #[must_use]
    pub fn is_raw(&self) -> bool {
        matches!(self, Self::Raw(_))
    }

    #[must_use]
    pub fn structurally_equal(&self, other: &MarkupElement) -> bool {
        match (self, other) {
            (Self::Raw(a), Self::Raw(b)) => a == b,
            (Self::Tag(a), Self::Tag(b)) => a.structurally_equal(b),
            _ => false,
        }
    }

    pub(crate) fn freeze(&mut self) {
        if let Self::Tag(tag) = self {
            tag.freeze();
        }
    }
}

impl From<ComponentTag> for MarkupElement {
    fn from(tag: ComponentTag) -> Self {
        Self::Tag(tag)
    }
}

impl From<RawMarkup> for MarkupElement {
    fn from(raw: RawMarkup) -> Self {
        Self::Raw(raw)
    }
}

impl fmt::Display for MarkupElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Raw(raw) => raw.fmt(f),
            Self::Tag(tag) => tag.fmt(f),
        }
    }
}
