use std::io;
use std::sync::Arc;

use thiserror::Error;
use trellis_source::Span;

use crate::markup::Markup;

#[derive(Clone, Debug, Error)]
pub enum MarkupError {
    #[error("{message} (line {}, column {})", .line + 1, .column + 1)]
    MalformedSource {
        position: usize,
        line: u32,
        column: u32,
        message: String,
    },

    #[error("{message}")]
    StructuralImbalance {
        tag: String,
        span: Span,
        message: String,
    },

    #[error("{message}")]
    InvalidMarkup { span: Option<Span>, message: String },

    #[error("{message}")]
    InvalidInheritance { span: Option<Span>, message: String },

    #[error("Base markup of '{view}' not found: no markup for superclass '{base}'")]
    BaseMarkupNotFound { view: String, base: String },

    #[error("Markup inheritance cycle: {}", .chain.join(" -> "))]
    InheritanceCycle { chain: Vec<String> },

    #[error("Markup not found for view {view}")]
    MarkupNotFound { view: String },

    #[error("{message} (cursor at element {index})")]
    CursorState { index: usize, message: String },

    #[error("Markup is immutable and cannot be modified")]
    Immutable,

    #[error("Failed to read markup source '{source_id}': {error}")]
    Io {
        source_id: String,
        #[source]
        error: Arc<io::Error>,
    },

    #[error("Failed to parse markup at offset {position}: {error}")]
    ParseFailure {
        #[source]
        error: Box<MarkupError>,
        position: usize,
        partial: Arc<Markup>,
    },
}

impl MarkupError {
    pub(crate) fn invalid_markup(span: Span, message: impl Into<String>) -> Self {
        Self::InvalidMarkup {
            span: Some(span),
            message: message.into(),
        }
    }

    pub(crate) fn invalid_inheritance(span: Option<Span>, message: impl Into<String>) -> Self {
        Self::InvalidInheritance {
            span,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn io(source_id: impl Into<String>, error: io::Error) -> Self {
        Self::Io {
            source_id: source_id.into(),
            error: Arc::new(error),
        }
    }

    /// The error a parse failure wraps, or `self` for every other variant.
    #[must_use]
    pub fn root(&self) -> &MarkupError {
        match self {
            Self::ParseFailure { error, .. } => error.root(),
            other => other,
        }
    }

    #[must_use]
    pub fn diagnostic_code(&self) -> &'static str {
        match self {
            Self::MalformedSource { .. } => "M100",
            Self::StructuralImbalance { .. } => "M101",
            Self::InvalidMarkup { .. } => "M102",
            Self::InvalidInheritance { .. } => "M103",
            Self::BaseMarkupNotFound { .. } => "M104",
            Self::InheritanceCycle { .. } => "M105",
            Self::MarkupNotFound { .. } => "M106",
            Self::CursorState { .. } => "M107",
            Self::Immutable => "M108",
            Self::Io { .. } => "M109",
            Self::ParseFailure { error, .. } => error.diagnostic_code(),
        }
    }

    /// Source span to point a diagnostic at, when the error has one.
    #[must_use]
    pub fn span(&self) -> Option<Span> {
        match self {
            Self::MalformedSource { position, .. } => Some(Span::from_parts(*position, 1)),
            Self::StructuralImbalance { span, .. } => Some(*span),
            Self::InvalidMarkup { span, .. } | Self::InvalidInheritance { span, .. } => *span,
            Self::ParseFailure { error, .. } => error.span(),
            _ => None,
        }
    }

    /// The message without the wrapping context a parse failure adds.
    #[must_use]
    pub fn message(&self) -> String {
        self.root().to_string()
    }
}
