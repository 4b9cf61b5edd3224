use annotate_snippets::AnnotationKind;
use annotate_snippets::Level;
use annotate_snippets::Renderer;
use annotate_snippets::Snippet;

use crate::Span;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
    Info,
}

/// One highlighted span on a source snippet. Primary annotations get `^^^`
/// underlines, context annotations get `---`.
#[derive(Debug, Clone)]
pub struct DiagnosticAnnotation<'a> {
    pub span: Span,
    pub label: &'a str,
    pub primary: bool,
}

/// A diagnostic ready for rendering. Callers pull span, code and message out
/// of their own error types and build one of these.
#[derive(Debug)]
pub struct Diagnostic<'a> {
    pub source: &'a str,
    pub path: &'a str,
    pub code: &'a str,
    pub message: &'a str,
    pub severity: Severity,
    pub annotations: Vec<DiagnosticAnnotation<'a>>,
    pub notes: Vec<&'a str>,
}

impl<'a> Diagnostic<'a> {
    #[must_use]
    pub fn new(
        source: &'a str,
        path: &'a str,
        code: &'a str,
        message: &'a str,
        severity: Severity,
        span: Span,
        label: &'a str,
    ) -> Self {
        Self {
            source,
            path,
            code,
            message,
            severity,
            annotations: vec![DiagnosticAnnotation {
                span,
                label,
                primary: true,
            }],
            notes: Vec::new(),
        }
    }

    #[must_use]
    pub fn annotation(mut self, span: Span, label: &'a str, primary: bool) -> Self {
        self.annotations.push(DiagnosticAnnotation {
            span,
            label,
            primary,
        });
        self
    }

    #[must_use]
    pub fn note(mut self, note: &'a str) -> Self {
        self.notes.push(note);
        self
    }
}

/// Renders diagnostics with `annotate-snippets`, either plain (tests, pipes)
/// or styled with ANSI colors (terminals).
#[derive(Debug)]
pub struct DiagnosticRenderer {
    renderer: Renderer,
}

impl DiagnosticRenderer {
    #[must_use]
    pub fn plain() -> Self {
        Self {
            renderer: Renderer::plain(),
        }
    }

    #[must_use]
    pub fn styled() -> Self {
        Self {
            renderer: Renderer::styled(),
        }
    }

    #[must_use]
    pub fn render(&self, diagnostic: &Diagnostic<'_>) -> String {
        let level = match diagnostic.severity {
            Severity::Error => Level::ERROR,
            Severity::Warning => Level::WARNING,
            Severity::Info => Level::INFO,
        };

        let mut snippet = Snippet::source(diagnostic.source)
            .path(diagnostic.path)
            .line_start(1);

        for ann in &diagnostic.annotations {
            // Clamp so a span computed against a partial document never
            // points past the text we were handed.
            let start = ann.span.start_usize().min(diagnostic.source.len());
            let end = ann.span.end_usize().clamp(start, diagnostic.source.len());
            let kind = if ann.primary {
                AnnotationKind::Primary
            } else {
                AnnotationKind::Context
            };
            snippet = snippet.annotation(kind.span(start..end).label(ann.label));
        }

        let mut title = level
            .primary_title(diagnostic.message)
            .id(diagnostic.code)
            .element(snippet);

        for note in &diagnostic.notes {
            title = title.element(Level::NOTE.message(*note));
        }

        let report = &[title];
        self.renderer.render(report).clone()
    }
}
