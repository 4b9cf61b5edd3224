use std::io::IsTerminal;

use trellis_markup::MarkupError;
use trellis_source::Diagnostic;
use trellis_source::DiagnosticRenderer;
use trellis_source::Severity;
use trellis_source::Span;

pub fn pick_renderer() -> DiagnosticRenderer {
    if std::io::stdout().is_terminal() {
        DiagnosticRenderer::styled()
    } else {
        DiagnosticRenderer::plain()
    }
}

/// Render a markup error against the decoded text of the file it came from.
pub fn render_markup_error(
    path: &str,
    source: &str,
    error: &MarkupError,
    renderer: &DiagnosticRenderer,
) -> String {
    let message = error.message();
    let span = error.span().unwrap_or_else(|| Span::empty_at(0));
    let label = match error.root() {
        MarkupError::MalformedSource { .. } => "cannot tokenize this",
        MarkupError::StructuralImbalance { .. } => "unbalanced tag",
        MarkupError::InvalidInheritance { .. } => "invalid inheritance",
        _ => "",
    };

    let note = match error {
        MarkupError::ParseFailure {
            position, partial, ..
        } => Some(format!(
            "parsing stopped at offset {position} after {} elements",
            partial.len()
        )),
        _ => None,
    };

    let mut diagnostic = Diagnostic::new(
        source,
        path,
        error.diagnostic_code(),
        &message,
        Severity::Error,
        span,
        label,
    );
    if let Some(note) = &note {
        diagnostic = diagnostic.note(note);
    }
    renderer.render(&diagnostic)
}

#[cfg(test)]
mod tests {
    use trellis_conf::MarkupSettings;
    use trellis_markup::MarkupParser;

    use super::*;

    #[test]
    fn unclosed_tag() {
        let source = "<div>\n  <p>text</p>\n";
        let err = MarkupParser::from_text(source, &MarkupSettings::default())
            .parse()
            .unwrap_err();
        let output = render_markup_error("Home.html", source, &err, &DiagnosticRenderer::plain());

        assert!(output.contains("error[M101]: Tag 'div' does not have a close tag"));
        assert!(output.contains("Home.html"));
        assert!(output.contains("unbalanced tag"));
        assert!(output.contains("parsing stopped at offset"));
    }

    #[test]
    fn error_without_span_points_at_start() {
        let err = MarkupError::MarkupNotFound {
            view: "Home".to_string(),
        };
        let output = render_markup_error("Home.html", "<p></p>", &err, &DiagnosticRenderer::plain());
        assert!(output.contains("error[M106]: Markup not found for view Home"));
    }
}
