use anyhow::Context;
use anyhow::Result;
use camino::Utf8Path;
use camino::Utf8PathBuf;
use clap::Parser;
use trellis_conf::MarkupSettings;
use trellis_markup::MarkupParser;
use trellis_source::DiagnosticRenderer;
use trellis_source::MarkupSource;
use trellis_source::SourceId;

use super::absolutize;
use super::load_settings;
use super::resolve_project_root;
use crate::args::Args;
use crate::commands::Command;
use crate::diagnostics::pick_renderer;
use crate::diagnostics::render_markup_error;
use crate::exit::Exit;
use crate::walk::walk_markup_files;

#[derive(Debug, Parser)]
pub struct Check {
    /// Files or directories to check. Defaults to the current directory.
    paths: Vec<Utf8PathBuf>,

    /// Fail markup that does not start with an XML declaration.
    #[arg(long)]
    require_xml_declaration: bool,

    /// Drop comments before checking, as the runtime does when configured to.
    #[arg(long)]
    strip_comments: bool,
}

impl Command for Check {
    fn execute(&self, _args: &Args) -> Result<Exit> {
        let project_root = resolve_project_root()?;
        let settings = load_settings(&project_root)?;

        let mut markup_settings = settings.markup;
        markup_settings.require_xml_declaration |= self.require_xml_declaration;
        markup_settings.strip_comments |= self.strip_comments;

        let paths: Vec<Utf8PathBuf> = if self.paths.is_empty() {
            vec![project_root.clone()]
        } else {
            self.paths
                .iter()
                .map(|path| absolutize(&project_root, path))
                .collect()
        };

        let files = walk_markup_files(&paths);
        if files.is_empty() {
            return Ok(Exit::success());
        }

        let renderer = pick_renderer();
        let mut error_count: usize = 0;
        for path in &files {
            if let Some(output) = check_file(path, &markup_settings, &renderer)? {
                println!("{output}\n");
                error_count += 1;
            }
        }
        tracing::info!(files = files.len(), errors = error_count, "Checked markup");

        if error_count > 0 {
            let word = if files.len() == 1 { "file" } else { "files" };
            Ok(Exit::error().with_message(format!(
                "Found errors in {error_count} of {} markup {word}.",
                files.len()
            )))
        } else {
            Ok(Exit::success())
        }
    }
}

/// Parse one file, returning the rendered error if it fails.
fn check_file(
    path: &Utf8Path,
    settings: &MarkupSettings,
    renderer: &DiagnosticRenderer,
) -> Result<Option<String>> {
    let bytes = std::fs::read(path).with_context(|| format!("Failed to read {path}"))?;
    let source = MarkupSource::new(SourceId::Path(path.to_owned()), bytes);

    let Err(error) = MarkupParser::new(&source, settings).and_then(MarkupParser::parse) else {
        tracing::debug!(%path, "Markup is valid");
        return Ok(None);
    };

    let text = source.decode(settings.encoding()).map_or_else(
        |_| String::from_utf8_lossy(source.bytes()).into_owned(),
        |decoded| decoded.text,
    );
    Ok(Some(render_markup_error(
        path.as_str(),
        &text,
        &error,
        renderer,
    )))
}
