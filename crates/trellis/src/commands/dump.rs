use std::fmt::Write as _;

use anyhow::Context;
use anyhow::Result;
use camino::Utf8PathBuf;
use clap::Parser;
use trellis_markup::ComponentTag;
use trellis_markup::Markup;
use trellis_markup::MarkupElement;
use trellis_markup::MarkupParser;
use trellis_markup::TagKind;
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

#[derive(Debug, Parser)]
pub struct Dump {
    /// The markup file to print.
    file: Utf8PathBuf,
}

impl Command for Dump {
    fn execute(&self, _args: &Args) -> Result<Exit> {
        let project_root = resolve_project_root()?;
        let settings = load_settings(&project_root)?;
        let path = absolutize(&project_root, &self.file);

        let bytes = std::fs::read(&path).with_context(|| format!("Failed to read {path}"))?;
        let source = MarkupSource::new(SourceId::Path(path.clone()), bytes);

        match MarkupParser::new(&source, &settings.markup).and_then(MarkupParser::parse) {
            Ok(markup) => {
                print!("{}", dump_elements(&markup));
                Ok(Exit::success())
            }
            Err(error) => {
                let text = source.decode(settings.markup.encoding()).map_or_else(
                    |_| String::from_utf8_lossy(source.bytes()).into_owned(),
                    |decoded| decoded.text,
                );
                println!(
                    "{}",
                    render_markup_error(path.as_str(), &text, &error, &pick_renderer())
                );
                Ok(Exit::error())
            }
        }
    }
}

/// One line per element: index, kind and either the tag with its
/// annotations or the raw text.
pub fn dump_elements(markup: &Markup) -> String {
    let mut out = String::new();
    for (index, element) in markup.iter().enumerate() {
        match element {
            MarkupElement::Raw(raw) => {
                let _ = writeln!(out, "{index:>4}  raw    {:?}", raw.as_str());
            }
            MarkupElement::Tag(tag) => {
                let _ = writeln!(out, "{index:>4}  {:<6} {tag}{}", kind(tag), notes(tag));
            }
        }
    }
    out
}

fn kind(tag: &ComponentTag) -> &'static str {
    match tag.kind() {
        TagKind::Open => "open",
        TagKind::Close => "close",
        TagKind::OpenClose => "empty",
    }
}

fn notes(tag: &ComponentTag) -> String {
    let mut notes = Vec::new();
    if let Some(id) = tag.binding_id() {
        notes.push(format!("id={id}"));
    }
    if let Some(role) = tag.role() {
        notes.push(format!("role={}", role.name()));
    }
    if tag.is_auto_component() {
        notes.push("auto".to_string());
    }
    if tag.has_no_close_tag() {
        notes.push("no-close".to_string());
    }
    if tag.is_synthetic() {
        notes.push("synthetic".to_string());
    }

    if notes.is_empty() {
        String::new()
    } else {
        format!("  [{}]", notes.join(" "))
    }
}

#[cfg(test)]
mod tests {
    use trellis_conf::MarkupSettings;

    use super::*;

    #[test]
    fn dump_lists_elements() {
        let markup = MarkupParser::from_text(
            "<div wicket:id=\"box\">a<br>b<wicket:child/></div>",
            &MarkupSettings::default(),
        )
        .parse()
        .unwrap();

        let dump = dump_elements(&markup);
        let lines: Vec<&str> = dump.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], "   0  open   <div wicket:id=\"box\">  [id=box]");
        assert_eq!(lines[1], "   1  raw    \"a<br>b\"");
        assert!(lines[2].starts_with("   2  empty  <wicket:child/>"));
        assert!(lines[2].contains("role=child"));
        assert!(lines[3].starts_with("   3  close  </div>"));
    }
}
