use std::sync::Arc;

use anyhow::Result;
use camino::Utf8PathBuf;
use clap::Parser;
use trellis_cache::FileSystemLocator;
use trellis_cache::MarkupCache;
use trellis_cache::StaticHierarchy;
use trellis_cache::ViewIdentity;
use trellis_source::OsFileSystem;

use super::absolutize;
use super::dump::dump_elements;
use super::load_settings;
use super::resolve_project_root;
use crate::args::Args;
use crate::commands::Command;
use crate::exit::Exit;

#[derive(Debug, Parser)]
pub struct Resolve {
    /// Logical class of the view, e.g. `app.pages.Home`.
    class: String,

    /// Directory markup is looked up in. May be repeated; defaults to the
    /// current directory.
    #[arg(long = "root", value_name = "DIR")]
    roots: Vec<Utf8PathBuf>,

    /// Declare a superclass, e.g. `--parent app.pages.Home=app.pages.Layout`.
    #[arg(long = "parent", value_name = "CLASS=SUPERCLASS", value_parser = parse_parent)]
    parents: Vec<(String, String)>,

    #[arg(long)]
    locale: Option<String>,

    #[arg(long)]
    style: Option<String>,

    /// File extension of the markup.
    #[arg(long, default_value = "html")]
    markup_type: String,

    /// Print the element sequence instead of the markup text.
    #[arg(long)]
    elements: bool,
}

fn parse_parent(value: &str) -> Result<(String, String), String> {
    match value.split_once('=') {
        Some((class, parent)) if !class.trim().is_empty() && !parent.trim().is_empty() => {
            Ok((class.trim().to_string(), parent.trim().to_string()))
        }
        _ => Err(format!("expected CLASS=SUPERCLASS, got '{value}'")),
    }
}

impl Command for Resolve {
    fn execute(&self, _args: &Args) -> Result<Exit> {
        let project_root = resolve_project_root()?;
        let settings = load_settings(&project_root)?;

        let roots = if self.roots.is_empty() {
            vec![project_root.clone()]
        } else {
            self.roots
                .iter()
                .map(|root| absolutize(&project_root, root))
                .collect()
        };

        let mut hierarchy = StaticHierarchy::new();
        for (class, parent) in &self.parents {
            hierarchy.insert(class.clone(), parent.clone());
        }

        let cache = MarkupCache::builder(FileSystemLocator::new(Arc::new(OsFileSystem), roots))
            .hierarchy(hierarchy)
            .settings(settings.markup)
            .build();

        let mut view = ViewIdentity::new(self.class.clone(), self.markup_type.clone());
        if let Some(locale) = &self.locale {
            view = view.with_locale(locale.clone());
        }
        if let Some(style) = &self.style {
            view = view.with_style(style.clone());
        }

        match cache.markup_for(&view, true) {
            Ok(Some(markup)) => {
                if self.elements {
                    print!("{}", dump_elements(&markup));
                } else {
                    println!("{markup}");
                }
                Ok(Exit::success())
            }
            Ok(None) => Ok(Exit::error().with_message(format!("No markup for {view}"))),
            Err(error) => Ok(Exit::error().with_message(format!(
                "error[{}]: {error}",
                error.diagnostic_code()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parent_pairs() {
        assert_eq!(
            parse_parent("a.Home = a.Layout"),
            Ok(("a.Home".to_string(), "a.Layout".to_string()))
        );
        assert!(parse_parent("a.Home").is_err());
        assert!(parse_parent("=a.Layout").is_err());
    }
}
