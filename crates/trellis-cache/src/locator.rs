use std::io;
use std::sync::Arc;

use camino::Utf8PathBuf;
use trellis_source::FileSystem;
use trellis_source::MarkupSource;
use trellis_source::SourceId;

use crate::identity::ViewIdentity;

pub trait SourceLocator: Send + Sync {
    /// The markup source of `view`, or `None` when it has none. Only the
    /// view's own class is consulted; the cache walks the hierarchy.
    fn locate(&self, view: &ViewIdentity) -> io::Result<Option<MarkupSource>>;
}

/// Finds markup next to the view's class path below one or more roots:
/// `app.pages.Home` with style `dark` and locale `de_CH` tries
/// `app/pages/Home_dark_de_CH.html`, `app/pages/Home_dark_de.html`,
/// `app/pages/Home_dark.html`, then the same without the style.
pub struct FileSystemLocator {
    fs: Arc<dyn FileSystem>,
    roots: Vec<Utf8PathBuf>,
}

impl FileSystemLocator {
    #[must_use]
    pub fn new(fs: Arc<dyn FileSystem>, roots: Vec<Utf8PathBuf>) -> Self {
        Self { fs, roots }
    }

    /// Candidate paths relative to a root, most specific first.
    #[must_use]
    pub fn candidates(view: &ViewIdentity) -> Vec<String> {
        let path = view.class.replace('.', "/");

        let mut locales: Vec<Option<&str>> = Vec::new();
        if let Some(locale) = view.locale.as_deref() {
            locales.push(Some(locale));
            if let Some((language, _)) = locale.split_once('_') {
                locales.push(Some(language));
            }
        }
        locales.push(None);

        let mut styles = vec![view.style.as_deref()];
        if view.style.is_some() {
            styles.push(None);
        }

        let mut candidates = Vec::with_capacity(styles.len() * locales.len());
        for style in &styles {
            for locale in &locales {
                let mut name = path.clone();
                for part in [style, locale].into_iter().flatten() {
                    name.push('_');
                    name.push_str(part);
                }
                name.push('.');
                name.push_str(&view.markup_type);
                candidates.push(name);
            }
        }
        candidates
    }
}

impl SourceLocator for FileSystemLocator {
    fn locate(&self, view: &ViewIdentity) -> io::Result<Option<MarkupSource>> {
        let candidates = Self::candidates(view);
        for root in &self.roots {
            for candidate in &candidates {
                let path = root.join(candidate);
                if !self.fs.exists(&path) {
                    continue;
                }
                let bytes = self.fs.read(&path)?;
                tracing::trace!(%path, view = %view, "Located markup");
                return Ok(Some(MarkupSource::new(SourceId::Path(path), bytes)));
            }
        }
        Ok(None)
    }
}
