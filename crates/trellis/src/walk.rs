use camino::Utf8Path;
use camino::Utf8PathBuf;
use ignore::WalkBuilder;

const MARKUP_EXTENSIONS: &[&str] = &["html", "htm", "xml"];

pub fn is_markup(path: &Utf8Path) -> bool {
    path.extension()
        .is_some_and(|ext| MARKUP_EXTENSIONS.iter().any(|m| ext.eq_ignore_ascii_case(m)))
}

/// Markup files under `paths`, sorted and deduplicated.
///
/// Files are taken as given when they are markup; directories are walked
/// with the usual ignore rules, skipping hidden entries.
pub fn walk_markup_files(paths: &[Utf8PathBuf]) -> Vec<Utf8PathBuf> {
    let mut files = Vec::new();

    for path in paths {
        if path.is_file() {
            if is_markup(path) {
                files.push(path.clone());
            }
            continue;
        }
        if !path.is_dir() {
            tracing::warn!(%path, "Path does not exist, skipping");
            continue;
        }

        for entry in WalkBuilder::new(path.as_std_path())
            .build()
            .filter_map(Result::ok)
        {
            if !entry.file_type().is_some_and(|ft| ft.is_file()) {
                continue;
            }
            let Some(utf8) = Utf8Path::from_path(entry.path()) else {
                continue;
            };
            if is_markup(utf8) {
                files.push(utf8.to_owned());
            }
        }
    }

    files.sort();
    files.dedup();
    files
}
