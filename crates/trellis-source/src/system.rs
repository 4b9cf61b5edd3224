use std::io;

use camino::Utf8Path;
use camino::Utf8PathBuf;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;

pub trait FileSystem: Send + Sync {
    fn read(&self, path: &Utf8Path) -> io::Result<Vec<u8>>;
    fn exists(&self, path: &Utf8Path) -> bool;
}

/// File system kept in memory. Files can be replaced while the file system
/// is shared, which lets callers simulate edits under a live cache.
pub struct InMemoryFileSystem {
    files: RwLock<FxHashMap<Utf8PathBuf, Vec<u8>>>,
}

impl InMemoryFileSystem {
    #[must_use]
    pub fn new() -> Self {
        Self {
            files: RwLock::new(FxHashMap::default()),
        }
    }

    pub fn add_file(&self, path: impl Into<Utf8PathBuf>, content: impl Into<Vec<u8>>) {
        self.files.write().insert(path.into(), content.into());
    }

    pub fn remove_file(&self, path: &Utf8Path) -> bool {
        self.files.write().remove(path).is_some()
    }
}

impl Default for InMemoryFileSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl FileSystem for InMemoryFileSystem {
    fn read(&self, path: &Utf8Path) -> io::Result<Vec<u8>> {
        self.files
            .read()
            .get(path)
            .cloned()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "File not found"))
    }

    fn exists(&self, path: &Utf8Path) -> bool {
        self.files.read().contains_key(path)
    }
}

/// Standard file system implementation that uses [`std::fs`].
pub struct OsFileSystem;

impl FileSystem for OsFileSystem {
    fn read(&self, path: &Utf8Path) -> io::Result<Vec<u8>> {
        std::fs::read(path)
    }

    fn exists(&self, path: &Utf8Path) -> bool {
        path.is_file()
    }
}
