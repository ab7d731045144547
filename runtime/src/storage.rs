//! Module sources: where the harness fetches WebAssembly bytes from.
//!
//! - [`FileSource`]: resolves names against a root directory on disk.
//! - [`MemoryStore`]: named modules kept in RAM, for tests and embedding.

use std::borrow::Cow;
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::PathBuf;

use tracing::debug;

use crate::{Error, ModuleSource, Result};

/// Reads modules from files below a fixed root.
#[derive(Debug, Clone)]
pub struct FileSource {
    root: PathBuf,
}

impl FileSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }
}

impl ModuleSource for FileSource {
    fn fetch(&self, name: &str) -> Result<Cow<'_, [u8]>> {
        let path = self.resolve(name);
        debug!(path = %path.display(), "reading module");
        match fs::read(&path) {
            Ok(bytes) => Ok(Cow::Owned(bytes)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                Err(Error::ModuleNotFound(name.to_string()))
            }
            Err(source) => Err(Error::Io { path, source }),
        }
    }
}

/// In-memory module store.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    modules: HashMap<String, Vec<u8>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a module.
    pub fn upsert(&mut self, name: impl Into<String>, bytes: impl Into<Vec<u8>>) {
        self.modules.insert(name.into(), bytes.into());
    }
}

impl ModuleSource for MemoryStore {
    fn fetch(&self, name: &str) -> Result<Cow<'_, [u8]>> {
        self.modules
            .get(name)
            .map(|bytes| Cow::Borrowed(bytes.as_slice()))
            .ok_or_else(|| Error::ModuleNotFound(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    #[test]
    fn memory_store_upsert_replaces() {
        let mut store = MemoryStore::new();
        store.upsert("a.wasm", vec![1, 2]);
        store.upsert("a.wasm", vec![3]);
        assert_eq!(&*store.fetch("a.wasm").unwrap(), &[3]);
    }

    #[test]
    fn memory_store_missing_module() {
        let store = MemoryStore::new();
        assert!(matches!(
            store.fetch("nope.wasm"),
            Err(Error::ModuleNotFound(name)) if name == "nope.wasm"
        ));
    }

    #[test]
    fn file_source_reads_relative_to_root() {
        let root = env::temp_dir().join("memlens_file_source");
        fs::create_dir_all(&root).unwrap();
        fs::write(root.join("mod.wasm"), [0x00, 0x61, 0x73, 0x6d]).unwrap();

        let source = FileSource::new(&root);
        assert_eq!(&*source.fetch("mod.wasm").unwrap(), b"\0asm");
        assert!(matches!(
            source.fetch("missing.wasm"),
            Err(Error::ModuleNotFound(_))
        ));

        let _ = fs::remove_dir_all(root);
    }
}
