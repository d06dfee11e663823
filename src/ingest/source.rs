//! Upstream fragment sources

use super::IngestError;
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// One addressable fragment in a source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceEntry {
    /// Key the fragment is stored under upstream; becomes the record id
    pub source_id: String,
    /// Where to read it from (path, offset, ...). Opaque to the ingestor.
    pub locator: String,
}

/// Raw fragments keyed by id. Nothing is assumed about the bytes.
#[async_trait]
pub trait FragmentSource: Send + Sync {
    /// Enumerate fragments in a stable order.
    fn entries(&self) -> Result<Vec<SourceEntry>, IngestError>;

    /// Read one fragment's bytes.
    async fn read(&self, entry: &SourceEntry) -> Result<Vec<u8>, IngestError>;
}

/// Every regular, non-hidden file under a directory is one fragment.
///
/// The file stem is the source id, so `3f2a...c1.json` ingests as
/// record `3f2a...c1`.
pub struct DirectorySource {
    root: PathBuf,
}

impl DirectorySource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

fn is_hidden(entry: &walkdir::DirEntry) -> bool {
    entry.depth() > 0
        && entry
            .file_name()
            .to_str()
            .is_some_and(|name| name.starts_with('.'))
}

#[async_trait]
impl FragmentSource for DirectorySource {
    fn entries(&self) -> Result<Vec<SourceEntry>, IngestError> {
        let mut entries = Vec::new();
        let walker = WalkDir::new(&self.root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| !is_hidden(e));

        for entry in walker {
            let entry = entry.map_err(|e| IngestError::Enumerate(e.to_string()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Some(stem) = entry.path().file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            entries.push(SourceEntry {
                source_id: stem.to_string(),
                locator: entry.path().to_string_lossy().to_string(),
            });
        }
        Ok(entries)
    }

    async fn read(&self, entry: &SourceEntry) -> Result<Vec<u8>, IngestError> {
        tokio::fs::read(&entry.locator)
            .await
            .map_err(|source| IngestError::Io {
                source_id: entry.source_id.clone(),
                source,
            })
    }
}

/// In-memory source, mainly for tests and embedding callers.
#[derive(Debug, Default, Clone)]
pub struct MemorySource {
    fragments: Vec<(String, Vec<u8>)>,
    unreadable: BTreeSet<String>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_fragment(mut self, source_id: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        self.fragments.push((source_id.into(), bytes.into()));
        self
    }

    /// Register an entry whose read always fails with an I/O error.
    pub fn with_unreadable(mut self, source_id: impl Into<String>) -> Self {
        let id = source_id.into();
        self.fragments.push((id.clone(), Vec::new()));
        self.unreadable.insert(id);
        self
    }
}

#[async_trait]
impl FragmentSource for MemorySource {
    fn entries(&self) -> Result<Vec<SourceEntry>, IngestError> {
        Ok(self
            .fragments
            .iter()
            .enumerate()
            .map(|(i, (id, _))| SourceEntry {
                source_id: id.clone(),
                locator: i.to_string(),
            })
            .collect())
    }

    async fn read(&self, entry: &SourceEntry) -> Result<Vec<u8>, IngestError> {
        if self.unreadable.contains(&entry.source_id) {
            return Err(IngestError::Io {
                source_id: entry.source_id.clone(),
                source: std::io::Error::new(std::io::ErrorKind::Other, "fragment unreadable"),
            });
        }
        let index: usize = entry
            .locator
            .parse()
            .map_err(|_| IngestError::Enumerate(format!("bad locator {}", entry.locator)))?;
        self.fragments
            .get(index)
            .map(|(_, bytes)| bytes.clone())
            .ok_or_else(|| IngestError::Enumerate(format!("no fragment at {}", index)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn directory_source_lists_files_by_stem_in_order() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("b.json"), b"{}").unwrap();
        std::fs::write(dir.path().join("a.html"), b"<p/>").unwrap();
        std::fs::write(dir.path().join("sub").join("c.txt"), b"text").unwrap();
        std::fs::write(dir.path().join(".hidden"), b"skip").unwrap();

        let source = DirectorySource::new(dir.path());
        let entries = source.entries().unwrap();
        let ids: Vec<&str> = entries.iter().map(|e| e.source_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);

        let bytes = source.read(&entries[0]).await.unwrap();
        assert_eq!(bytes, b"<p/>");
    }

    #[tokio::test]
    async fn directory_source_read_failure_is_io_error() {
        let source = DirectorySource::new("/nonexistent");
        let entry = SourceEntry {
            source_id: "gone".into(),
            locator: "/nonexistent/gone.json".into(),
        };
        let err = source.read(&entry).await.unwrap_err();
        assert!(matches!(err, IngestError::Io { .. }));
    }

    #[tokio::test]
    async fn memory_source_unreadable_entry_fails() {
        let source = MemorySource::new()
            .with_fragment("ok", "hello")
            .with_unreadable("bad");
        let entries = source.entries().unwrap();
        assert_eq!(source.read(&entries[0]).await.unwrap(), b"hello");
        assert!(source.read(&entries[1]).await.is_err());
    }
}
