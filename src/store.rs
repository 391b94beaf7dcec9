//! Scenario byte storage.
//!
//! Loading and writing are separate capabilities so that tests and embedders
//! can inject either one. Both are blocking; callers move them off the async
//! executor.

use crate::error::LoadError;
use std::collections::HashMap;
use std::io::Write;
use std::path::{Component, Path, PathBuf};
use std::sync::RwLock;
use tracing::debug;

/// Fetches scenario bytes by file identifier.
pub trait ScenarioLoader: Send + Sync {
    fn load(&self, id: &str) -> Result<Vec<u8>, LoadError>;
}

/// Persists scenario bytes under a file identifier.
///
/// A write replaces the previous content as a whole; readers never see a
/// partially written file.
pub trait ScenarioSink: Send + Sync {
    fn write(&self, id: &str, bytes: &[u8]) -> std::io::Result<()>;
}

/// Scenario files beneath a root directory.
#[derive(Debug, Clone)]
pub struct FileSystemStore {
    root: PathBuf,
}

impl FileSystemStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve an identifier beneath the root. Only normal components are
    /// kept, so identifiers cannot address files outside it.
    pub fn path_for(&self, id: &str) -> PathBuf {
        let mut path = self.root.clone();
        for component in Path::new(id).components() {
            if let Component::Normal(part) = component {
                path.push(part);
            }
        }
        path
    }
}

impl ScenarioLoader for FileSystemStore {
    fn load(&self, id: &str) -> Result<Vec<u8>, LoadError> {
        let path = self.path_for(id);
        match std::fs::read(&path) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(LoadError::NotFound(id.to_string()))
            }
            Err(source) => Err(LoadError::Io {
                id: id.to_string(),
                source,
            }),
        }
    }
}

impl ScenarioSink for FileSystemStore {
    fn write(&self, id: &str, bytes: &[u8]) -> std::io::Result<()> {
        let path = self.path_for(id);
        let parent = path.parent().unwrap_or(&self.root);
        std::fs::create_dir_all(parent)?;

        // Write beside the target, then rename over it
        let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
        tmp.write_all(bytes)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&path).map_err(|e| e.error)?;

        debug!(path = %path.display(), bytes = bytes.len(), "Scenario written");
        Ok(())
    }
}

/// In-memory scenario files.
#[derive(Debug, Default)]
pub struct MemoryStore {
    files: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, id: impl Into<String>, bytes: impl Into<Vec<u8>>) {
        self.files
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id.into(), bytes.into());
    }

    pub fn get(&self, id: &str) -> Option<Vec<u8>> {
        self.files
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(id)
            .cloned()
    }

    pub fn remove(&self, id: &str) -> Option<Vec<u8>> {
        self.files
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(id)
    }

    pub fn len(&self) -> usize {
        self.files.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ScenarioLoader for MemoryStore {
    fn load(&self, id: &str) -> Result<Vec<u8>, LoadError> {
        self.get(id).ok_or_else(|| LoadError::NotFound(id.to_string()))
    }
}

impl ScenarioSink for MemoryStore {
    fn write(&self, id: &str, bytes: &[u8]) -> std::io::Result<()> {
        self.insert(id, bytes);
        Ok(())
    }
}
