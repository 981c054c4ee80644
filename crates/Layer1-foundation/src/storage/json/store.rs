//! JSON file store
//!
//! A store is a directory holding JSON documents. There are two scopes: the
//! user-wide global store and a per-project store under the project root.
//! Writes go through a sibling temp file and a rename, so a reader never
//! sees a half-written document.

use crate::{Error, Result};
use serde::{de::DeserializeOwned, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Directory name used for both scopes
const STORE_DIR: &str = "taskq";

/// Where a store lives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreScope {
    /// `<config_dir>/taskq/`
    Global,
    /// `<cwd>/.taskq/`
    Project,
}

/// Directory of JSON documents
#[derive(Debug, Clone)]
pub struct JsonStore {
    dir: PathBuf,
}

impl JsonStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn open(scope: StoreScope) -> Result<Self> {
        match scope {
            StoreScope::Global => Self::global(),
            StoreScope::Project => Self::current_project(),
        }
    }

    pub fn global() -> Result<Self> {
        let dir = dirs::config_dir()
            .ok_or_else(|| Error::Config("no user config directory".to_string()))?;
        Ok(Self::new(dir.join(STORE_DIR)))
    }

    pub fn project(root: impl AsRef<Path>) -> Self {
        Self::new(root.as_ref().join(format!(".{}", STORE_DIR)))
    }

    pub fn current_project() -> Result<Self> {
        let cwd = std::env::current_dir()
            .map_err(|e| Error::Config(format!("no current directory: {}", e)))?;
        Ok(Self::project(cwd))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    /// Read and parse a document; `None` when it does not exist
    pub fn read<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>> {
        let path = self.path(name);
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %path.display(), "document absent");
                return Ok(None);
            }
            Err(e) => {
                return Err(Error::Config(format!("cannot read {}: {}", path.display(), e)));
            }
        };

        serde_json::from_str(&content)
            .map(Some)
            .map_err(|e| Error::Config(format!("malformed {}: {}", path.display(), e)))
    }

    /// Replace a document with the pretty JSON of `value`.
    ///
    /// Returns the path written.
    pub fn write<T: Serialize>(&self, name: &str, value: &T) -> Result<PathBuf> {
        let content = serde_json::to_string_pretty(value)
            .map_err(|e| Error::Config(format!("cannot serialize {}: {}", name, e)))?;

        std::fs::create_dir_all(&self.dir)
            .map_err(|e| Error::Config(format!("cannot create {}: {}", self.dir.display(), e)))?;

        let path = self.path(name);
        let staging = self.path(&format!("{}.tmp", name));
        std::fs::write(&staging, content)
            .map_err(|e| Error::Config(format!("cannot write {}: {}", staging.display(), e)))?;
        std::fs::rename(&staging, &path)
            .map_err(|e| Error::Config(format!("cannot replace {}: {}", path.display(), e)))?;

        debug!(path = %path.display(), "document written");
        Ok(path)
    }
}
