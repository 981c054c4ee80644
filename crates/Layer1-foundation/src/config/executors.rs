//! Executors Config - sizing and naming of the executor context
//!
//! Loaded from `executors.json` in the global store, then the project store.

use crate::storage::{JsonStore, StoreScope};
use std::path::PathBuf;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Config file name
pub const EXECUTORS_CONFIG_FILE: &str = "executors.json";

/// Sizing and naming of the named executors
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutorsConfig {
    /// Admission limit of the IO queue
    #[serde(default = "default_io_max_concurrent")]
    pub io_max_concurrent: usize,

    /// Admission limit of the immediate queue (None = unbounded)
    #[serde(default)]
    pub immediate_queue_max_concurrent: Option<usize>,

    /// In-flight jobs on the background pool before it overflows
    #[serde(default = "default_background_max_threads")]
    pub background_max_threads: usize,

    /// Worker count of the overflow pool
    #[serde(default = "default_backup_pool_threads")]
    pub backup_pool_threads: usize,

    /// Name of the serial ("main") thread
    #[serde(default = "default_serial_thread_name")]
    pub serial_thread_name: String,

    /// Name prefix of background worker threads
    #[serde(default = "default_background_thread_name")]
    pub background_thread_name: String,

    /// Name prefix of overflow worker threads
    #[serde(default = "default_backup_thread_name")]
    pub backup_thread_name: String,
}

impl Default for ExecutorsConfig {
    fn default() -> Self {
        Self {
            io_max_concurrent: default_io_max_concurrent(),
            immediate_queue_max_concurrent: None,
            background_max_threads: default_background_max_threads(),
            backup_pool_threads: default_backup_pool_threads(),
            serial_thread_name: default_serial_thread_name(),
            background_thread_name: default_background_thread_name(),
            backup_thread_name: default_backup_thread_name(),
        }
    }
}

impl ExecutorsConfig {
    pub fn new() -> Self {
        Self::default()
    }

    // ========================================================================
    // Load / Save
    // ========================================================================

    /// Global + project merged load
    pub fn load() -> Result<Self> {
        let mut config = Self::new();

        for scope in [StoreScope::Global, StoreScope::Project] {
            let Ok(store) = JsonStore::open(scope) else {
                continue;
            };
            if let Some(layer) = store.read::<Self>(EXECUTORS_CONFIG_FILE)? {
                config.merge(layer);
            }
        }

        config.validate()?;
        Ok(config)
    }

    /// Load from a single store, falling back to defaults when absent
    pub fn load_from(store: &JsonStore) -> Result<Self> {
        let mut config = Self::new();
        if let Some(loaded) = store.read::<Self>(EXECUTORS_CONFIG_FILE)? {
            config.merge(loaded);
        }
        config.validate()?;
        Ok(config)
    }

    /// Validate, then write to `store`; returns the file written
    pub fn save(&self, store: &JsonStore) -> Result<PathBuf> {
        self.validate()?;
        store.write(EXECUTORS_CONFIG_FILE, self)
    }

    /// Overlay every field of `other` that differs from the default
    pub fn merge(&mut self, other: ExecutorsConfig) {
        let defaults = Self::default();

        if other.io_max_concurrent != defaults.io_max_concurrent {
            self.io_max_concurrent = other.io_max_concurrent;
        }
        if other.immediate_queue_max_concurrent.is_some() {
            self.immediate_queue_max_concurrent = other.immediate_queue_max_concurrent;
        }
        if other.background_max_threads != defaults.background_max_threads {
            self.background_max_threads = other.background_max_threads;
        }
        if other.backup_pool_threads != defaults.backup_pool_threads {
            self.backup_pool_threads = other.backup_pool_threads;
        }
        if other.serial_thread_name != defaults.serial_thread_name {
            self.serial_thread_name = other.serial_thread_name;
        }
        if other.background_thread_name != defaults.background_thread_name {
            self.background_thread_name = other.background_thread_name;
        }
        if other.backup_thread_name != defaults.backup_thread_name {
            self.backup_thread_name = other.backup_thread_name;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.io_max_concurrent == 0 {
            return Err(Error::Config("ioMaxConcurrent must be at least 1".to_string()));
        }
        if self.immediate_queue_max_concurrent == Some(0) {
            return Err(Error::Config(
                "immediateQueueMaxConcurrent must be at least 1".to_string(),
            ));
        }
        if self.background_max_threads == 0 {
            return Err(Error::Config(
                "backgroundMaxThreads must be at least 1".to_string(),
            ));
        }
        if self.backup_pool_threads == 0 {
            return Err(Error::Config("backupPoolThreads must be at least 1".to_string()));
        }
        Ok(())
    }

    /// Admission limit of the immediate queue, unbounded mapped to `usize::MAX`
    pub fn immediate_queue_limit(&self) -> usize {
        self.immediate_queue_max_concurrent.unwrap_or(usize::MAX)
    }

    // ========================================================================
    // Builder
    // ========================================================================

    pub fn io_max_concurrent(mut self, limit: usize) -> Self {
        self.io_max_concurrent = limit;
        self
    }

    pub fn immediate_queue_max_concurrent(mut self, limit: usize) -> Self {
        self.immediate_queue_max_concurrent = Some(limit);
        self
    }

    pub fn background_max_threads(mut self, limit: usize) -> Self {
        self.background_max_threads = limit;
        self
    }

    pub fn backup_pool_threads(mut self, threads: usize) -> Self {
        self.backup_pool_threads = threads;
        self
    }

    pub fn serial_thread_name(mut self, name: impl Into<String>) -> Self {
        self.serial_thread_name = name.into();
        self
    }
}

fn default_io_max_concurrent() -> usize {
    64
}

fn default_background_max_threads() -> usize {
    512
}

fn default_backup_pool_threads() -> usize {
    4
}

fn default_serial_thread_name() -> String {
    "taskq-main".to_string()
}

fn default_background_thread_name() -> String {
    "taskq-bg".to_string()
}

fn default_backup_thread_name() -> String {
    "taskq-backup".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ExecutorsConfig::default();
        assert_eq!(config.io_max_concurrent, 64);
        assert_eq!(config.immediate_queue_limit(), usize::MAX);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: ExecutorsConfig =
            serde_json::from_str(r#"{ "ioMaxConcurrent": 8 }"#).unwrap();
        assert_eq!(config.io_max_concurrent, 8);
        assert_eq!(config.backup_pool_threads, 4);
        assert_eq!(config.serial_thread_name, "taskq-main");
    }

    #[test]
    fn test_merge_overrides_non_default_fields() {
        let mut base = ExecutorsConfig::default().backup_pool_threads(2);
        let overlay = ExecutorsConfig::default()
            .io_max_concurrent(16)
            .immediate_queue_max_concurrent(128);

        base.merge(overlay);
        assert_eq!(base.io_max_concurrent, 16);
        assert_eq!(base.immediate_queue_limit(), 128);
        // untouched by the overlay
        assert_eq!(base.backup_pool_threads, 2);
    }

    #[test]
    fn test_validate_rejects_zero_limits() {
        assert!(ExecutorsConfig::default().io_max_concurrent(0).validate().is_err());
        assert!(ExecutorsConfig::default()
            .immediate_queue_max_concurrent(0)
            .validate()
            .is_err());
        assert!(ExecutorsConfig::default().backup_pool_threads(0).validate().is_err());
    }

    #[test]
    fn test_load_from_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStore::new(dir.path());

        assert_eq!(ExecutorsConfig::load_from(&store).unwrap(), ExecutorsConfig::default());

        ExecutorsConfig::default().io_max_concurrent(3).save(&store).unwrap();
        assert_eq!(ExecutorsConfig::load_from(&store).unwrap().io_max_concurrent, 3);
    }

    #[test]
    fn test_save_refuses_invalid_config() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStore::new(dir.path());

        let err = ExecutorsConfig::default()
            .backup_pool_threads(0)
            .save(&store)
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(!store.path(EXECUTORS_CONFIG_FILE).exists());
    }

    #[test]
    fn test_load_from_rejects_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(EXECUTORS_CONFIG_FILE),
            r#"{ "backupPoolThreads": 0 }"#,
        )
        .unwrap();

        let err = ExecutorsConfig::load_from(&JsonStore::new(dir.path())).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
