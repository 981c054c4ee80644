//! # taskq-foundation
//!
//! Foundation layer for taskq:
//! - Error: the shared error taxonomy (contract violations, execution
//!   failures, cancellation, timeouts, rejected submissions)
//! - Config: `ExecutorsConfig`, merged from global and project JSON files
//! - Storage: `JsonStore`, the JSON file store behind the config

pub mod config;
pub mod error;
pub mod storage;

// ============================================================================
// Error
// ============================================================================
pub use error::{Error, Result};

// ============================================================================
// Config
// ============================================================================
pub use config::{ExecutorsConfig, EXECUTORS_CONFIG_FILE};

// ============================================================================
// Storage
// ============================================================================
pub use storage::{JsonStore, StoreScope};
