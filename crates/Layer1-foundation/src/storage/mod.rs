//! Storage module for taskq
//!
//! - `json`: JSON - configuration files (global and per-project)

mod json;

pub use json::{JsonStore, StoreScope};
