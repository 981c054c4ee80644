//! Config - executor context settings
//!
//! - `executors.rs` - ExecutorsConfig (queue limits, pool sizes, thread names)

mod executors;

pub use executors::{ExecutorsConfig, EXECUTORS_CONFIG_FILE};
