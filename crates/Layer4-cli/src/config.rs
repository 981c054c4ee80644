//! `taskq config` - show or persist the effective executor config

use std::path::PathBuf;
use taskq_foundation::{ExecutorsConfig, JsonStore, StoreScope};
use tracing::info;

pub struct ConfigOptions {
    pub json: bool,
    pub save: bool,
    pub global: bool,
}

pub fn run(config: &ExecutorsConfig, options: ConfigOptions) -> anyhow::Result<()> {
    if options.save {
        let scope = if options.global {
            StoreScope::Global
        } else {
            StoreScope::Project
        };
        let path = save(config, &JsonStore::open(scope)?)?;
        println!("Saved {}", path.display());
        return Ok(());
    }

    print(config, options.json)
}

/// Write the merged config, pinning every value the layers resolved to
fn save(config: &ExecutorsConfig, store: &JsonStore) -> anyhow::Result<PathBuf> {
    let path = config.save(store)?;
    info!(path = %path.display(), "executor config saved");
    Ok(path)
}

fn print(config: &ExecutorsConfig, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(config)?);
        return Ok(());
    }

    let immediate_limit = config
        .immediate_queue_max_concurrent
        .map(|n| n.to_string())
        .unwrap_or_else(|| "unbounded".to_string());

    println!("\nExecutors\n");
    println!("{:<28} {}", "io max concurrent", config.io_max_concurrent);
    println!("{:<28} {}", "immediate max concurrent", immediate_limit);
    println!("{:<28} {}", "background max threads", config.background_max_threads);
    println!("{:<28} {}", "backup pool threads", config.backup_pool_threads);
    println!("{:<28} {}", "serial thread", config.serial_thread_name);
    println!("{:<28} {}", "background thread", config.background_thread_name);
    println!("{:<28} {}", "backup thread", config.backup_thread_name);
    println!();

    Ok(())
}
