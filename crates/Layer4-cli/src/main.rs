//! taskq CLI - Main entry point

mod chain;
mod config;
mod run;

use clap::{Parser, Subcommand};
use taskq_foundation::ExecutorsConfig;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// taskq - task/future primitives and bounded execution queues
#[derive(Parser, Debug)]
#[command(name = "taskq")]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the effective executor config, or save it
    Config {
        /// Print as JSON
        #[arg(long)]
        json: bool,

        /// Write the effective config to the project store
        #[arg(long)]
        save: bool,

        /// With --save, write to the global store instead
        #[arg(long, requires = "save")]
        global: bool,
    },
    /// Drive sleeping nodes through a bounded queue
    Run {
        /// Number of nodes
        #[arg(short, long, default_value = "32")]
        nodes: usize,

        /// Admission limit of the queue
        #[arg(short, long, default_value = "4")]
        max_concurrent: usize,

        /// Sleep per node, in milliseconds
        #[arg(short, long, default_value = "50")]
        work_ms: u64,

        /// Cancel the remaining nodes after this many responses
        #[arg(long)]
        cancel_after: Option<usize>,
    },
    /// Build a continuation chain and await its value
    Chain {
        /// Number of continuations
        #[arg(long, default_value = "100")]
        depth: usize,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.debug { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let executors_config = ExecutorsConfig::load()?;

    match args.command {
        Command::Config { json, save, global } => {
            config::run(&executors_config, config::ConfigOptions { json, save, global })
        }
        Command::Run {
            nodes,
            max_concurrent,
            work_ms,
            cancel_after,
        } => {
            let options = run::RunOptions {
                nodes,
                max_concurrent,
                work_ms,
                cancel_after,
            };
            run::run(executors_config, options).await
        }
        Command::Chain { depth } => chain::run(executors_config, depth).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_global_requires_save() {
        assert!(Args::try_parse_from(["taskq", "config", "--global"]).is_err());

        let args = Args::try_parse_from(["taskq", "config", "--save", "--global"]).unwrap();
        assert!(matches!(
            args.command,
            Command::Config {
                save: true,
                global: true,
                ..
            }
        ));
    }
}
