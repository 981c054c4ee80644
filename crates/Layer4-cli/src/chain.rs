//! `taskq chain` - a continuation chain hopping over the background executor

use std::time::Instant;
use taskq_foundation::ExecutorsConfig;
use taskq_task::{Executors, Task};

pub async fn run(config: ExecutorsConfig, depth: usize) -> anyhow::Result<()> {
    let executors = Executors::new(config)?;
    let started = Instant::now();

    let mut task: Task<u64> = executors.call(|| Ok(0));
    for _ in 0..depth {
        task = task.continue_with(executors.background(), |t| Ok(t.result()? + 1));
    }
    let value = task.await?;

    println!("\nChain\n");
    println!("{:<10} {}", "depth", depth);
    println!("{:<10} {}", "value", value);
    println!("{:<10} {:.1?}", "elapsed", started.elapsed());
    println!();

    Ok(())
}
