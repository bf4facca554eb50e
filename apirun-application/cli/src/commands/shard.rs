//! 批量分片预览

use anyhow::{bail, Result};
use colored::Colorize;

use apirun_pool::shard_tasks;

pub fn preview(tasks: usize, workers: usize) -> Result<()> {
    if workers == 0 {
        bail!("节点数必须大于 0");
    }

    let shards = shard_tasks((0..tasks).collect(), workers);
    println!(
        "{} {} 个任务分配到 {} 个节点:\n",
        "✓".green(),
        tasks,
        workers
    );
    for (index, shard) in shards.iter().enumerate() {
        let mut indexes: Vec<String> = shard.iter().take(8).map(|i| format!("#{}", i)).collect();
        if shard.len() > 8 {
            indexes.push("...".to_string());
        }
        println!(
            "  节点 {:<4} {:>6} 个  {}",
            index + 1,
            shard.len(),
            indexes.join(" ").dimmed()
        );
    }

    Ok(())
}
