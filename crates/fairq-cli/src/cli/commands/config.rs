//! `fairq config` – show the effective configuration.

use anyhow::Result;
use fairq_core::config::{self, SchedulerConfig};

fn limit(value: Option<usize>) -> String {
    value
        .map(|n| n.to_string())
        .unwrap_or_else(|| "unlimited".to_string())
}

pub fn run_config(cfg: &SchedulerConfig) -> Result<()> {
    let path = config::config_path()?;
    println!("# {}", path.display());
    print!("{}", toml::to_string_pretty(cfg)?);
    println!();
    println!("# effective limits");
    println!("#   running tasks:  {}", limit(cfg.task_limit()));
    println!("#   running queues: {}", limit(cfg.queue_limit()));
    println!("#   queued tasks:   {}", limit(cfg.size_limit()));
    Ok(())
}
