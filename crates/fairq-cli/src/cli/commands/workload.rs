//! Workload file read by `fairq run`.
//!
//! ```toml
//! [[queue]]
//! type = "sleep"
//! priority = 3
//! items = [{ ms = 200 }, { ms = 400 }]
//! ```

use anyhow::{bail, Context, Result};
use fairq_core::QueueOptions;
use serde::Deserialize;
use serde_json::Value;
use std::fs;
use std::path::Path;

fn one() -> usize {
    1
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Workload {
    #[serde(default, rename = "queue")]
    pub queues: Vec<QueueSpec>,
}

/// One `[[queue]]` table.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QueueSpec {
    #[serde(rename = "type")]
    pub task_type: String,
    pub id: Option<String>,
    pub priority: Option<f64>,
    pub max_retries: Option<u32>,
    /// Simple mode: tasks per sub-queue. All items form one sub-queue when unset.
    pub batch: Option<usize>,
    #[serde(default)]
    pub items: Vec<Value>,
    /// Repeat `items` this many times.
    #[serde(default = "one")]
    pub repeat: usize,
}

impl QueueSpec {
    pub fn options(&self) -> QueueOptions {
        QueueOptions {
            id: self.id.clone(),
            priority: self.priority,
            max_retries: self.max_retries,
            metadata: None,
        }
    }

    pub fn expanded_items(&self) -> Vec<Value> {
        let mut items = Vec::with_capacity(self.items.len() * self.repeat);
        for _ in 0..self.repeat {
            items.extend(self.items.iter().cloned());
        }
        items
    }
}

impl Workload {
    pub fn parse(text: &str) -> Result<Self> {
        let workload: Workload = toml::from_str(text)?;
        if workload.queues.is_empty() {
            bail!("workload defines no [[queue]] tables");
        }
        Ok(workload)
    }

    /// Every queue must use one of `known` task types.
    pub fn check_types(&self, known: &[&str]) -> Result<()> {
        for (i, q) in self.queues.iter().enumerate() {
            if !known.contains(&q.task_type.as_str()) {
                bail!(
                    "queue #{} has unknown type {:?} (expected one of: {})",
                    i,
                    q.task_type,
                    known.join(", ")
                );
            }
        }
        Ok(())
    }
}

pub fn load(path: &Path) -> Result<Workload> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("read workload {}", path.display()))?;
    Workload::parse(&text).with_context(|| format!("parse workload {}", path.display()))
}
