//! Built-in executors for workload task types.
//!
//! - `sleep { ms }`: wait `ms` milliseconds.
//! - `shell { cmd }`: run `cmd` with `sh -c`; a non-zero exit fails the attempt.
//! - `fail { times, ms? }`: fail the first `times` attempts (default 1), then succeed.
//! - `echo`: print the task data.
//!
//! Each one watches the abort token and stops when the scheduler pauses or
//! cancels the task.

use anyhow::{bail, Context, Result};
use fairq_core::control::{AbortToken, TaskAborted};
use serde_json::{Map, Value};
use std::time::Duration;
use tokio::process::Command;
use tokio::time::Instant;

pub const BUILTIN_TYPES: [&str; 4] = ["sleep", "shell", "fail", "echo"];

const ABORT_POLL: Duration = Duration::from_millis(50);

/// Values an executor reports back into the task data on success.
pub type Outputs = Map<String, Value>;

pub async fn execute(task_type: &str, data: Value, attempt: u64, abort: AbortToken) -> Result<Outputs> {
    match task_type {
        "sleep" => {
            let ms = data
                .get("ms")
                .and_then(Value::as_u64)
                .context("sleep task needs a numeric `ms` field")?;
            sleep_unless_aborted(ms, &abort).await?;
            Ok(output("slept_ms", Value::from(ms)))
        }
        "shell" => {
            let cmd = data
                .get("cmd")
                .and_then(Value::as_str)
                .context("shell task needs a string `cmd` field")?;
            let code = run_shell(cmd, &abort).await?;
            Ok(output("exit_code", Value::from(code)))
        }
        "fail" => {
            let times = data.get("times").and_then(Value::as_u64).unwrap_or(1);
            let ms = data.get("ms").and_then(Value::as_u64).unwrap_or(0);
            sleep_unless_aborted(ms, &abort).await?;
            if attempt <= times {
                bail!("planned failure {}/{}", attempt, times);
            }
            Ok(Outputs::new())
        }
        "echo" => {
            println!("{}", data);
            Ok(Outputs::new())
        }
        other => bail!("unknown task type: {}", other),
    }
}

fn output(key: &str, value: Value) -> Outputs {
    let mut out = Outputs::new();
    out.insert(key.to_string(), value);
    out
}

async fn sleep_unless_aborted(ms: u64, abort: &AbortToken) -> Result<()> {
    let deadline = Instant::now() + Duration::from_millis(ms);
    loop {
        if abort.is_aborted() {
            return Err(TaskAborted.into());
        }
        let now = Instant::now();
        if now >= deadline {
            return Ok(());
        }
        tokio::time::sleep((deadline - now).min(ABORT_POLL)).await;
    }
}

async fn run_shell(cmd: &str, abort: &AbortToken) -> Result<i32> {
    let mut child = Command::new("sh")
        .arg("-c")
        .arg(cmd)
        .kill_on_drop(true)
        .spawn()
        .with_context(|| format!("spawn `{}`", cmd))?;
    loop {
        tokio::select! {
            status = child.wait() => {
                let status = status.context("wait for shell command")?;
                let code = status.code().unwrap_or(-1);
                if !status.success() {
                    bail!("`{}` exited with {}", cmd, code);
                }
                return Ok(code);
            }
            _ = tokio::time::sleep(ABORT_POLL) => {
                if abort.is_aborted() {
                    let _ = child.kill().await;
                    return Err(TaskAborted.into());
                }
            }
        }
    }
}
