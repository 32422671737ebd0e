//! CLI command handlers, one file per command.

mod builtins;
mod completions;
mod config;
mod man;
mod run;
mod workload;

pub use completions::run_completions;
pub use config::run_config;
pub use man::run_man;
pub use run::{run_workload, RunOptions};
