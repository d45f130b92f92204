pub mod config;
pub mod logging;
pub mod sweep;

pub use config::{FlagValue, RunSpec, ToolConfig, ToolError};
pub use logging::init_tracing;
pub use sweep::{build_argv, render_command, run_sweep, select_runs, SweepOptions, SweepReport};
