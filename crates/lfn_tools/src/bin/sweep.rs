use clap::Parser;
use lfn_tools::{init_tracing, run_sweep, SweepOptions, ToolConfig};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "sweep",
    about = "Launch train_single_class once per [[run]] in lfn-tools.toml"
)]
struct Args {
    /// Tools config (defaults to $LFN_TOOLS_CONFIG, then ./lfn-tools.toml).
    #[arg(long)]
    config: Option<PathBuf>,
    /// Print each command instead of running it.
    #[arg(long)]
    dry_run: bool,
    /// Keep launching after a run fails.
    #[arg(long)]
    keep_going: bool,
    /// Only launch the named experiment (repeatable).
    #[arg(long)]
    only: Vec<String>,
}

fn main() -> anyhow::Result<()> {
    init_tracing();

    let args = Args::parse();
    let cfg = match &args.config {
        Some(path) => ToolConfig::from_path(path)?,
        None => ToolConfig::load()?,
    };
    let report = run_sweep(
        &cfg,
        &SweepOptions {
            dry_run: args.dry_run,
            keep_going: args.keep_going,
            only: args.only,
        },
    )?;
    if !args.dry_run {
        println!("{} runs finished", report.succeeded.len());
    }
    Ok(())
}
