//! Turn `[[run]]` entries into training program invocations.

use crate::config::{RunSpec, ToolConfig, ToolError};
use std::path::Path;
use std::process::Command;

#[derive(Debug, Clone, Default)]
pub struct SweepOptions {
    /// Print the commands without running them.
    pub dry_run: bool,
    /// Continue after a failing run and report all failures at the end.
    pub keep_going: bool,
    /// Restrict the sweep to these experiment names.
    pub only: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SweepReport {
    pub succeeded: Vec<String>,
    pub failed: Vec<String>,
    /// Rendered command lines, in launch order.
    pub commands: Vec<String>,
}

fn push_flag(argv: &mut Vec<String>, name: &str, value: impl ToString) {
    argv.push(format!("--{name}"));
    argv.push(value.to_string());
}

/// Training program arguments for one run, in the order the launch scripts
/// pass them. Unset flags are left to the training program's defaults.
pub fn build_argv(run: &RunSpec, logging_root: Option<&Path>) -> Vec<String> {
    let mut argv = Vec::new();
    push_flag(&mut argv, "data_root", run.data_root.display());
    push_flag(&mut argv, "experiment_name", &run.experiment_name);
    if let Some(v) = run.fit_single {
        push_flag(&mut argv, "fit_single", v);
    }
    if let Some(v) = run.num_epochs {
        push_flag(&mut argv, "num_epochs", v);
    }
    if let Some(v) = run.steps_til_summary {
        push_flag(&mut argv, "steps_til_summary", v);
    }
    if let Some(v) = &run.lr {
        push_flag(&mut argv, "lr", v);
    }
    if let Some(v) = &run.input_encoding {
        push_flag(&mut argv, "input_encoding", v);
    }
    if let Some(v) = run.tcnn {
        push_flag(&mut argv, "tcnn", v);
    }
    if let Some(v) = run.max_num_instances {
        push_flag(&mut argv, "max_num_instances", v);
    }
    if let Some(root) = logging_root {
        push_flag(&mut argv, "logging_root", root.display());
    }
    argv.extend(run.extra_args.iter().cloned());
    argv
}

fn quote(arg: &str) -> String {
    let plain = !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:,+@%".contains(c));
    if plain {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', r"'\''"))
    }
}

/// Shell-style rendering of a command line for logs and `--dry-run`.
pub fn render_command(program: &[String], argv: &[String]) -> String {
    program
        .iter()
        .chain(argv)
        .map(|a| quote(a))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Runs to launch, in config order. Every name in `only` must exist.
pub fn select_runs<'a>(cfg: &'a ToolConfig, only: &[String]) -> Result<Vec<&'a RunSpec>, ToolError> {
    if let Some(missing) = only
        .iter()
        .find(|name| !cfg.runs.iter().any(|r| &r.experiment_name == *name))
    {
        return Err(ToolError::UnknownRun(missing.clone()));
    }
    Ok(cfg
        .runs
        .iter()
        .filter(|r| only.is_empty() || only.contains(&r.experiment_name))
        .collect())
}

fn launch(program: &[String], argv: &[String], run: &str) -> Result<(), ToolError> {
    let (bin, lead) = program.split_first().ok_or(ToolError::EmptyCommand)?;
    let status = Command::new(bin)
        .args(lead)
        .args(argv)
        .status()
        .map_err(|source| ToolError::Spawn {
            run: run.to_string(),
            source,
        })?;
    if status.success() {
        Ok(())
    } else {
        Err(ToolError::RunFailed {
            run: run.to_string(),
            status: status.to_string(),
        })
    }
}

/// Launch the selected runs one after another.
pub fn run_sweep(cfg: &ToolConfig, opts: &SweepOptions) -> Result<SweepReport, ToolError> {
    let runs = select_runs(cfg, &opts.only)?;
    let mut report = SweepReport::default();
    for run in &runs {
        let argv = build_argv(run, cfg.logging_root.as_deref());
        let rendered = render_command(&cfg.train_command, &argv);
        report.commands.push(rendered.clone());
        if opts.dry_run {
            println!("{rendered}");
            continue;
        }

        tracing::info!(experiment = %run.experiment_name, command = %rendered, "launching run");
        match launch(&cfg.train_command, &argv, &run.experiment_name) {
            Ok(()) => {
                tracing::info!(experiment = %run.experiment_name, "run finished");
                report.succeeded.push(run.experiment_name.clone());
            }
            Err(err) if opts.keep_going => {
                tracing::error!(experiment = %run.experiment_name, error = %err, "run failed; continuing");
                report.failed.push(run.experiment_name.clone());
            }
            Err(err) => return Err(err),
        }
    }

    if !report.failed.is_empty() {
        return Err(ToolError::SweepFailed {
            failed: report.failed.len(),
            total: runs.len(),
            names: report.failed.join(", "),
        });
    }
    Ok(report)
}
