use std::path::{Path, PathBuf};

use lfn_tools::{
    build_argv, render_command, run_sweep, select_runs, FlagValue, RunSpec, SweepOptions,
    ToolConfig, ToolError,
};

fn run(name: &str) -> RunSpec {
    RunSpec {
        experiment_name: name.to_string(),
        data_root: PathBuf::from("/data/cars_train"),
        fit_single: Some(true),
        num_epochs: Some(5000),
        steps_til_summary: Some(500),
        lr: Some(FlagValue::Str("1e-3".into())),
        input_encoding: Some("grid".into()),
        tcnn: Some(true),
        max_num_instances: Some(1),
        extra_args: Vec::new(),
    }
}

fn config(program: &[&str], runs: Vec<RunSpec>) -> ToolConfig {
    ToolConfig {
        train_command: program.iter().map(|s| s.to_string()).collect(),
        logging_root: None,
        runs,
    }
}

#[test]
fn argv_forwards_script_flags_in_order() {
    let argv = build_argv(&run("cars"), None);
    assert_eq!(
        argv,
        vec![
            "--data_root",
            "/data/cars_train",
            "--experiment_name",
            "cars",
            "--fit_single",
            "true",
            "--num_epochs",
            "5000",
            "--steps_til_summary",
            "500",
            "--lr",
            "1e-3",
            "--input_encoding",
            "grid",
            "--tcnn",
            "true",
            "--max_num_instances",
            "1",
        ]
    );
}

#[test]
fn optional_flags_are_omitted() {
    let spec = RunSpec {
        fit_single: None,
        tcnn: None,
        lr: None,
        extra_args: vec!["--batch_size".into(), "8".into()],
        ..run("minimal")
    };
    let argv = build_argv(&spec, Some(Path::new("logs")));
    assert!(!argv.contains(&"--tcnn".to_string()));
    assert!(!argv.contains(&"--lr".to_string()));
    let tail: Vec<&str> = argv.iter().rev().take(4).map(String::as_str).collect();
    assert_eq!(tail, vec!["8", "--batch_size", "logs", "--logging_root"]);
}

#[test]
fn rendered_command_quotes_when_needed() {
    let line = render_command(
        &["train_single_class".to_string()],
        &["--experiment_name".to_string(), "my run".to_string()],
    );
    assert_eq!(line, "train_single_class --experiment_name 'my run'");
}

#[test]
fn only_filters_and_rejects_unknown_names() {
    let cfg = config(&["train_single_class"], vec![run("a"), run("b"), run("c")]);
    let picked = select_runs(&cfg, &["c".to_string(), "a".to_string()]).unwrap();
    let names: Vec<&str> = picked.iter().map(|r| r.experiment_name.as_str()).collect();
    assert_eq!(names, vec!["a", "c"]);
    assert!(matches!(
        select_runs(&cfg, &["zzz".to_string()]),
        Err(ToolError::UnknownRun(name)) if name == "zzz"
    ));
}

#[test]
fn dry_run_launches_nothing() {
    let cfg = config(&["/definitely/not/a/binary"], vec![run("a"), run("b")]);
    let report = run_sweep(
        &cfg,
        &SweepOptions {
            dry_run: true,
            ..Default::default()
        },
    )
    .unwrap();
    assert_eq!(report.commands.len(), 2);
    assert!(report.commands[0].starts_with("/definitely/not/a/binary --data_root"));
    assert!(report.succeeded.is_empty());
}

#[cfg(unix)]
#[test]
fn failing_run_stops_sweep_unless_keep_going() {
    let cfg = config(&["false"], vec![run("a"), run("b")]);
    let err = run_sweep(&cfg, &SweepOptions::default()).unwrap_err();
    assert!(matches!(err, ToolError::RunFailed { ref run, .. } if run == "a"));

    let err = run_sweep(
        &cfg,
        &SweepOptions {
            keep_going: true,
            ..Default::default()
        },
    )
    .unwrap_err();
    assert!(matches!(err, ToolError::SweepFailed { failed: 2, total: 2, .. }));

    let ok = config(&["true"], vec![run("a"), run("b")]);
    let report = run_sweep(&ok, &SweepOptions::default()).unwrap();
    assert_eq!(report.succeeded, vec!["a", "b"]);
}

#[test]
fn negative_instance_cap_is_forwarded() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("lfn-tools.toml");
    std::fs::write(
        &path,
        "[[run]]\nexperiment_name = \"all\"\ndata_root = \"/d\"\nmax_num_instances = -1\n",
    )
    .unwrap();
    let cfg = ToolConfig::from_path(&path).unwrap();
    assert_eq!(cfg.runs[0].max_num_instances, Some(-1));

    let argv = build_argv(&cfg.runs[0], None);
    assert_eq!(
        argv[argv.len() - 2..],
        ["--max_num_instances".to_string(), "-1".to_string()]
    );
}
