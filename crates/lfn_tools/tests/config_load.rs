use std::fs;
use std::path::PathBuf;

use lfn_tools::{FlagValue, ToolConfig, ToolError};

fn write_config(dir: &tempfile::TempDir, contents: &str) -> PathBuf {
    let path = dir.path().join("lfn-tools.toml");
    fs::write(&path, contents).expect("write temp config");
    path
}

#[test]
fn runs_inherit_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(
        &dir,
        r#"
train_command = ["cargo", "run", "--release", "--bin", "train_single_class", "--"]
logging_root = "runs"

[defaults]
data_root = "/data/cars_train"
num_epochs = 5000
steps_til_summary = 500
extra_args = ["--seed", "1"]

[[run]]
experiment_name = "cars_positional"
fit_single = true
lr = 1e-3
input_encoding = "positional"
max_num_instances = 1

[[run]]
experiment_name = "cars_grid"
data_root = "/data/other"
lr = "1e-4"
input_encoding = "grid"
tcnn = true
extra_args = ["--batch_size", "8"]
"#,
    );
    let cfg = ToolConfig::from_path(&path).expect("load config");
    assert_eq!(cfg.train_command.len(), 6);
    assert_eq!(cfg.logging_root, Some(PathBuf::from("runs")));
    assert_eq!(cfg.runs.len(), 2);

    let first = &cfg.runs[0];
    assert_eq!(first.data_root, PathBuf::from("/data/cars_train"));
    assert_eq!(first.num_epochs, Some(5000));
    assert_eq!(first.lr, Some(FlagValue::Float(1e-3)));
    assert_eq!(first.extra_args, vec!["--seed", "1"]);

    let second = &cfg.runs[1];
    assert_eq!(second.data_root, PathBuf::from("/data/other"));
    assert_eq!(second.lr, Some(FlagValue::Str("1e-4".into())));
    assert_eq!(second.tcnn, Some(true));
    assert_eq!(second.extra_args, vec!["--seed", "1", "--batch_size", "8"]);
}

#[test]
fn default_command_is_train_binary() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(
        &dir,
        "[[run]]\nexperiment_name = \"a\"\ndata_root = \"/d\"\n",
    );
    let cfg = ToolConfig::from_path(&path).unwrap();
    assert_eq!(cfg.train_command, vec!["train_single_class"]);
    assert!(cfg.logging_root.is_none());
}

#[test]
fn invalid_configs_are_reported() {
    let dir = tempfile::tempdir().unwrap();
    let missing_root = write_config(&dir, "[[run]]\nexperiment_name = \"a\"\n");
    assert!(matches!(
        ToolConfig::from_path(&missing_root),
        Err(ToolError::MissingDataRoot(name)) if name == "a"
    ));

    let unknown_key = write_config(&dir, "[[run]]\nexperiment_name = \"a\"\nepochs = 3\n");
    assert!(matches!(
        ToolConfig::from_path(&unknown_key),
        Err(ToolError::ConfigParse { .. })
    ));

    let empty_command = write_config(&dir, "train_command = []\n");
    assert!(matches!(
        ToolConfig::from_path(&empty_command),
        Err(ToolError::EmptyCommand)
    ));

    assert!(matches!(
        ToolConfig::from_path(&dir.path().join("absent.toml")),
        Err(ToolError::ConfigMissing(_))
    ));
}
