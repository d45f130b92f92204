use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

const DEFAULT_CONFIG_NAME: &str = "lfn-tools.toml";
const CONFIG_ENV: &str = "LFN_TOOLS_CONFIG";
const DEFAULT_TRAIN_COMMAND: &str = "train_single_class";

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("failed to read tools config {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse tools config {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("tools config {0} not found")]
    ConfigMissing(PathBuf),
    #[error("train_command is empty")]
    EmptyCommand,
    #[error("[[run]] entry {0} has no experiment_name")]
    MissingExperimentName(usize),
    #[error("run `{0}` is missing data_root")]
    MissingDataRoot(String),
    #[error("no run named `{0}` in the tools config")]
    UnknownRun(String),
    #[error("failed to launch run `{run}`: {source}")]
    Spawn {
        run: String,
        source: std::io::Error,
    },
    #[error("run `{run}` failed: {status}")]
    RunFailed { run: String, status: String },
    #[error("{failed} of {total} runs failed: {names}")]
    SweepFailed {
        failed: usize,
        total: usize,
        names: String,
    },
}

/// A flag value forwarded verbatim: strings pass through untouched, numbers
/// and booleans use their TOML spelling.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum FlagValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl fmt::Display for FlagValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlagValue::Bool(v) => write!(f, "{v}"),
            FlagValue::Int(v) => write!(f, "{v}"),
            FlagValue::Float(v) => write!(f, "{v:?}"),
            FlagValue::Str(v) => f.write_str(v),
        }
    }
}

/// Keys of `[defaults]` and of every `[[run]]`; `experiment_name` is only
/// meaningful on runs.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RunFields {
    experiment_name: Option<String>,
    data_root: Option<String>,
    fit_single: Option<bool>,
    num_epochs: Option<u64>,
    steps_til_summary: Option<u64>,
    lr: Option<FlagValue>,
    input_encoding: Option<String>,
    tcnn: Option<bool>,
    max_num_instances: Option<i64>,
    extra_args: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct ToolConfigFile {
    train_command: Option<Vec<String>>,
    logging_root: Option<String>,
    defaults: Option<RunFields>,
    #[serde(default, rename = "run")]
    runs: Vec<RunFields>,
}

/// One training run: the flags handed to the training program.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSpec {
    pub experiment_name: String,
    pub data_root: PathBuf,
    pub fit_single: Option<bool>,
    pub num_epochs: Option<u64>,
    pub steps_til_summary: Option<u64>,
    pub lr: Option<FlagValue>,
    pub input_encoding: Option<String>,
    pub tcnn: Option<bool>,
    /// Forwarded as given; the training program reads a negative cap as "all".
    pub max_num_instances: Option<i64>,
    pub extra_args: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ToolConfig {
    /// Program and leading arguments, e.g. `["cargo", "run", "--release",
    /// "--bin", "train_single_class", "--"]`.
    pub train_command: Vec<String>,
    pub logging_root: Option<PathBuf>,
    pub runs: Vec<RunSpec>,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            train_command: vec![DEFAULT_TRAIN_COMMAND.to_string()],
            logging_root: None,
            runs: Vec::new(),
        }
    }
}

impl ToolConfig {
    /// Config from `$LFN_TOOLS_CONFIG`, else `lfn-tools.toml` in the working
    /// directory.
    pub fn load() -> Result<Self, ToolError> {
        let path = std::env::var(CONFIG_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_NAME));
        Self::from_path(&path)
    }

    pub fn from_path(path: &Path) -> Result<Self, ToolError> {
        if !path.exists() {
            return Err(ToolError::ConfigMissing(path.to_path_buf()));
        }
        let raw = std::fs::read_to_string(path).map_err(|source| ToolError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        let file: ToolConfigFile = toml::from_str(&raw).map_err(|source| ToolError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })?;
        let cfg = Self::from_file(file)?;
        cfg.warn_if_invalid();
        Ok(cfg)
    }

    fn from_file(file: ToolConfigFile) -> Result<Self, ToolError> {
        let defaults = file.defaults.unwrap_or_default();
        let runs = file
            .runs
            .into_iter()
            .enumerate()
            .map(|(idx, fields)| resolve_run(idx, fields, &defaults))
            .collect::<Result<Vec<_>, _>>()?;
        let train_command = file
            .train_command
            .unwrap_or_else(|| vec![DEFAULT_TRAIN_COMMAND.to_string()]);
        if train_command.first().map_or(true, |p| p.trim().is_empty()) {
            return Err(ToolError::EmptyCommand);
        }
        Ok(Self {
            train_command,
            logging_root: file.logging_root.map(|v| expand_path(&v)),
            runs,
        })
    }

    fn warn_if_invalid(&self) {
        if self.runs.is_empty() {
            tracing::warn!("tools config defines no [[run]] entries; nothing to sweep");
        }
        let mut names: Vec<&str> = self.runs.iter().map(|r| r.experiment_name.as_str()).collect();
        names.sort_unstable();
        for pair in names.windows(2) {
            if pair[0] == pair[1] {
                tracing::warn!(
                    experiment = pair[0],
                    "duplicate experiment_name; later runs will refuse to reuse its directory"
                );
            }
        }
    }
}

fn resolve_run(idx: usize, fields: RunFields, defaults: &RunFields) -> Result<RunSpec, ToolError> {
    let experiment_name = fields
        .experiment_name
        .filter(|name| !name.trim().is_empty())
        .ok_or(ToolError::MissingExperimentName(idx))?;
    let data_root = fields
        .data_root
        .or_else(|| defaults.data_root.clone())
        .map(|v| expand_path(&v))
        .ok_or_else(|| ToolError::MissingDataRoot(experiment_name.clone()))?;
    let mut extra_args = defaults.extra_args.clone().unwrap_or_default();
    extra_args.extend(fields.extra_args.unwrap_or_default());
    Ok(RunSpec {
        data_root,
        fit_single: fields.fit_single.or(defaults.fit_single),
        num_epochs: fields.num_epochs.or(defaults.num_epochs),
        steps_til_summary: fields.steps_til_summary.or(defaults.steps_til_summary),
        lr: fields.lr.or_else(|| defaults.lr.clone()),
        input_encoding: fields
            .input_encoding
            .or_else(|| defaults.input_encoding.clone()),
        tcnn: fields.tcnn.or(defaults.tcnn),
        max_num_instances: fields.max_num_instances.or(defaults.max_num_instances),
        extra_args,
        experiment_name,
    })
}

fn expand_path(raw: &str) -> PathBuf {
    let mut out = raw.to_string();
    if let Some(stripped) = out.strip_prefix('~') {
        // `~user` is left alone; only the current user's home is known.
        if stripped.is_empty() || stripped.starts_with('/') {
            if let Ok(home) = std::env::var("HOME") {
                out = format!("{home}{stripped}");
            }
        }
    }
    PathBuf::from(expand_env(&out))
}

/// Substitute `${VAR}` from the environment; unknown variables are kept.
fn expand_env(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) => {
                let key = &after[..end];
                match std::env::var(key) {
                    Ok(val) => out.push_str(&val),
                    Err(_) => out.push_str(&rest[start..start + 3 + end]),
                }
                rest = &after[end + 1..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expands_known_variables_only() {
        std::env::set_var("LFN_TOOLS_TEST_ROOT", "/srv/data");
        assert_eq!(expand_env("${LFN_TOOLS_TEST_ROOT}/cars"), "/srv/data/cars");
        assert_eq!(
            expand_env("${LFN_TOOLS_UNSET_VAR}/x"),
            "${LFN_TOOLS_UNSET_VAR}/x"
        );
        assert_eq!(expand_env("plain/${unterminated"), "plain/${unterminated");
    }

    #[test]
    fn tilde_expands_only_for_current_user() {
        let Ok(home) = std::env::var("HOME") else {
            return;
        };
        assert_eq!(expand_path("~"), PathBuf::from(&home));
        assert_eq!(expand_path("~/data"), PathBuf::from(format!("{home}/data")));
        assert_eq!(expand_path("~other/data"), PathBuf::from("~other/data"));
        assert_eq!(expand_path("/abs/~x"), PathBuf::from("/abs/~x"));
    }

    #[test]
    fn float_flags_keep_exponent_spelling() {
        assert_eq!(FlagValue::Float(0.001).to_string(), "0.001");
        assert_eq!(FlagValue::Float(1e-4).to_string(), "0.0001");
        assert_eq!(FlagValue::Str("1e-4".into()).to_string(), "1e-4");
        assert_eq!(FlagValue::Int(3).to_string(), "3");
    }
}
