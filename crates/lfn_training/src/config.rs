//! TOML overlay for [`TrainArgs`]: values in the file fill every flag that was
//! not given on the command line.

use crate::args::{
    BackendKind, ConditioningArg, EncodingArg, NetworkArg, ParameterizationArg, TrainArgs,
};
use anyhow::Context;
use clap::parser::ValueSource;
use clap::{ArgMatches, CommandFactory, FromArgMatches};
use serde::Deserialize;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TrainConfigFile {
    pub data_root: Option<PathBuf>,
    pub experiment_name: Option<String>,
    pub logging_root: Option<PathBuf>,
    pub fit_single: Option<bool>,
    pub num_epochs: Option<usize>,
    pub steps_til_summary: Option<usize>,
    pub epochs_til_ckpt: Option<usize>,
    pub lr: Option<f64>,
    pub input_encoding: Option<EncodingArg>,
    pub tcnn: Option<bool>,
    pub max_num_instances: Option<i64>,
    pub batch_size: Option<usize>,
    pub img_sidelength: Option<u32>,
    pub rays_per_view: Option<usize>,
    pub network: Option<NetworkArg>,
    pub conditioning: Option<ConditioningArg>,
    pub parameterization: Option<ParameterizationArg>,
    pub latent_dim: Option<usize>,
    pub hidden_features: Option<usize>,
    pub hidden_layers: Option<usize>,
    pub seed: Option<u64>,
    pub depth: Option<bool>,
    pub alpha: Option<bool>,
    pub backend: Option<BackendKind>,
    pub overwrite: Option<bool>,
}

fn from_command_line(matches: &ArgMatches, id: &str) -> bool {
    matches!(matches.value_source(id), Some(ValueSource::CommandLine))
}

macro_rules! overlay {
    ($file:ident, $args:ident, $matches:ident; values: $($value:ident),*; options: $($option:ident),*) => {
        $(
            if let Some(v) = $file.$value {
                if !from_command_line($matches, stringify!($value)) {
                    $args.$value = v;
                }
            }
        )*
        $(
            if let Some(v) = $file.$option {
                if !from_command_line($matches, stringify!($option)) {
                    $args.$option = Some(v);
                }
            }
        )*
    };
}

impl TrainConfigFile {
    pub fn from_path(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read training config {}", path.display()))?;
        toml::from_str(&raw)
            .with_context(|| format!("failed to parse training config {}", path.display()))
    }

    pub fn apply(self, args: &mut TrainArgs, matches: &ArgMatches) {
        let file = self;
        overlay!(file, args, matches;
            values: experiment_name, logging_root, fit_single, num_epochs, steps_til_summary,
                epochs_til_ckpt, lr, input_encoding, tcnn, batch_size, network, conditioning,
                parameterization, latent_dim, depth, alpha, backend, overwrite;
            options: data_root, max_num_instances, img_sidelength, rays_per_view,
                hidden_features, hidden_layers, seed
        );
    }
}

impl TrainArgs {
    /// Parse the process arguments and apply `--config` if given.
    pub fn parse_with_config() -> anyhow::Result<Self> {
        Self::parse_from_with_config(std::env::args_os())
    }

    pub fn parse_from_with_config<I, T>(argv: I) -> anyhow::Result<Self>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let matches = match Self::command().try_get_matches_from(argv) {
            Ok(matches) => matches,
            Err(err) => err.exit(),
        };
        let mut args = Self::from_arg_matches(&matches)?;
        if let Some(path) = args.config.clone() {
            TrainConfigFile::from_path(&path)?.apply(&mut args, &matches);
            tracing::info!(config = %path.display(), "applied training config overlay");
        }
        Ok(args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_fills_defaults_but_not_explicit_flags() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("train.toml");
        std::fs::write(
            &path,
            r#"
data_root = "/data/chairs"
lr = 0.005
num_epochs = 12
input_encoding = "positional"
fit_single = true
seed = 3
"#,
        )
        .unwrap();
        let args = TrainArgs::parse_from_with_config([
            "train_single_class",
            "--config",
            path.to_str().unwrap(),
            "--num_epochs",
            "2",
        ])
        .unwrap();
        assert_eq!(args.data_root, Some(PathBuf::from("/data/chairs")));
        assert!((args.lr - 0.005).abs() < 1e-12);
        assert_eq!(args.num_epochs, 2);
        assert_eq!(args.input_encoding, EncodingArg::Positional);
        assert!(args.fit_single);
        assert_eq!(args.seed, Some(3));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("bad.toml");
        std::fs::write(&path, "learning_rate = 1.0\n").unwrap();
        assert!(TrainConfigFile::from_path(&path).is_err());
    }
}
