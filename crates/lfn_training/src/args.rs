use clap::builder::BoolishValueParser;
use clap::{ArgAction, Parser, ValueEnum};
use lfn_models::{Conditioning, InputEncoding, LightFieldConfig, Network, Parameterization};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[value(name = "ndarray")]
    NdArray,
    Wgpu,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EncodingArg {
    Identity,
    Positional,
    Grid,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkArg {
    Relu,
    Siren,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConditioningArg {
    Hyper,
    Concat,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterizationArg {
    Plucker,
    Sphere,
}

impl From<EncodingArg> for InputEncoding {
    fn from(arg: EncodingArg) -> Self {
        match arg {
            EncodingArg::Identity => InputEncoding::Identity,
            EncodingArg::Positional => InputEncoding::Positional,
            EncodingArg::Grid => InputEncoding::Grid,
        }
    }
}

impl From<NetworkArg> for Network {
    fn from(arg: NetworkArg) -> Self {
        match arg {
            NetworkArg::Relu => Network::Relu,
            NetworkArg::Siren => Network::Siren,
        }
    }
}

impl From<ConditioningArg> for Conditioning {
    fn from(arg: ConditioningArg) -> Self {
        match arg {
            ConditioningArg::Hyper => Conditioning::Hyper,
            ConditioningArg::Concat => Conditioning::Concat,
        }
    }
}

impl From<ParameterizationArg> for Parameterization {
    fn from(arg: ParameterizationArg) -> Self {
        match arg {
            ParameterizationArg::Plucker => Parameterization::Plucker,
            ParameterizationArg::Sphere => Parameterization::Sphere,
        }
    }
}

/// Flags use the snake_case spelling the launch scripts pass. Boolean flags
/// take an optional value: `--fit_single`, `--fit_single true` and
/// `--fit_single false` all parse.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "train_single_class",
    about = "Train a light field network on one scene or a class of scenes"
)]
pub struct TrainArgs {
    /// Dataset root: one directory per instance.
    #[arg(long = "data_root")]
    pub data_root: Option<PathBuf>,
    /// Run name; outputs go to <logging_root>/<experiment_name>.
    #[arg(long = "experiment_name", default_value = "light_field")]
    pub experiment_name: String,
    #[arg(long = "logging_root", default_value = "logs")]
    pub logging_root: PathBuf,
    /// Overfit the first instance without latent codes.
    #[arg(
        long = "fit_single",
        action = ArgAction::Set,
        num_args = 0..=1,
        default_value_t = false,
        default_missing_value = "true",
        value_parser = BoolishValueParser::new()
    )]
    pub fit_single: bool,
    #[arg(long = "num_epochs", default_value_t = 100)]
    pub num_epochs: usize,
    /// Log, record metrics and write a preview every N optimizer steps.
    #[arg(long = "steps_til_summary", default_value_t = 100)]
    pub steps_til_summary: usize,
    #[arg(long = "epochs_til_ckpt", default_value_t = 10)]
    pub epochs_til_ckpt: usize,
    #[arg(long, default_value_t = 1e-4)]
    pub lr: f64,
    /// Coordinate encoding (single-scene fitting only).
    #[arg(long = "input_encoding", value_enum, default_value_t = EncodingArg::Identity)]
    pub input_encoding: EncodingArg,
    /// Compact fused-style MLP behind the encoding.
    #[arg(
        long,
        action = ArgAction::Set,
        num_args = 0..=1,
        default_value_t = false,
        default_missing_value = "true",
        value_parser = BoolishValueParser::new()
    )]
    pub tcnn: bool,
    /// Cap on loaded instances; a negative value loads all of them.
    #[arg(long = "max_num_instances", allow_negative_numbers = true)]
    pub max_num_instances: Option<i64>,
    /// Views per batch.
    #[arg(long = "batch_size", default_value_t = 4)]
    pub batch_size: usize,
    /// Resize views to a square of this side length.
    #[arg(long = "img_sidelength")]
    pub img_sidelength: Option<u32>,
    /// Random pixels per view; whole views when unset.
    #[arg(long = "rays_per_view")]
    pub rays_per_view: Option<usize>,
    #[arg(long, value_enum, default_value_t = NetworkArg::Relu)]
    pub network: NetworkArg,
    #[arg(long, value_enum, default_value_t = ConditioningArg::Hyper)]
    pub conditioning: ConditioningArg,
    #[arg(long, value_enum, default_value_t = ParameterizationArg::Plucker)]
    pub parameterization: ParameterizationArg,
    #[arg(long = "latent_dim", default_value_t = 256)]
    pub latent_dim: usize,
    /// Override the light field MLP width.
    #[arg(long = "hidden_features")]
    pub hidden_features: Option<usize>,
    /// Override the light field MLP hidden layer count.
    #[arg(long = "hidden_layers")]
    pub hidden_layers: Option<usize>,
    #[arg(long)]
    pub seed: Option<u64>,
    /// Predict an extra depth channel.
    #[arg(
        long,
        action = ArgAction::Set,
        num_args = 0..=1,
        default_value_t = false,
        default_missing_value = "true",
        value_parser = BoolishValueParser::new()
    )]
    pub depth: bool,
    /// Predict opacity and composite over white.
    #[arg(
        long,
        action = ArgAction::Set,
        num_args = 0..=1,
        default_value_t = false,
        default_missing_value = "true",
        value_parser = BoolishValueParser::new()
    )]
    pub alpha: bool,
    /// Backend to use (ndarray or wgpu if enabled).
    #[arg(long, value_enum, default_value_t = BackendKind::NdArray)]
    pub backend: BackendKind,
    /// Reuse an experiment directory that already holds checkpoints.
    #[arg(
        long,
        action = ArgAction::Set,
        num_args = 0..=1,
        default_value_t = false,
        default_missing_value = "true",
        value_parser = BoolishValueParser::new()
    )]
    pub overwrite: bool,
    /// TOML file whose values fill flags not given on the command line.
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl TrainArgs {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.data_root.is_none() {
            anyhow::bail!("--data_root is required (on the command line or in --config)");
        }
        if self.experiment_name.trim().is_empty() {
            anyhow::bail!("--experiment_name must not be empty");
        }
        for (name, value) in [
            ("--num_epochs", self.num_epochs),
            ("--steps_til_summary", self.steps_til_summary),
            ("--epochs_til_ckpt", self.epochs_til_ckpt),
            ("--batch_size", self.batch_size),
        ] {
            if value == 0 {
                anyhow::bail!("{name} must be at least 1");
            }
        }
        if self.max_num_instances == Some(0) {
            anyhow::bail!("--max_num_instances must be at least 1");
        }
        if self.rays_per_view == Some(0) {
            anyhow::bail!("--rays_per_view must be at least 1");
        }
        if self.img_sidelength == Some(0) {
            anyhow::bail!("--img_sidelength must be at least 1");
        }
        if !(self.lr.is_finite() && self.lr > 0.0) {
            anyhow::bail!("--lr must be positive, got {}", self.lr);
        }
        Ok(())
    }

    /// Instance cap handed to the dataset. Negative values mean no cap.
    pub fn instance_limit(&self) -> Option<usize> {
        self.max_num_instances.and_then(|v| usize::try_from(v).ok())
    }

    /// Model configuration for a dataset with `num_instances` instances.
    pub fn model_config(&self, num_instances: usize) -> LightFieldConfig {
        LightFieldConfig {
            latent_dim: self.latent_dim,
            num_instances,
            parameterization: self.parameterization.into(),
            network: self.network.into(),
            conditioning: self.conditioning.into(),
            input_encoding: self.input_encoding.into(),
            fit_single: self.fit_single,
            tcnn: self.tcnn,
            depth: self.depth,
            alpha: self.alpha,
            hidden_features: self.hidden_features,
            hidden_layers: self.hidden_layers,
            ..LightFieldConfig::default()
        }
    }
}

pub fn validate_backend_choice(kind: BackendKind) -> anyhow::Result<()> {
    let built_wgpu = cfg!(feature = "backend-wgpu");
    match (kind, built_wgpu) {
        (BackendKind::Wgpu, false) => {
            anyhow::bail!("backend-wgpu feature not enabled; rebuild with --features backend-wgpu or choose ndarray backend")
        }
        (BackendKind::NdArray, true) => {
            tracing::warn!("built with backend-wgpu; training will still use the WGPU backend despite --backend ndarray");
        }
        _ => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(extra: &[&str]) -> TrainArgs {
        let mut argv = vec!["train_single_class", "--data_root", "/data/cars"];
        argv.extend_from_slice(extra);
        TrainArgs::try_parse_from(argv).unwrap()
    }

    #[test]
    fn script_flags_parse() {
        let args = parse(&[
            "--experiment_name",
            "cars_grid",
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
        ]);
        assert_eq!(args.experiment_name, "cars_grid");
        assert!(args.fit_single);
        assert!(args.tcnn);
        assert_eq!(args.num_epochs, 5000);
        assert_eq!(args.input_encoding, EncodingArg::Grid);
        assert_eq!(args.max_num_instances, Some(1));
        assert!((args.lr - 1e-3).abs() < 1e-12);
    }

    #[test]
    fn bool_flags_accept_bare_and_false() {
        assert!(parse(&["--fit_single"]).fit_single);
        assert!(!parse(&["--fit_single", "false"]).fit_single);
        assert!(!parse(&[]).fit_single);
    }

    #[test]
    fn model_config_carries_choices() {
        let args = parse(&["--network", "siren", "--conditioning", "concat", "--alpha"]);
        let cfg = args.model_config(7);
        assert_eq!(cfg.num_instances, 7);
        assert_eq!(cfg.network, Network::Siren);
        assert_eq!(cfg.conditioning, Conditioning::Concat);
        assert!(cfg.alpha);
    }

    #[test]
    fn zero_epochs_rejected() {
        let args = parse(&["--num_epochs", "0"]);
        assert!(args.validate().is_err());
        let mut args = parse(&[]);
        args.data_root = None;
        assert!(args.validate().is_err());
    }

    #[test]
    fn negative_instance_cap_loads_everything() {
        let args = parse(&["--max_num_instances", "-1"]);
        assert_eq!(args.max_num_instances, Some(-1));
        assert_eq!(args.instance_limit(), None);
        assert!(args.validate().is_ok());

        assert_eq!(parse(&["--max_num_instances", "3"]).instance_limit(), Some(3));
        assert_eq!(parse(&[]).instance_limit(), None);
        assert!(parse(&["--max_num_instances", "0"]).validate().is_err());
    }
}
