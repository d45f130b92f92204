use crate::encoding::HashGridConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Spatial dimensionality of a ray embedding.
pub const COORD_DIMS: usize = 6;
pub const NUM_HIDDEN_UNITS_PHI: usize = 256;
pub const RELU_HIDDEN_LAYERS: usize = 6;
pub const SIREN_HIDDEN_LAYERS: usize = 8;
pub const FUSED_HIDDEN_UNITS: usize = 64;
pub const FUSED_HIDDEN_LAYERS: usize = 6;
pub const SIREN_OMEGA_0: f32 = 30.0;
pub const POSITIONAL_FREQUENCIES: usize = 8;
pub const CONCAT_RESNET_BLOCKS: usize = 3;
pub const HYPER_HIDDEN_LAYERS: usize = 1;
pub const LATENT_INIT_STD: f64 = 0.01;
pub const SPHERE_RADIUS: f32 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Parameterization {
    /// `(d, o x d)` with unit direction `d` and camera centre `o`.
    Plucker,
    /// Normalized entry and exit points on a sphere of radius 100.
    Sphere,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Network {
    Relu,
    Siren,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Conditioning {
    Hyper,
    Concat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputEncoding {
    Identity,
    Positional,
    Grid,
}

#[derive(Debug, Error, PartialEq)]
pub enum ModelConfigError {
    #[error("num_instances must be at least 1")]
    NoInstances,
    #[error("latent_dim must be at least 1 when fitting multiple instances")]
    ZeroLatentDim,
    #[error("positional encoding needs at least one frequency")]
    ZeroFrequencies,
    #[error("hash grid: {0}")]
    HashGrid(String),
    #[error("the fused MLP (tcnn) only supports the relu network")]
    FusedSiren,
    #[error("{0} must be at least 1")]
    ZeroSize(&'static str),
    #[error("conditioned light field evaluated without a latent code")]
    MissingLatent,
}

/// Everything needed to rebuild a [`crate::LightFieldModel`]; saved next to
/// checkpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LightFieldConfig {
    pub latent_dim: usize,
    pub num_instances: usize,
    pub parameterization: Parameterization,
    pub network: Network,
    pub conditioning: Conditioning,
    /// Only used when `fit_single` is set.
    pub input_encoding: InputEncoding,
    pub fit_single: bool,
    /// Compact fused-style MLP (64 wide, no layer norm) behind the encoding.
    pub tcnn: bool,
    /// Predict an extra depth channel.
    pub depth: bool,
    /// Predict opacity and composite over a white background.
    pub alpha: bool,
    pub positional_frequencies: usize,
    pub hash_grid: HashGridConfig,
    /// Overrides the network width chosen by `network`/`tcnn`.
    pub hidden_features: Option<usize>,
    /// Overrides the hidden layer count chosen by `network`/`tcnn`.
    pub hidden_layers: Option<usize>,
}

impl Default for LightFieldConfig {
    fn default() -> Self {
        Self {
            latent_dim: 256,
            num_instances: 1,
            parameterization: Parameterization::Plucker,
            network: Network::Relu,
            conditioning: Conditioning::Hyper,
            input_encoding: InputEncoding::Identity,
            fit_single: false,
            tcnn: false,
            depth: false,
            alpha: false,
            positional_frequencies: POSITIONAL_FREQUENCIES,
            hash_grid: HashGridConfig::default(),
            hidden_features: None,
            hidden_layers: None,
        }
    }
}

impl LightFieldConfig {
    pub fn validate(&self) -> Result<(), ModelConfigError> {
        if self.num_instances == 0 {
            return Err(ModelConfigError::NoInstances);
        }
        if !self.fit_single && self.latent_dim == 0 {
            return Err(ModelConfigError::ZeroLatentDim);
        }
        if self.fit_single && self.tcnn && self.network == Network::Siren {
            return Err(ModelConfigError::FusedSiren);
        }
        if self.hidden_features == Some(0) {
            return Err(ModelConfigError::ZeroSize("hidden_features"));
        }
        if self.encoding() == InputEncoding::Positional && self.positional_frequencies == 0 {
            return Err(ModelConfigError::ZeroFrequencies);
        }
        if self.encoding() == InputEncoding::Grid {
            self.hash_grid
                .validate()
                .map_err(ModelConfigError::HashGrid)?;
        }
        Ok(())
    }

    /// Input encoding actually applied; conditioned models see raw coordinates.
    pub fn encoding(&self) -> InputEncoding {
        if self.fit_single {
            self.input_encoding
        } else {
            InputEncoding::Identity
        }
    }

    pub fn out_channels(&self) -> usize {
        3 + usize::from(self.depth) + usize::from(self.alpha)
    }

    pub fn phi_hidden_features(&self) -> usize {
        self.hidden_features.unwrap_or(if self.fit_single && self.tcnn {
            FUSED_HIDDEN_UNITS
        } else {
            NUM_HIDDEN_UNITS_PHI
        })
    }

    pub fn phi_hidden_layers(&self) -> usize {
        self.hidden_layers.unwrap_or(match (self.fit_single && self.tcnn, self.network) {
            (true, _) => FUSED_HIDDEN_LAYERS,
            (false, Network::Relu) => RELU_HIDDEN_LAYERS,
            (false, Network::Siren) => SIREN_HIDDEN_LAYERS,
        })
    }
}
