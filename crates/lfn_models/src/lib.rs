//! Burn modules for light field networks.
//!
//! A light field network maps a ray, embedded as 6-D Plücker coordinates or
//! as a pair of points on a bounding sphere, straight to a colour. No
//! volume rendering is involved: one network evaluation per pixel.
//!
//! - [`encoding`]: positional (frequency) and multiresolution hash-grid encodings.
//! - [`layers`]: ReLU/SIREN MLPs that run with their own weights or with
//!   per-sample weights, and the residual FC block.
//! - [`hyper`]: hypernetwork mapping a latent code to MLP weights.
//! - [`geometry`]: ray construction from pixel coordinates and cameras.
//! - [`light_field`]: the full model in single-scene, hypernetwork and
//!   concatenation modes.
//!
//! These are plain Burn modules. Data loading and optimization live in
//! `lfn_dataset` and `lfn_training`.

pub mod config;
pub mod encoding;
pub mod geometry;
pub mod hyper;
pub mod layers;
pub mod light_field;

pub use config::{
    Conditioning, InputEncoding, LightFieldConfig, ModelConfigError, Network, Parameterization,
};
pub use encoding::{HashGridConfig, HashGridEncoding, InputEncoder, PositionalEncoding};
pub use hyper::HyperNetwork;
pub use layers::{
    Activation, BatchedLinear, FcBlock, FcBlockConfig, FcSpec, LinearShape, ResnetBlockFc,
    SirenConfig,
};
pub use light_field::{LightFieldModel, LightFieldOutput, LightFieldQuery};

pub mod prelude {
    pub use super::{LightFieldConfig, LightFieldModel, LightFieldOutput, LightFieldQuery};
}
