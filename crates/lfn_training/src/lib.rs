#![recursion_limit = "256"]

pub mod args;
pub mod checkpoint;
pub mod config;
pub mod loss;
pub mod render;
pub mod summary;
pub mod train;

pub use args::{BackendKind, TrainArgs};
pub use checkpoint::{RunConfig, RunDir};
pub use loss::{LfLoss, LossTerms};
pub use render::{run_render, RenderArgs, RenderReport};
pub use train::{run_train, TrainOutcome};

/// Backend alias for training/rendering (NdArray by default; WGPU if enabled).
#[cfg(feature = "backend-wgpu")]
pub type TrainBackend = burn_wgpu::Wgpu<f32>;
#[cfg(not(feature = "backend-wgpu"))]
pub type TrainBackend = burn_ndarray::NdArray<f32>;
