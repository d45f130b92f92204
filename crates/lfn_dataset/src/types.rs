//! Core types, error definitions, and data structures for lfn_dataset.

use lfn_contracts::{CameraIntrinsics, CameraPose, ContractError};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

pub type DatasetResult<T> = Result<T, DatasetError>;

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid camera file {path}: {source}")]
    Camera {
        path: PathBuf,
        #[source]
        source: ContractError,
    },
    #[error("image decode error at {path}: {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("pose file missing for view {image}")]
    MissingPose { image: PathBuf },
    #[error("instance {path} has no views")]
    EmptyInstance { path: PathBuf },
    #[error("no instances found under {path}")]
    NoInstances { path: PathBuf },
    #[error("view {path} is {actual:?}, expected {expected:?} (set img_sidelength to resize)")]
    ResolutionMismatch {
        path: PathBuf,
        actual: (u32, u32),
        expected: (u32, u32),
    },
    #[error("{0}")]
    Other(String),
}

/// Where and how much of a dataset to load.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetConfig {
    pub root: PathBuf,
    /// Keep at most this many instances (in sorted order).
    pub max_num_instances: Option<usize>,
    /// Keep only the first instance.
    pub fit_single: bool,
    /// Resize every view to a square of this side length.
    pub img_sidelength: Option<u32>,
}

impl DatasetConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            max_num_instances: None,
            fit_single: false,
            img_sidelength: None,
        }
    }

    /// Number of instances to keep once the root has been indexed.
    pub fn instance_limit(&self) -> Option<usize> {
        if self.fit_single {
            Some(1)
        } else {
            self.max_num_instances
        }
    }
}

#[derive(Debug, Clone)]
pub struct ViewIndex {
    pub image: PathBuf,
    pub pose: PathBuf,
}

#[derive(Debug, Clone)]
pub struct InstanceIndex {
    pub name: String,
    pub dir: PathBuf,
    pub intrinsics: PathBuf,
    pub views: Vec<ViewIndex>,
}

/// A decoded view. `rgb` is HWC, mapped from [0, 255] to [-1, 1].
#[derive(Debug, Clone)]
pub struct View {
    pub rgb: Vec<f32>,
    pub width: u32,
    pub height: u32,
    pub pose: CameraPose,
    pub intrinsics: CameraIntrinsics,
}

impl View {
    pub fn num_pixels(&self) -> usize {
        (self.width * self.height) as usize
    }
}

#[derive(Debug, Clone)]
pub struct InstanceViews {
    pub name: String,
    pub views: Vec<View>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatasetSummary {
    pub instances: usize,
    pub views: usize,
    pub min_views: usize,
    pub max_views: usize,
}
