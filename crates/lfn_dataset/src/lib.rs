//! Scene-class light field datasets.
//!
//! A dataset root holds one directory per object instance. Each instance has
//! an `intrinsics.txt`, an `rgb/` directory of views and a `pose/` directory
//! with one camera-to-world matrix per view, paired by file stem.
//!
//! - [`index_instances`] walks the root and pairs images with poses.
//! - [`SceneClassDataset::load`] decodes the views in parallel.
//! - [`RaySampler`] turns views into [`QueryBatch`]es of rays for training.

pub mod batch;
pub mod index;
pub mod load;
pub mod sampler;
pub mod types;

pub use batch::{BurnQueryBatch, QueryBatch};
pub use index::{index_instances, summarize};
pub use load::SceneClassDataset;
pub use sampler::{RaySampler, SamplerConfig};
pub use types::{
    DatasetConfig, DatasetError, DatasetResult, DatasetSummary, InstanceIndex, InstanceViews,
    View, ViewIndex,
};
