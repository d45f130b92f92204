//! Decoding instances into memory.

use crate::index::{index_instances, summarize};
use crate::types::{
    DatasetConfig, DatasetError, DatasetResult, DatasetSummary, InstanceIndex, InstanceViews,
    View, ViewIndex,
};
use image::imageops::FilterType;
use lfn_contracts::{parse_intrinsics, parse_pose};
use rayon::prelude::*;
use std::fs;
use std::path::Path;

/// All views of a scene class, decoded and sharing one resolution.
#[derive(Debug, Clone)]
pub struct SceneClassDataset {
    instances: Vec<InstanceViews>,
    resolution: (u32, u32),
}

fn read_text(path: &Path) -> DatasetResult<String> {
    fs::read_to_string(path).map_err(|source| DatasetError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn load_view(
    view: &ViewIndex,
    intrinsics_text: &str,
    intrinsics_path: &Path,
    sidelength: Option<u32>,
) -> DatasetResult<View> {
    let img = image::open(&view.image).map_err(|source| DatasetError::Image {
        path: view.image.clone(),
        source,
    })?;
    let mut rgb = img.to_rgb8();
    if let Some(side) = sidelength {
        if rgb.dimensions() != (side, side) {
            rgb = image::imageops::resize(&rgb, side, side, FilterType::Triangle);
        }
    }
    let (width, height) = rgb.dimensions();
    let intrinsics = parse_intrinsics(intrinsics_text, (width, height)).map_err(|source| {
        DatasetError::Camera {
            path: intrinsics_path.to_path_buf(),
            source,
        }
    })?;
    let pose = parse_pose(&read_text(&view.pose)?).map_err(|source| DatasetError::Camera {
        path: view.pose.clone(),
        source,
    })?;
    let pixels = rgb
        .as_raw()
        .iter()
        .map(|v| *v as f32 / 255.0 * 2.0 - 1.0)
        .collect();
    Ok(View {
        rgb: pixels,
        width,
        height,
        pose,
        intrinsics,
    })
}

fn load_instance(index: &InstanceIndex, sidelength: Option<u32>) -> DatasetResult<InstanceViews> {
    let intrinsics_text = read_text(&index.intrinsics)?;
    let views = index
        .views
        .par_iter()
        .map(|view| load_view(view, &intrinsics_text, &index.intrinsics, sidelength))
        .collect::<DatasetResult<Vec<_>>>()?;
    Ok(InstanceViews {
        name: index.name.clone(),
        views,
    })
}

impl SceneClassDataset {
    pub fn load(cfg: &DatasetConfig) -> DatasetResult<Self> {
        let indices = index_instances(&cfg.root, cfg.instance_limit())?;
        let summary = summarize(&indices);
        tracing::info!(
            root = %cfg.root.display(),
            instances = summary.instances,
            views = summary.views,
            min_views = summary.min_views,
            max_views = summary.max_views,
            "indexed dataset"
        );
        let instances = indices
            .par_iter()
            .map(|idx| load_instance(idx, cfg.img_sidelength))
            .collect::<DatasetResult<Vec<_>>>()?;
        Self::from_instances(instances)
    }

    /// Build a dataset from views already in memory. All views must share a
    /// resolution and every instance needs at least one view.
    pub fn from_instances(instances: Vec<InstanceViews>) -> DatasetResult<Self> {
        let first = instances
            .first()
            .and_then(|inst| inst.views.first())
            .ok_or_else(|| DatasetError::Other("dataset has no views".to_string()))?;
        let resolution = (first.width, first.height);
        for inst in &instances {
            if inst.views.is_empty() {
                return Err(DatasetError::EmptyInstance {
                    path: inst.name.clone().into(),
                });
            }
            for (i, view) in inst.views.iter().enumerate() {
                if (view.width, view.height) != resolution {
                    return Err(DatasetError::ResolutionMismatch {
                        path: format!("{}/{i}", inst.name).into(),
                        actual: (view.width, view.height),
                        expected: resolution,
                    });
                }
                if view.rgb.len() != view.num_pixels() * 3 {
                    return Err(DatasetError::Other(format!(
                        "view {}/{i} has {} values, expected {}",
                        inst.name,
                        view.rgb.len(),
                        view.num_pixels() * 3
                    )));
                }
            }
        }
        Ok(Self {
            instances,
            resolution,
        })
    }

    pub fn num_instances(&self) -> usize {
        self.instances.len()
    }

    pub fn num_views(&self) -> usize {
        self.instances.iter().map(|i| i.views.len()).sum()
    }

    /// (width, height) shared by every view.
    pub fn resolution(&self) -> (u32, u32) {
        self.resolution
    }

    pub fn instances(&self) -> &[InstanceViews] {
        &self.instances
    }

    pub fn instance(&self, idx: usize) -> Option<&InstanceViews> {
        self.instances.get(idx)
    }

    pub fn view(&self, instance: usize, view: usize) -> Option<&View> {
        self.instances.get(instance)?.views.get(view)
    }

    pub fn summary(&self) -> DatasetSummary {
        let views = self.instances.iter().map(|i| i.views.len());
        DatasetSummary {
            instances: self.instances.len(),
            views: self.num_views(),
            min_views: views.clone().min().unwrap_or(0),
            max_views: views.max().unwrap_or(0),
        }
    }
}
