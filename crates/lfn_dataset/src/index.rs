//! Indexing instance directories and pairing views with poses.

use crate::types::{DatasetError, DatasetResult, DatasetSummary, InstanceIndex, ViewIndex};
use std::fs;
use std::path::{Path, PathBuf};

const RGB_DIR: &str = "rgb";
const POSE_DIR: &str = "pose";
const INTRINSICS_FILE: &str = "intrinsics.txt";
const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg"];

fn read_dir_sorted(dir: &Path) -> DatasetResult<Vec<PathBuf>> {
    let entries = fs::read_dir(dir).map_err(|source| DatasetError::Io {
        path: dir.to_path_buf(),
        source,
    })?;
    let mut paths = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| DatasetError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        paths.push(entry.path());
    }
    paths.sort();
    Ok(paths)
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|s| s.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

fn index_instance(dir: &Path) -> DatasetResult<InstanceIndex> {
    let name = dir
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_string();
    let pose_dir = dir.join(POSE_DIR);
    let mut views = Vec::new();
    for image in read_dir_sorted(&dir.join(RGB_DIR))? {
        if !is_image(&image) {
            continue;
        }
        let stem = image
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default();
        let pose = pose_dir.join(format!("{stem}.txt"));
        if !pose.is_file() {
            return Err(DatasetError::MissingPose { image });
        }
        views.push(ViewIndex { image, pose });
    }
    if views.is_empty() {
        return Err(DatasetError::EmptyInstance {
            path: dir.to_path_buf(),
        });
    }
    Ok(InstanceIndex {
        name,
        dir: dir.to_path_buf(),
        intrinsics: dir.join(INTRINSICS_FILE),
        views,
    })
}

/// Index every instance directory under `root`, sorted by name.
///
/// A sub-directory counts as an instance when it contains an `rgb/`
/// directory; anything else is ignored. `limit` keeps the first N instances.
pub fn index_instances(root: &Path, limit: Option<usize>) -> DatasetResult<Vec<InstanceIndex>> {
    let mut instances = Vec::new();
    for dir in read_dir_sorted(root)? {
        if !dir.join(RGB_DIR).is_dir() {
            continue;
        }
        if limit.is_some_and(|max| instances.len() >= max) {
            break;
        }
        instances.push(index_instance(&dir)?);
    }
    if instances.is_empty() {
        return Err(DatasetError::NoInstances {
            path: root.to_path_buf(),
        });
    }
    Ok(instances)
}

pub fn summarize(instances: &[InstanceIndex]) -> DatasetSummary {
    let counts: Vec<usize> = instances.iter().map(|i| i.views.len()).collect();
    DatasetSummary {
        instances: instances.len(),
        views: counts.iter().sum(),
        min_views: counts.iter().copied().min().unwrap_or(0),
        max_views: counts.iter().copied().max().unwrap_or(0),
    }
}
