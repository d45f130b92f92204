//! Experiment directory layout, run config and model checkpoints.

use anyhow::Context;
use burn::module::Module;
use burn::record::{BinFileRecorder, FullPrecisionSettings};
use burn::tensor::backend::Backend;
use lfn_models::{LightFieldConfig, LightFieldModel};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const CONFIG_FILE: &str = "config.json";
const FINAL_CHECKPOINT: &str = "model_final.bin";

/// What is needed to rebuild the model and its dataset view after training.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    pub experiment_name: String,
    pub data_root: PathBuf,
    pub fit_single: bool,
    pub max_num_instances: Option<usize>,
    pub img_sidelength: Option<u32>,
    pub lr: f64,
    pub batch_size: usize,
    pub rays_per_view: Option<usize>,
    pub num_epochs: usize,
    pub seed: Option<u64>,
    pub model: LightFieldConfig,
}

/// `<logging_root>/<experiment_name>` and the files inside it.
#[derive(Debug, Clone)]
pub struct RunDir {
    root: PathBuf,
}

impl RunDir {
    pub fn new(logging_root: &Path, experiment_name: &str) -> Self {
        Self {
            root: logging_root.join(experiment_name),
        }
    }

    pub fn open(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn checkpoints_dir(&self) -> PathBuf {
        self.root.join("checkpoints")
    }

    pub fn summaries_dir(&self) -> PathBuf {
        self.root.join("summaries")
    }

    pub fn metrics_path(&self) -> PathBuf {
        self.root.join("metrics.jsonl")
    }

    pub fn config_path(&self) -> PathBuf {
        self.root.join(CONFIG_FILE)
    }

    pub fn epoch_checkpoint(&self, epoch: usize) -> PathBuf {
        self.checkpoints_dir()
            .join(format!("model_epoch_{epoch:04}.bin"))
    }

    pub fn final_checkpoint(&self) -> PathBuf {
        self.checkpoints_dir().join(FINAL_CHECKPOINT)
    }

    fn has_checkpoints(&self) -> bool {
        std::fs::read_dir(self.checkpoints_dir())
            .map(|mut entries| entries.next().is_some())
            .unwrap_or(false)
    }

    /// Create the directory tree. An existing run with checkpoints is only
    /// reused when `overwrite` is set; its old metrics are then discarded.
    pub fn prepare(&self, overwrite: bool) -> anyhow::Result<()> {
        if self.has_checkpoints() {
            if !overwrite {
                anyhow::bail!(
                    "experiment directory {} already has checkpoints; pass --overwrite to reuse it",
                    self.root.display()
                );
            }
            tracing::warn!(dir = %self.root.display(), "overwriting existing experiment");
            let metrics = self.metrics_path();
            if metrics.exists() {
                std::fs::remove_file(&metrics)
                    .with_context(|| format!("failed to remove {}", metrics.display()))?;
            }
        }
        for dir in [self.checkpoints_dir(), self.summaries_dir()] {
            std::fs::create_dir_all(&dir)
                .with_context(|| format!("failed to create {}", dir.display()))?;
        }
        Ok(())
    }

    pub fn write_config(&self, config: &RunConfig) -> anyhow::Result<()> {
        let path = self.config_path();
        let json = serde_json::to_string_pretty(config)?;
        std::fs::write(&path, json).with_context(|| format!("failed to write {}", path.display()))
    }

    pub fn read_config(&self) -> anyhow::Result<RunConfig> {
        let path = self.config_path();
        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("failed to parse {}", path.display()))
    }
}

pub fn save_model<B: Backend>(model: &LightFieldModel<B>, path: &Path) -> anyhow::Result<()> {
    let recorder = BinFileRecorder::<FullPrecisionSettings>::new();
    model
        .clone()
        .save_file(path, &recorder)
        .map_err(|e| anyhow::anyhow!("failed to save checkpoint {}: {e}", path.display()))
}

pub fn load_model<B: Backend>(
    config: &LightFieldConfig,
    path: &Path,
    device: &B::Device,
) -> anyhow::Result<LightFieldModel<B>> {
    let recorder = BinFileRecorder::<FullPrecisionSettings>::new();
    LightFieldModel::<B>::new(config, device)?
        .load_file(path, &recorder, device)
        .map_err(|e| anyhow::anyhow!("failed to load checkpoint {}: {e}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checkpoint_names() {
        let run = RunDir::new(Path::new("logs"), "cars");
        assert_eq!(
            run.epoch_checkpoint(7),
            PathBuf::from("logs/cars/checkpoints/model_epoch_0007.bin")
        );
        assert_eq!(
            run.final_checkpoint(),
            PathBuf::from("logs/cars/checkpoints/model_final.bin")
        );
    }

    #[test]
    fn existing_checkpoints_need_overwrite() {
        let tmp = tempfile::tempdir().unwrap();
        let run = RunDir::new(tmp.path(), "exp");
        run.prepare(false).unwrap();
        std::fs::write(run.final_checkpoint(), b"x").unwrap();
        std::fs::write(run.metrics_path(), b"{}\n").unwrap();
        assert!(run.prepare(false).is_err());
        run.prepare(true).unwrap();
        assert!(!run.metrics_path().exists());
    }
}
