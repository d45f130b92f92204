//! Render the views of one instance from a trained checkpoint.

use crate::args::{validate_backend_choice, BackendKind};
use crate::checkpoint::{load_model, RunDir};
use crate::loss::psnr_from_mse;
use crate::summary::write_comparison_png;
use crate::train::{first_view_rgb, split_batch};
use crate::TrainBackend;
use anyhow::Context;
use burn::tensor::backend::Backend;
use clap::Parser;
use lfn_dataset::{DatasetConfig, QueryBatch, SceneClassDataset};
use std::path::PathBuf;

#[derive(Parser, Debug, Clone)]
#[command(name = "render", about = "Render dataset views from a light field checkpoint")]
pub struct RenderArgs {
    /// Experiment directory holding config.json and checkpoints/.
    #[arg(long = "experiment_dir")]
    pub experiment_dir: PathBuf,
    /// Checkpoint to load (defaults to checkpoints/model_final.bin).
    #[arg(long)]
    pub checkpoint: Option<PathBuf>,
    /// Dataset root (defaults to the one recorded at training time).
    #[arg(long = "data_root")]
    pub data_root: Option<PathBuf>,
    /// Instance index within the loaded dataset.
    #[arg(long, default_value_t = 0)]
    pub instance: usize,
    #[arg(long = "max_views")]
    pub max_views: Option<usize>,
    /// Output directory (defaults to <experiment_dir>/render).
    #[arg(long = "out_dir")]
    pub out_dir: Option<PathBuf>,
    /// Backend to use (ndarray or wgpu if enabled).
    #[arg(long, value_enum, default_value_t = BackendKind::NdArray)]
    pub backend: BackendKind,
}

#[derive(Debug, Clone)]
pub struct ViewReport {
    pub view: usize,
    pub psnr: f32,
    pub path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct RenderReport {
    pub out_dir: PathBuf,
    pub views: Vec<ViewReport>,
    pub mean_psnr: f32,
}

fn mse(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || a.len() != b.len() {
        return f32::NAN;
    }
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum::<f32>() / a.len() as f32
}

pub fn run_render(args: RenderArgs) -> anyhow::Result<RenderReport> {
    validate_backend_choice(args.backend)?;
    let run_dir = RunDir::open(&args.experiment_dir);
    let run_cfg = run_dir.read_config()?;

    let data_root = args.data_root.clone().unwrap_or(run_cfg.data_root.clone());
    let dataset = SceneClassDataset::load(&DatasetConfig {
        max_num_instances: run_cfg.max_num_instances,
        fit_single: run_cfg.fit_single,
        img_sidelength: run_cfg.img_sidelength,
        ..DatasetConfig::new(&data_root)
    })
    .with_context(|| format!("failed to load dataset at {}", data_root.display()))?;

    if dataset.num_instances() != run_cfg.model.num_instances {
        anyhow::bail!(
            "dataset at {} has {} instances but the model was trained on {}",
            data_root.display(),
            dataset.num_instances(),
            run_cfg.model.num_instances
        );
    }
    let instance = dataset.instance(args.instance).with_context(|| {
        format!(
            "instance {} out of range (dataset has {})",
            args.instance,
            dataset.num_instances()
        )
    })?;
    let num_views = args
        .max_views
        .map_or(instance.views.len(), |m| m.min(instance.views.len()));

    let device = <TrainBackend as Backend>::Device::default();
    let checkpoint = args
        .checkpoint
        .clone()
        .unwrap_or_else(|| run_dir.final_checkpoint());
    let model = load_model::<TrainBackend>(&run_cfg.model, &checkpoint, &device)?;
    tracing::info!(
        checkpoint = %checkpoint.display(),
        instance = %instance.name,
        views = num_views,
        "rendering"
    );

    let out_dir = args
        .out_dir
        .clone()
        .unwrap_or_else(|| run_dir.root().join("render"));
    std::fs::create_dir_all(&out_dir)
        .with_context(|| format!("failed to create {}", out_dir.display()))?;

    let (w, h) = dataset.resolution();
    let mut views = Vec::with_capacity(num_views);
    for v in 0..num_views {
        let batch = QueryBatch::full_views(&dataset, &[(args.instance, v)]);
        let (query, _) = split_batch(batch.to_tensors::<TrainBackend>(&device));
        let prediction = first_view_rgb(&model.forward(query)?);
        let psnr = psnr_from_mse(mse(&prediction, &batch.rgb));
        let path = out_dir.join(format!("{}_{v:04}.png", instance.name));
        write_comparison_png(&path, &prediction, &batch.rgb, w, h)?;
        tracing::info!(view = v, psnr, "rendered view");
        views.push(ViewReport { view: v, psnr, path });
    }

    let mean_psnr = if views.is_empty() {
        0.0
    } else {
        views.iter().map(|r| r.psnr).sum::<f32>() / views.len() as f32
    };
    tracing::info!(mean_psnr, views = views.len(), "render finished");
    Ok(RenderReport {
        out_dir,
        views,
        mean_psnr,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mse_of_buffers() {
        assert!((mse(&[0.0, 1.0], &[0.0, 0.0]) - 0.5).abs() < 1e-6);
        assert!(mse(&[], &[]).is_nan());
    }

    #[test]
    fn args_use_script_style_names() {
        let args = RenderArgs::try_parse_from([
            "render",
            "--experiment_dir",
            "logs/cars",
            "--max_views",
            "3",
            "--instance",
            "2",
        ])
        .unwrap();
        assert_eq!(args.max_views, Some(3));
        assert_eq!(args.instance, 2);
        assert!(args.checkpoint.is_none());
    }
}
