use crate::args::{validate_backend_choice, TrainArgs};
use crate::checkpoint::{save_model, RunConfig, RunDir};
use crate::loss::{psnr_from_mse, scalar, LfLoss};
use crate::summary::{append_metrics, write_comparison_png, MetricsRecord};
use crate::TrainBackend;
use anyhow::Context;
use burn::backend::Autodiff;
use burn::module::Module;
use burn::optim::{AdamConfig, GradientsParams, Optimizer};
use burn::tensor::{backend::Backend, Tensor};
use lfn_dataset::{
    BurnQueryBatch, DatasetConfig, QueryBatch, RaySampler, SamplerConfig, SceneClassDataset,
};
use lfn_models::{InputEncoding, LightFieldModel, LightFieldOutput, LightFieldQuery};
use std::path::PathBuf;
use std::time::Instant;

type ADBackend = Autodiff<TrainBackend>;

#[derive(Debug, Clone)]
pub struct TrainOutcome {
    pub run_dir: PathBuf,
    pub steps: usize,
    pub final_loss: f32,
    pub final_checkpoint: PathBuf,
}

/// Split a tensor batch into the model query and the ground-truth colours.
pub fn split_batch<B: Backend>(batch: BurnQueryBatch<B>) -> (LightFieldQuery<B>, Tensor<B, 4>) {
    let query = LightFieldQuery {
        cam2world: batch.cam2world,
        intrinsics: batch.intrinsics,
        uv: batch.uv,
        instance_idx: batch.instance_idx,
    };
    (query, batch.rgb)
}

/// First view of a model output on the host, `[p * 3]`.
pub fn first_view_rgb<B: Backend>(output: &LightFieldOutput<B>) -> Vec<f32> {
    let [_, _, p, c] = output.rgb.dims();
    output
        .rgb
        .clone()
        .slice([0..1, 0..1, 0..p, 0..c])
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .unwrap_or_default()
}

fn load_dataset(args: &TrainArgs) -> anyhow::Result<SceneClassDataset> {
    let root = args
        .data_root
        .clone()
        .context("--data_root is required")?;
    let cfg = DatasetConfig {
        max_num_instances: args.instance_limit(),
        fit_single: args.fit_single,
        img_sidelength: args.img_sidelength,
        ..DatasetConfig::new(&root)
    };
    SceneClassDataset::load(&cfg)
        .with_context(|| format!("failed to load dataset at {}", root.display()))
}

pub fn run_train(args: TrainArgs) -> anyhow::Result<TrainOutcome> {
    validate_backend_choice(args.backend)?;
    args.validate()?;

    let dataset = load_dataset(&args)?;
    let summary = dataset.summary();
    tracing::info!(
        instances = summary.instances,
        views = summary.views,
        resolution = ?dataset.resolution(),
        "dataset ready"
    );

    let model_cfg = args.model_config(dataset.num_instances());
    if !args.fit_single && model_cfg.input_encoding != InputEncoding::Identity {
        tracing::warn!(
            encoding = ?model_cfg.input_encoding,
            "input encoding only applies with --fit_single; conditioned models use raw coordinates"
        );
    }
    model_cfg.validate()?;

    let run_dir = RunDir::new(&args.logging_root, &args.experiment_name);
    run_dir.prepare(args.overwrite)?;
    let data_root = args.data_root.clone().unwrap_or_default();
    run_dir.write_config(&RunConfig {
        experiment_name: args.experiment_name.clone(),
        data_root,
        fit_single: args.fit_single,
        max_num_instances: args.instance_limit(),
        img_sidelength: args.img_sidelength,
        lr: args.lr,
        batch_size: args.batch_size,
        rays_per_view: args.rays_per_view,
        num_epochs: args.num_epochs,
        seed: args.seed,
        model: model_cfg.clone(),
    })?;

    let device = <ADBackend as Backend>::Device::default();
    if let Some(seed) = args.seed {
        ADBackend::seed(seed);
    }
    let mut model = LightFieldModel::<ADBackend>::new(&model_cfg, &device)?;
    tracing::info!(params = model.num_params(), "model initialized");
    let mut optim = AdamConfig::new().init();
    let loss_fn = LfLoss::default();

    let mut sampler = RaySampler::new(
        &dataset,
        SamplerConfig {
            batch_size: args.batch_size,
            rays_per_view: args.rays_per_view,
            shuffle: true,
            seed: args.seed,
            drop_last: false,
        },
    );

    let started = Instant::now();
    let mut step = 0usize;
    let mut final_loss = f32::NAN;
    for epoch in 0..args.num_epochs {
        sampler.start_epoch();
        let mut epoch_losses = Vec::new();
        while let Some(batch) = sampler.next_batch(&dataset) {
            let (query, gt_rgb) = split_batch(batch.to_tensors::<ADBackend>(&device));
            let output = model.forward(query)?;
            let terms = loss_fn.forward(&output, gt_rgb);

            let total_val = scalar(terms.total.clone().detach());
            if !total_val.is_finite() {
                anyhow::bail!("loss became non-finite at epoch {epoch}, step {step}");
            }

            if step % args.steps_til_summary == 0 {
                let img_val = scalar(terms.img.clone().detach());
                let reg_val = terms.reg.clone().map(|r| scalar(r.detach()));
                write_summary(
                    &run_dir,
                    &batch,
                    &output,
                    MetricsRecord {
                        epoch,
                        step,
                        img_loss: img_val,
                        reg_loss: reg_val,
                        total_loss: total_val,
                        psnr: psnr_from_mse(loss_fn.image_mse(img_val)),
                        elapsed_secs: started.elapsed().as_secs_f64(),
                    },
                )?;
            }

            let grads = GradientsParams::from_grads(terms.total.backward(), &model);
            model = optim.step(args.lr, model, grads);
            epoch_losses.push(total_val);
            final_loss = total_val;
            step += 1;
        }

        let avg_loss = if epoch_losses.is_empty() {
            0.0
        } else {
            epoch_losses.iter().sum::<f32>() / epoch_losses.len() as f32
        };
        tracing::info!(epoch, avg_loss, "epoch finished");

        if (epoch + 1) % args.epochs_til_ckpt == 0 && epoch + 1 < args.num_epochs {
            let path = run_dir.epoch_checkpoint(epoch);
            save_model(&model, &path)?;
            tracing::info!(path = %path.display(), "saved checkpoint");
        }
    }

    let final_checkpoint = run_dir.final_checkpoint();
    save_model(&model, &final_checkpoint)?;
    tracing::info!(path = %final_checkpoint.display(), steps = step, "saved final checkpoint");

    Ok(TrainOutcome {
        run_dir: run_dir.root().to_path_buf(),
        steps: step,
        final_loss,
        final_checkpoint,
    })
}

fn write_summary<B: Backend>(
    run_dir: &RunDir,
    batch: &QueryBatch,
    output: &LightFieldOutput<B>,
    record: MetricsRecord,
) -> anyhow::Result<()> {
    tracing::info!(
        epoch = record.epoch,
        step = record.step,
        img_loss = record.img_loss,
        reg_loss = ?record.reg_loss,
        psnr = record.psnr,
        "summary"
    );
    append_metrics(&run_dir.metrics_path(), &record)?;

    if batch.full_views {
        let (w, h) = batch.resolution;
        let p = batch.rays_per_view;
        let prediction = first_view_rgb(output);
        let path = run_dir
            .summaries_dir()
            .join(format!("step_{:07}.png", record.step));
        write_comparison_png(&path, &prediction, &batch.rgb[..p * 3], w, h)?;
    }
    Ok(())
}
