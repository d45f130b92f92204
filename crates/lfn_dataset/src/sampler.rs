//! Epoch iteration over (instance, view) pairs and ray subsampling.

use crate::batch::QueryBatch;
use crate::load::SceneClassDataset;
use crate::types::View;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

#[derive(Debug, Clone)]
pub struct SamplerConfig {
    /// Views per batch.
    pub batch_size: usize,
    /// Random pixels drawn per view; `None` keeps whole views.
    pub rays_per_view: Option<usize>,
    pub shuffle: bool,
    /// Seed for reproducible shuffling and ray selection.
    pub seed: Option<u64>,
    /// Drop the last partial batch of an epoch.
    pub drop_last: bool,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            batch_size: 1,
            rays_per_view: None,
            shuffle: true,
            seed: None,
            drop_last: false,
        }
    }
}

/// Walks every (instance, view) pair once per epoch.
pub struct RaySampler {
    order: Vec<(usize, usize)>,
    cursor: usize,
    cfg: SamplerConfig,
    rays_per_view: usize,
    rng: StdRng,
}

fn push_view(batch: &mut QueryBatch, view: &View, instance: usize, pixels: Option<&[usize]>) {
    batch.cam2world.extend_from_slice(&view.pose.flatten());
    batch.intrinsics.extend_from_slice(&view.intrinsics.matrix());
    batch.instance_idx.push(instance as i64);
    let width = view.width as usize;
    let mut push_pixel = |idx: usize| {
        let (x, y) = (idx % width, idx / width);
        batch.uv.push(x as f32 + 0.5);
        batch.uv.push(y as f32 + 0.5);
        batch.rgb.extend_from_slice(&view.rgb[idx * 3..idx * 3 + 3]);
    };
    match pixels {
        Some(pixels) => pixels.iter().copied().for_each(&mut push_pixel),
        None => (0..view.num_pixels()).for_each(&mut push_pixel),
    }
}

impl QueryBatch {
    fn with_capacity(views: usize, rays_per_view: usize, resolution: (u32, u32)) -> Self {
        Self {
            cam2world: Vec::with_capacity(views * 16),
            intrinsics: Vec::with_capacity(views * 9),
            uv: Vec::with_capacity(views * rays_per_view * 2),
            rgb: Vec::with_capacity(views * rays_per_view * 3),
            instance_idx: Vec::with_capacity(views),
            sources: Vec::with_capacity(views),
            rays_per_view,
            resolution,
            full_views: true,
        }
    }

    /// Every pixel of the given views, in raster order. Pairs that do not
    /// exist in the dataset are skipped.
    pub fn full_views(dataset: &SceneClassDataset, sources: &[(usize, usize)]) -> Self {
        let (w, h) = dataset.resolution();
        let mut batch = Self::with_capacity(sources.len(), (w * h) as usize, (w, h));
        for &(inst, view_idx) in sources {
            if let Some(view) = dataset.view(inst, view_idx) {
                push_view(&mut batch, view, inst, None);
                batch.sources.push((inst, view_idx));
            }
        }
        batch
    }
}

impl RaySampler {
    pub fn new(dataset: &SceneClassDataset, cfg: SamplerConfig) -> Self {
        let order = dataset
            .instances()
            .iter()
            .enumerate()
            .flat_map(|(i, inst)| (0..inst.views.len()).map(move |v| (i, v)))
            .collect();
        let (w, h) = dataset.resolution();
        let num_pixels = (w * h) as usize;
        let rays_per_view = cfg
            .rays_per_view
            .map(|r| r.clamp(1, num_pixels))
            .unwrap_or(num_pixels);
        let rng = match cfg.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_rng(&mut rand::rng()),
        };
        let mut sampler = Self {
            order,
            cursor: 0,
            cfg,
            rays_per_view,
            rng,
        };
        sampler.start_epoch();
        sampler
    }

    /// Reset the cursor and reshuffle.
    pub fn start_epoch(&mut self) {
        self.cursor = 0;
        if self.cfg.shuffle {
            self.order.shuffle(&mut self.rng);
        }
    }

    fn batch_size(&self) -> usize {
        self.cfg.batch_size.max(1)
    }

    pub fn rays_per_view(&self) -> usize {
        self.rays_per_view
    }

    pub fn steps_per_epoch(&self) -> usize {
        let n = self.order.len();
        let bs = self.batch_size();
        if self.cfg.drop_last {
            n / bs
        } else {
            n.div_ceil(bs)
        }
    }

    /// Next batch of the current epoch, or `None` once it is exhausted.
    pub fn next_batch(&mut self, dataset: &SceneClassDataset) -> Option<QueryBatch> {
        let remaining = self.order.len().saturating_sub(self.cursor);
        let take = remaining.min(self.batch_size());
        if take == 0 || (self.cfg.drop_last && take < self.batch_size()) {
            return None;
        }
        let sources: Vec<(usize, usize)> = self.order[self.cursor..self.cursor + take].to_vec();
        self.cursor += take;

        let (w, h) = dataset.resolution();
        let num_pixels = (w * h) as usize;
        if self.rays_per_view >= num_pixels {
            return Some(QueryBatch::full_views(dataset, &sources));
        }

        let mut batch = QueryBatch::with_capacity(take, self.rays_per_view, (w, h));
        batch.full_views = false;
        for (inst, view_idx) in sources {
            let Some(view) = dataset.view(inst, view_idx) else {
                continue;
            };
            let pixels = rand::seq::index::sample(&mut self.rng, num_pixels, self.rays_per_view)
                .into_vec();
            push_view(&mut batch, view, inst, Some(&pixels));
            batch.sources.push((inst, view_idx));
        }
        Some(batch)
    }
}
