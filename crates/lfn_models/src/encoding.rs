//! Input encodings for ray coordinates.

use crate::config::InputEncoding;
use burn::module::{Ignored, Module, Param};
use burn::tensor::{backend::Backend, Distribution, Int, Tensor, TensorData};
use serde::{Deserialize, Serialize};
use std::f32::consts::PI;

/// Spatial hash primes (first dimension unhashed).
const HASH_PRIMES: [u64; 3] = [1, 2_654_435_761, 805_459_861];
const TABLE_INIT_RANGE: f64 = 1e-4;

/// `[sin(2^0 π x), cos(2^0 π x), ..., sin(2^(n-1) π x), cos(2^(n-1) π x)]`,
/// each term over all input features.
#[derive(Module, Debug, Clone)]
pub struct PositionalEncoding {
    in_features: usize,
    n_frequencies: usize,
}

impl PositionalEncoding {
    pub fn new(in_features: usize, n_frequencies: usize) -> Self {
        Self {
            in_features,
            n_frequencies,
        }
    }

    pub fn out_size(&self) -> usize {
        self.in_features * self.n_frequencies * 2
    }

    pub fn forward<B: Backend, const D: usize>(&self, x: Tensor<B, D>) -> Tensor<B, D> {
        let mut terms = Vec::with_capacity(self.n_frequencies * 2);
        for i in 0..self.n_frequencies {
            let scaled = x.clone().mul_scalar(2f32.powi(i as i32) * PI);
            terms.push(scaled.clone().sin());
            terms.push(scaled.cos());
        }
        Tensor::cat(terms, D - 1)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HashGridConfig {
    pub n_levels: usize,
    pub n_features_per_level: usize,
    pub log2_hashmap_size: u32,
    pub base_resolution: usize,
    pub per_level_scale: f32,
    /// Input dimensions sharing one grid; inputs are split into groups of
    /// at most this many. Every input dimension is grid-encoded, none pass
    /// through as raw coordinates (see the grid entry in DESIGN.md).
    pub dims_per_group: usize,
}

impl Default for HashGridConfig {
    fn default() -> Self {
        Self {
            n_levels: 16,
            n_features_per_level: 2,
            log2_hashmap_size: 19,
            base_resolution: 16,
            per_level_scale: 2.0,
            dims_per_group: 3,
        }
    }
}

impl HashGridConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.n_levels == 0 || self.n_features_per_level == 0 {
            return Err("n_levels and n_features_per_level must be positive".to_string());
        }
        if !(1..=30).contains(&self.log2_hashmap_size) {
            return Err(format!(
                "log2_hashmap_size must be in 1..=30, got {}",
                self.log2_hashmap_size
            ));
        }
        if self.base_resolution == 0 {
            return Err("base_resolution must be positive".to_string());
        }
        if !self.per_level_scale.is_finite() || self.per_level_scale < 1.0 {
            return Err(format!(
                "per_level_scale must be >= 1, got {}",
                self.per_level_scale
            ));
        }
        if !(1..=HASH_PRIMES.len()).contains(&self.dims_per_group) {
            return Err(format!(
                "dims_per_group must be in 1..={}, got {}",
                HASH_PRIMES.len(),
                self.dims_per_group
            ));
        }
        Ok(())
    }

    pub fn level_resolution(&self, level: usize) -> usize {
        let res = self.base_resolution as f32 * self.per_level_scale.powi(level as i32);
        (res.floor() as usize).max(1)
    }

    /// Entries in the table of one level for a grid over `dims` dimensions.
    pub fn table_size(&self, dims: usize, level: usize) -> usize {
        let max = 1usize << self.log2_hashmap_size;
        let side = self.level_resolution(level) + 1;
        side.checked_pow(dims as u32)
            .map(|dense| dense.min(max))
            .unwrap_or(max)
    }

    fn groups(&self, in_features: usize) -> Vec<std::ops::Range<usize>> {
        (0..in_features)
            .step_by(self.dims_per_group)
            .map(|start| start..(start + self.dims_per_group).min(in_features))
            .collect()
    }

    pub fn out_size(&self, in_features: usize) -> usize {
        self.groups(in_features).len() * self.n_levels * self.n_features_per_level
    }
}

/// Table slots and trilinear (or lower-dimensional) weights of the grid
/// corners around `point` (coordinates in [0, 1]).
pub fn grid_corners(point: &[f32], resolution: usize, table_size: usize) -> Vec<(usize, f32)> {
    let dims = point.len();
    let side = resolution + 1;
    let dense = side
        .checked_pow(dims as u32)
        .is_some_and(|cells| cells <= table_size);

    let mut base = Vec::with_capacity(dims);
    let mut frac = Vec::with_capacity(dims);
    for &x in point {
        let pos = x.clamp(0.0, 1.0) * resolution as f32;
        let cell = (pos.floor() as usize).min(resolution.saturating_sub(1));
        base.push(cell);
        frac.push(pos - cell as f32);
    }

    (0..1usize << dims)
        .map(|corner| {
            let mut weight = 1.0f32;
            let mut dense_idx = 0usize;
            let mut stride = 1usize;
            let mut hash = 0u64;
            for d in 0..dims {
                let bit = (corner >> d) & 1;
                let c = base[d] + bit;
                weight *= if bit == 1 { frac[d] } else { 1.0 - frac[d] };
                dense_idx += c * stride;
                stride *= side;
                hash ^= (c as u64).wrapping_mul(HASH_PRIMES[d]);
            }
            let slot = if dense {
                dense_idx
            } else {
                (hash % table_size as u64) as usize
            };
            (slot, weight)
        })
        .collect()
}

/// Multiresolution hash-grid encoding with one learned feature table per
/// (dimension group, level). Inputs in [-1, 1] are mapped to [0, 1] and
/// clamped. Table lookups are computed on the host; gradients flow into the
/// tables but not back into the input coordinates.
#[derive(Module, Debug)]
pub struct HashGridEncoding<B: Backend> {
    tables: Vec<Param<Tensor<B, 2>>>,
    in_features: usize,
    config: Ignored<HashGridConfig>,
}

impl<B: Backend> HashGridEncoding<B> {
    pub fn new(in_features: usize, config: &HashGridConfig, device: &B::Device) -> Self {
        let mut tables = Vec::new();
        for group in config.groups(in_features) {
            for level in 0..config.n_levels {
                let size = config.table_size(group.len(), level);
                let table = Tensor::<B, 2>::random(
                    [size, config.n_features_per_level],
                    Distribution::Uniform(-TABLE_INIT_RANGE, TABLE_INIT_RANGE),
                    device,
                );
                tables.push(Param::from_tensor(table));
            }
        }
        Self {
            tables,
            in_features,
            config: Ignored(config.clone()),
        }
    }

    pub fn out_size(&self) -> usize {
        self.config.out_size(self.in_features)
    }

    /// `x [n, in] -> [n, out_size]`.
    pub fn forward(&self, x: Tensor<B, 2>) -> Tensor<B, 2> {
        let [n, d] = x.dims();
        let device = x.device();
        let values = x
            .into_data()
            .convert::<f32>()
            .to_vec::<f32>()
            .unwrap_or_default();
        let features = self.config.n_features_per_level;
        if values.len() != n * d || n == 0 {
            return Tensor::zeros([n, self.out_size()], &device);
        }

        let mut encoded = Vec::with_capacity(self.tables.len());
        for (g, group) in self.config.groups(d).into_iter().enumerate() {
            let corners = 1usize << group.len();
            for level in 0..self.config.n_levels {
                let resolution = self.config.level_resolution(level);
                let table_size = self.config.table_size(group.len(), level);
                let mut slots = Vec::with_capacity(n * corners);
                let mut weights = Vec::with_capacity(n * corners);
                let mut point = Vec::with_capacity(group.len());
                for row in values.chunks_exact(d) {
                    point.clear();
                    point.extend(row[group.clone()].iter().map(|v| (v + 1.0) * 0.5));
                    for (slot, weight) in grid_corners(&point, resolution, table_size) {
                        slots.push(slot as i64);
                        weights.push(weight);
                    }
                }
                let slots = Tensor::<B, 1, Int>::from_data(
                    TensorData::new(slots, [n * corners]),
                    &device,
                );
                let weights = Tensor::<B, 3>::from_data(
                    TensorData::new(weights, [n, corners, 1]),
                    &device,
                );
                let table = self.tables[g * self.config.n_levels + level].val();
                let corner_features = table.select(0, slots).reshape([n, corners, features]);
                encoded.push((corner_features * weights).sum_dim(1).reshape([n, features]));
            }
        }
        Tensor::cat(encoded, 1)
    }
}

/// The encoding selected by [`InputEncoding`]; identity when both are unset.
#[derive(Module, Debug)]
pub struct InputEncoder<B: Backend> {
    positional: Option<PositionalEncoding>,
    grid: Option<HashGridEncoding<B>>,
    in_features: usize,
}

impl<B: Backend> InputEncoder<B> {
    pub fn new(
        kind: InputEncoding,
        in_features: usize,
        n_frequencies: usize,
        grid: &HashGridConfig,
        device: &B::Device,
    ) -> Self {
        let (positional, grid) = match kind {
            InputEncoding::Identity => (None, None),
            InputEncoding::Positional => {
                (Some(PositionalEncoding::new(in_features, n_frequencies)), None)
            }
            InputEncoding::Grid => (None, Some(HashGridEncoding::new(in_features, grid, device))),
        };
        Self {
            positional,
            grid,
            in_features,
        }
    }

    pub fn identity() -> Self {
        Self {
            positional: None,
            grid: None,
            in_features: 0,
        }
    }

    pub fn out_size(&self) -> usize {
        match (&self.positional, &self.grid) {
            (Some(pe), _) => pe.out_size(),
            (None, Some(grid)) => grid.out_size(),
            (None, None) => self.in_features,
        }
    }

    /// `coords [b, n, in] -> [b, n, out_size]`.
    pub fn forward(&self, coords: Tensor<B, 3>) -> Tensor<B, 3> {
        if let Some(pe) = &self.positional {
            return pe.forward(coords);
        }
        match &self.grid {
            Some(grid) => {
                let [b, n, d] = coords.dims();
                grid.forward(coords.reshape([b * n, d]))
                    .reshape([b, n, grid.out_size()])
            }
            None => coords,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn positional_encoding_values() {
        let device = Default::default();
        let pe = PositionalEncoding::new(1, 2);
        assert_eq!(pe.out_size(), 4);
        let x = Tensor::<TestBackend, 2>::from_data(TensorData::new(vec![0.25f32], [1, 1]), &device);
        let y: Vec<f32> = pe.forward(x).into_data().to_vec().unwrap();
        let expected = [
            (0.25 * PI).sin(),
            (0.25 * PI).cos(),
            (0.5 * PI).sin(),
            (0.5 * PI).cos(),
        ];
        for (a, b) in y.iter().zip(expected.iter()) {
            assert!((a - b).abs() < 1e-5, "{a} vs {b}");
        }
    }

    #[test]
    fn corner_weights_sum_to_one() {
        let corners = grid_corners(&[0.3, 0.71, 0.5], 8, 1 << 12);
        assert_eq!(corners.len(), 8);
        let total: f32 = corners.iter().map(|(_, w)| w).sum();
        assert!((total - 1.0).abs() < 1e-5);
        assert!(corners.iter().all(|(slot, _)| *slot < 1 << 12));
    }

    #[test]
    fn dense_levels_index_without_collisions() {
        // 3x3 grid over 2 dims fits in the table, so corners map densely.
        let corners = grid_corners(&[0.0, 0.0], 2, 64);
        let slots: Vec<usize> = corners.iter().map(|(s, _)| *s).collect();
        assert_eq!(slots, vec![0, 1, 3, 4]);
        assert!((corners[0].1 - 1.0).abs() < 1e-6);
    }

    #[test]
    fn upper_boundary_stays_in_last_cell() {
        let corners = grid_corners(&[1.0], 4, 16);
        let (slot, weight) = corners[1];
        assert_eq!(slot, 4);
        assert!((weight - 1.0).abs() < 1e-6);
    }

    #[test]
    fn hashed_slots_stay_in_table() {
        let cfg = HashGridConfig {
            log2_hashmap_size: 6,
            ..Default::default()
        };
        let size = cfg.table_size(3, 4);
        assert_eq!(size, 64);
        for corner in grid_corners(&[0.9, 0.1, 0.42], cfg.level_resolution(4), size) {
            assert!(corner.0 < size);
        }
    }

    #[test]
    fn grid_output_size_and_determinism() {
        let device = Default::default();
        let cfg = HashGridConfig {
            n_levels: 3,
            log2_hashmap_size: 8,
            base_resolution: 4,
            ..Default::default()
        };
        assert_eq!(cfg.out_size(6), 2 * 3 * 2);
        let grid = HashGridEncoding::<TestBackend>::new(6, &cfg, &device);
        let x = Tensor::<TestBackend, 2>::random([5, 6], Distribution::Uniform(-1.0, 1.0), &device);
        let a: Vec<f32> = grid.forward(x.clone()).into_data().to_vec().unwrap();
        let b: Vec<f32> = grid.forward(x).into_data().to_vec().unwrap();
        assert_eq!(a.len(), 5 * 12);
        assert_eq!(a, b);
        assert!(a.iter().all(|v| v.abs() <= TABLE_INIT_RANGE as f32 + 1e-7));
    }

    #[test]
    fn encoder_identity_passthrough() {
        let device = Default::default();
        let enc = InputEncoder::<TestBackend>::new(
            InputEncoding::Identity,
            6,
            8,
            &HashGridConfig::default(),
            &device,
        );
        assert_eq!(enc.out_size(), 6);
        let x = Tensor::<TestBackend, 3>::random([2, 3, 6], Distribution::Default, &device);
        assert_eq!(enc.forward(x).dims(), [2, 3, 6]);

        let enc = InputEncoder::<TestBackend>::new(
            InputEncoding::Positional,
            6,
            8,
            &HashGridConfig::default(),
            &device,
        );
        assert_eq!(enc.out_size(), 96);
    }
}
