//! Ray batches on the host and their burn tensor counterparts.

use burn::tensor::{backend::Backend, Int, Tensor, TensorData};

/// Rays for `len()` query views, one query per view. Buffers are row-major
/// and sized for `rays_per_view` pixels each.
#[derive(Debug, Clone)]
pub struct QueryBatch {
    /// `[views, 16]` camera-to-world matrices.
    pub cam2world: Vec<f32>,
    /// `[views, 9]` camera matrices.
    pub intrinsics: Vec<f32>,
    /// `[views, rays_per_view, 2]` pixel centres.
    pub uv: Vec<f32>,
    /// `[views, rays_per_view, 3]` ground truth in [-1, 1].
    pub rgb: Vec<f32>,
    /// `[views]` dataset instance index of each view.
    pub instance_idx: Vec<i64>,
    /// `[views]` (instance, view) pairs the batch was drawn from.
    pub sources: Vec<(usize, usize)>,
    pub rays_per_view: usize,
    /// (width, height) of the source views.
    pub resolution: (u32, u32),
    /// True when every pixel of each view is present, in raster order.
    pub full_views: bool,
}

/// [`QueryBatch`] as tensors: `cam2world [b,1,4,4]`, `intrinsics [b,1,3,3]`,
/// `uv [b,1,p,2]`, `rgb [b,1,p,3]`, `instance_idx [b,1]`.
#[derive(Debug, Clone)]
pub struct BurnQueryBatch<B: Backend> {
    pub cam2world: Tensor<B, 4>,
    pub intrinsics: Tensor<B, 4>,
    pub uv: Tensor<B, 4>,
    pub rgb: Tensor<B, 4>,
    pub instance_idx: Tensor<B, 2, Int>,
}

impl QueryBatch {
    pub fn len(&self) -> usize {
        self.instance_idx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instance_idx.is_empty()
    }

    pub fn to_tensors<B: Backend>(&self, device: &B::Device) -> BurnQueryBatch<B> {
        let b = self.len();
        let p = self.rays_per_view;
        BurnQueryBatch {
            cam2world: Tensor::from_data(
                TensorData::new(self.cam2world.clone(), [b, 1, 4, 4]),
                device,
            ),
            intrinsics: Tensor::from_data(
                TensorData::new(self.intrinsics.clone(), [b, 1, 3, 3]),
                device,
            ),
            uv: Tensor::from_data(TensorData::new(self.uv.clone(), [b, 1, p, 2]), device),
            rgb: Tensor::from_data(TensorData::new(self.rgb.clone(), [b, 1, p, 3]), device),
            instance_idx: Tensor::from_data(
                TensorData::new(self.instance_idx.clone(), [b, 1]),
                device,
            ),
        }
    }
}
