use burn::nn::loss::{MseLoss, Reduction};
use burn::tensor::{backend::Backend, Tensor};
use lfn_models::LightFieldOutput;

/// Scale applied to the per-pixel MSE before weighting.
const IMAGE_LOSS_SCALE: f32 = 200.0;

/// `img = 200 * MSE(rgb) * l2_weight`, plus `reg = mean(z^2) * reg_weight`
/// when the model carries latent codes.
#[derive(Debug, Clone, Copy)]
pub struct LfLoss {
    pub l2_weight: f32,
    pub reg_weight: f32,
}

impl Default for LfLoss {
    fn default() -> Self {
        Self {
            l2_weight: 1.0,
            reg_weight: 100.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LossTerms<B: Backend> {
    pub img: Tensor<B, 1>,
    pub reg: Option<Tensor<B, 1>>,
    pub total: Tensor<B, 1>,
}

impl LfLoss {
    pub fn forward<B: Backend>(
        &self,
        output: &LightFieldOutput<B>,
        gt_rgb: Tensor<B, 4>,
    ) -> LossTerms<B> {
        let img = MseLoss::new()
            .forward(output.rgb.clone(), gt_rgb, Reduction::Mean)
            .mul_scalar(IMAGE_LOSS_SCALE * self.l2_weight);
        let reg = output
            .z
            .clone()
            .map(|z| z.powf_scalar(2.0).mean().mul_scalar(self.reg_weight));
        let total = match &reg {
            Some(reg) => img.clone() + reg.clone(),
            None => img.clone(),
        };
        LossTerms { img, reg, total }
    }

    /// Undo the image loss scaling to recover the per-pixel MSE.
    pub fn image_mse(&self, img_loss: f32) -> f32 {
        img_loss / (IMAGE_LOSS_SCALE * self.l2_weight)
    }
}

/// First element of a scalar tensor on the host.
pub fn scalar<B: Backend>(t: Tensor<B, 1>) -> f32 {
    t.into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .unwrap_or_default()
        .first()
        .copied()
        .unwrap_or(f32::NAN)
}

/// PSNR of an image MSE over [-1, 1] values (peak-to-peak range 2).
pub fn psnr_from_mse(mse: f32) -> f32 {
    10.0 * (4.0 / mse.max(1e-10)).log10()
}
