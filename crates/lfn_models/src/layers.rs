//! Fully connected building blocks.
//!
//! [`FcBlock`] owns its weights; its [`FcSpec`] describes the layer stack and
//! can also run it with per-sample [`BatchedLinear`] weights, which is how the
//! hypernetwork evaluates a light field per instance.

use burn::module::{Ignored, Module};
use burn::nn::{Initializer, Linear, LinearConfig};
use burn::tensor::activation::relu;
use burn::tensor::{backend::Backend, Tensor};
use serde::{Deserialize, Serialize};

const LAYER_NORM_EPS: f64 = 1e-5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinearShape {
    pub d_input: usize,
    pub d_output: usize,
}

impl LinearShape {
    pub fn new(d_input: usize, d_output: usize) -> Self {
        Self { d_input, d_output }
    }

    pub fn weight_len(&self) -> usize {
        self.d_input * self.d_output
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Activation {
    Relu,
    /// `sin(omega_0 * x)`, with a separate frequency for the first layer.
    Sine { first_omega_0: f32, hidden_omega_0: f32 },
}

/// Layer norm over the last dimension without learned scale or shift.
pub fn layer_norm_no_affine<B: Backend, const D: usize>(x: Tensor<B, D>) -> Tensor<B, D> {
    let mean = x.clone().mean_dim(D - 1);
    let centered = x - mean;
    let var = centered.clone().powf_scalar(2.0).mean_dim(D - 1);
    centered / var.add_scalar(LAYER_NORM_EPS).sqrt()
}

/// Per-sample weights for one linear layer: `weight [b, in, out]`,
/// `bias [b, 1, out]`.
#[derive(Debug, Clone)]
pub struct BatchedLinear<B: Backend> {
    pub weight: Tensor<B, 3>,
    pub bias: Tensor<B, 3>,
}

impl<B: Backend> BatchedLinear<B> {
    /// `x [b, n, in] -> [b, n, out]`.
    pub fn forward(&self, x: Tensor<B, 3>) -> Tensor<B, 3> {
        x.matmul(self.weight.clone()) + self.bias.clone()
    }

    /// Repeat a shared layer's weights `batch` times.
    pub fn from_linear(linear: &Linear<B>, batch: usize) -> Self {
        let weight = linear.weight.val();
        let [_, d_output] = weight.dims();
        let bias = match &linear.bias {
            Some(bias) => bias.val().reshape([1, 1, d_output]),
            None => Tensor::zeros([1, 1, d_output], &weight.device()),
        };
        Self {
            weight: weight.unsqueeze::<3>().repeat_dim(0, batch),
            bias: bias.repeat_dim(0, batch),
        }
    }
}

/// Shape and activation layout of a fully connected stack.
#[derive(Debug, Clone, PartialEq)]
pub struct FcSpec {
    pub shapes: Vec<LinearShape>,
    pub layer_norm: bool,
    pub outermost_linear: bool,
    pub activation: Activation,
}

impl FcSpec {
    fn is_activated(&self, layer: usize) -> bool {
        layer + 1 < self.shapes.len() || !self.outermost_linear
    }

    fn activate<B: Backend, const D: usize>(&self, layer: usize, x: Tensor<B, D>) -> Tensor<B, D> {
        if !self.is_activated(layer) {
            return x;
        }
        let x = if self.layer_norm {
            layer_norm_no_affine(x)
        } else {
            x
        };
        match self.activation {
            Activation::Relu => relu(x),
            Activation::Sine {
                first_omega_0,
                hidden_omega_0,
            } => {
                let omega = if layer == 0 {
                    first_omega_0
                } else {
                    hidden_omega_0
                };
                x.mul_scalar(omega).sin()
            }
        }
    }

    /// Run the stack with weights supplied per sample (one set per batch
    /// entry of `x [b, n, in]`).
    pub fn forward_batched<B: Backend>(
        &self,
        x: Tensor<B, 3>,
        params: &[BatchedLinear<B>],
    ) -> Tensor<B, 3> {
        debug_assert_eq!(params.len(), self.shapes.len());
        params
            .iter()
            .enumerate()
            .fold(x, |x, (i, layer)| self.activate(i, layer.forward(x)))
    }

    pub fn in_features(&self) -> usize {
        self.shapes.first().map(|s| s.d_input).unwrap_or(0)
    }

    pub fn out_features(&self) -> usize {
        self.shapes.last().map(|s| s.d_output).unwrap_or(0)
    }

    pub fn num_params(&self) -> usize {
        self.shapes.iter().map(|s| s.weight_len() + s.d_output).sum()
    }
}

#[derive(Debug, Clone)]
pub struct FcBlockConfig {
    pub in_features: usize,
    pub hidden_features: usize,
    pub out_features: usize,
    pub num_hidden_layers: usize,
    pub outermost_linear: bool,
    pub layer_norm: bool,
    pub activation: Activation,
    /// Kaiming gain for the last layer; defaults to the ReLU gain.
    pub final_gain: Option<f64>,
}

impl FcBlockConfig {
    pub fn new(
        in_features: usize,
        hidden_features: usize,
        out_features: usize,
        num_hidden_layers: usize,
    ) -> Self {
        Self {
            in_features,
            hidden_features,
            out_features,
            num_hidden_layers,
            outermost_linear: true,
            layer_norm: false,
            activation: Activation::Relu,
            final_gain: None,
        }
    }

    pub fn with_layer_norm(mut self, layer_norm: bool) -> Self {
        self.layer_norm = layer_norm;
        self
    }

    pub fn with_activation(mut self, activation: Activation) -> Self {
        self.activation = activation;
        self
    }

    pub fn with_outermost_linear(mut self, outermost_linear: bool) -> Self {
        self.outermost_linear = outermost_linear;
        self
    }

    pub fn with_final_gain(mut self, gain: f64) -> Self {
        self.final_gain = Some(gain);
        self
    }

    fn shapes(&self) -> Vec<LinearShape> {
        let mut shapes = vec![LinearShape::new(self.in_features, self.hidden_features)];
        for _ in 0..self.num_hidden_layers {
            shapes.push(LinearShape::new(self.hidden_features, self.hidden_features));
        }
        shapes.push(LinearShape::new(self.hidden_features, self.out_features));
        shapes
    }

    pub fn spec(&self) -> FcSpec {
        FcSpec {
            shapes: self.shapes(),
            layer_norm: self.layer_norm,
            outermost_linear: self.outermost_linear,
            activation: self.activation,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SirenConfig {
    pub in_features: usize,
    pub hidden_features: usize,
    pub hidden_layers: usize,
    pub out_features: usize,
    pub outermost_linear: bool,
    pub first_omega_0: f32,
    pub hidden_omega_0: f32,
}

impl SirenConfig {
    pub fn new(
        in_features: usize,
        hidden_features: usize,
        hidden_layers: usize,
        out_features: usize,
    ) -> Self {
        Self {
            in_features,
            hidden_features,
            hidden_layers,
            out_features,
            outermost_linear: true,
            first_omega_0: crate::config::SIREN_OMEGA_0,
            hidden_omega_0: crate::config::SIREN_OMEGA_0,
        }
    }

    pub fn spec(&self) -> FcSpec {
        FcBlockConfig::new(
            self.in_features,
            self.hidden_features,
            self.out_features,
            self.hidden_layers,
        )
        .with_outermost_linear(self.outermost_linear)
        .with_activation(Activation::Sine {
            first_omega_0: self.first_omega_0,
            hidden_omega_0: self.hidden_omega_0,
        })
        .spec()
    }
}

/// Fully connected stack with its own weights.
#[derive(Debug, Module)]
pub struct FcBlock<B: Backend> {
    layers: Vec<Linear<B>>,
    spec: Ignored<FcSpec>,
}

impl<B: Backend> FcBlock<B> {
    /// ReLU stack with Kaiming-normal (fan-in) initialization.
    pub fn new(cfg: &FcBlockConfig, device: &B::Device) -> Self {
        let spec = cfg.spec();
        let gain = std::f64::consts::SQRT_2;
        let last = spec.shapes.len() - 1;
        let layers = spec
            .shapes
            .iter()
            .enumerate()
            .map(|(i, shape)| {
                let gain = match cfg.final_gain {
                    Some(final_gain) if i == last => final_gain,
                    _ => gain,
                };
                LinearConfig::new(shape.d_input, shape.d_output)
                    .with_initializer(Initializer::KaimingNormal {
                        gain,
                        fan_out_only: false,
                    })
                    .init(device)
            })
            .collect();
        Self {
            layers,
            spec: Ignored(spec),
        }
    }

    /// Sine-activated stack with SIREN initialization: first layer
    /// `U(-1/in, 1/in)`, later layers `U(±sqrt(6/in)/omega_0)`.
    pub fn siren(cfg: &SirenConfig, device: &B::Device) -> Self {
        let spec = cfg.spec();
        let layers = spec
            .shapes
            .iter()
            .enumerate()
            .map(|(i, shape)| {
                let fan_in = shape.d_input as f64;
                let bound = if i == 0 {
                    1.0 / fan_in
                } else {
                    (6.0 / fan_in).sqrt() / cfg.hidden_omega_0 as f64
                };
                LinearConfig::new(shape.d_input, shape.d_output)
                    .with_initializer(Initializer::Uniform {
                        min: -bound,
                        max: bound,
                    })
                    .init(device)
            })
            .collect();
        Self {
            layers,
            spec: Ignored(spec),
        }
    }

    pub fn spec(&self) -> &FcSpec {
        &self.spec
    }

    pub fn forward<const D: usize>(&self, input: Tensor<B, D>) -> Tensor<B, D> {
        self.layers
            .iter()
            .enumerate()
            .fold(input, |x, (i, layer)| self.spec.activate(i, layer.forward(x)))
    }

    /// This block's own weights repeated for a batch of `batch` samples.
    pub fn batched_params(&self, batch: usize) -> Vec<BatchedLinear<B>> {
        self.layers
            .iter()
            .map(|layer| BatchedLinear::from_linear(layer, batch))
            .collect()
    }
}

/// Residual block `x_s + fc_1(relu(fc_0(relu(x))))`; `fc_1` starts at zero so
/// the block is initially the (projected) identity.
#[derive(Debug, Module)]
pub struct ResnetBlockFc<B: Backend> {
    fc_0: Linear<B>,
    fc_1: Linear<B>,
    shortcut: Option<Linear<B>>,
}

impl<B: Backend> ResnetBlockFc<B> {
    pub fn new(size_in: usize, size_out: usize, size_h: usize, device: &B::Device) -> Self {
        let fc_0 = LinearConfig::new(size_in, size_h).init(device);
        let fc_1 = LinearConfig::new(size_h, size_out)
            .with_initializer(Initializer::Zeros)
            .init(device);
        let shortcut = (size_in != size_out).then(|| {
            LinearConfig::new(size_in, size_out)
                .with_bias(false)
                .init(device)
        });
        Self {
            fc_0,
            fc_1,
            shortcut,
        }
    }

    pub fn forward<const D: usize>(&self, x: Tensor<B, D>) -> Tensor<B, D> {
        let net = self.fc_0.forward(relu(x.clone()));
        let dx = self.fc_1.forward(relu(net));
        let x_s = match &self.shortcut {
            Some(shortcut) => shortcut.forward(x),
            None => x,
        };
        x_s + dx
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::tensor::{Distribution, TensorData};

    type TestBackend = NdArray<f32>;

    fn max_abs_diff<const D: usize>(a: Tensor<TestBackend, D>, b: Tensor<TestBackend, D>) -> f32 {
        (a - b)
            .abs()
            .max()
            .into_data()
            .to_vec::<f32>()
            .unwrap_or_default()
            .first()
            .copied()
            .unwrap_or(f32::MAX)
    }

    #[test]
    fn layer_norm_zero_mean_unit_variance() {
        let device = Default::default();
        let x = Tensor::<TestBackend, 2>::from_data(
            TensorData::new(vec![1.0f32, 2.0, 3.0, 4.0, -2.0, 0.0, 2.0, 4.0], [2, 4]),
            &device,
        );
        let y = layer_norm_no_affine(x);
        let mean = y.clone().mean_dim(1).abs().max();
        let var = y.powf_scalar(2.0).mean_dim(1);
        let mean: f32 = mean.into_data().to_vec::<f32>().unwrap()[0];
        assert!(mean < 1e-5);
        for v in var.into_data().to_vec::<f32>().unwrap() {
            assert!((v - 1.0).abs() < 1e-3);
        }
    }

    #[test]
    fn fc_block_shapes_and_layer_count() {
        let device = Default::default();
        let cfg = FcBlockConfig::new(6, 16, 3, 2).with_layer_norm(true);
        let block = FcBlock::<TestBackend>::new(&cfg, &device);
        assert_eq!(block.spec().shapes.len(), 4);
        assert_eq!(block.spec().num_params(), 6 * 16 + 16 + 2 * (16 * 16 + 16) + 16 * 3 + 3);
        let x = Tensor::<TestBackend, 3>::random([2, 5, 6], Distribution::Default, &device);
        assert_eq!(block.forward(x).dims(), [2, 5, 3]);
    }

    fn weight_std(linear: &Linear<TestBackend>) -> f32 {
        let w: Vec<f32> = linear.weight.val().into_data().to_vec().unwrap();
        let mean = w.iter().sum::<f32>() / w.len() as f32;
        (w.iter().map(|v| (v - mean).powi(2)).sum::<f32>() / w.len() as f32).sqrt()
    }

    #[test]
    fn relu_init_uses_kaiming_fan_in() {
        let device = Default::default();
        let cfg = FcBlockConfig::new(256, 256, 256, 1).with_final_gain(0.1);
        let block = FcBlock::<TestBackend>::new(&cfg, &device);
        let expected = (2.0f32 / 256.0).sqrt();
        for layer in &block.layers[..2] {
            assert!((weight_std(layer) / expected - 1.0).abs() < 0.1);
        }
        let last = weight_std(&block.layers[2]);
        assert!((last / (0.1 / 16.0) - 1.0).abs() < 0.1);
    }

    #[test]
    fn batched_forward_matches_shared_weights() {
        let device = Default::default();
        for block in [
            FcBlock::<TestBackend>::new(
                &FcBlockConfig::new(6, 8, 4, 1).with_layer_norm(true),
                &device,
            ),
            FcBlock::<TestBackend>::siren(&SirenConfig::new(6, 8, 1, 4), &device),
        ] {
            let x = Tensor::<TestBackend, 3>::random(
                [3, 7, 6],
                Distribution::Uniform(-1.0, 1.0),
                &device,
            );
            let shared = block.forward(x.clone());
            let batched = block.spec().forward_batched(x, &block.batched_params(3));
            assert!(max_abs_diff(shared, batched) < 1e-4);
        }
    }

    #[test]
    fn siren_output_bounded_before_last_layer() {
        let device = Default::default();
        let cfg = SirenConfig {
            outermost_linear: false,
            ..SirenConfig::new(2, 8, 1, 3)
        };
        let siren = FcBlock::<TestBackend>::siren(&cfg, &device);
        let x = Tensor::<TestBackend, 2>::random([4, 2], Distribution::Default, &device);
        let y: Vec<f32> = siren.forward(x).into_data().to_vec().unwrap();
        assert!(y.iter().all(|v| v.abs() <= 1.0));
    }

    #[test]
    fn resnet_block_starts_as_identity() {
        let device = Default::default();
        let block = ResnetBlockFc::<TestBackend>::new(8, 8, 8, &device);
        let x = Tensor::<TestBackend, 2>::random([3, 8], Distribution::Default, &device);
        assert!(max_abs_diff(block.forward(x.clone()), x) < 1e-6);

        let projecting = ResnetBlockFc::<TestBackend>::new(8, 4, 8, &device);
        let x = Tensor::<TestBackend, 3>::random([2, 3, 8], Distribution::Default, &device);
        assert_eq!(projecting.forward(x).dims(), [2, 3, 4]);
    }
}
