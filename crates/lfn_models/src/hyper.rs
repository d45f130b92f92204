use crate::layers::{BatchedLinear, FcBlock, FcBlockConfig, FcSpec};
use burn::module::{Ignored, Module};
use burn::tensor::{backend::Backend, Tensor};

/// Output layers start at a tenth of the Kaiming scale so the predicted
/// weights begin small.
const FINAL_LAYER_SCALE: f64 = 0.1;

/// Predicts the weights of an MLP (the hypo network, described by an
/// [`FcSpec`]) from a latent code. One small MLP per weight matrix and one
/// per bias vector.
#[derive(Module, Debug)]
pub struct HyperNetwork<B: Backend> {
    weight_nets: Vec<FcBlock<B>>,
    bias_nets: Vec<FcBlock<B>>,
    hypo: Ignored<FcSpec>,
}

impl<B: Backend> HyperNetwork<B> {
    pub fn new(
        latent_dim: usize,
        hidden_features: usize,
        hidden_layers: usize,
        hypo: FcSpec,
        device: &B::Device,
    ) -> Self {
        let net = |out: usize| {
            let cfg = FcBlockConfig::new(latent_dim, hidden_features, out, hidden_layers)
                .with_layer_norm(true)
                .with_final_gain(std::f64::consts::SQRT_2 * FINAL_LAYER_SCALE);
            FcBlock::new(&cfg, device)
        };
        let weight_nets = hypo.shapes.iter().map(|s| net(s.weight_len())).collect();
        let bias_nets = hypo.shapes.iter().map(|s| net(s.d_output)).collect();
        Self {
            weight_nets,
            bias_nets,
            hypo: Ignored(hypo),
        }
    }

    pub fn hypo_spec(&self) -> &FcSpec {
        &self.hypo
    }

    /// `z [n, latent]` to one set of hypo-network weights per row.
    pub fn forward(&self, z: Tensor<B, 2>) -> Vec<BatchedLinear<B>> {
        let [n, _] = z.dims();
        self.hypo
            .shapes
            .iter()
            .zip(self.weight_nets.iter().zip(self.bias_nets.iter()))
            .map(|(shape, (weight_net, bias_net))| BatchedLinear {
                weight: weight_net
                    .forward(z.clone())
                    .reshape([n, shape.d_input, shape.d_output]),
                bias: bias_net.forward(z.clone()).reshape([n, 1, shape.d_output]),
            })
            .collect()
    }

    /// Evaluate the hypo network on `coords [n, p, in]` with weights
    /// predicted from `z [n, latent]`.
    pub fn run(&self, z: Tensor<B, 2>, coords: Tensor<B, 3>) -> Tensor<B, 3> {
        let params = self.forward(z);
        self.hypo.forward_batched(coords, &params)
    }
}
