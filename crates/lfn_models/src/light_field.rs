//! The light field model: ray embedding, optional per-instance latent code,
//! and the network mapping embedded rays to colour.

use crate::config::{
    Conditioning, LightFieldConfig, ModelConfigError, Network, Parameterization,
    CONCAT_RESNET_BLOCKS, COORD_DIMS, HYPER_HIDDEN_LAYERS, LATENT_INIT_STD, SPHERE_RADIUS,
};
use crate::encoding::InputEncoder;
use crate::geometry::{plucker_embedding, sphere_embedding};
use crate::hyper::HyperNetwork;
use crate::layers::{FcBlock, FcBlockConfig, FcSpec, ResnetBlockFc, SirenConfig};
use burn::module::{Ignored, Module};
use burn::nn::{Embedding, EmbeddingConfig, Initializer, Linear, LinearConfig};
use burn::tensor::{backend::Backend, Int, Tensor};

/// Query rays for `b` samples with `q` query views of `p` pixels each.
#[derive(Debug, Clone)]
pub struct LightFieldQuery<B: Backend> {
    /// `[b, q, 4, 4]`
    pub cam2world: Tensor<B, 4>,
    /// `[b, q, 3, 3]`
    pub intrinsics: Tensor<B, 4>,
    /// `[b, q, p, 2]` pixel coordinates.
    pub uv: Tensor<B, 4>,
    /// `[b, q]`
    pub instance_idx: Tensor<B, 2, Int>,
}

#[derive(Debug, Clone)]
pub struct LightFieldOutput<B: Backend> {
    /// `[b, q, p, 3]`, composited over white when the model predicts alpha.
    pub rgb: Tensor<B, 4>,
    /// Latent codes `[b, q, latent]` of conditioned models.
    pub z: Option<Tensor<B, 3>>,
    /// `[b, q, p, 1]`
    pub depth: Option<Tensor<B, 4>>,
    /// Opacity weight `1 - exp(-|a|)`, `[b, q, p, 1]`.
    pub alpha: Option<Tensor<B, 4>>,
    /// Embedded rays `[b * q, p, 6]`.
    pub coords: Tensor<B, 3>,
}

/// `Linear -> ResnetBlockFc x3 -> Linear` over `[z, coords]`.
#[derive(Module, Debug)]
pub struct ConcatNetwork<B: Backend> {
    input: Linear<B>,
    blocks: Vec<ResnetBlockFc<B>>,
    output: Linear<B>,
}

impl<B: Backend> ConcatNetwork<B> {
    pub fn new(in_features: usize, hidden: usize, out_features: usize, device: &B::Device) -> Self {
        Self {
            input: LinearConfig::new(in_features, hidden).init(device),
            blocks: (0..CONCAT_RESNET_BLOCKS)
                .map(|_| ResnetBlockFc::new(hidden, hidden, hidden, device))
                .collect(),
            output: LinearConfig::new(hidden, out_features).init(device),
        }
    }

    pub fn forward(&self, x: Tensor<B, 3>) -> Tensor<B, 3> {
        let x = self.input.forward(x);
        let x = self.blocks.iter().fold(x, |x, block| block.forward(x));
        self.output.forward(x)
    }
}

/// Single-scene, hypernetwork-conditioned or concatenation-conditioned light
/// field network. Exactly one of `phi`, `hyper` and `concat` is set.
#[derive(Module, Debug)]
pub struct LightFieldModel<B: Backend> {
    encoder: InputEncoder<B>,
    phi: Option<FcBlock<B>>,
    latent_codes: Option<Embedding<B>>,
    hyper: Option<HyperNetwork<B>>,
    concat: Option<ConcatNetwork<B>>,
    config: Ignored<LightFieldConfig>,
}

fn uses_fused_mlp(cfg: &LightFieldConfig) -> bool {
    cfg.fit_single && cfg.tcnn
}

fn phi_block_config(cfg: &LightFieldConfig, in_features: usize) -> FcBlockConfig {
    FcBlockConfig::new(
        in_features,
        cfg.phi_hidden_features(),
        cfg.out_channels(),
        cfg.phi_hidden_layers(),
    )
    .with_layer_norm(!uses_fused_mlp(cfg))
}

fn siren_config(cfg: &LightFieldConfig, in_features: usize) -> SirenConfig {
    SirenConfig::new(
        in_features,
        cfg.phi_hidden_features(),
        cfg.phi_hidden_layers(),
        cfg.out_channels(),
    )
}

/// Layer layout of the network the hypernetwork predicts.
fn hypo_spec(cfg: &LightFieldConfig) -> FcSpec {
    match cfg.network {
        Network::Relu => phi_block_config(cfg, COORD_DIMS).spec(),
        Network::Siren => siren_config(cfg, COORD_DIMS).spec(),
    }
}

impl<B: Backend> LightFieldModel<B> {
    pub fn new(cfg: &LightFieldConfig, device: &B::Device) -> Result<Self, ModelConfigError> {
        cfg.validate()?;
        let mut model = Self {
            encoder: InputEncoder::identity(),
            phi: None,
            latent_codes: None,
            hyper: None,
            concat: None,
            config: Ignored(cfg.clone()),
        };

        if cfg.fit_single {
            model.encoder = InputEncoder::new(
                cfg.encoding(),
                COORD_DIMS,
                cfg.positional_frequencies,
                &cfg.hash_grid,
                device,
            );
            let in_features = model.encoder.out_size();
            model.phi = Some(match (uses_fused_mlp(cfg), cfg.network) {
                (false, Network::Siren) => FcBlock::siren(&siren_config(cfg, in_features), device),
                _ => FcBlock::new(&phi_block_config(cfg, in_features), device),
            });
            return Ok(model);
        }

        model.latent_codes = Some(
            EmbeddingConfig::new(cfg.num_instances, cfg.latent_dim)
                .with_initializer(Initializer::Normal {
                    mean: 0.0,
                    std: LATENT_INIT_STD,
                })
                .init(device),
        );
        match cfg.conditioning {
            Conditioning::Hyper => {
                model.hyper = Some(HyperNetwork::new(
                    cfg.latent_dim,
                    cfg.latent_dim,
                    HYPER_HIDDEN_LAYERS,
                    hypo_spec(cfg),
                    device,
                ));
            }
            Conditioning::Concat => {
                model.concat = Some(ConcatNetwork::new(
                    COORD_DIMS + cfg.latent_dim,
                    cfg.phi_hidden_features(),
                    cfg.out_channels(),
                    device,
                ));
            }
        }
        Ok(model)
    }

    pub fn config(&self) -> &LightFieldConfig {
        &self.config
    }

    /// Latent table `[num_instances, latent_dim]` of conditioned models.
    pub fn latent_table(&self) -> Option<Tensor<B, 2>> {
        self.latent_codes.as_ref().map(|codes| codes.weight.val())
    }

    fn embed_rays(
        &self,
        cam2world: Tensor<B, 3>,
        uv: Tensor<B, 3>,
        intrinsics: Tensor<B, 3>,
    ) -> Tensor<B, 3> {
        match self.config.parameterization {
            Parameterization::Plucker => plucker_embedding(cam2world, uv, intrinsics),
            Parameterization::Sphere => sphere_embedding(cam2world, uv, intrinsics, SPHERE_RADIUS),
        }
    }

    /// Evaluate the light field on embedded rays `coords [n, p, 6]` with
    /// per-row latent codes `z [n, latent]` when the model is conditioned.
    pub fn light_field(
        &self,
        coords: Tensor<B, 3>,
        z: Option<Tensor<B, 2>>,
    ) -> Result<Tensor<B, 3>, ModelConfigError> {
        match (&self.phi, &self.hyper, &self.concat, z) {
            (Some(phi), _, _, _) => Ok(phi.forward(self.encoder.forward(coords))),
            (None, Some(hyper), _, Some(z)) => Ok(hyper.run(z, coords)),
            (None, None, Some(net), Some(z)) => {
                let [n, p, _] = coords.dims();
                let [_, latent] = z.dims();
                let z = z.reshape([n, 1, latent]).repeat_dim(1, p);
                Ok(net.forward(Tensor::cat(vec![z, coords], 2)))
            }
            _ => Err(ModelConfigError::MissingLatent),
        }
    }

    pub fn forward(
        &self,
        query: LightFieldQuery<B>,
    ) -> Result<LightFieldOutput<B>, ModelConfigError> {
        let [b, q, p, _] = query.uv.dims();
        let n = b * q;
        let coords = self.embed_rays(
            query.cam2world.reshape([n, 4, 4]),
            query.uv.reshape([n, p, 2]),
            query.intrinsics.reshape([n, 3, 3]),
        );

        let z = self
            .latent_codes
            .as_ref()
            .map(|codes| codes.forward(query.instance_idx));
        let z_rows = z.clone().map(|z| {
            let [_, _, latent] = z.dims();
            z.reshape([n, latent])
        });

        let raw = self.light_field(coords.clone(), z_rows)?;
        let channels = self.config.out_channels();
        let channel = |c: usize| raw.clone().slice([0..n, 0..p, c..c + 1]).reshape([b, q, p, 1]);

        let mut rgb = raw.clone().slice([0..n, 0..p, 0..3]).reshape([b, q, p, 3]);
        let depth = self.config.depth.then(|| channel(3));
        let alpha = self.config.alpha.then(|| {
            let weight = channel(channels - 1).abs().neg().exp().neg().add_scalar(1.0);
            let background = weight.clone().neg().add_scalar(1.0);
            rgb = rgb.clone() * weight.clone() + background;
            weight
        });

        Ok(LightFieldOutput {
            rgb,
            z,
            depth,
            alpha,
            coords,
        })
    }
}
