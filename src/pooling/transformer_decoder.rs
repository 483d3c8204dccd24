//! Transformer-decoder pooling.
//!
//! The task token takes the place of the `<sos>` input of a regular decoder.
//! It is embedded into a single query which cross-attends to the frame-level
//! encoder output, so one utterance yields a different embedding per task token.

mod config;
mod decoder_layer;
mod embedding;

use std::path::Path;

use anyhow::Result;
use candle::{DType, Device, Module, ModuleT, Tensor};
use candle_nn::{LayerNorm, LayerNormConfig, Linear, VarBuilder};
use hf_hub::{Repo, api::sync::Api};

pub use self::config::{Config, InputLayer, PosEnc};
use self::{decoder_layer::DecoderLayer, embedding::DecoderInput};
use crate::{
    common::{
        attention::MultiHeadedAttention, feed_forward::PositionwiseFeedForward,
        layer_drop::LayerDropStack,
    },
    pooling::Pooling,
};

pub struct TransformerDecoderPooling {
    config: Config,
    encoder_mapping: Option<Linear>,
    embed: DecoderInput,
    decoders: LayerDropStack<DecoderLayer>,
    after_norm: Option<LayerNorm>,
}

impl TransformerDecoderPooling {
    pub fn new(config: &Config, vb: VarBuilder) -> candle::Result<Self> {
        config.validate()?;
        let dim = config.attention_dim;

        let encoder_mapping = if config.maps_encoder_output() {
            Some(candle_nn::linear(
                config.encoder_output_size,
                dim,
                vb.pp("encoder_mapping"),
            )?)
        } else {
            None
        };

        let embed = DecoderInput::new(config, vb.pp("embed"))?;

        let layers = (0..config.num_blocks)
            .map(|i| {
                let vb = vb.pp(format!("decoders.{i}"));
                DecoderLayer::new(
                    dim,
                    MultiHeadedAttention::new(
                        config.attention_heads,
                        dim,
                        config.self_attention_dropout_rate,
                        vb.pp("self_attn"),
                    )?,
                    MultiHeadedAttention::new(
                        config.attention_heads,
                        dim,
                        config.src_attention_dropout_rate,
                        vb.pp("src_attn"),
                    )?,
                    PositionwiseFeedForward::new(
                        dim,
                        config.linear_units,
                        config.dropout_rate,
                        vb.pp("feed_forward"),
                    )?,
                    config.dropout_rate,
                    config.normalize_before,
                    config.concat_after,
                    vb,
                )
            })
            .collect::<candle::Result<Vec<_>>>()?;
        let decoders = LayerDropStack::new(layers, config.layer_drop_rate);

        let after_norm = if config.normalize_before {
            let norm_config = LayerNormConfig {
                eps: 1e-12,
                ..Default::default()
            };
            Some(candle_nn::layer_norm(dim, norm_config, vb.pp("after_norm"))?)
        } else {
            None
        };

        tracing::debug!(
            blocks = config.num_blocks,
            attention_dim = dim,
            heads = config.attention_heads,
            mapped = encoder_mapping.is_some(),
            "built transformer decoder pooling"
        );

        Ok(Self {
            config: config.clone(),
            encoder_mapping,
            embed,
            decoders,
            after_norm,
        })
    }

    /// Loads `config.json` and `model.safetensors` from a hub model repo.
    pub fn from_pretrained(repo_id: &str, device: &Device) -> Result<Self> {
        let (config, model) = {
            let api = Api::new()?;
            let repo = api.repo(Repo::model(repo_id.to_string()));
            (repo.get("config.json")?, repo.get("model.safetensors")?)
        };
        tracing::info!(repo_id, "fetched pooling checkpoint");

        Self::from_files(config, model, device)
    }

    /// Loads `config.json` and `model.safetensors` from a local directory.
    pub fn from_dir<P: AsRef<Path>>(dir: P, device: &Device) -> Result<Self> {
        let dir = dir.as_ref();
        Self::from_files(dir.join("config.json"), dir.join("model.safetensors"), device)
    }

    fn from_files<P: AsRef<Path>>(config: P, model: P, device: &Device) -> Result<Self> {
        let config = Config::from_file(config)?;
        let model = candle::safetensors::load(model, device)?;
        tracing::info!(tensors = model.len(), "loaded pooling weights");

        let vb = VarBuilder::from_tensors(model, DType::F32, device);
        Ok(Self::new(&config, vb)?)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn num_blocks(&self) -> usize {
        self.config.num_blocks
    }
}

impl Pooling for TransformerDecoderPooling {
    fn output_size(&self) -> usize {
        self.config.attention_dim
    }

    fn forward_t(
        &self,
        encoder_output: &Tensor,
        task_tokens: &Tensor,
        memory_mask: Option<&Tensor>,
        train: bool,
    ) -> candle::Result<Tensor> {
        let (batch, _dim, _frames) = encoder_output.dims3()?;
        let tokens = task_tokens.dims1()?;
        if tokens != batch {
            candle::bail!("got {tokens} task tokens for a batch of {batch}");
        }

        // (B, D, T) -> (B, T, D)
        let memory = encoder_output.transpose(1, 2)?.contiguous()?;
        let memory = match &self.encoder_mapping {
            Some(mapping) => mapping.forward(&memory)?,
            None => memory,
        };
        tracing::trace!(memory = ?memory.shape(), "encoder memory");

        let x = self.embed.forward_t(&task_tokens.unsqueeze(1)?, train)?;
        tracing::trace!(query = ?x.shape(), "task query");

        let x = self.decoders.forward_t(x, train, |layer, x| {
            layer.forward_t(x, None, &memory, memory_mask, train)
        })?;

        let x = match &self.after_norm {
            Some(norm) => norm.forward(&x)?,
            None => x,
        };

        x.squeeze(1)
    }
}
