use candle::{DType, Module, ModuleT, Result, Tensor};
use candle_nn::{Dropout, Embedding, LayerNorm, Linear, VarBuilder};

use crate::{
    common::positional_encoding::PositionalEncoding,
    pooling::transformer_decoder::config::{Config, InputLayer, PosEnc},
};

/// Turns task token ids `(batch, len)` into `(batch, len, attention_dim)` queries.
pub enum DecoderInput {
    Embed {
        embed: Embedding,
        pos_enc: PositionalEncoding,
    },
    Linear {
        vocab_size: usize,
        linear: Linear,
        norm: LayerNorm,
        dropout: Dropout,
        pos_enc: PositionalEncoding,
    },
}

impl DecoderInput {
    pub fn new(config: &Config, vb: VarBuilder) -> Result<Self> {
        let dim = config.attention_dim;
        let pos_enc = |vb: VarBuilder| match config.pos_enc {
            PosEnc::Abs => PositionalEncoding::new(dim, config.positional_dropout_rate, vb.device()),
            PosEnc::Scaled => {
                PositionalEncoding::new_scaled(dim, config.positional_dropout_rate, vb)
            }
        };

        let input = match config.input_layer {
            InputLayer::Embed => Self::Embed {
                embed: candle_nn::embedding(config.vocab_size, dim, vb.pp("0"))?,
                pos_enc: pos_enc(vb.pp("1"))?,
            },
            InputLayer::Linear => Self::Linear {
                vocab_size: config.vocab_size,
                linear: candle_nn::linear(config.vocab_size, dim, vb.pp("0"))?,
                norm: candle_nn::layer_norm(dim, 1e-5, vb.pp("1"))?,
                dropout: Dropout::new(config.dropout_rate as f32),
                pos_enc: pos_enc(vb.pp("4"))?,
            },
        };

        Ok(input)
    }
}

impl ModuleT for DecoderInput {
    fn forward_t(&self, tokens: &Tensor, train: bool) -> Result<Tensor> {
        let tokens = token_ids(tokens)?;
        match self {
            Self::Embed { embed, pos_enc } => {
                let x = embed.forward(&tokens)?;
                pos_enc.forward_t(&x, train)
            }
            Self::Linear {
                vocab_size,
                linear,
                norm,
                dropout,
                pos_enc,
            } => {
                let one_hot = candle_nn::encoding::one_hot(tokens, *vocab_size, 1f32, 0f32)?;
                let x = linear.forward(&one_hot)?;
                let x = norm.forward(&x)?;
                let x = dropout.forward_t(&x, train)?.relu()?;
                pos_enc.forward_t(&x, train)
            }
        }
    }
}

/// Task tokens must be non-negative integers.
fn token_ids(tokens: &Tensor) -> Result<Tensor> {
    match tokens.dtype() {
        DType::U8 | DType::U32 => tokens.to_dtype(DType::U32),
        DType::I64 => {
            if tokens.elem_count() > 0 && tokens.min_all()?.to_scalar::<i64>()? < 0 {
                candle::bail!("task tokens must be non-negative");
            }
            tokens.to_dtype(DType::U32)
        }
        dtype => candle::bail!("task tokens must be integers, got {dtype:?}"),
    }
}
