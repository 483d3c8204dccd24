use candle::{D, Module, ModuleT, Result, Tensor};
use candle_nn::{Dropout, LayerNorm, LayerNormConfig, Linear, VarBuilder};

use crate::common::{attention::MultiHeadedAttention, feed_forward::PositionwiseFeedForward};

const LAYER_NORM_EPS: f64 = 1e-12;

pub struct DecoderLayer {
    self_attn: MultiHeadedAttention,
    src_attn: MultiHeadedAttention,
    feed_forward: PositionwiseFeedForward,
    norm1: LayerNorm,
    norm2: LayerNorm,
    norm3: LayerNorm,
    dropout: Dropout,
    normalize_before: bool,
    concat_linear: Option<(Linear, Linear)>,
}

impl DecoderLayer {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        size: usize,
        self_attn: MultiHeadedAttention,
        src_attn: MultiHeadedAttention,
        feed_forward: PositionwiseFeedForward,
        dropout_rate: f64,
        normalize_before: bool,
        concat_after: bool,
        vb: VarBuilder,
    ) -> Result<Self> {
        let norm_config = LayerNormConfig {
            eps: LAYER_NORM_EPS,
            ..Default::default()
        };
        let norm1 = candle_nn::layer_norm(size, norm_config, vb.pp("norm1"))?;
        let norm2 = candle_nn::layer_norm(size, norm_config, vb.pp("norm2"))?;
        let norm3 = candle_nn::layer_norm(size, norm_config, vb.pp("norm3"))?;

        let concat_linear = if concat_after {
            Some((
                candle_nn::linear(size + size, size, vb.pp("concat_linear1"))?,
                candle_nn::linear(size + size, size, vb.pp("concat_linear2"))?,
            ))
        } else {
            None
        };

        Ok(Self {
            self_attn,
            src_attn,
            feed_forward,
            norm1,
            norm2,
            norm3,
            dropout: Dropout::new(dropout_rate as f32),
            normalize_before,
            concat_linear,
        })
    }

    /// tgt: (B, L, F), memory: (B, T, F).
    /// tgt_mask: (B, L, L), memory_mask: (B, 1, T); both are keep-masks.
    pub fn forward_t(
        &self,
        tgt: &Tensor,
        tgt_mask: Option<&Tensor>,
        memory: &Tensor,
        memory_mask: Option<&Tensor>,
        train: bool,
    ) -> Result<Tensor> {
        let residual = tgt;
        let x = self.pre_norm(&self.norm1, tgt)?;
        let attn = self.self_attn.forward_t(&x, &x, &x, tgt_mask, train)?;
        let x = self.merge(residual, &x, &attn, |(l, _)| l, train)?;
        let x = self.post_norm(&self.norm1, x)?;

        let residual = &x;
        let y = self.pre_norm(&self.norm2, &x)?;
        let attn = self.src_attn.forward_t(&y, memory, memory, memory_mask, train)?;
        let x = self.merge(residual, &y, &attn, |(_, l)| l, train)?;
        let x = self.post_norm(&self.norm2, x)?;

        let residual = &x;
        let y = self.pre_norm(&self.norm3, &x)?;
        let y = self.feed_forward.forward_t(&y, train)?;
        let x = (residual + self.dropout.forward_t(&y, train)?)?;
        self.post_norm(&self.norm3, x)
    }

    fn pre_norm(&self, norm: &LayerNorm, x: &Tensor) -> Result<Tensor> {
        if self.normalize_before {
            norm.forward(x)
        } else {
            Ok(x.clone())
        }
    }

    fn post_norm(&self, norm: &LayerNorm, x: Tensor) -> Result<Tensor> {
        if self.normalize_before {
            Ok(x)
        } else {
            norm.forward(&x)
        }
    }

    /// residual + dropout(attn), or residual + concat_linear([x, attn]) with concat_after.
    fn merge(
        &self,
        residual: &Tensor,
        x: &Tensor,
        attn: &Tensor,
        pick: impl Fn(&(Linear, Linear)) -> &Linear,
        train: bool,
    ) -> Result<Tensor> {
        match &self.concat_linear {
            Some(linears) => {
                let concat = Tensor::cat(&[x, attn], D::Minus1)?;
                residual + pick(linears).forward(&concat)?
            }
            None => residual + self.dropout.forward_t(attn, train)?,
        }
    }
}
