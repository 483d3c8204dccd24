use candle::{D, Module, ModuleT, Result, Tensor};
use candle_nn::{Dropout, Linear, VarBuilder};

use crate::common::tensor_ext::TensorExt;

/// Multi-head scaled dot-product attention with biased q/k/v/out projections.
pub struct MultiHeadedAttention {
    n_head: usize,
    d_k: usize,
    linear_q: Linear,
    linear_k: Linear,
    linear_v: Linear,
    linear_out: Linear,
    dropout: Dropout,
}

impl MultiHeadedAttention {
    pub fn new(n_head: usize, n_feat: usize, dropout_rate: f64, vb: VarBuilder) -> Result<Self> {
        if n_head == 0 || n_feat % n_head != 0 {
            candle::bail!("attention dim {n_feat} is not divisible by {n_head} heads");
        }

        let linear_q = candle_nn::linear(n_feat, n_feat, vb.pp("linear_q"))?;
        let linear_k = candle_nn::linear(n_feat, n_feat, vb.pp("linear_k"))?;
        let linear_v = candle_nn::linear(n_feat, n_feat, vb.pp("linear_v"))?;
        let linear_out = candle_nn::linear(n_feat, n_feat, vb.pp("linear_out"))?;

        Ok(Self {
            n_head,
            d_k: n_feat / n_head,
            linear_q,
            linear_k,
            linear_v,
            linear_out,
            dropout: Dropout::new(dropout_rate as f32),
        })
    }

    /// query: (B, T1, F), key/value: (B, T2, F), mask: (B, 1 or T1, T2) with 1 on kept keys.
    pub fn forward_t(
        &self,
        query: &Tensor,
        key: &Tensor,
        value: &Tensor,
        mask: Option<&Tensor>,
        train: bool,
    ) -> Result<Tensor> {
        let q = self.split_heads(&self.linear_q.forward(query)?)?;
        let k = self.split_heads(&self.linear_k.forward(key)?)?;
        let v = self.split_heads(&self.linear_v.forward(value)?)?;

        let scale = (self.d_k as f64).powf(-0.25);
        let scores = q
            .scalar_mul(scale)?
            .matmul(&k.scalar_mul(scale)?.transpose(D::Minus1, D::Minus2)?)?;

        let attn = match mask {
            Some(mask) => {
                // (B, 1, T2) -> (B, 1, 1, T2) so it broadcasts over heads
                let mask = mask.unsqueeze(1)?;
                let scores = scores.masked_fill(&mask, f32::NEG_INFINITY)?;
                // fully masked rows come out of the softmax as NaN
                scores.softmax(D::Minus1)?.masked_fill(&mask, 0.0)?
            }
            None => scores.softmax(D::Minus1)?,
        };

        let attn = self.dropout.forward_t(&attn, train)?;
        let x = attn.matmul(&v)?.transpose(1, 2)?.flatten(2, D::Minus1)?;

        self.linear_out.forward(&x)
    }

    fn split_heads(&self, x: &Tensor) -> Result<Tensor> {
        let (n_batch, n_ctx, _) = x.dims3()?;
        x.reshape((n_batch, n_ctx, self.n_head, self.d_k))?
            .transpose(1, 2)?
            .contiguous()
    }
}
