use candle::{Device, IndexOp, ModuleT, Result, Tensor};
use candle_nn::{Dropout, Init, VarBuilder};

use crate::common::tensor_ext::TensorExt;

const MAX_LEN: usize = 5000;

/// Sinusoidal positional encoding added to a `(batch, time, d_model)` input.
pub struct PositionalEncoding {
    d_model: usize,
    scale: Scale,
    pe: Tensor,
    dropout: Dropout,
}

enum Scale {
    /// x * sqrt(d_model) + pe
    Input(f64),
    /// x + alpha * pe, alpha is learned
    Learned(Tensor),
}

impl PositionalEncoding {
    pub fn new(d_model: usize, dropout_rate: f64, device: &Device) -> Result<Self> {
        Ok(Self {
            d_model,
            scale: Scale::Input((d_model as f64).sqrt()),
            pe: sinusoids(MAX_LEN, d_model, 10000.0, device)?,
            dropout: Dropout::new(dropout_rate as f32),
        })
    }

    pub fn new_scaled(d_model: usize, dropout_rate: f64, vb: VarBuilder) -> Result<Self> {
        let alpha = vb.get_with_hints((), "alpha", Init::Const(1.0))?;
        Ok(Self {
            d_model,
            scale: Scale::Learned(alpha),
            pe: sinusoids(MAX_LEN, d_model, 10000.0, vb.device())?,
            dropout: Dropout::new(dropout_rate as f32),
        })
    }

    fn table(&self, len: usize) -> Result<Tensor> {
        if len <= self.pe.size(0) {
            self.pe.i(..len)
        } else {
            sinusoids(len, self.d_model, 10000.0, self.pe.device())
        }
    }
}

impl ModuleT for PositionalEncoding {
    fn forward_t(&self, x: &Tensor, train: bool) -> Result<Tensor> {
        let (_b, t, _d) = x.dims3()?;
        let pe = self.table(t)?.to_dtype(x.dtype())?;

        let x = match &self.scale {
            Scale::Input(xscale) => x.scalar_mul(*xscale)?.broadcast_add(&pe)?,
            Scale::Learned(alpha) => x.broadcast_add(&pe.broadcast_mul(alpha)?)?,
        };

        self.dropout.forward_t(&x, train)
    }
}

/// (length, channels) table, sin on even channels and cos on odd ones.
fn sinusoids(length: usize, channels: usize, max_timescale: f64, device: &Device) -> Result<Tensor> {
    if channels % 2 != 0 {
        candle::bail!("positional encoding needs an even dimension, got {channels}");
    }

    let inv_timescales = Tensor::arange_step(0, channels as i64, 2, device)?
        .float()?
        .scalar_mul(-max_timescale.ln() / channels as f64)?
        .exp()?;
    let scaled_time = Tensor::arange(0, length as i64, device)?
        .float()?
        .unsqueeze(1)?
        .broadcast_mul(&inv_timescales.unsqueeze(0)?)?;

    Tensor::stack(&[scaled_time.sin()?, scaled_time.cos()?], 2)?.reshape((length, channels))
}
