use candle::{Module, ModuleT, Result, Tensor};
use candle_nn::{Dropout, Linear, VarBuilder};

pub struct PositionwiseFeedForward {
    w_1: Linear,
    w_2: Linear,
    dropout: Dropout,
}

impl PositionwiseFeedForward {
    pub fn new(idim: usize, hidden_units: usize, dropout_rate: f64, vb: VarBuilder) -> Result<Self> {
        let w_1 = candle_nn::linear(idim, hidden_units, vb.pp("w_1"))?;
        let w_2 = candle_nn::linear(hidden_units, idim, vb.pp("w_2"))?;

        Ok(Self {
            w_1,
            w_2,
            dropout: Dropout::new(dropout_rate as f32),
        })
    }
}

impl ModuleT for PositionwiseFeedForward {
    fn forward_t(&self, x: &Tensor, train: bool) -> Result<Tensor> {
        let x = self.w_1.forward(x)?.relu()?;
        let x = self.dropout.forward_t(&x, train)?;
        self.w_2.forward(&x)
    }
}
