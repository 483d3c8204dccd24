use candle::{Result, Tensor};
use rand::Rng;

/// Sequence of layers where each layer is skipped with probability
/// `layer_drop_rate` during training.
pub struct LayerDropStack<L> {
    layers: Vec<L>,
    layer_drop_rate: f64,
}

impl<L> LayerDropStack<L> {
    pub fn new(layers: Vec<L>, layer_drop_rate: f64) -> Self {
        Self {
            layers,
            layer_drop_rate,
        }
    }

    pub fn forward_t<F>(&self, x: Tensor, train: bool, mut f: F) -> Result<Tensor>
    where
        F: FnMut(&L, &Tensor) -> Result<Tensor>,
    {
        let mut rng = rand::thread_rng();
        let mut x = x;
        for (i, layer) in self.layers.iter().enumerate() {
            if train && self.layer_drop_rate > 0.0 && rng.gen::<f64>() < self.layer_drop_rate {
                tracing::trace!(layer = i, "layer dropped");
                continue;
            }
            x = f(layer, &x)?;
        }
        Ok(x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle::Device;

    fn run(stack: &LayerDropStack<f64>, train: bool) -> f32 {
        let x = Tensor::new(1.0f32, &Device::Cpu).unwrap();
        stack
            .forward_t(x, train, |add, x| x + *add)
            .unwrap()
            .to_scalar::<f32>()
            .unwrap()
    }

    #[test]
    fn test_all_layers_run_at_inference() {
        let stack = LayerDropStack::new(vec![1.0, 2.0, 3.0], 1.0);
        assert_eq!(run(&stack, false), 7.0);
    }

    #[test]
    fn test_full_drop_rate_skips_everything_in_training() {
        let stack = LayerDropStack::new(vec![1.0, 2.0, 3.0], 1.0);
        assert_eq!(run(&stack, true), 1.0);
    }

    #[test]
    fn test_zero_drop_rate_keeps_everything_in_training() {
        let stack = LayerDropStack::new(vec![1.0, 2.0, 3.0], 0.0);
        assert_eq!(run(&stack, true), 7.0);
    }
}
