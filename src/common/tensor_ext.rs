use candle::{DType, Result, Tensor, shape::Dim};

pub trait TensorExt {
    fn size(&self, dim: usize) -> usize;
    fn float(&self) -> Result<Tensor>;
    fn scalar_mul(&self, value: f64) -> Result<Tensor>;
    fn softmax<D: Dim>(&self, dim: D) -> Result<Tensor>;
    /// Keeps elements where `mask` is non-zero and replaces the rest with `value`.
    /// `mask` may have any dtype and is broadcast to the shape of `self`.
    fn masked_fill(&self, mask: &Tensor, value: f32) -> Result<Tensor>;
}

impl TensorExt for Tensor {
    fn size(&self, dim: usize) -> usize {
        self.dims()[dim]
    }

    fn float(&self) -> Result<Tensor> {
        self.to_dtype(DType::F32)
    }

    fn scalar_mul(&self, value: f64) -> Result<Tensor> {
        self * value
    }

    fn softmax<D: Dim>(&self, dim: D) -> Result<Tensor> {
        candle_nn::ops::softmax(self, dim)
    }

    fn masked_fill(&self, mask: &Tensor, value: f32) -> Result<Tensor> {
        let mask = mask.ne(&mask.zeros_like()?)?.broadcast_as(self.shape())?;
        let fill = Tensor::new(value, self.device())?
            .to_dtype(self.dtype())?
            .broadcast_as(self.shape())?;
        mask.where_cond(self, &fill)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle::Device;

    #[test]
    fn test_masked_fill_broadcasts() {
        let device = Device::Cpu;
        let x = Tensor::new(&[[1.0f32, 2.0, 3.0], [4.0, 5.0, 6.0]], &device).unwrap();
        let mask = Tensor::new(&[[1u8, 0, 1]], &device).unwrap();

        let y = x.masked_fill(&mask, -1.0).unwrap();
        assert_eq!(
            y.to_vec2::<f32>().unwrap(),
            vec![vec![1.0, -1.0, 3.0], vec![4.0, -1.0, 6.0]]
        );
    }

    #[test]
    fn test_masked_fill_float_mask() {
        let device = Device::Cpu;
        let x = Tensor::new(&[[1.0f32, 2.0, 3.0, 4.0]], &device).unwrap();
        let mask = Tensor::new(&[[1.0f32, 1.0, 0.0, 0.0]], &device).unwrap();

        let y = x.masked_fill(&mask, 0.0).unwrap();
        assert_eq!(y.to_vec2::<f32>().unwrap(), vec![vec![1.0, 2.0, 0.0, 0.0]]);
    }
}
