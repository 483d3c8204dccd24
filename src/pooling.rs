pub mod transformer_decoder;

use candle::{Result, Tensor};

pub use transformer_decoder::TransformerDecoderPooling;

/// Pooling stage that reduces frame-level encoder output to one embedding per utterance.
pub trait Pooling {
    /// Width of the pooled embedding.
    fn output_size(&self) -> usize;

    /// encoder_output: (batch, dim, frames), task_tokens: (batch,),
    /// memory_mask: optional (batch, 1, frames) keep-mask.
    /// Returns (batch, output_size).
    fn forward_t(
        &self,
        encoder_output: &Tensor,
        task_tokens: &Tensor,
        memory_mask: Option<&Tensor>,
        train: bool,
    ) -> Result<Tensor>;

    fn forward(&self, encoder_output: &Tensor, task_tokens: &Tensor) -> Result<Tensor> {
        self.forward_t(encoder_output, task_tokens, None, false)
    }
}
