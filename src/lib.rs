//! Task-conditioned transformer-decoder pooling for speaker embeddings.
//!
//! ```rust,ignore
//! use spk_pool::{Pooling, TransformerDecoderPooling};
//!
//! let pooling = TransformerDecoderPooling::from_dir("checkpoints/pooling", &device)?;
//! // encoder_output: (batch, dim, frames), task_tokens: (batch,)
//! let embeddings = pooling.forward(&encoder_output, &task_tokens)?;
//! ```

pub mod common;
pub mod pooling;

pub use common::mask::{make_non_pad_mask, make_pad_mask};
pub use pooling::{
    Pooling, TransformerDecoderPooling,
    transformer_decoder::{Config, InputLayer, PosEnc},
};
