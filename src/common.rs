pub mod attention;
pub mod feed_forward;
pub mod layer_drop;
pub mod mask;
pub mod positional_encoding;
pub mod tensor_ext;
