use std::path::Path;

use anyhow::Result;
use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum InputLayer {
    #[default]
    Embed,
    Linear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PosEnc {
    #[default]
    Abs,
    Scaled,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub vocab_size: usize,
    pub encoder_output_size: usize,
    pub num_blocks: usize,
    pub attention_dim: usize,
    pub attention_heads: usize,
    pub linear_units: usize,
    pub dropout_rate: f64,
    pub positional_dropout_rate: f64,
    pub self_attention_dropout_rate: f64,
    pub src_attention_dropout_rate: f64,
    pub input_layer: InputLayer,
    pub pos_enc: PosEnc,
    pub concat_after: bool,
    pub normalize_before: bool,
    pub layer_drop_rate: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            vocab_size: 0,
            encoder_output_size: 0,
            num_blocks: 3,
            attention_dim: 512,
            attention_heads: 4,
            linear_units: 2048,
            dropout_rate: 0.1,
            positional_dropout_rate: 0.1,
            self_attention_dropout_rate: 0.0,
            src_attention_dropout_rate: 0.0,
            input_layer: InputLayer::Embed,
            pos_enc: PosEnc::Abs,
            concat_after: false,
            normalize_before: true,
            layer_drop_rate: 0.0,
        }
    }
}

impl Config {
    pub fn new(vocab_size: usize, encoder_output_size: usize) -> Self {
        Self {
            vocab_size,
            encoder_output_size,
            ..Default::default()
        }
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&config)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> candle::Result<()> {
        if self.vocab_size == 0 {
            candle::bail!("vocab_size must be positive");
        }
        if self.encoder_output_size == 0 || self.attention_dim == 0 || self.linear_units == 0 {
            candle::bail!(
                "encoder_output_size, attention_dim and linear_units must be positive, got {}, {}, {}",
                self.encoder_output_size,
                self.attention_dim,
                self.linear_units
            );
        }
        if self.num_blocks == 0 {
            candle::bail!("num_blocks must be positive");
        }
        if self.attention_heads == 0 || self.attention_dim % self.attention_heads != 0 {
            candle::bail!(
                "attention_dim {} is not divisible by attention_heads {}",
                self.attention_dim,
                self.attention_heads
            );
        }
        if self.attention_dim % 2 != 0 {
            candle::bail!("attention_dim must be even, got {}", self.attention_dim);
        }

        let rates = [
            ("dropout_rate", self.dropout_rate),
            ("positional_dropout_rate", self.positional_dropout_rate),
            ("self_attention_dropout_rate", self.self_attention_dropout_rate),
            ("src_attention_dropout_rate", self.src_attention_dropout_rate),
        ];
        for (name, rate) in rates {
            if !(0.0..1.0).contains(&rate) {
                candle::bail!("{name} must be in [0, 1), got {rate}");
            }
        }
        if !(0.0..=1.0).contains(&self.layer_drop_rate) {
            candle::bail!("layer_drop_rate must be in [0, 1], got {}", self.layer_drop_rate);
        }

        Ok(())
    }

    /// Encoder memory needs a projection before cross-attention.
    pub fn maps_encoder_output(&self) -> bool {
        self.attention_dim != self.encoder_output_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_fill_missing_fields() {
        let config: Config =
            serde_json::from_str(r#"{"vocab_size": 4, "encoder_output_size": 192}"#).unwrap();
        assert_eq!(config, Config::new(4, 192));
        assert_eq!(config.num_blocks, 3);
        assert_eq!(config.attention_dim, 512);
        assert!(config.normalize_before);
        assert!(config.maps_encoder_output());
        config.validate().unwrap();
    }

    #[test]
    fn test_enum_fields() {
        let config: Config = serde_json::from_str(
            r#"{"vocab_size": 4, "encoder_output_size": 512, "input_layer": "linear", "pos_enc": "scaled"}"#,
        )
        .unwrap();
        assert_eq!(config.input_layer, InputLayer::Linear);
        assert_eq!(config.pos_enc, PosEnc::Scaled);
        assert!(!config.maps_encoder_output());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config::new(4, 256);
        config.attention_heads = 3;
        assert!(config.validate().is_err());

        let mut config = Config::new(4, 256);
        config.dropout_rate = 1.0;
        assert!(config.validate().is_err());

        let mut config = Config::new(4, 256);
        config.layer_drop_rate = 1.0;
        config.validate().unwrap();

        assert!(Config::new(0, 256).validate().is_err());

        let mut config = Config::new(4, 256);
        config.num_blocks = 0;
        assert!(config.validate().is_err());
    }
}
