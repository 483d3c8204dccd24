//! End-to-end checks for loading and running the pooling head.

use anyhow::Result;
use candle::{DType, Device, Tensor};
use candle_nn::{VarBuilder, VarMap};
use spk_pool::{Config, Pooling, TransformerDecoderPooling, make_non_pad_mask};

fn small_config() -> Config {
    Config {
        num_blocks: 2,
        attention_dim: 32,
        attention_heads: 4,
        linear_units: 64,
        ..Config::new(3, 48)
    }
}

/// Weights saved from a trainable module load back into an identical module.
#[test]
fn test_checkpoint_round_trip_from_dir() -> Result<()> {
    let device = Device::Cpu;
    let config = small_config();

    let varmap = VarMap::new();
    let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
    let trained = TransformerDecoderPooling::new(&config, vb)?;

    let dir = tempfile::tempdir()?;
    varmap.save(dir.path().join("model.safetensors"))?;
    std::fs::write(
        dir.path().join("config.json"),
        r#"{
            "vocab_size": 3,
            "encoder_output_size": 48,
            "num_blocks": 2,
            "attention_dim": 32,
            "attention_heads": 4,
            "linear_units": 64
        }"#,
    )?;

    let loaded = TransformerDecoderPooling::from_dir(dir.path(), &device)?;
    assert_eq!(loaded.config(), &config);

    let encoder_output = Tensor::randn(0.0f32, 1.0, (2, 48, 20), &device)?;
    let tokens = Tensor::new(&[0u32, 2], &device)?;

    let a = trained.forward(&encoder_output, &tokens)?;
    let b = loaded.forward(&encoder_output, &tokens)?;
    let diff = (a - b)?.abs()?.max_all()?.to_scalar::<f32>()?;
    assert!(diff < 1e-6, "diff {diff}");

    Ok(())
}

#[test]
fn test_missing_weights_fail_to_load() -> Result<()> {
    let dir = tempfile::tempdir()?;
    std::fs::write(
        dir.path().join("config.json"),
        r#"{"vocab_size": 3, "encoder_output_size": 48}"#,
    )?;

    assert!(TransformerDecoderPooling::from_dir(dir.path(), &Device::Cpu).is_err());
    Ok(())
}

/// Each task token yields its own embedding of the same utterances, and
/// padded batches agree with unpadded single utterances.
#[test]
fn test_multi_task_batch_with_padding() -> Result<()> {
    let device = Device::Cpu;
    let varmap = VarMap::new();
    let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
    let pooling = TransformerDecoderPooling::new(&small_config(), vb)?;

    let long = Tensor::randn(0.0f32, 1.0, (1, 48, 12), &device)?;
    let short = Tensor::randn(0.0f32, 1.0, (1, 48, 7), &device)?;
    let short_padded = short.pad_with_zeros(2, 0, 5)?;
    let batch = Tensor::cat(&[&long, &short_padded], 0)?;
    let mask = make_non_pad_mask(&[12, 7], None, &device)?;

    let mut per_task = vec![];
    for token in 0..3u32 {
        let tokens = Tensor::full(token, 2, &device)?;
        let x = pooling.forward_t(&batch, &tokens, Some(&mask), false)?;
        assert_eq!(x.dims2()?, (2, pooling.output_size()));

        let alone = pooling.forward(&short, &Tensor::new(&[token], &device)?)?;
        let diff = (x.get(1)? - alone.get(0)?)?.abs()?.max_all()?.to_scalar::<f32>()?;
        assert!(diff < 1e-4, "token {token} diff {diff}");

        per_task.push(x);
    }

    let diff = (&per_task[0] - &per_task[1])?.abs()?.max_all()?.to_scalar::<f32>()?;
    assert!(diff > 1e-4);

    Ok(())
}
