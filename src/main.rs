mod config;

use std::{collections::HashMap, path::Path};

use anyhow::{Context, Result};
use candle::{DType, Device, Tensor};
use spk_pool::{Pooling, TransformerDecoderPooling, make_non_pad_mask};
use tracing::{Level, info};
use tracing_subscriber::FmtSubscriber;

use crate::config::{CONFIG_FILE, Config};

fn setup_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .compact()
        .finish();
    _ = tracing::subscriber::set_global_default(subscriber);
}

fn load_model(model: &str, device: &Device) -> Result<TransformerDecoderPooling> {
    if Path::new(model).is_dir() {
        info!(model, "loading pooling from directory");
        TransformerDecoderPooling::from_dir(model, device)
    } else {
        info!(model, "loading pooling from hub");
        TransformerDecoderPooling::from_pretrained(model, device)
    }
}

/// Reads `encoder_output` (B, D, T) and the optional per-utterance `lengths`.
fn load_input(path: &str, device: &Device) -> Result<(Tensor, Option<Tensor>)> {
    let mut tensors = candle::safetensors::load(path, device)?;
    let encoder_output = tensors
        .remove("encoder_output")
        .with_context(|| format!("{path} has no encoder_output tensor"))?
        .to_dtype(DType::F32)?;

    let mask = match tensors.remove("lengths") {
        Some(lengths) => {
            let lengths: Vec<usize> = lengths
                .to_dtype(DType::U32)?
                .to_vec1::<u32>()?
                .into_iter()
                .map(|len| len as usize)
                .collect();
            let (_, _, frames) = encoder_output.dims3()?;
            Some(make_non_pad_mask(&lengths, Some(frames), device)?)
        }
        None => None,
    };

    Ok((encoder_output, mask))
}

fn run(config: &Config) -> Result<()> {
    let device = config.device.device()?;
    let pooling = load_model(&config.model, &device)?;
    let (encoder_output, mask) = load_input(&config.input, &device)?;
    let (batch, dim, frames) = encoder_output.dims3()?;
    info!(batch, dim, frames, masked = mask.is_some(), "loaded encoder output");

    let mut embeddings = HashMap::new();
    for &token in &config.task_tokens {
        let tokens = Tensor::full(token, batch, &device)?;
        let x = pooling.forward_t(&encoder_output, &tokens, mask.as_ref(), false)?;
        info!(token, size = pooling.output_size(), "pooled");
        embeddings.insert(format!("embeddings.{token}"), x);
    }

    candle::safetensors::save(&embeddings, &config.output)?;
    info!(output = %config.output, "saved embeddings");

    Ok(())
}

fn main() {
    if !Path::new(CONFIG_FILE).exists() {
        _ = Config::default().save(CONFIG_FILE);
    }
    let config = Config::load(CONFIG_FILE);
    setup_logging(config.verbose);

    if let Err(e) = run(&config) {
        eprintln!("{e:?}");
        std::process::exit(1);
    }
}
