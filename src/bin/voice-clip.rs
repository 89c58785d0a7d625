//! VoiceCLIP CLI — smoke-run the model on random token batches.
//!
//! Builds the model through the registry (from a network options JSON file,
//! or defaults), feeds it random text and speech ids of the configured
//! sequence lengths, and prints a one-line JSON summary to stdout:
//!
//! ```json
//! {"model":"voice_clip","mode":"loss","batch_size":2,"value":0.6931}
//! ```
//!
//! Exit code 0 on success, non-zero on error.

use candle_core::{DType, Device, Tensor};
use candle_nn::{VarBuilder, VarMap};
use clap::Parser;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use voice_clip_rs::{ClipOutput, NetworkOptions, create_model};

#[derive(Parser, Debug)]
#[command(
    name = "voice-clip",
    about = "VoiceCLIP text/speech contrastive model smoke run",
    long_about = "Construct VoiceCLIP from registry options and run one forward pass\n\
                  on random token batches. A JSON summary line is printed to stdout."
)]
struct Args {
    /// Network options JSON: {"which_model": "voice_clip", "kwargs": {...}}.
    /// Omit to use the default configuration.
    #[arg(long, short = 'o')]
    options: Option<String>,

    /// Number of (text, speech) pairs in the batch.
    #[arg(long, short = 'b', default_value_t = 2)]
    batch_size: usize,

    /// Score aligned pairs instead of computing the contrastive loss.
    #[arg(long)]
    score: bool,

    /// Random seed for the token batches. Omit for a random seed each run.
    #[arg(long, short = 's')]
    seed: Option<u64>,

    /// Force CPU even when CUDA is available.
    #[arg(long)]
    cpu: bool,
}

/// `[batch, seq_len]` ids drawn uniformly from `[0, vocab)`.
fn random_ids(
    rng: &mut ChaCha8Rng,
    batch: usize,
    seq_len: usize,
    vocab: usize,
    device: &Device,
) -> candle_core::Result<Tensor> {
    let ids: Vec<u32> = (0..batch * seq_len)
        .map(|_| rng.random_range(0..vocab as u32))
        .collect();
    Tensor::from_vec(ids, (batch, seq_len), device)
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    if args.batch_size == 0 {
        anyhow::bail!("batch size must be at least 1");
    }

    let opts = match &args.options {
        Some(path) => NetworkOptions::from_file(path)
            .map_err(|e| anyhow::anyhow!("failed to read options {path}: {e}"))?,
        None => NetworkOptions::default(),
    };

    let device = if args.cpu {
        Device::Cpu
    } else {
        Device::cuda_if_available(0)?
    };
    tracing::info!("Using device: {:?}", device);

    let varmap = VarMap::new();
    let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
    let model =
        create_model(&opts, vb).map_err(|e| anyhow::anyhow!("failed to build model: {e}"))?;
    let cfg = model.config();

    let seed = args.seed.unwrap_or_else(|| rand::rng().random());
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let text = random_ids(
        &mut rng,
        args.batch_size,
        cfg.text_seq_len,
        cfg.num_text_tokens,
        &device,
    )?;
    let speech = random_ids(
        &mut rng,
        args.batch_size,
        cfg.speech_seq_len,
        cfg.num_speech_tokens,
        &device,
    )?;

    tracing::info!(
        seed,
        batch = args.batch_size,
        text_len = cfg.text_seq_len,
        speech_len = cfg.speech_seq_len,
        "Running forward pass..."
    );

    let output = model
        .forward(&text, &speech, None, !args.score)
        .map_err(|e| anyhow::anyhow!("forward failed: {e}"))?;

    // Print machine-readable summary to stdout for the caller
    let summary = match output {
        ClipOutput::Loss(loss) => serde_json::json!({
            "model": opts.which_model,
            "mode": "loss",
            "batch_size": args.batch_size,
            "seed": seed,
            "value": loss.to_scalar::<f32>()?,
        }),
        ClipOutput::Scores(scores) => serde_json::json!({
            "model": opts.which_model,
            "mode": "score",
            "batch_size": args.batch_size,
            "seed": seed,
            "scores": scores.to_vec1::<f32>()?,
        }),
    };
    println!("{summary}");

    Ok(())
}
