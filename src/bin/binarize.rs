use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use burn_binarize::data::DocumentDataset;
use burn_binarize::diffusion::NoiseSource;
use burn_binarize::image::save_binary_mask;
use burn_binarize::loader::{load_checkpoint, CheckpointConfig};
use burn_binarize::telemetry::RunContext;
use burn_binarize::{Binarizer, RunConfig, SolverKind};
use burn_ndarray::{NdArray as B, NdArrayDevice};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};

#[derive(Parser, Debug)]
#[command(name = "binarize", version, about = "Binarize document images with a conditional diffusion model")]
struct Args {
    /// Run configuration (JSON)
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    config: PathBuf,
    /// Override the sampler: "iterative" or "fast-ode"
    #[arg(long)]
    solver: Option<String>,
    /// Override the fast-solver step count
    #[arg(long)]
    steps: Option<usize>,
    /// Override the noise seed
    #[arg(long)]
    seed: Option<u64>,
    /// Override the output directory
    #[arg(short = 'o', long = "output", value_name = "DIR")]
    output: Option<PathBuf>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let mut run = RunConfig::from_file(&args.config).with_context(|| format!("config {:?}", args.config))?;
    if let Some(solver) = &args.solver {
        run.binarize.solver = solver.parse::<SolverKind>()?;
    }
    if let Some(steps) = args.steps {
        run.binarize.solver_steps = steps;
    }
    if let Some(seed) = args.seed {
        run.binarize.seed = seed;
    }
    if let Some(out) = &args.output {
        run.data.output_dir = out.display().to_string();
    }
    run.binarize.validate()?;
    tracing::info!(config = %run.binarize, "config loaded");

    let device = NdArrayDevice::default();
    let (mut predictor, mut denoiser) = run.models.init::<B>(&device);
    let ckpt = CheckpointConfig { from_pytorch: run.data.from_pytorch, ..Default::default() };
    let (Some(predictor_path), Some(denoiser_path)) =
        (run.data.initial_predictor_weights.as_deref(), run.data.denoiser_weights.as_deref())
    else {
        bail!("both initial_predictor_weights and denoiser_weights must be set");
    };
    load_checkpoint::<B, _>(&mut predictor, Path::new(predictor_path), &ckpt)?;
    load_checkpoint::<B, _>(&mut denoiser, Path::new(denoiser_path), &ckpt)?;

    let dataset = DocumentDataset::open(
        Path::new(&run.data.image_dir),
        run.data.ground_truth_dir.as_deref().map(Path::new),
    )?;
    if dataset.is_empty() {
        bail!("no images found in {}", run.data.image_dir);
    }

    let cfg = &run.binarize;
    let binarizer = Binarizer::from_config(predictor, denoiser, cfg)?;
    let resize = (!cfg.native_resolution).then_some(cfg.image_size);
    let output_dir = PathBuf::from(&run.data.output_dir);
    let mut noise = NoiseSource::seeded(cfg.seed);
    let mut ctx = RunContext::new(format!("{}-{}", cfg.solver, cfg.schedule)).with_solver(cfg.solver);

    let pb = ProgressBar::new(dataset.len() as u64);
    pb.set_style(
        ProgressStyle::with_template("{bar:40.cyan/blue} {pos}/{len} {msg} [{elapsed}]")
            .context("progress style")?,
    );
    for sample in &dataset {
        pb.set_message(sample.name.clone());
        let loaded = sample.load::<B>(resize, &device)?;
        let out = binarizer
            .binarize(&loaded.name, loaded.image, &mut noise, &mut ctx)
            .with_context(|| format!("binarize {}", loaded.name))?;
        let path = save_binary_mask(out.mask, cfg.binarize_threshold, &output_dir, &loaded.name)?;
        tracing::debug!(path = %path.display(), "wrote mask");
        pb.inc(1);
    }
    pb.finish_with_message("done");

    let summary = ctx.finish();
    println!(
        "binarized {} images ({} model evaluations) into {}",
        summary.images,
        summary.model_evaluations,
        output_dir.display()
    );
    Ok(())
}
