use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use rasterprep::logger;
use rasterprep::preprocessing::{BatchRunner, JobConfig, LayerPipeline};

use tracing::{error, info};

/// Preprocess raster and vector layers onto template grids.
#[derive(Debug, Parser)]
#[command(name = "rasterprep", version)]
struct Cli {
    /// Job file (TOML, or JSON with a .json extension)
    job: PathBuf,

    /// Worker threads; overrides the job file
    #[arg(short, long)]
    workers: Option<usize>,

    /// Decode inputs and validate every layer's steps without running them
    #[arg(long)]
    dry_run: bool,

    /// Log at debug level unless RUST_LOG is set
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    logger::init_with_default(if cli.verbose { "debug" } else { "info" });

    match run(&cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

/// Returns whether every layer succeeded.
fn run(cli: &Cli) -> Result<bool> {
    info!("Starting rasterprep...");

    let job = JobConfig::from_path(&cli.job)
        .with_context(|| format!("loading job {}", cli.job.display()))?;
    let workers = cli
        .workers
        .or(job.workers)
        .unwrap_or_else(|| std::thread::available_parallelism().map_or(1, |n| n.get()));

    let pipeline = LayerPipeline::new(job.writer.clone());
    let mut templates = job
        .load_templates(pipeline.raster_reader())
        .context("loading templates")?;
    job.load_aois(pipeline.vector_reader(), &mut templates)
        .context("loading areas of interest")?;
    info!(
        layers = job.layers.len(),
        templates = templates.len(),
        aois = templates.aoi_count(),
        workers,
        "Job loaded, compression: {:?}",
        job.writer.compression
    );

    let runner = BatchRunner::new(pipeline, workers);

    if cli.dry_run {
        let checks = runner.check(&job, &templates)?;
        let mut ok = true;
        for (layer_id, result) in checks {
            match result {
                Ok(()) => info!("{layer_id}: valid"),
                Err(e) => {
                    error!("{e}");
                    ok = false;
                }
            }
        }
        return Ok(ok);
    }

    let report = runner.run(&job, &templates)?;
    for outcome in &report.outcomes {
        match &outcome.result {
            Ok(layer) => info!(
                "{}: completed in {:.3}ms\n{}",
                layer.layer_id,
                layer.timings.total_duration().as_secs_f64() * 1000.0,
                layer.timings.summary()
            ),
            Err(e) => error!("{e}"),
        }
    }
    info!(
        "{} of {} layer(s) completed",
        report.completed().count(),
        report.outcomes.len()
    );
    Ok(report.all_succeeded())
}
