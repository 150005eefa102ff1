//! This file defines the tripreduce binary entry point.

use std::process::ExitCode;
use std::sync::Arc;

use tripreduce::cli;
use tripreduce::config::PipelineConfig;
use tripreduce::engine::Rayon;
use tripreduce::error::{self, ReductionError};
use tripreduce::metrics;
use tripreduce::pipeline::Pipeline;
use tripreduce::render::PlottersRenderer;
use tripreduce::s3_client::{S3Client, S3Credentials};
use tripreduce::store::{S3Store, StoreRouter};
use tripreduce::tracing;

async fn run(args: &cli::CommandLineArgs) -> Result<(), ReductionError> {
    let config = PipelineConfig::from_args(args)?;
    if config.use_rayon {
        Rayon::init(config.threads)?;
    }
    let credentials =
        S3Credentials::from_options(args.s3_access_key.as_deref(), args.s3_secret_key.as_deref());
    let client = S3Client::new(args.s3_endpoint.as_ref(), args.s3_region.as_deref(), credentials).await;
    let store = Arc::new(StoreRouter::new(S3Store::new(client)));
    let mut pipeline = Pipeline::new(config, store, Arc::new(PlottersRenderer::default()));
    let report = pipeline.run().await?;
    for artifact in &report.artifacts {
        println!("{}", artifact);
    }
    Ok(())
}

/// Application entry point
#[tokio::main]
async fn main() -> ExitCode {
    let args = cli::parse();
    tracing::init_tracing();
    metrics::register_metrics();
    match run(&args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let report = error::report(&err);
            match serde_json::to_string_pretty(&report) {
                Ok(json) => println!("{}", json),
                Err(_) => println!("{}", report.message),
            }
            ExitCode::FAILURE
        }
    }
}
