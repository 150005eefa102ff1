//! End-to-end reduction pipeline.
//!
//! A run reads the dataset, executes the CPU-bound stages on the configured substrate, then
//! writes images and the execution log. CPU-bound work runs either on the Rayon thread pool via
//! [tokio_rayon] or on a Tokio blocking thread, so that it never blocks the async runtime.

use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;

use crate::aggregate::{AggregationEngine, AggregationResult};
use crate::cast::{CastSummary, TypeCaster};
use crate::compression::{decompress, Compression};
use crate::config::{check_drop_rate, PipelineConfig};
use crate::engine::{split_partitions, Dataset, Rayon, Sequential, Substrate};
use crate::error::ReductionError;
use crate::execution_log::ExecutionLog;
use crate::export::{scatter_chart_name, ArtifactExporter, BAR_CHART_NAME, DENSITY_MAP_NAME};
use crate::filter::{FilterSummary, TripFilter};
use crate::grid::{BinSummary, SpatialBinner};
use crate::ingest::{IngestSummary, RecordIngestor};
use crate::metrics;
use crate::models::FilteredRecord;
use crate::preprocess::{PreprocessSummary, Preprocessor};
use crate::render::{Chart, Renderer};
use crate::resource_manager::ResourceManager;
use crate::sample::{percentage, SamplingEngine};
use crate::shade::Shader;
use crate::state::{PipelineState, Stage};
use crate::store::{Location, Store};

/// Outcome of a successful run.
#[derive(Clone, Debug)]
pub struct RunReport {
    pub ingest: IngestSummary,
    pub cast: CastSummary,
    pub filter: FilterSummary,
    pub aggregation: AggregationResult,
    pub sample_size: usize,
    pub bins: BinSummary,
    /// Locations of all written artifacts, images first
    pub artifacts: Vec<Location>,
    pub log: ExecutionLog,
}

/// Results of the distributed stages. The sample has not yet been materialised locally.
struct Reduced<S> {
    ingest: IngestSummary,
    cast: CastSummary,
    filter: FilterSummary,
    aggregation: AggregationResult,
    aggregation_time: Duration,
    sample: Dataset<FilteredRecord, S>,
    sample_time: Duration,
    log: ExecutionLog,
}

/// PNG images rendered from the reduced results.
struct Rendered {
    bar: Bytes,
    scatter: Bytes,
    density: Bytes,
    sample_size: usize,
    bins: BinSummary,
    log: ExecutionLog,
}

fn timed<T>(f: impl FnOnce() -> T) -> (T, Duration) {
    let start = Instant::now();
    let result = f();
    (result, start.elapsed())
}

/// Run a CPU-bound function outside of the async runtime.
async fn spawn_cpu<T, F>(use_rayon: bool, f: F) -> Result<T, ReductionError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    if use_rayon {
        Ok(tokio_rayon::spawn(f).await)
    } else {
        Ok(tokio::task::spawn_blocking(f).await?)
    }
}

/// Decompress the input if its location names a compression. The compressed buffer is released
/// on return.
fn decompressed(config: &PipelineConfig, data: Bytes) -> Result<Bytes, ReductionError> {
    match Compression::from_location(&config.dataset) {
        Some(compression) => decompress(compression, &data),
        None => Ok(data),
    }
}

/// Ingest, cast and filter the input, then aggregate and sample the filtered records concurrently.
fn reduce<S: Substrate>(
    config: &PipelineConfig,
    data: Bytes,
    substrate: S,
    state: &mut PipelineState,
) -> Result<Reduced<S>, ReductionError> {
    let start = Instant::now();
    let blocks = split_partitions(decompressed(config, data)?, config.partitions)
        .into_iter()
        .map(|block| vec![block])
        .collect();
    let text = Dataset::from_partitions(blocks, substrate.clone());

    let preprocessor = Preprocessor::new(
        RecordIngestor::new(config.delimiter),
        TypeCaster::default(),
        TripFilter::default(),
    );
    let (filtered, PreprocessSummary { ingest, cast, filter }) = preprocessor.preprocess(text);
    let log = ingest.record(ExecutionLog::new());
    check_drop_rate(
        "malformed line",
        ingest.malformed,
        ingest.parsed + ingest.malformed,
        config.max_malformed_rate,
    )?;
    state.advance(Stage::Ingested)?;
    let log = cast.record(log);
    state.advance(Stage::Typed)?;
    let log = filter.record(log);
    state.advance(Stage::Filtered)?;
    let elapsed = start.elapsed();
    metrics::record_stage_time("preprocessing", elapsed);
    let log = log.timed("Data preprocessing", elapsed);

    let sampler = SamplingEngine::new(config.sample_fraction, config.seed)?;
    let (aggregated, sampled) = substrate.join(
        || timed(|| AggregationEngine.aggregate(&filtered, ExecutionLog::new())),
        || timed(|| sampler.sample_logged(&filtered, ExecutionLog::new())),
    );
    let ((aggregation, aggregation_log), aggregation_time) = aggregated;
    state.advance(Stage::Aggregated)?;
    let (sampled, sample_time) = sampled;
    let (sample, sample_log) = sampled?;
    state.advance(Stage::Sampled)?;

    Ok(Reduced {
        ingest,
        cast,
        filter,
        aggregation,
        aggregation_time,
        sample,
        sample_time,
        log: log.extend(aggregation_log).extend(sample_log),
    })
}

/// Render charts, then bin and shade the sample into a density map.
#[allow(clippy::too_many_arguments)]
fn render<S: Substrate>(
    config: &PipelineConfig,
    renderer: &dyn Renderer,
    aggregation: &AggregationResult,
    aggregation_time: Duration,
    sample: Dataset<FilteredRecord, S>,
    sample_time: Duration,
    state: &mut PipelineState,
    log: ExecutionLog,
) -> Result<Rendered, ReductionError> {
    let (bar, elapsed) = timed(|| renderer.render(&Chart::Bar(aggregation)));
    let bar = bar?;
    metrics::record_stage_time("aggregation", aggregation_time + elapsed);
    let log = log.timed("Aggregation & plotting", aggregation_time + elapsed);

    let sampler = SamplingEngine::new(config.sample_fraction, config.seed)?;
    let (sample, scatter, elapsed) = {
        let start = Instant::now();
        let sample = sampler.materialise(sample);
        let scatter = renderer.render(&Chart::Scatter(&sample))?;
        (sample, scatter, start.elapsed())
    };
    metrics::record_stage_time("sampling", sample_time + elapsed);
    let log = log.timed(
        format!("Sampling {}% & plotting", percentage(config.sample_fraction)),
        sample_time + elapsed,
    );

    let start = Instant::now();
    let (grid, bins, log) = SpatialBinner::new(config.grid)?.bin(&sample, log);
    check_drop_rate(
        "out of bounds point",
        bins.dropped(),
        bins.points,
        config.max_out_of_bounds_rate,
    )?;
    state.advance(Stage::Binned)?;
    let (image, log) = Shader::default().shade(&grid, log);
    let density = renderer.render(&Chart::DensityMap {
        image: &image,
        bounds: &grid.spec().bounds,
    })?;
    let elapsed = start.elapsed();
    metrics::record_stage_time("density", elapsed);
    let log = log.timed("Density map", elapsed);

    Ok(Rendered {
        bar,
        scatter,
        density,
        sample_size: sample.len(),
        bins,
        log,
    })
}

/// A single run of the reduction pipeline.
pub struct Pipeline {
    config: PipelineConfig,
    store: Arc<dyn Store>,
    renderer: Arc<dyn Renderer>,
    resource_manager: Arc<ResourceManager>,
    state: PipelineState,
}

impl Pipeline {
    /// Return a new Pipeline.
    ///
    /// # Arguments
    ///
    /// * `config`: Validated configuration
    /// * `store`: Store for the dataset and all artifacts
    /// * `renderer`: Renderer of charts and images
    pub fn new(config: PipelineConfig, store: Arc<dyn Store>, renderer: Arc<dyn Renderer>) -> Self {
        let resource_manager = Arc::new(ResourceManager::new(
            Some(config.upload_limit),
            config.local_memory_limit,
        ));
        Pipeline {
            config,
            store,
            renderer,
            resource_manager,
            state: PipelineState::new(),
        }
    }

    /// Current stage of the run.
    pub fn stage(&self) -> Stage {
        self.state.current()
    }

    /// Execute the pipeline to completion.
    ///
    /// On error the pipeline moves to the failed stage and nothing further is written.
    pub async fn run(&mut self) -> Result<RunReport, ReductionError> {
        let result = if self.config.use_rayon {
            self.execute(Rayon).await
        } else {
            self.execute(Sequential).await
        };
        if result.is_err() {
            self.state.fail();
        }
        result
    }

    async fn execute<S: Substrate>(&mut self, substrate: S) -> Result<RunReport, ReductionError> {
        let start = Instant::now();
        let use_rayon = self.config.use_rayon;
        let data = self.store.get(&self.config.dataset).await?;
        tracing::info!("Read {} bytes from {}", data.len(), self.config.dataset);

        let config = self.config.clone();
        let state = self.state.clone();
        let (state, reduced) = spawn_cpu(use_rayon, move || {
            let mut state = state;
            let reduced = reduce(&config, data, substrate, &mut state);
            (state, reduced)
        })
        .await?;
        self.state = state;
        let reduced = reduced?;

        // Reserve memory for the sample before materialising it.
        let resource_manager = self.resource_manager.clone();
        let requested = reduced.sample.count() * std::mem::size_of::<FilteredRecord>();
        let permit = resource_manager.memory("sample", requested).await?;

        let config = self.config.clone();
        let renderer = self.renderer.clone();
        let state = self.state.clone();
        let Reduced {
            ingest,
            cast,
            filter,
            aggregation,
            aggregation_time,
            sample,
            sample_time,
            log,
        } = reduced;
        let (state, aggregation, rendered) = spawn_cpu(use_rayon, move || {
            let mut state = state;
            let rendered = render(
                &config,
                renderer.as_ref(),
                &aggregation,
                aggregation_time,
                sample,
                sample_time,
                &mut state,
                log,
            );
            (state, aggregation, rendered)
        })
        .await?;
        self.state = state;
        drop(permit);
        let rendered = rendered?;

        let export_start = Instant::now();
        let exporter = ArtifactExporter::new(self.store.clone(), resource_manager);
        let images = vec![
            (self.config.artifact_location(BAR_CHART_NAME), rendered.bar),
            (
                self.config
                    .artifact_location(&scatter_chart_name(self.config.sample_fraction)),
                rendered.scatter,
            ),
            (self.config.artifact_location(DENSITY_MAP_NAME), rendered.density),
        ];
        let mut artifacts = exporter.write_images(images).await?;
        self.state.advance(Stage::Exported)?;
        metrics::record_stage_time("export", export_start.elapsed());

        let log = rendered
            .log
            .append(format!("Total time taken: {:?}", start.elapsed()));
        artifacts.push(exporter.write_log(self.config.log_location(), &log).await?);
        if self.config.export_metrics {
            artifacts.push(exporter.write_metrics(self.config.metrics_location()).await?);
        }
        self.state.advance(Stage::Done)?;

        Ok(RunReport {
            ingest,
            cast,
            filter,
            aggregation,
            sample_size: rendered.sample_size,
            bins: rendered.bins,
            artifacts,
            log,
        })
    }
}
