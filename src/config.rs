//! Pipeline configuration.

use validator::{Validate, ValidationError};

use crate::cli::CommandLineArgs;
use crate::error::ReductionError;
use crate::grid::{BoundingBox, GridSpec};
use crate::sample::{validate_fraction, DEFAULT_FRACTION, DEFAULT_SEED};
use crate::store::Location;

/// Name of the execution log object within the log subfolder.
pub const LOG_NAME: &str = "part-00000";

/// Validated configuration of a pipeline run.
#[derive(Clone, Debug, Validate)]
#[validate(schema(function = "validate_config"))]
pub struct PipelineConfig {
    /// Source of input lines
    pub dataset: Location,
    /// Destination directory of the execution log
    pub output: Location,
    /// Destination of rendered images
    pub artifacts: Location,
    /// Field delimiter of input lines
    pub delimiter: u8,
    /// Sampling fraction, in (0, 1]
    pub sample_fraction: f64,
    /// Sampling seed
    pub seed: u64,
    /// Number of partitions into which input is split
    #[validate(range(min = 1, message = "partitions must be greater than 0"))]
    pub partitions: usize,
    /// Whether to run CPU-bound stages on the Rayon thread pool
    pub use_rayon: bool,
    /// Optional number of Rayon worker threads
    #[validate(range(min = 1, message = "threads must be greater than 0"))]
    pub threads: Option<usize>,
    /// Density map grid
    #[validate]
    pub grid: GridSpec,
    /// Optional limit on the fraction of malformed input lines
    pub max_malformed_rate: Option<f64>,
    /// Optional limit on the fraction of sampled points dropped by binning
    pub max_out_of_bounds_rate: Option<f64>,
    /// Optional memory limit for locally materialised results, in bytes
    pub local_memory_limit: Option<usize>,
    /// Maximum number of concurrent artifact uploads
    #[validate(range(min = 1, message = "upload limit must be greater than 0"))]
    pub upload_limit: usize,
    /// Subfolder of the output directory for the execution log
    #[validate(length(min = 1, message = "log subfolder must not be empty"))]
    pub log_subfolder: String,
    /// Whether to write Prometheus metrics to the output directory
    pub export_metrics: bool,
}

fn validate_rate(rate: Option<f64>) -> Result<(), ValidationError> {
    match rate {
        Some(rate) if !(0.0..=1.0).contains(&rate) => Err(ValidationError::new(
            "Drop rate limits must be between 0 and 1",
        )),
        _ => Ok(()),
    }
}

/// Validate the configuration as a whole.
fn validate_config(config: &PipelineConfig) -> Result<(), ValidationError> {
    validate_fraction(config.sample_fraction)?;
    validate_rate(config.max_malformed_rate)?;
    validate_rate(config.max_out_of_bounds_rate)?;
    Ok(())
}

impl PipelineConfig {
    /// Return a configuration with default options.
    pub fn new(dataset: Location, output: Location, artifacts: Location) -> Self {
        PipelineConfig {
            dataset,
            output,
            artifacts,
            delimiter: b',',
            sample_fraction: DEFAULT_FRACTION,
            seed: DEFAULT_SEED,
            partitions: num_cpus::get(),
            use_rayon: false,
            threads: None,
            grid: GridSpec::default(),
            max_malformed_rate: None,
            max_out_of_bounds_rate: None,
            local_memory_limit: None,
            upload_limit: 4,
            log_subfolder: "Success-logs".to_string(),
            export_metrics: false,
        }
    }

    /// Build and validate a configuration from command line arguments.
    pub fn from_args(args: &CommandLineArgs) -> Result<Self, ReductionError> {
        let config = PipelineConfig {
            delimiter: args.delimiter,
            sample_fraction: args.sample_fraction,
            seed: args.seed,
            partitions: args.partitions.unwrap_or_else(num_cpus::get),
            use_rayon: args.use_rayon,
            threads: args.threads,
            grid: GridSpec {
                width: args.grid_width,
                height: args.grid_height,
                bounds: BoundingBox::default(),
            },
            max_malformed_rate: args.max_malformed_rate,
            max_out_of_bounds_rate: args.max_out_of_bounds_rate,
            local_memory_limit: args.local_memory_limit,
            upload_limit: args.upload_limit,
            log_subfolder: args.log_subfolder.clone(),
            export_metrics: args.export_metrics,
            ..PipelineConfig::new(
                Location::parse(&args.dataset)?,
                Location::parse(&args.output)?,
                Location::artifact_root(&args.artifact_store, &args.artifact_subfolder)?,
            )
        };
        config.validate()?;
        Ok(config)
    }

    /// Location of the execution log.
    pub fn log_location(&self) -> Location {
        self.output.join(&self.log_subfolder).join(LOG_NAME)
    }

    /// Location of the exported metrics.
    pub fn metrics_location(&self) -> Location {
        self.output.join("metrics").join("metrics.txt")
    }

    /// Location of a rendered image.
    pub fn artifact_location(&self, name: &str) -> Location {
        self.artifacts.join(name)
    }
}

/// Fail if more than `limit` of `total` items were dropped.
pub fn check_drop_rate(
    what: &'static str,
    dropped: usize,
    total: usize,
    limit: Option<f64>,
) -> Result<(), ReductionError> {
    match limit {
        Some(limit) if total > 0 && dropped as f64 / total as f64 > limit => {
            Err(ReductionError::DropRateExceeded {
                what,
                dropped: dropped as u64,
                total: total as u64,
                limit,
            })
        }
        _ => Ok(()),
    }
}
