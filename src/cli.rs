//! Command Line Interface (CLI) arguments.

use byte_unit::Byte;
use clap::Parser;

/// Parse a human readable byte size, e.g. `512MiB`.
fn parse_byte_size(size: &str) -> Result<usize, String> {
    let bytes = Byte::parse_str(size, /* ignore case */ true)
        .map_err(|err| err.to_string())?
        .as_u64();
    usize::try_from(bytes).map_err(|err| err.to_string())
}

/// Parse a single byte delimiter.
fn parse_delimiter(delimiter: &str) -> Result<u8, String> {
    match delimiter.as_bytes() {
        [byte] => Ok(*byte),
        _ => Err("delimiter must be a single byte".to_string()),
    }
}

/// tripreduce command line interface
///
/// Reduces a large collection of trip records to an aggregate bar chart, a sampled scatter plot
/// and a pickup density map.
#[derive(Clone, Debug, Parser)]
#[command(version, about)]
pub struct CommandLineArgs {
    /// Location of the input trip records: a local path or an s3:// URL
    pub dataset: String,
    /// Directory to which the execution log is written
    pub output: String,
    /// S3 bucket for rendered images, or a local directory
    pub artifact_store: String,
    /// Path prefix for rendered images within the artifact store
    pub artifact_subfolder: String,
    /// Field delimiter of the input records
    #[arg(long, default_value = ",", value_parser = parse_delimiter, env = "TRIPREDUCE_DELIMITER")]
    pub delimiter: u8,
    /// Fraction of filtered records to sample, in (0, 1]
    #[arg(long, default_value_t = 0.01, env = "TRIPREDUCE_SAMPLE_FRACTION")]
    pub sample_fraction: f64,
    /// Seed for sampling
    #[arg(long, default_value_t = 42, env = "TRIPREDUCE_SEED")]
    pub seed: u64,
    /// Number of partitions into which the input is split. Defaults to the number of CPUs.
    #[arg(long, env = "TRIPREDUCE_PARTITIONS")]
    pub partitions: Option<usize>,
    /// Whether to use Rayon for execution of CPU-bound stages.
    #[arg(long, default_value_t = false, env = "TRIPREDUCE_USE_RAYON")]
    pub use_rayon: bool,
    /// Number of Rayon worker threads. Defaults to the number of CPUs.
    #[arg(long, env = "TRIPREDUCE_THREADS")]
    pub threads: Option<usize>,
    /// Width of the density map, in cells
    #[arg(long, default_value_t = 800, env = "TRIPREDUCE_GRID_WIDTH")]
    pub grid_width: usize,
    /// Height of the density map, in cells
    #[arg(long, default_value_t = 800, env = "TRIPREDUCE_GRID_HEIGHT")]
    pub grid_height: usize,
    /// Fail if the fraction of malformed input lines exceeds this
    #[arg(long, env = "TRIPREDUCE_MAX_MALFORMED_RATE")]
    pub max_malformed_rate: Option<f64>,
    /// Fail if the fraction of sampled points outside the density map exceeds this
    #[arg(long, env = "TRIPREDUCE_MAX_OUT_OF_BOUNDS_RATE")]
    pub max_out_of_bounds_rate: Option<f64>,
    /// Memory limit for results materialised locally, e.g. 512MiB
    #[arg(long, value_parser = parse_byte_size, env = "TRIPREDUCE_LOCAL_MEMORY_LIMIT")]
    pub local_memory_limit: Option<usize>,
    /// Maximum number of concurrent artifact uploads
    #[arg(long, default_value_t = 4, env = "TRIPREDUCE_UPLOAD_LIMIT")]
    pub upload_limit: usize,
    /// Subfolder of the output directory for the execution log
    #[arg(long, default_value = "Success-logs", env = "TRIPREDUCE_LOG_SUBFOLDER")]
    pub log_subfolder: String,
    /// Whether to write Prometheus metrics to the output directory
    #[arg(long, default_value_t = false, env = "TRIPREDUCE_EXPORT_METRICS")]
    pub export_metrics: bool,
    /// S3 API endpoint URL. Defaults to AWS.
    #[arg(long, env = "TRIPREDUCE_S3_ENDPOINT")]
    pub s3_endpoint: Option<url::Url>,
    /// S3 region
    #[arg(long, env = "AWS_REGION")]
    pub s3_region: Option<String>,
    /// S3 access key
    #[arg(long, env = "AWS_ACCESS_KEY_ID", hide_env_values = true)]
    pub s3_access_key: Option<String>,
    /// S3 secret key
    #[arg(long, env = "AWS_SECRET_ACCESS_KEY", hide_env_values = true)]
    pub s3_secret_key: Option<String>,
}

/// Returns parsed command line arguments.
pub fn parse() -> CommandLineArgs {
    CommandLineArgs::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    const REQUIRED: [&str; 5] = ["tripreduce", "s3://trips/2013.csv", "/tmp/out", "plots-bucket", "run1"];

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        CommandLineArgs::command().debug_assert();
    }

    #[test]
    fn parse_required() {
        let args = CommandLineArgs::try_parse_from(REQUIRED).unwrap();
        assert_eq!("s3://trips/2013.csv", args.dataset);
        assert_eq!("/tmp/out", args.output);
        assert_eq!("plots-bucket", args.artifact_store);
        assert_eq!("run1", args.artifact_subfolder);
        assert_eq!(b',', args.delimiter);
        assert_eq!(0.01, args.sample_fraction);
        assert_eq!(42, args.seed);
        assert_eq!(800, args.grid_width);
        assert_eq!(4, args.upload_limit);
        assert_eq!("Success-logs", args.log_subfolder);
        assert!(!args.use_rayon);
        assert_eq!(None, args.local_memory_limit);
    }

    #[test]
    fn parse_missing_positional() {
        assert!(CommandLineArgs::try_parse_from(&REQUIRED[..4]).is_err());
    }

    #[test]
    fn parse_options() {
        let mut argv = REQUIRED.to_vec();
        argv.extend([
            "--sample-fraction",
            "0.5",
            "--use-rayon",
            "--local-memory-limit",
            "1KiB",
            "--delimiter",
            "|",
            "--s3-endpoint",
            "http://localhost:9000",
        ]);
        let args = CommandLineArgs::try_parse_from(argv).unwrap();
        assert_eq!(0.5, args.sample_fraction);
        assert!(args.use_rayon);
        assert_eq!(Some(1024), args.local_memory_limit);
        assert_eq!(b'|', args.delimiter);
        assert_eq!("localhost", args.s3_endpoint.unwrap().host_str().unwrap());
    }

    #[test]
    fn parse_invalid_options() {
        for (option, value) in [
            ("--local-memory-limit", "lots"),
            ("--delimiter", "::"),
            ("--seed", "-1"),
        ] {
            let mut argv = REQUIRED.to_vec();
            argv.extend([option, value]);
            assert!(CommandLineArgs::try_parse_from(argv).is_err(), "{}", option);
        }
    }
}
