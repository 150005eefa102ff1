//! Probabilistic sampling of filtered records.

use serde::Serialize;
use validator::{ValidationError, ValidationErrors};

use crate::engine::{Dataset, Substrate};
use crate::error::ReductionError;
use crate::execution_log::ExecutionLog;
use crate::models::FilteredRecord;

/// Default fraction of records to sample.
pub const DEFAULT_FRACTION: f64 = 0.01;
/// Default sampling seed.
pub const DEFAULT_SEED: u64 = 42;

/// Validate that a sampling fraction is in (0, 1].
pub fn validate_fraction(fraction: f64) -> Result<(), ValidationError> {
    if fraction > 0.0 && fraction <= 1.0 {
        Ok(())
    } else {
        Err(ValidationError::new("Sample fraction must be greater than 0 and at most 1"))
    }
}

/// Format a fraction as a percentage, e.g. `1.0` for 0.01.
pub fn percentage(fraction: f64) -> String {
    format!("{:?}", fraction * 100.0)
}

/// A locally materialised sample.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SampleSet {
    pub records: Vec<FilteredRecord>,
    pub fraction: f64,
    pub seed: u64,
}

impl SampleSet {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Includes each record independently with a fixed probability.
///
/// Each partition draws from its own generator, seeded from the seed and the partition index.
/// A sample is reproducible for a fixed seed and partition layout.
#[derive(Clone, Copy, Debug)]
pub struct SamplingEngine {
    fraction: f64,
    seed: u64,
}

impl Default for SamplingEngine {
    fn default() -> Self {
        SamplingEngine {
            fraction: DEFAULT_FRACTION,
            seed: DEFAULT_SEED,
        }
    }
}

impl SamplingEngine {
    /// Return a new SamplingEngine.
    ///
    /// # Arguments
    ///
    /// * `fraction`: Probability of including each record, in (0, 1]
    /// * `seed`: Base seed for the per-partition generators
    pub fn new(fraction: f64, seed: u64) -> Result<Self, ReductionError> {
        if let Err(err) = validate_fraction(fraction) {
            let mut errors = ValidationErrors::new();
            errors.add("fraction", err);
            return Err(errors.into());
        }
        Ok(SamplingEngine { fraction, seed })
    }

    pub fn fraction(&self) -> f64 {
        self.fraction
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Draw a sample, keeping it distributed.
    pub fn sample<S: Substrate>(
        &self,
        records: &Dataset<FilteredRecord, S>,
    ) -> Result<Dataset<FilteredRecord, S>, ReductionError> {
        records.sample(self.fraction, self.seed)
    }

    /// Draw a sample, keeping it distributed, and log its size.
    #[tracing::instrument(level = "DEBUG", skip_all, fields(fraction = self.fraction, seed = self.seed))]
    pub fn sample_logged<S: Substrate>(
        &self,
        records: &Dataset<FilteredRecord, S>,
        log: ExecutionLog,
    ) -> Result<(Dataset<FilteredRecord, S>, ExecutionLog), ReductionError> {
        let sample = self.sample(records)?;
        let log = log.append(format!(
            "{} rows reduced to {} rows after sampling {}%.",
            records.count(),
            sample.count(),
            percentage(self.fraction)
        ));
        Ok((sample, log))
    }

    /// Materialise a sample drawn by this engine locally.
    pub fn materialise<S: Substrate>(&self, sample: Dataset<FilteredRecord, S>) -> SampleSet {
        SampleSet {
            records: sample.collect(),
            fraction: self.fraction,
            seed: self.seed,
        }
    }

    /// Draw a sample and materialise it locally.
    pub fn sample_set<S: Substrate>(
        &self,
        records: &Dataset<FilteredRecord, S>,
        log: ExecutionLog,
    ) -> Result<(SampleSet, ExecutionLog), ReductionError> {
        let (sample, log) = self.sample_logged(records, log)?;
        Ok((self.materialise(sample), log))
    }
}
