//! Validity filtering of typed records.

use validator::ValidationErrors;

use crate::engine::{Dataset, Substrate};
use crate::error::ReductionError;
use crate::execution_log::ExecutionLog;
use crate::metrics;
use crate::models::{FilteredRecord, TypedRecord};
use crate::types::{Truth, Validity};

/// Input and output counts of a filter.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct FilterSummary {
    pub input: usize,
    pub output: usize,
}

impl FilterSummary {
    /// Combine the summaries of two parts of a dataset.
    pub fn merge(self, other: &FilterSummary) -> Self {
        FilterSummary {
            input: self.input + other.input,
            output: self.output + other.output,
        }
    }

    /// Count the dropped rows in metrics and append the summary line to the log.
    pub fn record(&self, log: ExecutionLog) -> ExecutionLog {
        metrics::record_dropped("filtered", self.input - self.output);
        log.append(format!(
            "{} rows filtered to {} rows with valid trip distance.",
            self.input, self.output
        ))
    }
}

/// Keeps trips whose distance is known and within a valid range.
#[derive(Clone, Debug)]
pub struct TripFilter {
    trip_distance: Validity<f64>,
}

impl Default for TripFilter {
    fn default() -> Self {
        TripFilter {
            trip_distance: Validity::ValidRange(1.0, 50.0),
        }
    }
}

impl TripFilter {
    /// Return a new TripFilter, rejecting an empty or NaN range.
    pub fn new(trip_distance: Validity<f64>) -> Result<Self, ReductionError> {
        if let Err(err) = trip_distance.validate() {
            let mut errors = ValidationErrors::new();
            errors.add("trip_distance", err);
            return Err(errors.into());
        }
        Ok(TripFilter { trip_distance })
    }

    /// Evaluate the predicate for a record under three-valued logic.
    pub fn evaluate(&self, record: &TypedRecord) -> Truth {
        self.trip_distance.evaluate(record.trip_distance)
    }

    /// Return the filtered record if the predicate is true. Unknown excludes the record.
    pub fn apply(&self, record: TypedRecord) -> Option<FilteredRecord> {
        if !self.evaluate(&record).is_true() {
            return None;
        }
        let trip_distance = record.trip_distance?;
        Some(FilteredRecord {
            pickup_longitude: record.pickup_longitude,
            pickup_latitude: record.pickup_latitude,
            trip_distance,
            payment_type: record.payment_type,
            total_amount: record.total_amount,
        })
    }

    #[tracing::instrument(level = "DEBUG", skip_all)]
    pub fn filter<S: Substrate>(
        &self,
        records: Dataset<TypedRecord, S>,
        log: ExecutionLog,
    ) -> (Dataset<FilteredRecord, S>, FilterSummary, ExecutionLog) {
        let input = records.count();
        let filtered = records.filter_map(|record| self.apply(record));
        let summary = FilterSummary {
            input,
            output: filtered.count(),
        };
        let log = summary.record(log);
        (filtered, summary, log)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Rayon;
    use crate::test_utils;

    #[test]
    fn evaluate_bounds_inclusive() {
        let filter = TripFilter::default();
        let truth = |d: Option<f64>| filter.evaluate(&test_utils::typed_record("CSH", d, Some(1.0)));
        assert_eq!(Truth::False, truth(Some(0.5)));
        assert_eq!(Truth::True, truth(Some(1.0)));
        assert_eq!(Truth::True, truth(Some(10.0)));
        assert_eq!(Truth::True, truth(Some(50.0)));
        assert_eq!(Truth::False, truth(Some(50.000001)));
        assert_eq!(Truth::Unknown, truth(None));
    }

    #[test]
    fn apply_excludes_unknown() {
        let filter = TripFilter::default();
        assert_eq!(None, filter.apply(test_utils::typed_record("CSH", None, Some(5.0))));
        let kept = filter
            .apply(test_utils::typed_record("CSH", Some(2.0), None))
            .unwrap();
        assert_eq!(2.0, kept.trip_distance);
        assert_eq!(None, kept.total_amount);
    }

    #[test]
    fn apply_custom_validity() {
        let filter = TripFilter::new(Validity::ValidMin(0.0)).unwrap();
        assert!(filter
            .apply(test_utils::typed_record("CSH", Some(100.0), None))
            .is_some());
        assert!(filter
            .apply(test_utils::typed_record("CSH", Some(-1.0), None))
            .is_none());
    }

    #[test]
    fn new_rejects_inverted_range() {
        match TripFilter::new(Validity::ValidRange(50.0, 1.0)) {
            Err(ReductionError::ConfigValidation(errors)) => {
                assert!(errors.field_errors().contains_key("trip_distance"));
            }
            other => panic!("unexpected result {:?}", other),
        }
        assert!(TripFilter::new(Validity::ValidRange(f64::NAN, 1.0)).is_err());
        assert!(TripFilter::new(Validity::ValidRange(1.0, 1.0)).is_ok());
    }

    #[test]
    fn filter_keeps_only_valid_distances() {
        let records = test_utils::typed_records_example();
        let ds = Dataset::from_partitions(vec![records[..2].to_vec(), records[2..].to_vec()], Rayon);
        let (filtered, summary, log) = TripFilter::default().filter(ds, ExecutionLog::new());
        let filtered = filtered.collect();
        assert_eq!(FilterSummary { input: 5, output: 3 }, summary);
        assert!(filtered
            .iter()
            .all(|r| (1.0..=50.0).contains(&r.trip_distance)));
        let distances: Vec<f64> = filtered.iter().map(|r| r.trip_distance).collect();
        assert_eq!(vec![1.0, 10.0, 50.0], distances);
        assert_eq!(
            "5 rows filtered to 3 rows with valid trip distance.",
            log.entries()[0].message
        );
    }
}
