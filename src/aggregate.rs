//! Exact grouped aggregation.
//!
//! Each partition accumulates a `(sum, count)` pair per group. Pairs combine by elementwise
//! addition, which is associative with `(0, 0)` as identity, so the result does not depend on
//! how records are partitioned (up to floating point rounding). The mean is only computed once
//! all pairs have been combined.

use std::collections::BTreeMap;
use std::ops::Add;

use num_traits::{Float, NumCast};
use serde::Serialize;

use crate::engine::{Dataset, Substrate};
use crate::execution_log::ExecutionLog;
use crate::models::FilteredRecord;

/// Running sum and count of non-null values.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct MeanAccumulator<T> {
    pub sum: T,
    pub count: u64,
}

impl<T: Float> Default for MeanAccumulator<T> {
    fn default() -> Self {
        MeanAccumulator {
            sum: T::zero(),
            count: 0,
        }
    }
}

impl<T: Float> MeanAccumulator<T> {
    /// Accumulator for a single optional value. Null values are not counted.
    pub fn of(value: Option<T>) -> Self {
        match value {
            Some(value) => MeanAccumulator { sum: value, count: 1 },
            None => Self::default(),
        }
    }

    /// Mean of the accumulated values, or `None` if there are none.
    pub fn mean(&self) -> Option<T> {
        if self.count == 0 {
            None
        } else {
            <T as NumCast>::from(self.count).map(|count| self.sum / count)
        }
    }
}

impl<T: Float> Add for MeanAccumulator<T> {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        MeanAccumulator {
            sum: self.sum + other.sum,
            count: self.count + other.count,
        }
    }
}

/// Aggregate of one group.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct GroupMean {
    pub sum: f64,
    pub count: u64,
    /// `None` if every value in the group was null
    pub mean: Option<f64>,
}

impl From<MeanAccumulator<f64>> for GroupMean {
    fn from(acc: MeanAccumulator<f64>) -> Self {
        GroupMean {
            sum: acc.sum,
            count: acc.count,
            mean: acc.mean(),
        }
    }
}

/// Mean total amount per payment type, ordered by payment type.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct AggregationResult {
    pub groups: BTreeMap<String, GroupMean>,
}

impl AggregationResult {
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Mean of a group, if the group exists and has a non-null value.
    pub fn mean(&self, payment_type: &str) -> Option<f64> {
        self.groups.get(payment_type).and_then(|group| group.mean)
    }
}

/// Groups filtered records by payment type and averages their total amount.
#[derive(Clone, Copy, Debug, Default)]
pub struct AggregationEngine;

impl AggregationEngine {
    #[tracing::instrument(level = "DEBUG", skip_all)]
    pub fn aggregate<S: Substrate>(
        &self,
        records: &Dataset<FilteredRecord, S>,
        log: ExecutionLog,
    ) -> (AggregationResult, ExecutionLog) {
        let partial = records.group_reduce(
            |record| record.payment_type.clone(),
            |record| MeanAccumulator::of(record.total_amount),
            |a, b| a + b,
        );
        let result = AggregationResult {
            groups: partial
                .into_iter()
                .map(|(payment_type, acc)| (payment_type, GroupMean::from(acc)))
                .collect(),
        };
        let log = log.append(format!(
            "{} rows reduced to {} rows after aggregation.",
            records.count(),
            result.len()
        ));
        (result, log)
    }
}
