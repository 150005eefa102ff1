//! Casting of raw text fields to numeric types.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use strum_macros::Display;

use crate::engine::{Dataset, Substrate};
use crate::error::ReductionError;
use crate::execution_log::ExecutionLog;
use crate::metrics;
use crate::models::{Field, RawRecord, TypedRecord};

/// Numeric types that a field may be cast to.
#[derive(Clone, Copy, Debug, Deserialize, Display, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum NumericType {
    /// 64-bit floating point
    Double,
    /// 32-bit floating point, widened on output
    Float,
}

impl NumericType {
    /// Parse text as this type.
    ///
    /// Surrounding whitespace is ignored. Unparseable text and non-finite values give `None`.
    pub fn parse(self, text: &str) -> Option<f64> {
        let text = text.trim();
        let value = match self {
            NumericType::Double => text.parse::<f64>().ok(),
            NumericType::Float => text.parse::<f32>().ok().map(f64::from),
        };
        value.filter(|v| v.is_finite())
    }
}

/// Fields which must be designated numeric for a [TypedRecord] to be produced.
pub const NUMERIC_FIELDS: [Field; 4] = [
    Field::PickupLongitude,
    Field::PickupLatitude,
    Field::TripDistance,
    Field::TotalAmount,
];

/// A value that could not be cast. The field becomes null.
#[derive(Clone, Debug, PartialEq)]
pub struct CastError {
    pub field: Field,
}

/// Counts of null values produced by casting, per field.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CastSummary {
    pub records: usize,
    pub nulls: BTreeMap<Field, usize>,
}

impl CastSummary {
    pub fn total_nulls(&self) -> usize {
        self.nulls.values().sum()
    }

    /// Count one cast record and the fields of it that failed to cast.
    pub fn count(&mut self, errors: &[CastError]) {
        self.records += 1;
        for error in errors {
            *self.nulls.entry(error.field).or_default() += 1;
        }
    }

    /// Combine the summaries of two parts of a dataset.
    pub fn merge(mut self, other: &CastSummary) -> Self {
        self.records += other.records;
        for (field, count) in &other.nulls {
            *self.nulls.entry(*field).or_default() += count;
        }
        self
    }

    /// Count the null values in metrics and append the summary line to the log.
    pub fn record(&self, log: ExecutionLog) -> ExecutionLog {
        metrics::CAST_NULLS.inc_by(self.total_nulls() as u64);
        for (field, count) in &self.nulls {
            tracing::warn!("{} values of {} could not be cast and were set to null", count, field);
        }
        log.append(format!(
            "{} records typed; {} values could not be cast and were set to null.",
            self.records,
            self.total_nulls()
        ))
    }
}

/// Casts raw records to typed records according to a field mapping.
#[derive(Clone, Debug)]
pub struct TypeCaster {
    mapping: BTreeMap<Field, NumericType>,
}

impl Default for TypeCaster {
    fn default() -> Self {
        TypeCaster {
            mapping: NUMERIC_FIELDS
                .iter()
                .map(|field| (*field, NumericType::Double))
                .collect(),
        }
    }
}

impl TypeCaster {
    /// Return a new TypeCaster.
    ///
    /// # Arguments
    ///
    /// * `mapping`: Numeric type for each designated field. Must include every field in
    ///   [NUMERIC_FIELDS].
    pub fn new(mapping: BTreeMap<Field, NumericType>) -> Result<Self, ReductionError> {
        if let Some(field) = NUMERIC_FIELDS.iter().find(|f| !mapping.contains_key(f)) {
            return Err(ReductionError::IncompleteCastMapping { field: *field });
        }
        Ok(TypeCaster { mapping })
    }

    fn cast_field(&self, record: &RawRecord, field: Field, errors: &mut Vec<CastError>) -> Option<f64> {
        // The constructor guarantees that every numeric field is mapped.
        let numeric_type = self.mapping.get(&field).copied().unwrap_or(NumericType::Double);
        let value = numeric_type.parse(record.get(field));
        if value.is_none() {
            errors.push(CastError { field });
        }
        value
    }

    /// Cast a single record, returning the fields that failed to cast.
    pub fn cast_record(&self, record: &RawRecord) -> (TypedRecord, Vec<CastError>) {
        let mut errors = Vec::new();
        let typed = TypedRecord {
            pickup_longitude: self.cast_field(record, Field::PickupLongitude, &mut errors),
            pickup_latitude: self.cast_field(record, Field::PickupLatitude, &mut errors),
            trip_distance: self.cast_field(record, Field::TripDistance, &mut errors),
            payment_type: record.get(Field::PaymentType).to_string(),
            total_amount: self.cast_field(record, Field::TotalAmount, &mut errors),
        };
        (typed, errors)
    }

    /// Cast every record. Cast failures are counted and logged, never raised.
    #[tracing::instrument(level = "DEBUG", skip_all)]
    pub fn cast<S: Substrate>(
        &self,
        records: Dataset<RawRecord, S>,
        log: ExecutionLog,
    ) -> (Dataset<TypedRecord, S>, CastSummary, ExecutionLog) {
        let cast = records.map(|record| self.cast_record(&record));
        let summary = cast.reduce(
            CastSummary::default,
            |mut summary, (_, errors)| {
                summary.count(errors);
                summary
            },
            |left, right| left.merge(&right),
        );
        let typed = cast.map(|(record, _)| record);
        let log = summary.record(log);
        (typed, summary, log)
    }
}
