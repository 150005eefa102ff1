//! Validity descriptors
//!
//! A validity descriptor states which values of a numeric field are acceptable. Bounds are
//! inclusive. We support:
//!
//! * A valid minimum value
//! * A valid maximum value
//! * A valid range of values

use serde::{Deserialize, Serialize};
use validator::ValidationError;

use crate::types::Truth;

/// Valid values of a field
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Validity<T> {
    /// Valid minimum
    ValidMin(T),
    /// Valid maximum
    ValidMax(T),
    /// Valid range
    ValidRange(T, T),
}

impl<T: Copy + PartialOrd + Serialize> Validity<T> {
    /// Validate the descriptor itself: a range must not be empty.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if let Validity::ValidRange(min, max) = self {
            // Written so that NaN bounds are also rejected.
            if !(min <= max) {
                let mut error = ValidationError::new("Valid range min must not exceed max");
                error.add_param("min".into(), min);
                error.add_param("max".into(), max);
                return Err(error);
            }
        }
        Ok(())
    }

    /// Evaluate the descriptor against an optional value.
    ///
    /// Returns [Truth::Unknown] for a null value.
    pub fn evaluate(&self, x: Option<T>) -> Truth {
        match self {
            Validity::ValidMin(min) => Truth::ge(x, *min),
            Validity::ValidMax(max) => Truth::le(x, *max),
            Validity::ValidRange(min, max) => Truth::ge(x, *min) & Truth::le(x, *max),
        }
    }
}
