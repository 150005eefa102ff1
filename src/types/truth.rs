//! Three-valued logic
//!
//! Comparisons against a value that may be null have three outcomes: true, false, or unknown when
//! the value is null. Predicates are conjunctions under Kleene's strong logic, and a record is kept
//! only when its predicate is [Truth::True]. Unknown is never silently treated as true.

use std::ops::BitAnd;

/// A three-valued truth value.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Truth {
    True,
    False,
    Unknown,
}

impl Truth {
    /// Collapse to a boolean for selection: only [Truth::True] selects.
    pub fn is_true(self) -> bool {
        self == Truth::True
    }

    /// Compare an optional value against a bound with `cmp`.
    ///
    /// A null operand yields [Truth::Unknown]. Incomparable values (NaN) yield [Truth::False].
    pub fn compare<T, F>(value: Option<T>, bound: T, cmp: F) -> Truth
    where
        F: FnOnce(&T, &T) -> bool,
    {
        match value {
            None => Truth::Unknown,
            Some(value) => cmp(&value, &bound).into(),
        }
    }

    /// `value >= bound`
    pub fn ge<T: PartialOrd>(value: Option<T>, bound: T) -> Truth {
        Self::compare(value, bound, |x, b| x >= b)
    }

    /// `value <= bound`
    pub fn le<T: PartialOrd>(value: Option<T>, bound: T) -> Truth {
        Self::compare(value, bound, |x, b| x <= b)
    }
}

impl From<bool> for Truth {
    fn from(value: bool) -> Self {
        if value {
            Truth::True
        } else {
            Truth::False
        }
    }
}

impl BitAnd for Truth {
    type Output = Truth;

    fn bitand(self, rhs: Truth) -> Truth {
        match (self, rhs) {
            (Truth::False, _) | (_, Truth::False) => Truth::False,
            (Truth::True, Truth::True) => Truth::True,
            _ => Truth::Unknown,
        }
    }
}
