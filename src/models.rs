//! Data types and associated functions and methods

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

/// Number of positional fields in a raw trip record.
pub const FIELD_COUNT: usize = 17;

/// Fields of the trip record schema, in positional order.
#[derive(
    Clone, Copy, Debug, Deserialize, Display, EnumString, Eq, Hash, Ord, PartialEq, PartialOrd,
    Serialize,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Field {
    Medallion,
    HackLicense,
    PickupDatetime,
    DropoffDatetime,
    TripTimeInSecs,
    TripDistance,
    PickupLongitude,
    PickupLatitude,
    DropoffLongitude,
    DropoffLatitude,
    PaymentType,
    FareAmount,
    Surcharge,
    MtaTax,
    TipAmount,
    TollsAmount,
    TotalAmount,
}

impl Field {
    /// All fields, in the order in which they appear in a raw record.
    pub const ALL: [Field; FIELD_COUNT] = [
        Field::Medallion,
        Field::HackLicense,
        Field::PickupDatetime,
        Field::DropoffDatetime,
        Field::TripTimeInSecs,
        Field::TripDistance,
        Field::PickupLongitude,
        Field::PickupLatitude,
        Field::DropoffLongitude,
        Field::DropoffLatitude,
        Field::PaymentType,
        Field::FareAmount,
        Field::Surcharge,
        Field::MtaTax,
        Field::TipAmount,
        Field::TollsAmount,
        Field::TotalAmount,
    ];

    /// Position of the field within a raw record.
    pub fn index(self) -> usize {
        self as usize
    }
}

/// A line of input split into its positional fields.
///
/// Only constructed by the ingestor, which guarantees the field count.
#[derive(Clone, Debug, PartialEq)]
pub struct RawRecord {
    fields: [String; FIELD_COUNT],
}

impl RawRecord {
    /// Return a new RawRecord.
    pub fn new(fields: [String; FIELD_COUNT]) -> Self {
        RawRecord { fields }
    }

    /// Returns the text of a field.
    pub fn get(&self, field: Field) -> &str {
        &self.fields[field.index()]
    }
}

/// The projection of a raw record used by the reductions, with numeric fields cast.
///
/// `None` marks a value that could not be cast.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct TypedRecord {
    pub pickup_longitude: Option<f64>,
    pub pickup_latitude: Option<f64>,
    pub trip_distance: Option<f64>,
    pub payment_type: String,
    pub total_amount: Option<f64>,
}

/// A typed record that passed the validity filter.
///
/// The trip distance was used by the filter and is therefore always present.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FilteredRecord {
    pub pickup_longitude: Option<f64>,
    pub pickup_latitude: Option<f64>,
    pub trip_distance: f64,
    pub payment_type: String,
    pub total_amount: Option<f64>,
}

impl FilteredRecord {
    /// Pickup coordinates, if both are present.
    pub fn pickup(&self) -> Option<(f64, f64)> {
        self.pickup_longitude.zip(self.pickup_latitude)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_test::{assert_de_tokens, assert_de_tokens_error, Token};
    use std::str::FromStr;

    #[test]
    fn field_positions() {
        for (index, field) in Field::ALL.iter().enumerate() {
            assert_eq!(index, field.index());
        }
        assert_eq!(5, Field::TripDistance.index());
        assert_eq!(10, Field::PaymentType.index());
        assert_eq!(16, Field::TotalAmount.index());
    }

    #[test]
    fn field_names() {
        assert_eq!("pickup_latitude", Field::PickupLatitude.to_string());
        assert_eq!("trip_time_in_secs", Field::TripTimeInSecs.to_string());
        assert_eq!(Field::MtaTax, Field::from_str("mta_tax").unwrap());
        assert!(Field::from_str("pickup_latidue").is_err());
    }

    #[test]
    fn field_deserialise() {
        assert_de_tokens(
            &Field::TripDistance,
            &[
                Token::Enum { name: "Field" },
                Token::Str("trip_distance"),
                Token::Unit,
            ],
        );
    }

    #[test]
    fn field_deserialise_unknown() {
        assert_de_tokens_error::<Field>(
            &[Token::Enum { name: "Field" }, Token::Str("fare")],
            "unknown variant `fare`, expected one of `medallion`, `hack_license`, `pickup_datetime`, `dropoff_datetime`, `trip_time_in_secs`, `trip_distance`, `pickup_longitude`, `pickup_latitude`, `dropoff_longitude`, `dropoff_latitude`, `payment_type`, `fare_amount`, `surcharge`, `mta_tax`, `tip_amount`, `tolls_amount`, `total_amount`",
        );
    }

    #[test]
    fn raw_record_get() {
        let fields: [String; FIELD_COUNT] = std::array::from_fn(|i| i.to_string());
        let record = RawRecord::new(fields);
        assert_eq!("5", record.get(Field::TripDistance));
        assert_eq!("16", record.get(Field::TotalAmount));
    }

    #[test]
    fn filtered_record_pickup() {
        let mut record = FilteredRecord {
            pickup_longitude: Some(-73.9),
            pickup_latitude: Some(40.7),
            trip_distance: 2.0,
            payment_type: "CSH".to_string(),
            total_amount: None,
        };
        assert_eq!(Some((-73.9, 40.7)), record.pickup());
        record.pickup_latitude = None;
        assert_eq!(None, record.pickup());
    }
}
