use crate::models::*;

/// Create an input line with the given values and fixed values for other fields.
pub(crate) fn trip_line(payment_type: &str, trip_distance: &str, total_amount: &str, lon: &str, lat: &str) -> String {
    [
        "89D227B655E5C82AECF13C3F540D4CF4",
        "BA96DE419E711691B9445D6A6307C170",
        "2013-01-01 15:11:48",
        "2013-01-01 15:18:10",
        "382",
        trip_distance,
        lon,
        lat,
        "-73.978165",
        "40.757977",
        payment_type,
        "6.5",
        "0",
        "0.5",
        "0",
        "0",
        total_amount,
    ]
    .join(",")
}

/// Create a RawRecord with the given values and fixed values for other fields.
pub(crate) fn raw_record(payment_type: &str, trip_distance: &str, total_amount: &str, lon: &str, lat: &str) -> RawRecord {
    let line = trip_line(payment_type, trip_distance, total_amount, lon, lat);
    let fields: Vec<String> = line.split(',').map(str::to_string).collect();
    RawRecord::new(fields.try_into().unwrap())
}

/// Create a TypedRecord with a pickup location inside the default bounding box.
pub(crate) fn typed_record(payment_type: &str, trip_distance: Option<f64>, total_amount: Option<f64>) -> TypedRecord {
    TypedRecord {
        pickup_longitude: Some(-73.98),
        pickup_latitude: Some(40.75),
        trip_distance,
        payment_type: payment_type.to_string(),
        total_amount,
    }
}

/// Create a FilteredRecord with a pickup location inside the default bounding box.
pub(crate) fn filtered_record(payment_type: &str, trip_distance: f64, total_amount: Option<f64>) -> FilteredRecord {
    FilteredRecord {
        pickup_longitude: Some(-73.98),
        pickup_latitude: Some(40.75),
        trip_distance,
        payment_type: payment_type.to_string(),
        total_amount,
    }
}

/// The five worked example trips: distances, payment types and totals.
pub(crate) const EXAMPLE_TRIPS: [(f64, &str, f64); 5] = [
    (0.5, "cash", 5.0),
    (1.0, "cash", 10.0),
    (10.0, "card", 20.0),
    (50.0, "card", 30.0),
    (51.0, "cash", 40.0),
];

pub(crate) fn typed_records_example() -> Vec<TypedRecord> {
    EXAMPLE_TRIPS
        .iter()
        .map(|(distance, payment_type, total)| typed_record(payment_type, Some(*distance), Some(*total)))
        .collect()
}

/// The example trips that have a valid distance.
pub(crate) fn filtered_records_example() -> Vec<FilteredRecord> {
    EXAMPLE_TRIPS[1..4]
        .iter()
        .map(|(distance, payment_type, total)| filtered_record(payment_type, *distance, Some(*total)))
        .collect()
}

/// Input text for the example trips.
pub(crate) fn example_text() -> String {
    EXAMPLE_TRIPS
        .iter()
        .map(|(distance, payment_type, total)| {
            trip_line(payment_type, &distance.to_string(), &total.to_string(), "-73.98", "40.75") + "\n"
        })
        .collect()
}

/// Create `n` varied filtered records.
///
/// Pickup locations are spread across the default bounding box, with every tenth record outside
/// it and every twentieth without a latitude.
pub(crate) fn filtered_records_many(n: usize) -> Vec<FilteredRecord> {
    const PAYMENT_TYPES: [&str; 5] = ["CRD", "CSH", "DIS", "NOC", "UNK"];
    (0..n)
        .map(|i| {
            let lon = if i % 10 == 9 {
                -74.5
            } else {
                -74.05 + 0.3 * ((i * 37) % 1000) as f64 / 1000.0
            };
            let lat = if i % 20 == 19 {
                None
            } else {
                Some(40.63 + 0.22 * ((i * 53) % 1000) as f64 / 1000.0)
            };
            FilteredRecord {
                pickup_longitude: Some(lon),
                pickup_latitude: lat,
                trip_distance: 1.0 + ((i * 7) % 490) as f64 / 10.0,
                payment_type: PAYMENT_TYPES[i % PAYMENT_TYPES.len()].to_string(),
                total_amount: Some(2.5 + ((i * 13) % 1000) as f64 / 10.0),
            }
        })
        .collect()
}
