use std::sync::Once;

use lazy_static::lazy_static;
use prometheus::{self, Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry};

lazy_static! {
    // Registry for holding metric state
    pub static ref REGISTRY: Registry = Registry::new();
    // Records parsed from input lines
    pub static ref RECORDS_INGESTED: IntCounter = IntCounter::new(
        "records_ingested", "The number of records parsed from input lines"
    ).unwrap();
    // Records or points dropped, by reason
    pub static ref RECORDS_DROPPED: IntCounterVec = IntCounterVec::new(
        Opts::new("records_dropped", "The number of records or points dropped"),
        &["reason"]
    ).unwrap();
    // Values that could not be cast and became null
    pub static ref CAST_NULLS: IntCounter = IntCounter::new(
        "cast_nulls", "The number of field values that failed to cast to a numeric type"
    ).unwrap();
    // Bytes of artifacts written, by artifact type
    pub static ref ARTIFACT_BYTES: IntCounterVec = IntCounterVec::new(
        Opts::new("artifact_bytes", "The number of bytes written to artifact storage"),
        &["content_type"]
    ).unwrap();
    // Stage histogram by duration
    pub static ref STAGE_TIME_COLLECTOR: HistogramVec = HistogramVec::new(
        HistogramOpts{
            common_opts: Opts::new("stage_time", "The time taken by each pipeline stage"),
            buckets: prometheus::DEFAULT_BUCKETS.to_vec(), // Change buckets here if desired
        },
        &["stage"],
    ).unwrap();
}

static REGISTER: Once = Once::new();

/// Register all metrics with [REGISTRY]. Calls after the first are no-ops.
pub fn register_metrics() {
    REGISTER.call_once(register_all);
}

fn register_all() {
    REGISTRY
        .register(Box::new(RECORDS_INGESTED.clone()))
        .unwrap();
    REGISTRY
        .register(Box::new(RECORDS_DROPPED.clone()))
        .unwrap();
    REGISTRY.register(Box::new(CAST_NULLS.clone())).unwrap();
    REGISTRY
        .register(Box::new(ARTIFACT_BYTES.clone()))
        .unwrap();
    REGISTRY
        .register(Box::new(STAGE_TIME_COLLECTOR.clone()))
        .unwrap();
}

/// Render all registered metrics in the Prometheus text exposition format.
pub fn metrics_text() -> String {
    let encoder = prometheus::TextEncoder::new();
    let mut buffer = Vec::new();

    encoder.encode(&REGISTRY.gather(), &mut buffer).unwrap();

    String::from_utf8(buffer).unwrap()
}

/// Count dropped records, labelled by reason
pub fn record_dropped(reason: &str, count: usize) {
    RECORDS_DROPPED
        .with_label_values(&[reason])
        .inc_by(count as u64);
}

/// Observe the duration of a pipeline stage
pub fn record_stage_time(stage: &str, elapsed: std::time::Duration) {
    STAGE_TIME_COLLECTOR
        .with_label_values(&[stage])
        .observe(elapsed.as_secs_f64());
}
