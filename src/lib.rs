//! This crate reduces a large collection of taxi trip records to a handful of small artifacts: a
//! bar chart of the mean total amount per payment type, a scatter plot of trip distance against
//! total amount for a random sample of trips, and a density map of pickup locations shaded by
//! mean trip distance. A timestamped execution log of row counts and stage durations is written
//! alongside them.
//!
//! Input lines are split into partitions and every record-level stage runs independently per
//! partition. Only reduced results (the per-payment-type means, the sample and the density grid)
//! are ever materialised in one place.
//!
//! The pipeline is built on top of a number of open source components.
//!
//! * [Tokio](tokio), the most popular asynchronous Rust runtime.
//! * [Rayon](rayon) executes partitions in parallel on a work-stealing thread pool.
//! * [AWS SDK for S3](aws-sdk-s3) is used to interact with S3-compatible object stores.
//! * [ndarray] provides the two dimensional arrays used to accumulate the density map.
//! * [plotters] draws charts and [image] encodes them as PNG.

pub mod aggregate;
pub mod cast;
pub mod cli;
pub mod compression;
pub mod config;
pub mod engine;
pub mod error;
pub mod execution_log;
pub mod export;
pub mod filter;
pub mod grid;
pub mod ingest;
pub mod metrics;
pub mod models;
pub mod pipeline;
pub mod preprocess;
pub mod render;
pub mod resource_manager;
pub mod s3_client;
pub mod sample;
pub mod shade;
pub mod state;
pub mod store;
#[cfg(test)]
pub mod test_utils;
pub mod tracing;
pub mod types;
