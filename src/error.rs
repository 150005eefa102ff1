//! Error handling.

use aws_sdk_s3::error::SdkError;
use aws_sdk_s3::operation::get_object::GetObjectError;
use aws_sdk_s3::operation::put_object::PutObjectError;
use aws_smithy_types::byte_stream::error::Error as ByteStreamError;
use serde::{Deserialize, Serialize};
use std::error::Error;
use strum_macros::Display;
use thiserror::Error;
use tokio::sync::AcquireError;
use tracing::{event, Level};

use crate::models::Field;
use crate::state::Stage;

/// Trip reduction error type
///
/// This type encapsulates the fatal errors that may occur during a run. Recoverable per-line
/// parse errors and per-value cast errors are counted by their stages and never surface here.
#[derive(Debug, Error)]
pub enum ReductionError {
    /// Invalid pipeline configuration
    #[error("pipeline configuration is not valid")]
    ConfigValidation(#[from] validator::ValidationErrors),

    /// Error decompressing input data
    #[error("failed to decompress data")]
    Decompression(#[source] std::io::Error),

    /// Too many records or points were dropped by a recoverable stage
    #[error("{what} drop rate exceeded ({dropped} of {total} > {limit})")]
    DropRateExceeded {
        what: &'static str,
        dropped: u64,
        total: u64,
        limit: f64,
    },

    /// A task running on the parallel substrate failed to complete
    #[error("parallel task failed to complete")]
    EngineJoin(#[from] tokio::task::JoinError),

    /// Error building the worker thread pool
    #[error("failed to build worker thread pool")]
    EngineThreadPool(#[from] rayon::ThreadPoolBuildError),

    /// Error encoding a rendered image
    #[error("failed to encode image")]
    ImageEncode(#[from] image::ImageError),

    /// The cast mapping does not cover a numeric field
    #[error("cast mapping has no numeric type for {field}")]
    IncompleteCastMapping { field: Field },

    /// Insufficient memory to materialise a reduced result locally
    #[error("Insufficient memory to materialise {what} locally ({requested} > {total})")]
    InsufficientMemory {
        what: &'static str,
        requested: usize,
        total: usize,
    },

    /// Unparseable storage location
    #[error("invalid storage location {location}: {reason}")]
    InvalidLocation {
        location: String,
        reason: &'static str,
    },

    /// Attempt to move the pipeline along an edge that does not exist
    #[error("invalid pipeline transition from {from} to {to}")]
    InvalidTransition { from: Stage, to: Stage },

    /// Error reading or writing the local filesystem
    #[error("error accessing {path}")]
    LocalIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Object does not exist in the store
    #[error("object {location} not found")]
    NotFound { location: String },

    /// Error drawing a chart
    #[error("failed to render {chart} chart: {reason}")]
    Render { chart: &'static str, reason: String },

    /// Error reading object data from S3
    #[error("error receiving object from S3 storage")]
    S3ByteStream(#[from] ByteStreamError),

    /// Error while retrieving an object from S3
    #[error("error retrieving object from S3 storage")]
    S3GetObject(#[from] SdkError<GetObjectError>),

    /// Error while uploading an object to S3
    #[error("error uploading object to S3 storage")]
    S3PutObject(#[from] SdkError<PutObjectError>),

    /// Sampling fraction outside of the unit interval
    #[error("invalid sampling fraction")]
    SamplingFraction(#[from] rand::distributions::BernoulliError),

    /// Error acquiring a semaphore
    #[error("error acquiring resources")]
    SemaphoreAcquireError(#[from] AcquireError),

    /// Error converting between integer types
    #[error(transparent)]
    TryFromInt(#[from] std::num::TryFromIntError),
}

/// Broad classification of a [ReductionError].
#[derive(Clone, Copy, Debug, Deserialize, Display, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ErrorKind {
    /// Invalid configuration, detected before any work is done
    Config,
    /// Failure of the parallel execution substrate
    Engine,
    /// A drop-rate or memory policy was violated
    Policy,
    /// Failure to render or encode an artifact
    Render,
    /// Failure to read input or write an output artifact
    Storage,
    /// A bug in the pipeline itself
    Internal,
}

impl From<&ReductionError> for ErrorKind {
    fn from(error: &ReductionError) -> Self {
        match error {
            ReductionError::ConfigValidation(_)
            | ReductionError::IncompleteCastMapping { field: _ }
            | ReductionError::SamplingFraction(_) => Self::Config,

            ReductionError::EngineJoin(_)
            | ReductionError::EngineThreadPool(_)
            | ReductionError::SemaphoreAcquireError(_) => Self::Engine,

            ReductionError::DropRateExceeded { .. }
            | ReductionError::InsufficientMemory { .. } => Self::Policy,

            ReductionError::ImageEncode(_) | ReductionError::Render { .. } => Self::Render,

            ReductionError::Decompression(_)
            | ReductionError::InvalidLocation { .. }
            | ReductionError::LocalIo { .. }
            | ReductionError::NotFound { location: _ }
            | ReductionError::S3ByteStream(_)
            | ReductionError::S3GetObject(_)
            | ReductionError::S3PutObject(_) => Self::Storage,

            ReductionError::InvalidTransition { .. } | ReductionError::TryFromInt(_) => {
                Self::Internal
            }
        }
    }
}

/// Report of a fatal error, suitable for presenting to an operator.
///
/// Implements serde (de)serialise.
#[derive(Debug, Deserialize, Serialize)]
pub struct ErrorReport {
    /// Classification of the error
    pub kind: ErrorKind,

    /// Main error message
    pub message: String,

    /// Optional list of causes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caused_by: Option<Vec<String>>,
}

impl ErrorReport {
    /// Return a new ErrorReport
    ///
    /// # Arguments
    ///
    /// * `error`: The error that occurred
    pub fn new(error: &ReductionError) -> Self {
        let message = error.to_string();
        let mut causes = Vec::new();
        let mut current = error.source();
        while let Some(source) = current {
            causes.push(source.to_string());
            current = source.source();
        }
        // Remove duplicate entries.
        causes.dedup();
        ErrorReport {
            kind: error.into(),
            message,
            caused_by: if causes.is_empty() {
                None
            } else {
                Some(causes)
            },
        }
    }
}

/// Log a fatal error and its causes, returning a report of it.
pub fn report(error: &ReductionError) -> ErrorReport {
    let report = ErrorReport::new(error);
    event!(Level::ERROR, kind = %report.kind, "{}", report.message);
    for cause in report.caused_by.iter().flatten() {
        event!(Level::ERROR, "Caused by: {}", cause);
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;

    use aws_sdk_s3::types::error::NoSuchKey;
    use aws_smithy_runtime_api::http::Response as SmithyResponse;
    use aws_smithy_runtime_api::http::StatusCode as SmithyStatusCode;
    use aws_smithy_types::error::ErrorMetadata as SmithyError;

    fn test_reduction_error(
        error: ReductionError,
        kind: ErrorKind,
        message: &str,
        caused_by: Option<Vec<&'static str>>,
    ) {
        let report = report(&error);
        // Round trip through JSON as the binary does.
        let json = serde_json::to_string_pretty(&report).unwrap();
        let report: ErrorReport = serde_json::from_str(&json).unwrap();
        assert_eq!(kind, report.kind);
        assert_eq!(message.to_string(), report.message);
        // Map Vec items from str to String
        let caused_by = caused_by.map(|cb| cb.iter().map(|s| s.to_string()).collect());
        assert_eq!(caused_by, report.caused_by);
    }

    #[test]
    fn decompression_error() {
        let io_error = std::io::Error::new(std::io::ErrorKind::InvalidInput, "corrupt deflate");
        let error = ReductionError::Decompression(io_error);
        let message = "failed to decompress data";
        let caused_by = Some(vec!["corrupt deflate"]);
        test_reduction_error(error, ErrorKind::Storage, message, caused_by);
    }

    #[test]
    fn drop_rate_exceeded() {
        let error = ReductionError::DropRateExceeded {
            what: "malformed line",
            dropped: 3,
            total: 10,
            limit: 0.25,
        };
        let message = "malformed line drop rate exceeded (3 of 10 > 0.25)";
        test_reduction_error(error, ErrorKind::Policy, message, None);
    }

    #[test]
    fn incomplete_cast_mapping() {
        let error = ReductionError::IncompleteCastMapping {
            field: Field::TotalAmount,
        };
        let message = "cast mapping has no numeric type for total_amount";
        test_reduction_error(error, ErrorKind::Config, message, None);
    }

    #[test]
    fn insufficient_memory() {
        let error = ReductionError::InsufficientMemory {
            what: "sample",
            requested: 2,
            total: 1,
        };
        let message = "Insufficient memory to materialise sample locally (2 > 1)";
        test_reduction_error(error, ErrorKind::Policy, message, None);
    }

    #[test]
    fn invalid_transition() {
        let error = ReductionError::InvalidTransition {
            from: Stage::Aggregated,
            to: Stage::Binned,
        };
        let message = "invalid pipeline transition from aggregated to binned";
        test_reduction_error(error, ErrorKind::Internal, message, None);
    }

    #[test]
    fn local_io_error() {
        let error = ReductionError::LocalIo {
            path: "/data/trips.csv".to_string(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
        };
        let message = "error accessing /data/trips.csv";
        let caused_by = Some(vec!["no such file"]);
        test_reduction_error(error, ErrorKind::Storage, message, caused_by);
    }

    #[test]
    fn render_error() {
        let error = ReductionError::Render {
            chart: "bar",
            reason: "font not found".to_string(),
        };
        let message = "failed to render bar chart: font not found";
        test_reduction_error(error, ErrorKind::Render, message, None);
    }

    #[test]
    fn sampling_fraction_error() {
        let bernoulli_error = rand::distributions::Bernoulli::new(1.5).unwrap_err();
        let error = ReductionError::SamplingFraction(bernoulli_error);
        let message = "invalid sampling fraction";
        let caused_by = Some(vec!["p is outside [0, 1] in Bernoulli distribution"]);
        test_reduction_error(error, ErrorKind::Config, message, caused_by);
    }

    #[test]
    fn try_from_int_error() {
        let error = ReductionError::TryFromInt(u8::try_from(-1_i8).unwrap_err());
        let message = "out of range integral type conversion attempted";
        test_reduction_error(error, ErrorKind::Internal, message, None);
    }

    fn get_smithy_response() -> SmithyResponse {
        let sdk_body = "body";
        let status: SmithyStatusCode = 400.try_into().unwrap();
        SmithyResponse::new(status, sdk_body.into())
    }

    #[test]
    fn s3_get_object_error() {
        // Jump through hoops to create an SdkError.
        let no_such_key = NoSuchKey::builder().build();
        let get_object_error = GetObjectError::NoSuchKey(no_such_key);
        let sdk_error = SdkError::service_error(get_object_error, get_smithy_response());
        let error = ReductionError::S3GetObject(sdk_error);
        let message = "error retrieving object from S3 storage";
        let caused_by = Some(vec!["service error", "NoSuchKey"]);
        test_reduction_error(error, ErrorKind::Storage, message, caused_by);
    }

    #[test]
    fn s3_put_object_access_denied_error() {
        // Jump through hoops to create an SdkError.
        let smithy_error = SmithyError::builder()
            .message("fake smithy error")
            .code("AccessDenied")
            .build();
        let put_object_error = PutObjectError::generic(smithy_error);
        let sdk_error = SdkError::service_error(put_object_error, get_smithy_response());
        let error = ReductionError::S3PutObject(sdk_error);
        let message = "error uploading object to S3 storage";
        let caused_by = Some(vec![
            "service error",
            "unhandled error (AccessDenied)",
            "Error { code: \"AccessDenied\", message: \"fake smithy error\" }",
        ]);
        test_reduction_error(error, ErrorKind::Storage, message, caused_by);
    }

    #[test]
    fn s3_byte_stream_error() {
        // ByteStreamError provides a From impl for std::io:Error.
        let error = ReductionError::S3ByteStream(
            std::io::Error::from(std::io::ErrorKind::UnexpectedEof).into(),
        );
        let message = "error receiving object from S3 storage";
        let caused_by = Some(vec!["IO error", "unexpected end of file"]);
        test_reduction_error(error, ErrorKind::Storage, message, caused_by);
    }

    #[tokio::test]
    async fn semaphore_acquire_error() {
        let sem = tokio::sync::Semaphore::new(1);
        sem.close();
        let error = ReductionError::SemaphoreAcquireError(sem.acquire().await.unwrap_err());
        let message = "error acquiring resources";
        let caused_by = Some(vec!["semaphore closed"]);
        test_reduction_error(error, ErrorKind::Engine, message, caused_by);
    }

    #[test]
    fn error_kind_display() {
        assert_eq!("storage", ErrorKind::Storage.to_string());
        assert_eq!("policy", ErrorKind::Policy.to_string());
    }
}
