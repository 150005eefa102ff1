//! Record ingestion.
//!
//! Input lines are split naively on the delimiter (there is no quoting) and must yield exactly
//! [FIELD_COUNT] fields. Any other line is a recoverable [ParseError]: it is dropped and counted,
//! never allowed to shift the columns of a record.

use bytes::Bytes;
use thiserror::Error;

use crate::engine::{Dataset, Substrate};
use crate::execution_log::ExecutionLog;
use crate::metrics;
use crate::models::{RawRecord, FIELD_COUNT};

/// A line that could not be parsed into a [RawRecord].
#[derive(Clone, Debug, Error, PartialEq)]
pub enum ParseError {
    #[error("line {line}: expected {FIELD_COUNT} fields, found {found}")]
    FieldCount { line: u64, found: usize },

    #[error("line {line}: field {field} is not valid UTF-8")]
    InvalidUtf8 { line: u64, field: usize },

    #[error("line {line}: {reason}")]
    Read { line: u64, reason: String },
}

/// Outcome of ingesting a dataset.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct IngestSummary {
    pub parsed: usize,
    pub malformed: usize,
}

impl IngestSummary {
    /// Fraction of non-blank lines that were malformed.
    pub fn malformed_rate(&self) -> f64 {
        let total = self.parsed + self.malformed;
        if total == 0 {
            0.0
        } else {
            self.malformed as f64 / total as f64
        }
    }

    /// Combine the summaries of two parts of a dataset.
    pub fn merge(self, other: &IngestSummary) -> Self {
        IngestSummary {
            parsed: self.parsed + other.parsed,
            malformed: self.malformed + other.malformed,
        }
    }

    /// Count the outcome in metrics and append the summary line to the log.
    pub fn record(&self, log: ExecutionLog) -> ExecutionLog {
        metrics::RECORDS_INGESTED.inc_by(self.parsed as u64);
        metrics::record_dropped("malformed", self.malformed);
        if self.malformed > 0 {
            tracing::warn!("Skipped {} malformed lines", self.malformed);
        }
        log.append(format!(
            "{} lines parsed into records; {} malformed lines skipped.",
            self.parsed, self.malformed
        ))
    }
}

/// Parses delimited text into positional records.
#[derive(Clone, Copy, Debug)]
pub struct RecordIngestor {
    delimiter: u8,
}

impl Default for RecordIngestor {
    fn default() -> Self {
        Self::new(b',')
    }
}

impl RecordIngestor {
    pub fn new(delimiter: u8) -> Self {
        RecordIngestor { delimiter }
    }

    /// Parse a block of lines. Blank lines produce nothing.
    ///
    /// Line numbers in errors are relative to the start of the block.
    pub fn parse(&self, data: &[u8]) -> Vec<Result<RawRecord, ParseError>> {
        let mut results = Vec::new();
        self.parse_each(data, |result| results.push(result));
        results
    }

    /// Parse a block of lines, passing each outcome to `f` as soon as its line is read.
    pub fn parse_each<F>(&self, data: &[u8], mut f: F)
    where
        F: FnMut(Result<RawRecord, ParseError>),
    {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .quoting(false)
            .delimiter(self.delimiter)
            .from_reader(data);
        let mut record = csv::ByteRecord::new();
        loop {
            let line = reader.position().line();
            match reader.read_byte_record(&mut record) {
                Ok(false) => break,
                Ok(true) => {
                    if record.len() == 1 && record[0].is_empty() {
                        continue;
                    }
                    let line = record.position().map_or(line, |p| p.line());
                    f(Self::to_raw_record(&record, line));
                }
                Err(err) => {
                    f(Err(ParseError::Read {
                        line,
                        reason: err.to_string(),
                    }));
                    break;
                }
            }
        }
    }

    fn to_raw_record(record: &csv::ByteRecord, line: u64) -> Result<RawRecord, ParseError> {
        let fields = record
            .iter()
            .enumerate()
            .map(|(field, bytes)| {
                std::str::from_utf8(bytes)
                    .map(str::to_string)
                    .map_err(|_| ParseError::InvalidUtf8 { line, field })
            })
            .collect::<Result<Vec<String>, _>>()?;
        let found = fields.len();
        let fields: [String; FIELD_COUNT] = fields
            .try_into()
            .map_err(|_| ParseError::FieldCount { line, found })?;
        Ok(RawRecord::new(fields))
    }

    /// Parse every partition of raw text.
    ///
    /// Returns the parsed records, with one summary entry appended to the log.
    #[tracing::instrument(level = "DEBUG", skip_all)]
    pub fn ingest<S: Substrate>(
        &self,
        text: Dataset<Bytes, S>,
        log: ExecutionLog,
    ) -> (Dataset<RawRecord, S>, IngestSummary, ExecutionLog) {
        let parsed = text.map_partitions(|index, blocks| {
            let results: Vec<_> = blocks.iter().flat_map(|block| self.parse(block)).collect();
            for err in results.iter().filter_map(|r| r.as_ref().err()) {
                tracing::debug!("Skipping malformed line in partition {}: {}", index, err);
            }
            results
        });
        let malformed = parsed.count_where(Result::is_err);
        let records = parsed.filter_map(Result::ok);
        let summary = IngestSummary {
            parsed: records.count(),
            malformed,
        };
        let log = summary.record(log);
        (records, summary, log)
    }
}
