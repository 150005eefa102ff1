//! Fused ingestion, casting and filtering.
//!
//! The three record-level preprocessing stages run back to back over each line of a partition,
//! so neither the raw nor the typed records of a partition are ever held in full. Each partition
//! consumes its text blocks and yields only its filtered records and the partial summaries of
//! every stage. The partial summaries combine by addition in partition order, and the combined
//! summaries match those of running the stages one after another.

use bytes::Bytes;

use crate::cast::{CastSummary, TypeCaster};
use crate::engine::{Dataset, Substrate};
use crate::filter::{FilterSummary, TripFilter};
use crate::ingest::{IngestSummary, RecordIngestor};
use crate::models::FilteredRecord;

/// Summaries of the ingest, cast and filter stages.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PreprocessSummary {
    pub ingest: IngestSummary,
    pub cast: CastSummary,
    pub filter: FilterSummary,
}

impl PreprocessSummary {
    pub fn merge(self, other: &PreprocessSummary) -> Self {
        PreprocessSummary {
            ingest: self.ingest.merge(&other.ingest),
            cast: self.cast.merge(&other.cast),
            filter: self.filter.merge(&other.filter),
        }
    }
}

/// Ingests, casts and filters text in a single pass per partition.
#[derive(Clone, Debug, Default)]
pub struct Preprocessor {
    ingestor: RecordIngestor,
    caster: TypeCaster,
    filter: TripFilter,
}

impl Preprocessor {
    pub fn new(ingestor: RecordIngestor, caster: TypeCaster, filter: TripFilter) -> Self {
        Preprocessor {
            ingestor,
            caster,
            filter,
        }
    }

    fn preprocess_partition(&self, index: usize, blocks: Vec<Bytes>) -> (Vec<FilteredRecord>, PreprocessSummary) {
        let mut records = Vec::new();
        let mut summary = PreprocessSummary::default();
        for block in blocks {
            self.ingestor.parse_each(&block, |result| match result {
                Ok(raw) => {
                    summary.ingest.parsed += 1;
                    let (typed, errors) = self.caster.cast_record(&raw);
                    summary.cast.count(&errors);
                    summary.filter.input += 1;
                    if let Some(record) = self.filter.apply(typed) {
                        summary.filter.output += 1;
                        records.push(record);
                    }
                }
                Err(err) => {
                    summary.ingest.malformed += 1;
                    tracing::debug!("Skipping malformed line in partition {}: {}", index, err);
                }
            });
        }
        (records, summary)
    }

    /// Preprocess every partition of raw text.
    ///
    /// The text blocks are consumed, and each is released once its lines have been read.
    #[tracing::instrument(level = "DEBUG", skip_all)]
    pub fn preprocess<S: Substrate>(
        &self,
        text: Dataset<Bytes, S>,
    ) -> (Dataset<FilteredRecord, S>, PreprocessSummary) {
        let (records, summaries) =
            text.map_partitions_with(|index, blocks| self.preprocess_partition(index, blocks));
        let summary = summaries
            .iter()
            .fold(PreprocessSummary::default(), |total, partial| total.merge(partial));
        (records, summary)
    }
}
