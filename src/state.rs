//! Pipeline state machine.
//!
//! ```text
//! Init -> Ingested -> Typed -> Filtered -> {Aggregated, Sampled} -> Binned -> Exported -> Done
//! ```
//!
//! Aggregation and sampling are independent branches from `Filtered` and may complete in either
//! order. Binning only follows sampling. Any non-terminal stage may fail, and `Failed` is terminal:
//! there is no retry edge.

use strum_macros::Display;

use crate::error::ReductionError;

/// Pipeline stages.
#[derive(Clone, Copy, Debug, Display, Eq, PartialEq)]
#[strum(serialize_all = "lowercase")]
pub enum Stage {
    Init,
    Ingested,
    Typed,
    Filtered,
    Aggregated,
    Sampled,
    Binned,
    Exported,
    Done,
    Failed,
}

/// Current stage of a run, plus which of the concurrent branches have completed.
#[derive(Clone, Debug)]
pub struct PipelineState {
    current: Stage,
    aggregated: bool,
    sampled: bool,
}

impl Default for PipelineState {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineState {
    pub fn new() -> Self {
        PipelineState {
            current: Stage::Init,
            aggregated: false,
            sampled: false,
        }
    }

    pub fn current(&self) -> Stage {
        self.current
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.current, Stage::Done | Stage::Failed)
    }

    fn can_advance(&self, to: Stage) -> bool {
        use Stage::*;
        match (self.current, to) {
            (Done | Failed, _) => false,
            (_, Failed) => true,
            (Init, Ingested) | (Ingested, Typed) | (Typed, Filtered) => true,
            (Filtered | Sampled, Aggregated) => !self.aggregated,
            (Filtered | Aggregated, Sampled) => !self.sampled,
            (Sampled, Binned) => true,
            (Binned, Exported) => self.aggregated,
            (Exported, Done) => true,
            _ => false,
        }
    }

    /// Move to the next stage.
    ///
    /// Returns an error, leaving the state unchanged, if there is no edge to `to`.
    pub fn advance(&mut self, to: Stage) -> Result<(), ReductionError> {
        if !self.can_advance(to) {
            return Err(ReductionError::InvalidTransition {
                from: self.current,
                to,
            });
        }
        tracing::debug!("Pipeline stage {} -> {}", self.current, to);
        match to {
            Stage::Aggregated => self.aggregated = true,
            Stage::Sampled => self.sampled = true,
            _ => (),
        }
        self.current = to;
        Ok(())
    }

    /// Move to the terminal failed stage. Has no effect on a terminal state.
    pub fn fail(&mut self) {
        if !self.is_terminal() {
            tracing::debug!("Pipeline stage {} -> {}", self.current, Stage::Failed);
            self.current = Stage::Failed;
        }
    }
}
