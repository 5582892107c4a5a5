use crate::error::{Error, Result};
use crate::storage_engine::transaction::{Mode, Watermark};

/// Lifecycle phase of a transaction on one component.
///
/// Active ──prepare──▶ Prepared ──commit──▶ Committed ──commit_end──▶ Ended ──┐
///   │                    │                                                   ├─complete─▶ Complete
///   └───────abort────────┴───────────────────────────────▶ Aborted ──────────┘
///
/// A read-only transaction may also complete straight from Active.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Active,
    /// Pending writes are flushed; holds the watermark that commit will publish.
    Prepared(Watermark),
    /// The watermark has advanced.
    Committed,
    Ended,
    Aborted,
    Complete,
}

/// A lifecycle call, as applied to a phase.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Step {
    Promote,
    Prepare(Watermark),
    Commit,
    CommitEnd,
    Abort,
    Complete,
}

impl Phase {
    /// Returns the phase reached by taking a step, or a concurrency misuse error if the step is
    /// not allowed from this phase.
    pub fn step(self, step: Step, mode: Mode) -> Result<Phase> {
        let next = match (self, step) {
            (Phase::Active, Step::Promote) if !mode.mutable() => Phase::Active,
            (Phase::Active, Step::Prepare(watermark)) => Phase::Prepared(watermark),
            (Phase::Prepared(_), Step::Commit) => Phase::Committed,
            (Phase::Committed, Step::CommitEnd) => Phase::Ended,
            (Phase::Active | Phase::Prepared(_), Step::Abort) => Phase::Aborted,
            (Phase::Ended | Phase::Aborted | Phase::Complete, Step::Complete) => Phase::Complete,
            (Phase::Active, Step::Complete) if !mode.mutable() => Phase::Complete,
            (phase, step) => {
                return Err(Error::ConcurrencyMisuse(format!(
                    "Cannot {:?} a {:?} transaction in phase {:?}",
                    step, mode, phase
                )))
            }
        };
        Ok(next)
    }

    /// Whether the transaction no longer takes part in reads or writes.
    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Ended | Self::Aborted | Self::Complete)
    }
}
