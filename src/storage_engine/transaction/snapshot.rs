use crate::error::{Error, Result};
use crate::storage_engine::transaction::{Mode, Phase, Step, TxnId};
use core_models::state::StateRecord;
use serde::{Deserialize, Serialize};

/// The committed extent of a component: the {length, position} pair readers are pinned to.
/// What the position means depends on the component.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Watermark {
    pub length: u64,
    pub position: u64,
}

impl Watermark {
    pub fn new(length: u64, position: u64) -> Self {
        Self { length, position }
    }

    pub fn to_state(&self) -> StateRecord<2> {
        StateRecord::new([self.length, self.position])
    }

    pub fn from_state(state: &StateRecord<2>) -> Self {
        let [length, position] = *state.fields();
        Self { length, position }
    }

    /// Encodes the watermark as a journal payload.
    pub fn encode(&self) -> Vec<u8> {
        self.to_state().to_bytes().to_vec()
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let state = StateRecord::<2>::from_bytes(bytes)
            .map_err(|err| Error::Corruption(format!("Invalid watermark: {}", err)))?;
        Ok(Self::from_state(&state))
    }
}

/// A transaction's view of one component: the watermark taken at begin (or promote) and the
/// lifecycle phase. Owned by the transaction and passed back to the component on every call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TxnSnapshot {
    txn: TxnId,
    mode: Mode,
    watermark: Watermark,
    phase: Phase,
}

impl TxnSnapshot {
    pub fn new(txn: TxnId, mode: Mode, watermark: Watermark) -> Self {
        Self { txn, mode, watermark, phase: Phase::Active }
    }

    pub fn txn(&self) -> TxnId {
        self.txn
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn watermark(&self) -> Watermark {
        self.watermark
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// The watermark produced by commit-prepare, once prepared.
    pub fn prepared(&self) -> Option<Watermark> {
        match self.phase {
            Phase::Prepared(watermark) => Some(watermark),
            _ => None,
        }
    }

    /// Moves the snapshot to its next phase, or fails if the step is illegal.
    pub(crate) fn advance(&mut self, step: Step) -> Result<()> {
        self.phase = self.phase.step(step, self.mode)?;
        Ok(())
    }

    /// Turns a read snapshot into a write snapshot at the given watermark.
    pub(crate) fn promote(&mut self, watermark: Watermark) -> Result<()> {
        self.advance(Step::Promote)?;
        self.mode = Mode::ReadWrite;
        self.watermark = watermark;
        Ok(())
    }
}
