mod binary_file;
mod blob;
mod state_file;
mod tree;

pub use binary_file::*;
pub use blob::*;
pub use state_file::*;
pub use tree::*;

use crate::config::StoreOptions;
use crate::error::{Error, Result};
use crate::storage_engine::transaction::{
    ComponentId, Mode, Phase, Step, TransactionalComponent, TxnId, TxnSnapshot, Watermark,
};
use log::{debug, error, info, warn};

/// The storage behind a transactional component. The lifecycle logic lives in `Component`;
/// a backend only knows how to turn its resource into a watermark and back.
pub trait ComponentBackend {
    /// The watermark of a resource nothing was ever committed to.
    fn initial_watermark(&self) -> Watermark;

    /// Pushes pending writes into the resource and returns the watermark they produce.
    fn flush(&mut self) -> Result<Watermark>;

    /// Makes the resource durable.
    fn sync(&mut self) -> Result<()>;

    /// The physical length of the resource, committed or not.
    fn physical_length(&self) -> u64;

    /// Drops everything past the given length.
    fn truncate(&mut self, length: u64) -> Result<()>;

    /// Resets in-memory state to a committed watermark.
    fn restore(&mut self, watermark: &Watermark) -> Result<()>;

    /// Called when a write transaction starts from the committed watermark.
    fn begin_write(&mut self, watermark: &Watermark) -> Result<()>;

    fn close(&mut self) -> Result<()>;
}

/// A transactional component over a backend: tracks the committed watermark, the single
/// active writer and recovery, and persists the watermark to a state file on commit.
///
/// A failure during abort or recovery halts the component, after which every call returns
/// a corruption error.
#[derive(Debug)]
pub struct Component<B: ComponentBackend> {
    id: ComponentId,
    backend: B,
    state: StateFile,
    options: StoreOptions,
    /// The committed watermark, as seen by new transactions.
    watermark: Watermark,
    writer: Option<TxnId>,
    recovering: bool,
    halted: bool,
}

impl<B: ComponentBackend> Component<B> {
    /// Wraps a backend, loading the committed watermark from the state file. A missing state
    /// file starts from the backend's initial watermark.
    pub fn with_backend(id: ComponentId, mut backend: B, mut state: StateFile, options: StoreOptions) -> Result<Self> {
        let watermark = match state.read()? {
            Some(watermark) => watermark,
            None => {
                let watermark = backend.initial_watermark();
                state.write(&watermark)?;
                watermark
            }
        };
        backend.restore(&watermark)?;
        debug!("Opened {} at {:?}", id, watermark);
        Ok(Self { id, backend, state, options, watermark, writer: None, recovering: false, halted: false })
    }

    /// The committed watermark.
    pub fn watermark(&self) -> Watermark {
        self.watermark
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Whether the snapshot belongs to the active write transaction.
    pub fn is_writer(&self, snapshot: &TxnSnapshot) -> bool {
        snapshot.mode().mutable() && self.writer == Some(snapshot.txn())
    }

    fn check_live(&self) -> Result<()> {
        if self.halted {
            return Err(Error::Corruption(format!("{} is halted after a fatal failure", self.id)));
        }
        if self.recovering {
            return Err(Error::ConcurrencyMisuse(format!("{} is recovering", self.id)));
        }
        Ok(())
    }

    /// Checks that the snapshot may read: the transaction is live on this component.
    fn check_read(&self, snapshot: &TxnSnapshot) -> Result<()> {
        self.check_live()?;
        if snapshot.phase().is_finished() {
            return Err(Error::ConcurrencyMisuse(format!(
                "Transaction {} is {:?} on {}",
                snapshot.txn(),
                snapshot.phase(),
                self.id
            )));
        }
        Ok(())
    }

    /// Checks that the snapshot may write: it is the active writer and has not prepared.
    fn check_write(&self, snapshot: &TxnSnapshot) -> Result<()> {
        self.check_live()?;
        if !snapshot.mode().mutable() {
            return Err(Error::ReadOnly);
        }
        if !self.is_writer(snapshot) || snapshot.phase() != Phase::Active {
            return Err(Error::ConcurrencyMisuse(format!(
                "Transaction {} is not the active writer of {}",
                snapshot.txn(),
                self.id
            )));
        }
        Ok(())
    }

    /// Checks that the snapshot is the writer, in any phase.
    fn check_writer(&self, snapshot: &TxnSnapshot) -> Result<()> {
        if !self.is_writer(snapshot) {
            return Err(Error::ConcurrencyMisuse(format!(
                "Transaction {} is not the writer of {}",
                snapshot.txn(),
                self.id
            )));
        }
        Ok(())
    }

    /// Truncates the backend to a committed watermark, syncs and restores it.
    fn rollback(&mut self, watermark: &Watermark) -> Result<()> {
        self.backend.truncate(watermark.length)?;
        self.backend.sync()?;
        self.backend.restore(watermark)
    }

    fn halt(&mut self, err: Error) -> Error {
        error!("Halting {}: {}", self.id, err);
        self.halted = true;
        err
    }

    fn take_writer(&mut self) -> Result<()> {
        if let Some(writer) = self.writer {
            return Err(Error::ConcurrencyMisuse(format!("{} already has writer {}", self.id, writer)));
        }
        if let Err(err) = self.backend.begin_write(&self.watermark) {
            return Err(self.halt(err));
        }
        Ok(())
    }
}

impl<B: ComponentBackend> TransactionalComponent for Component<B> {
    fn component_id(&self) -> &ComponentId {
        &self.id
    }

    fn begin(&mut self, txn: TxnId, mode: Mode) -> Result<TxnSnapshot> {
        self.check_live()?;
        if mode.mutable() {
            self.take_writer()?;
            self.writer = Some(txn);
        }
        debug!("Began {:?} transaction {} on {} at {:?}", mode, txn, self.id, self.watermark);
        Ok(TxnSnapshot::new(txn, mode, self.watermark))
    }

    fn promote(&mut self, snapshot: &mut TxnSnapshot) -> Result<()> {
        self.check_read(snapshot)?;
        if snapshot.mode().mutable() {
            return Ok(());
        }
        self.take_writer()?;
        snapshot.promote(self.watermark)?;
        self.writer = Some(snapshot.txn());
        debug!("Promoted transaction {} on {}", snapshot.txn(), self.id);
        Ok(())
    }

    fn commit_prepare(&mut self, snapshot: &mut TxnSnapshot) -> Result<Option<Vec<u8>>> {
        if !snapshot.mode().mutable() {
            self.check_read(snapshot)?;
            snapshot.advance(Step::Prepare(snapshot.watermark()))?;
            return Ok(None);
        }
        self.check_write(snapshot)?;
        let watermark = self.backend.flush()?;
        if self.options.sync_on_prepare {
            self.backend.sync()?;
        }
        snapshot.advance(Step::Prepare(watermark))?;
        debug!("Prepared transaction {} on {} at {:?}", snapshot.txn(), self.id, watermark);
        Ok(Some(watermark.encode()))
    }

    fn commit(&mut self, snapshot: &mut TxnSnapshot) -> Result<()> {
        self.check_live()?;
        if !snapshot.mode().mutable() {
            return snapshot.advance(Step::Commit);
        }
        self.check_writer(snapshot)?;
        let watermark = snapshot.prepared().ok_or_else(|| {
            Error::ConcurrencyMisuse(format!("Transaction {} committed before prepare", snapshot.txn()))
        })?;
        self.backend.sync()?;
        self.state.write(&watermark)?;
        self.watermark = watermark;
        snapshot.advance(Step::Commit)?;
        debug!("Committed transaction {} on {} at {:?}", snapshot.txn(), self.id, watermark);
        Ok(())
    }

    fn commit_end(&mut self, snapshot: &mut TxnSnapshot) -> Result<()> {
        self.check_live()?;
        snapshot.advance(Step::CommitEnd)?;
        if self.is_writer(snapshot) {
            self.writer = None;
        }
        Ok(())
    }

    fn abort(&mut self, snapshot: &mut TxnSnapshot) -> Result<()> {
        self.check_live()?;
        if !snapshot.mode().mutable() {
            return snapshot.advance(Step::Abort);
        }
        self.check_writer(snapshot)?;
        snapshot.advance(Step::Abort)?;
        let watermark = self.watermark;
        if let Err(err) = self.rollback(&watermark) {
            return Err(self.halt(err));
        }
        self.writer = None;
        info!("Aborted transaction {} on {}, back to {:?}", snapshot.txn(), self.id, watermark);
        Ok(())
    }

    fn complete(&mut self, snapshot: &mut TxnSnapshot) -> Result<()> {
        if snapshot.phase() == Phase::Complete {
            return Ok(());
        }
        self.check_live()?;
        snapshot.advance(Step::Complete)
    }

    fn start_recovery(&mut self) -> Result<()> {
        self.check_live()?;
        if let Some(writer) = self.writer {
            return Err(Error::ConcurrencyMisuse(format!("{} has active writer {}", self.id, writer)));
        }
        self.recovering = true;
        debug!("Recovering {} from {:?}", self.id, self.watermark);
        Ok(())
    }

    fn recover(&mut self, payload: &[u8]) -> Result<()> {
        if self.halted {
            return Err(Error::Corruption(format!("{} is halted after a fatal failure", self.id)));
        }
        if !self.recovering {
            return Err(Error::ConcurrencyMisuse(format!("{} is not recovering", self.id)));
        }
        let watermark = match Watermark::decode(payload) {
            Ok(watermark) => watermark,
            Err(err) => return Err(self.halt(err)),
        };
        if let Err(err) = self.state.write(&watermark) {
            return Err(self.halt(err));
        }
        self.watermark = watermark;
        info!("Recovered {} to {:?}", self.id, watermark);
        Ok(())
    }

    fn finish_recovery(&mut self) -> Result<()> {
        if self.halted {
            return Err(Error::Corruption(format!("{} is halted after a fatal failure", self.id)));
        }
        if !self.recovering {
            return Err(Error::ConcurrencyMisuse(format!("{} is not recovering", self.id)));
        }
        let watermark = self.watermark;
        let physical = self.backend.physical_length();
        if physical < watermark.length {
            let err = Error::RecoveryMismatch(format!(
                "{} records length {} but holds only {} bytes",
                self.id, watermark.length, physical
            ));
            return Err(self.halt(err));
        }
        let result = if physical > watermark.length {
            warn!("Truncating {} from {} to {} bytes left by an interrupted transaction", self.id, physical, watermark.length);
            self.rollback(&watermark)
        } else {
            self.backend.restore(&watermark)
        };
        if let Err(err) = result {
            return Err(self.halt(err));
        }
        self.recovering = false;
        Ok(())
    }

    fn shutdown(&mut self) -> Result<()> {
        if let Some(writer) = self.writer {
            return Err(Error::ConcurrencyMisuse(format!("{} has active writer {}", self.id, writer)));
        }
        self.backend.close()?;
        self.state.close()?;
        debug!("Closed {}", self.id);
        Ok(())
    }
}
