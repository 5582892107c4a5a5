use crate::error::Result;
use crate::storage_engine::transaction::{ComponentId, Mode, TxnId, TxnSnapshot};

/// A storage resource taking part in multi-component transactions.
///
/// The coordinator calls `begin` on every component when a transaction starts, and at commit
/// drives every component through `commit_prepare`, writes the combined journal, then calls
/// `commit` and `commit_end`. A failed transaction is driven to `abort` instead. `complete`
/// releases the transaction's snapshot either way. At process start `start_recovery`,
/// `recover` and `finish_recovery` replay the journal before any transaction begins.
///
/// Calls for one component are serialized by the caller. A component accepts any number of
/// read transactions alongside at most one write transaction.
pub trait TransactionalComponent {
    fn component_id(&self) -> &ComponentId;

    /// Starts a transaction, capturing the committed watermark.
    fn begin(&mut self, txn: TxnId, mode: Mode) -> Result<TxnSnapshot>;

    /// Upgrades a read transaction to a write transaction, re-reading the watermark.
    fn promote(&mut self, snapshot: &mut TxnSnapshot) -> Result<()>;

    /// Flushes pending writes and returns the journal payload describing the new watermark.
    /// The visible watermark does not move yet. Read transactions return no payload.
    fn commit_prepare(&mut self, snapshot: &mut TxnSnapshot) -> Result<Option<Vec<u8>>>;

    /// Syncs data, durably records the prepared state and advances the watermark.
    fn commit(&mut self, snapshot: &mut TxnSnapshot) -> Result<()>;

    /// Releases commit-local resources.
    fn commit_end(&mut self, snapshot: &mut TxnSnapshot) -> Result<()>;

    /// Discards everything written since begin and syncs. A failure halts the component.
    fn abort(&mut self, snapshot: &mut TxnSnapshot) -> Result<()>;

    /// Releases the transaction's snapshot. Idempotent.
    fn complete(&mut self, snapshot: &mut TxnSnapshot) -> Result<()>;

    fn start_recovery(&mut self) -> Result<()>;

    /// Applies a journal payload produced by `commit_prepare`. Replaying a payload twice is
    /// the same as replaying it once.
    fn recover(&mut self, payload: &[u8]) -> Result<()>;

    /// Truncates data left behind by an interrupted transaction.
    fn finish_recovery(&mut self) -> Result<()>;

    /// Closes the component's resources.
    fn shutdown(&mut self) -> Result<()>;
}
