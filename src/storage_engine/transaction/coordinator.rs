use crate::error::{Error, Result};
use crate::storage_engine::byte_resource::ByteResource;
use crate::storage_engine::transaction::{
    ComponentId, EntryKind, Journal, JournalEntry, Mode, TransactionalComponent, TxnId, TxnSnapshot,
};
use log::{debug, error, info};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt::Display;

/// The components a transaction runs over, in a fixed order. The same slice, in the same
/// order, must be passed to every coordinator call for a transaction.
pub type Components<'a, 'b> = &'a mut [&'b mut dyn TransactionalComponent];

/// A transaction spanning several components, holding one snapshot per component.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Transaction {
    id: TxnId,
    mode: Mode,
    participants: Vec<ComponentId>,
    snapshots: Vec<TxnSnapshot>,
}

impl Transaction {
    /// Returns the transaction ID.
    pub fn id(&self) -> TxnId {
        self.id
    }

    /// Returns the transaction mode.
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// The snapshot of the i-th component.
    pub fn snapshot(&self, i: usize) -> Option<&TxnSnapshot> {
        self.snapshots.get(i)
    }

    pub fn snapshots(&self) -> &[TxnSnapshot] {
        &self.snapshots
    }
}

/// Coordinator status.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    /// Transactions begun since startup.
    pub txns: u64,
    pub txns_active: u64,
    pub txns_finished: u64,
    pub journal: String,
}

/// Drives the component lifecycle for multi-component transactions. Begins are serialized
/// through `&mut self`, which gives every transaction a consistent snapshot across its
/// components. At most one write transaction is active at a time.
///
/// Commit is two-phase: every component prepares, then the redo entries and a commit marker
/// are appended to the journal and synced. That sync is the commit point: after it, recovery
/// replays the transaction even if the process dies before the components commit.
pub struct TransactionCoordinator<R: ByteResource> {
    journal: Journal<R>,
    next_txn: TxnId,
    writer: Option<TxnId>,
    recovered: bool,
    txns: u64,
    txns_active: u64,
    txns_finished: u64,
}

impl<R: ByteResource + Display> TransactionCoordinator<R> {
    pub fn status(&self) -> Status {
        Status {
            txns: self.txns,
            txns_active: self.txns_active,
            txns_finished: self.txns_finished,
            journal: self.journal.resource().to_string(),
        }
    }
}

impl<R: ByteResource> TransactionCoordinator<R> {
    pub fn new(journal: Journal<R>) -> Self {
        Self {
            journal,
            next_txn: 1,
            writer: None,
            recovered: false,
            txns: 0,
            txns_active: 0,
            txns_finished: 0,
        }
    }

    pub fn journal(&self) -> &Journal<R> {
        &self.journal
    }

    /// Replays the journal into the components and resets it. Only redo entries of
    /// transactions with a commit marker and no abort marker are applied. Must run once before any transaction
    /// begins. Returns the number of entries applied.
    pub fn recover(&mut self, components: Components) -> Result<usize> {
        if self.recovered {
            return Err(Error::ConcurrencyMisuse("Recovery already ran".into()));
        }
        for component in components.iter_mut() {
            component.start_recovery()?;
        }
        let entries = self.journal.entries()?;
        let aborted: HashSet<TxnId> =
            entries.iter().filter(|e| e.kind == EntryKind::Abort).map(|e| e.txn).collect();
        let committed: HashSet<TxnId> = entries
            .iter()
            .filter(|e| e.kind == EntryKind::Commit && !aborted.contains(&e.txn))
            .map(|e| e.txn)
            .collect();
        let mut applied = 0;
        for entry in &entries {
            self.next_txn = self.next_txn.max(entry.txn + 1);
            if entry.kind != EntryKind::Redo || !committed.contains(&entry.txn) {
                continue;
            }
            let component = components
                .iter_mut()
                .find(|c| c.component_id().bytes() == &entry.component)
                .ok_or_else(|| {
                    Error::RecoveryMismatch(format!(
                        "Journal entry of txn {} belongs to unknown component {}",
                        entry.txn,
                        uuid::Uuid::from_bytes(entry.component)
                    ))
                })?;
            component.recover(&entry.payload)?;
            applied += 1;
        }
        for component in components.iter_mut() {
            component.finish_recovery()?;
        }
        self.journal.reset()?;
        self.recovered = true;
        info!("Recovered {} journal entries from {} committed transactions", applied, committed.len());
        Ok(applied)
    }

    /// Begins a transaction on every component.
    pub fn begin(&mut self, components: Components, mode: Mode) -> Result<Transaction> {
        if !self.recovered {
            return Err(Error::ConcurrencyMisuse("Transaction begun before recovery".into()));
        }
        if let (true, Some(writer)) = (mode.mutable(), self.writer) {
            return Err(Error::ConcurrencyMisuse(format!("Write transaction {} is active", writer)));
        }
        let id = self.next_txn;
        self.next_txn += 1;
        let mut txn = Transaction { id, mode, participants: Vec::new(), snapshots: Vec::new() };
        for i in 0..components.len() {
            match components[i].begin(id, mode) {
                Ok(snapshot) => {
                    txn.participants.push(components[i].component_id().clone());
                    txn.snapshots.push(snapshot);
                }
                Err(err) => {
                    Self::unwind(&mut components[..i], &mut txn);
                    return Err(err);
                }
            }
        }
        if mode.mutable() {
            self.writer = Some(id);
        }
        self.txns += 1;
        self.txns_active += 1;
        debug!("Began {:?} transaction {}", mode, id);
        Ok(txn)
    }

    /// Upgrades a read transaction to a write transaction on every component. A failure ends
    /// the transaction, rolling back the components already promoted.
    pub fn promote(&mut self, components: Components, mut txn: Transaction) -> Result<Transaction> {
        if let Err(err) = self.check(components, &txn) {
            self.finish(&txn);
            return Err(err);
        }
        if txn.mode.mutable() {
            return Ok(txn);
        }
        let promoted = match self.writer {
            Some(writer) => Err(Error::ConcurrencyMisuse(format!("Write transaction {} is active", writer))),
            None => components
                .iter_mut()
                .zip(txn.snapshots.iter_mut())
                .try_for_each(|(component, snapshot)| component.promote(snapshot)),
        };
        if let Err(err) = promoted {
            error!("Promotion of transaction {} failed: {}", txn.id, err);
            Self::unwind(components, &mut txn);
            self.finish(&txn);
            return Err(err);
        }
        txn.mode = Mode::ReadWrite;
        self.writer = Some(txn.id);
        debug!("Promoted transaction {}", txn.id);
        Ok(txn)
    }

    /// Commits a transaction. A failure before the commit point aborts the transaction on all
    /// components. Read-only transactions just end.
    pub fn commit(&mut self, components: Components, mut txn: Transaction) -> Result<()> {
        self.check(components, &txn)?;
        if !txn.mode.mutable() {
            return self.end(components, txn);
        }

        let redo = match Self::prepare(components, &mut txn) {
            Ok(redo) => redo,
            Err(err) => {
                self.abort(components, txn)?;
                return Err(err);
            }
        };
        if let Err(err) = self.write_commit_point(txn.id, &redo) {
            error!("Journal write failed for transaction {}: {}", txn.id, err);
            self.discard_commit_point(txn.id);
            self.abort(components, txn)?;
            return Err(err);
        }

        // Past the commit point: the journal replays anything that fails from here on.
        for (component, snapshot) in components.iter_mut().zip(txn.snapshots.iter_mut()) {
            component.commit(snapshot)?;
        }
        for (component, snapshot) in components.iter_mut().zip(txn.snapshots.iter_mut()) {
            component.commit_end(snapshot)?;
            component.complete(snapshot)?;
        }
        self.journal.reset()?;
        self.finish(&txn);
        debug!("Committed transaction {}", txn.id);
        Ok(())
    }

    /// Aborts a transaction on every component.
    pub fn abort(&mut self, components: Components, mut txn: Transaction) -> Result<()> {
        self.check(components, &txn)?;
        for (component, snapshot) in components.iter_mut().zip(txn.snapshots.iter_mut()) {
            component.abort(snapshot)?;
            component.complete(snapshot)?;
        }
        self.finish(&txn);
        debug!("Aborted transaction {}", txn.id);
        Ok(())
    }

    /// Ends a read-only transaction.
    pub fn end(&mut self, components: Components, mut txn: Transaction) -> Result<()> {
        self.check(components, &txn)?;
        if txn.mode.mutable() {
            return Err(Error::ConcurrencyMisuse(format!(
                "Write transaction {} must commit or abort",
                txn.id
            )));
        }
        for (component, snapshot) in components.iter_mut().zip(txn.snapshots.iter_mut()) {
            component.complete(snapshot)?;
        }
        self.finish(&txn);
        Ok(())
    }

    pub fn shutdown(&mut self, components: Components) -> Result<()> {
        if let Some(writer) = self.writer {
            return Err(Error::ConcurrencyMisuse(format!("Write transaction {} is active", writer)));
        }
        for component in components.iter_mut() {
            component.shutdown()?;
        }
        self.journal.close()
    }

    /// Prepares every component, collecting their redo entries.
    fn prepare(components: Components, txn: &mut Transaction) -> Result<Vec<JournalEntry>> {
        let mut redo = Vec::new();
        for (component, snapshot) in components.iter_mut().zip(txn.snapshots.iter_mut()) {
            match component.commit_prepare(snapshot) {
                Ok(Some(payload)) => redo.push(JournalEntry::redo(txn.id, component.component_id(), payload)),
                Ok(None) => {}
                Err(err) => {
                    error!("Prepare of {} failed for transaction {}: {}", component.component_id(), txn.id, err);
                    return Err(err);
                }
            }
        }
        Ok(redo)
    }

    fn write_commit_point(&mut self, txn: TxnId, redo: &[JournalEntry]) -> Result<()> {
        for entry in redo {
            self.journal.append(entry)?;
        }
        self.journal.append(&JournalEntry::commit(txn))?;
        self.journal.sync()
    }

    /// Revokes a commit point that may have partly reached the journal: marks the transaction
    /// aborted, then empties the journal.
    fn discard_commit_point(&mut self, txn: TxnId) {
        if let Err(err) = self.journal.append(&JournalEntry::abort(txn)).and_then(|_| self.journal.sync()) {
            error!("Failed to mark transaction {} aborted in the journal: {}", txn, err);
        }
        if let Err(err) = self.journal.reset() {
            error!("Failed to reset the journal after transaction {}: {}", txn, err);
        }
    }

    /// Checks that the components are the ones the transaction began on.
    fn check(&self, components: &[&mut dyn TransactionalComponent], txn: &Transaction) -> Result<()> {
        let matches = components.len() == txn.participants.len()
            && components.iter().zip(&txn.participants).all(|(c, id)| c.component_id() == id);
        if !matches {
            return Err(Error::ConcurrencyMisuse(format!(
                "Transaction {} called with a different set of components",
                txn.id
            )));
        }
        Ok(())
    }

    /// Releases the snapshots of a partially begun or promoted transaction. Write snapshots
    /// are aborted first.
    fn unwind(components: Components, txn: &mut Transaction) {
        for (component, snapshot) in components.iter_mut().zip(txn.snapshots.iter_mut()) {
            let released = match snapshot.mode() {
                Mode::ReadWrite => component.abort(snapshot).and_then(|_| component.complete(snapshot)),
                Mode::ReadOnly => component.complete(snapshot),
            };
            if let Err(err) = released {
                error!("Failed to release {} for transaction {}: {}", component.component_id(), txn.id, err);
            }
        }
    }

    fn finish(&mut self, txn: &Transaction) {
        if self.writer == Some(txn.id) {
            self.writer = None;
        }
        self.txns_active = self.txns_active.saturating_sub(1);
        self.txns_finished += 1;
    }
}

#[cfg(test)]
mod coordinator_tests {
    use super::*;
    use crate::config::StoreOptions;
    use crate::storage_engine::byte_resource::{FileResource, MemoryResource};
    use crate::storage_engine::components::{BinaryFile, Blob, ComponentBackend};
    use crate::storage_engine::transaction::Watermark;
    use pretty_assertions::assert_eq;
    use std::path::Path;

    fn log() -> Result<BinaryFile<MemoryResource>> {
        BinaryFile::open(ComponentId::new("log", 1), MemoryResource::new(), MemoryResource::new(), StoreOptions::default())
    }

    fn meta() -> Result<Blob<MemoryResource>> {
        Blob::open(ComponentId::new("meta", 2), MemoryResource::new(), MemoryResource::new(), StoreOptions::default())
    }

    fn recovered(components: Components) -> Result<TransactionCoordinator<MemoryResource>> {
        let mut coordinator = TransactionCoordinator::new(Journal::new(MemoryResource::new()));
        assert_eq!(0, coordinator.recover(components)?);
        Ok(coordinator)
    }

    fn on_disk(dir: &Path) -> Result<(BinaryFile<FileResource>, Blob<FileResource>, Journal<FileResource>)> {
        let log = BinaryFile::open(
            ComponentId::new("log", 1),
            FileResource::open(dir.join("log.dat"))?,
            FileResource::open(dir.join("log.state"))?,
            StoreOptions::default(),
        )?;
        let meta = Blob::open(
            ComponentId::new("meta", 2),
            FileResource::open(dir.join("meta.dat"))?,
            FileResource::open(dir.join("meta.state"))?,
            StoreOptions::default(),
        )?;
        Ok((log, meta, Journal::new(FileResource::open(dir.join("journal"))?)))
    }

    /// Prepares both components and journals them as transaction 1, then drops everything as
    /// if the process died before the components committed.
    fn crash_after_prepare(dir: &Path, commit_marker: bool) -> Result<()> {
        let (mut log, mut meta, mut journal) = on_disk(dir)?;
        let mut s0 = log.begin(1, Mode::ReadWrite)?;
        let mut s1 = meta.begin(1, Mode::ReadWrite)?;
        log.write(&s0, b"hello")?;
        meta.set(&s1, b"v1")?;
        let p0 = log.commit_prepare(&mut s0)?.unwrap();
        let p1 = meta.commit_prepare(&mut s1)?.unwrap();
        journal.append(&JournalEntry::redo(1, log.component_id(), p0))?;
        journal.append(&JournalEntry::redo(1, meta.component_id(), p1))?;
        if commit_marker {
            journal.append(&JournalEntry::commit(1))?;
        }
        journal.sync()
    }

    #[test]
    fn commit_spans_components() -> Result<()> {
        let (mut log, mut meta) = (log()?, meta()?);
        let mut coordinator = recovered(&mut [&mut log, &mut meta])?;

        let before = coordinator.begin(&mut [&mut log, &mut meta], Mode::ReadOnly)?;
        let txn = coordinator.begin(&mut [&mut log, &mut meta], Mode::ReadWrite)?;
        log.write(&txn.snapshots()[0], b"abc")?;
        meta.set(&txn.snapshots()[1], b"v1")?;
        coordinator.commit(&mut [&mut log, &mut meta], txn)?;
        assert!(coordinator.journal().is_empty());

        assert_eq!(Watermark::new(3, 3), log.watermark());
        assert_eq!(Watermark::new(2, 0), meta.watermark());
        assert_eq!(0, log.length(&before.snapshots()[0])?);
        assert_eq!(Vec::<u8>::new(), meta.get(&before.snapshots()[1])?);
        coordinator.end(&mut [&mut log, &mut meta], before)?;

        let after = coordinator.begin(&mut [&mut log, &mut meta], Mode::ReadOnly)?;
        assert_eq!(b"abc".to_vec(), log.read(&after.snapshots()[0], 0, 3)?);
        assert_eq!(b"v1".to_vec(), meta.get(&after.snapshots()[1])?);
        coordinator.commit(&mut [&mut log, &mut meta], after)?;
        Ok(())
    }

    #[test]
    fn abort_rolls_back_every_component() -> Result<()> {
        let (mut log, mut meta) = (log()?, meta()?);
        let mut coordinator = recovered(&mut [&mut log, &mut meta])?;

        let txn = coordinator.begin(&mut [&mut log, &mut meta], Mode::ReadWrite)?;
        log.write(&txn.snapshots()[0], b"abc")?;
        meta.set(&txn.snapshots()[1], b"v1")?;
        coordinator.abort(&mut [&mut log, &mut meta], txn)?;

        assert_eq!(0, log.backend().physical_length());
        assert_eq!(0, meta.backend().physical_length());
        assert_eq!(Watermark::default(), log.watermark());
        assert!(coordinator.journal().is_empty());

        // The writer slot is free again.
        let txn = coordinator.begin(&mut [&mut log, &mut meta], Mode::ReadWrite)?;
        coordinator.commit(&mut [&mut log, &mut meta], txn)?;
        Ok(())
    }

    #[test]
    fn one_writer_at_a_time() -> Result<()> {
        let (mut log, mut meta) = (log()?, meta()?);
        let mut coordinator = recovered(&mut [&mut log, &mut meta])?;

        let writer = coordinator.begin(&mut [&mut log, &mut meta], Mode::ReadWrite)?;
        assert!(matches!(
            coordinator.begin(&mut [&mut log, &mut meta], Mode::ReadWrite),
            Err(Error::ConcurrencyMisuse(_))
        ));
        let reader = coordinator.begin(&mut [&mut log, &mut meta], Mode::ReadOnly)?;
        assert!(reader.id() > writer.id());
        assert!(matches!(
            coordinator.end(&mut [&mut log, &mut meta], writer.clone()),
            Err(Error::ConcurrencyMisuse(_))
        ));

        coordinator.commit(&mut [&mut log, &mut meta], writer)?;
        coordinator.end(&mut [&mut log, &mut meta], reader)?;
        let writer = coordinator.begin(&mut [&mut log, &mut meta], Mode::ReadWrite)?;
        coordinator.abort(&mut [&mut log, &mut meta], writer)?;
        Ok(())
    }

    #[test]
    fn begin_requires_recovery() -> Result<()> {
        let (mut log, mut meta) = (log()?, meta()?);
        let mut coordinator = TransactionCoordinator::new(Journal::new(MemoryResource::new()));
        assert!(matches!(
            coordinator.begin(&mut [&mut log, &mut meta], Mode::ReadOnly),
            Err(Error::ConcurrencyMisuse(_))
        ));
        coordinator.recover(&mut [&mut log, &mut meta])?;
        assert!(matches!(coordinator.recover(&mut [&mut log, &mut meta]), Err(Error::ConcurrencyMisuse(_))));
        coordinator.begin(&mut [&mut log, &mut meta], Mode::ReadOnly)?;
        Ok(())
    }

    #[test]
    fn rejects_other_components() -> Result<()> {
        let (mut log, mut meta) = (log()?, meta()?);
        let mut coordinator = recovered(&mut [&mut log, &mut meta])?;
        let txn = coordinator.begin(&mut [&mut log, &mut meta], Mode::ReadWrite)?;
        assert!(matches!(coordinator.commit(&mut [&mut log], txn.clone()), Err(Error::ConcurrencyMisuse(_))));
        assert!(matches!(
            coordinator.commit(&mut [&mut meta, &mut log], txn.clone()),
            Err(Error::ConcurrencyMisuse(_))
        ));
        coordinator.commit(&mut [&mut log, &mut meta], txn)?;
        Ok(())
    }

    #[test]
    fn promote_takes_the_writer_slot() -> Result<()> {
        let (mut log, mut meta) = (log()?, meta()?);
        let mut coordinator = recovered(&mut [&mut log, &mut meta])?;

        let txn = coordinator.begin(&mut [&mut log, &mut meta], Mode::ReadOnly)?;
        assert_eq!(Err(Error::ReadOnly), log.write(&txn.snapshots()[0], b"x"));
        let txn = coordinator.promote(&mut [&mut log, &mut meta], txn)?;
        assert_eq!(Mode::ReadWrite, txn.mode());
        assert!(matches!(
            coordinator.begin(&mut [&mut log, &mut meta], Mode::ReadWrite),
            Err(Error::ConcurrencyMisuse(_))
        ));

        log.write(&txn.snapshots()[0], b"x")?;
        coordinator.commit(&mut [&mut log, &mut meta], txn)?;
        assert_eq!(Watermark::new(1, 1), log.watermark());
        Ok(())
    }

    #[test]
    fn status_counts_transactions() -> Result<()> {
        let (mut log, mut meta) = (log()?, meta()?);
        let mut coordinator = recovered(&mut [&mut log, &mut meta])?;

        let reader = coordinator.begin(&mut [&mut log, &mut meta], Mode::ReadOnly)?;
        let writer = coordinator.begin(&mut [&mut log, &mut meta], Mode::ReadWrite)?;
        assert_eq!(
            Status { txns: 2, txns_active: 2, txns_finished: 0, journal: "memory".into() },
            coordinator.status()
        );
        coordinator.commit(&mut [&mut log, &mut meta], writer)?;
        coordinator.end(&mut [&mut log, &mut meta], reader)?;
        assert_eq!(
            Status { txns: 2, txns_active: 0, txns_finished: 2, journal: "memory".into() },
            coordinator.status()
        );
        Ok(())
    }

    /// Delegates to a binary file but fails to prepare.
    struct FailingPrepare(BinaryFile<MemoryResource>);

    impl TransactionalComponent for FailingPrepare {
        fn component_id(&self) -> &ComponentId {
            self.0.component_id()
        }
        fn begin(&mut self, txn: TxnId, mode: Mode) -> Result<TxnSnapshot> {
            self.0.begin(txn, mode)
        }
        fn promote(&mut self, snapshot: &mut TxnSnapshot) -> Result<()> {
            self.0.promote(snapshot)
        }
        fn commit_prepare(&mut self, _snapshot: &mut TxnSnapshot) -> Result<Option<Vec<u8>>> {
            Err(Error::Io("disk full".into()))
        }
        fn commit(&mut self, snapshot: &mut TxnSnapshot) -> Result<()> {
            self.0.commit(snapshot)
        }
        fn commit_end(&mut self, snapshot: &mut TxnSnapshot) -> Result<()> {
            self.0.commit_end(snapshot)
        }
        fn abort(&mut self, snapshot: &mut TxnSnapshot) -> Result<()> {
            self.0.abort(snapshot)
        }
        fn complete(&mut self, snapshot: &mut TxnSnapshot) -> Result<()> {
            self.0.complete(snapshot)
        }
        fn start_recovery(&mut self) -> Result<()> {
            self.0.start_recovery()
        }
        fn recover(&mut self, payload: &[u8]) -> Result<()> {
            self.0.recover(payload)
        }
        fn finish_recovery(&mut self) -> Result<()> {
            self.0.finish_recovery()
        }
        fn shutdown(&mut self) -> Result<()> {
            self.0.shutdown()
        }
    }

    #[test]
    fn prepare_failure_aborts() -> Result<()> {
        let mut log = log()?;
        let mut failing = FailingPrepare(BinaryFile::open(
            ComponentId::new("broken", 9),
            MemoryResource::new(),
            MemoryResource::new(),
            StoreOptions::default(),
        )?);
        let mut coordinator = recovered(&mut [&mut log, &mut failing])?;

        let txn = coordinator.begin(&mut [&mut log, &mut failing], Mode::ReadWrite)?;
        log.write(&txn.snapshots()[0], b"lost")?;
        assert_eq!(
            Err(Error::Io("disk full".into())),
            coordinator.commit(&mut [&mut log, &mut failing], txn)
        );
        assert_eq!(0, log.backend().physical_length());
        assert_eq!(Watermark::default(), log.watermark());
        assert!(coordinator.journal().is_empty());
        assert_eq!(1, coordinator.status().txns_finished);
        coordinator.begin(&mut [&mut log, &mut failing], Mode::ReadWrite)?;
        Ok(())
    }

    /// Accepts writes, but fails to sync or truncate once it holds data.
    #[derive(Debug, Default)]
    struct StuckJournal(MemoryResource);

    impl StuckJournal {
        fn check(&self) -> Result<()> {
            if self.0.is_empty() {
                return Ok(());
            }
            Err(Error::Io("EIO".into()))
        }
    }

    impl ByteResource for StuckJournal {
        fn read_at(&self, pos: u64, buf: &mut [u8]) -> Result<usize> {
            self.0.read_at(pos, buf)
        }
        fn write_at(&mut self, pos: u64, buf: &[u8]) -> Result<()> {
            self.0.write_at(pos, buf)
        }
        fn length(&self) -> u64 {
            self.0.length()
        }
        fn truncate(&mut self, len: u64) -> Result<()> {
            self.check()?;
            self.0.truncate(len)
        }
        fn sync(&mut self) -> Result<()> {
            self.check()
        }
        fn close(&mut self) -> Result<()> {
            self.0.close()
        }
    }

    #[test]
    fn failed_commit_point_is_not_replayed() -> Result<()> {
        let (mut log, mut meta) = (log()?, meta()?);
        let mut coordinator = TransactionCoordinator::new(Journal::new(StuckJournal::default()));
        coordinator.recover(&mut [&mut log, &mut meta])?;

        let txn = coordinator.begin(&mut [&mut log, &mut meta], Mode::ReadWrite)?;
        log.write(&txn.snapshots()[0], &[1; 50])?;
        meta.set(&txn.snapshots()[1], b"v1")?;
        assert_eq!(Err(Error::Io("EIO".into())), coordinator.commit(&mut [&mut log, &mut meta], txn));
        assert_eq!(0, log.backend().physical_length());
        assert_eq!(Watermark::default(), log.watermark());

        // The journal kept its frames, followed by an abort marker.
        let kinds: Vec<EntryKind> = coordinator.journal().entries()?.iter().map(|e| e.kind).collect();
        assert_eq!(vec![EntryKind::Redo, EntryKind::Redo, EntryKind::Commit, EntryKind::Abort], kinds);

        // Restarting over those bytes does not replay the aborted transaction.
        let stuck = coordinator.journal().resource();
        let mut resource = MemoryResource::new();
        resource.append(&stuck.read_exact_at(0, stuck.length() as usize)?)?;
        let mut restarted = TransactionCoordinator::new(Journal::new(resource));
        assert_eq!(0, restarted.recover(&mut [&mut log, &mut meta])?);
        assert!(!log.is_halted());
        assert_eq!(Watermark::default(), log.watermark());
        assert_eq!(Watermark::default(), meta.watermark());
        Ok(())
    }

    #[test]
    fn failed_promote_releases_promoted_components() -> Result<()> {
        let (mut log, mut meta) = (log()?, meta()?);
        let mut coordinator = recovered(&mut [&mut log, &mut meta])?;

        let txn = coordinator.begin(&mut [&mut log, &mut meta], Mode::ReadOnly)?;
        // Another writer holds the second component, so only the first gets promoted.
        let mut foreign = meta.begin(999, Mode::ReadWrite)?;
        assert!(matches!(
            coordinator.promote(&mut [&mut log, &mut meta], txn),
            Err(Error::ConcurrencyMisuse(_))
        ));
        assert_eq!(0, coordinator.status().txns_active);
        assert_eq!(1, coordinator.status().txns_finished);

        meta.abort(&mut foreign)?;
        meta.complete(&mut foreign)?;
        let txn = coordinator.begin(&mut [&mut log, &mut meta], Mode::ReadWrite)?;
        log.write(&txn.snapshots()[0], b"ok")?;
        coordinator.commit(&mut [&mut log, &mut meta], txn)?;
        assert_eq!(Watermark::new(2, 2), log.watermark());
        Ok(())
    }

    #[test]
    fn crash_after_commit_point_is_replayed() -> Result<()> {
        let dir = tempfile::tempdir()?;
        crash_after_prepare(dir.path(), true)?;

        let (mut log, mut meta, journal) = on_disk(dir.path())?;
        assert_eq!(Watermark::default(), log.watermark());
        let mut coordinator = TransactionCoordinator::new(journal);
        assert_eq!(2, coordinator.recover(&mut [&mut log, &mut meta])?);
        assert!(coordinator.journal().is_empty());
        assert_eq!(Watermark::new(5, 5), log.watermark());
        assert_eq!(Watermark::new(2, 0), meta.watermark());

        let txn = coordinator.begin(&mut [&mut log, &mut meta], Mode::ReadOnly)?;
        assert_eq!(2, txn.id());
        assert_eq!(b"hello".to_vec(), log.read(&txn.snapshots()[0], 0, 5)?);
        assert_eq!(b"v1".to_vec(), meta.get(&txn.snapshots()[1])?);
        coordinator.end(&mut [&mut log, &mut meta], txn)?;
        coordinator.shutdown(&mut [&mut log, &mut meta])?;

        let (log, meta, _) = on_disk(dir.path())?;
        assert_eq!(Watermark::new(5, 5), log.watermark());
        assert_eq!(Watermark::new(2, 0), meta.watermark());
        Ok(())
    }

    #[test]
    fn crash_before_commit_marker_is_discarded() -> Result<()> {
        let dir = tempfile::tempdir()?;
        crash_after_prepare(dir.path(), false)?;

        let (mut log, mut meta, journal) = on_disk(dir.path())?;
        assert_eq!(5, log.backend().physical_length());
        let mut coordinator = TransactionCoordinator::new(journal);
        assert_eq!(0, coordinator.recover(&mut [&mut log, &mut meta])?);
        assert_eq!(0, log.backend().physical_length());
        assert_eq!(0, meta.backend().physical_length());
        assert_eq!(Watermark::default(), meta.watermark());

        // The uncommitted transaction id is still not reused.
        let txn = coordinator.begin(&mut [&mut log, &mut meta], Mode::ReadWrite)?;
        assert_eq!(2, txn.id());
        Ok(())
    }

    #[test]
    fn journal_for_unknown_component_fails_recovery() -> Result<()> {
        let mut log = log()?;
        let mut journal = Journal::new(MemoryResource::new());
        journal.append(&JournalEntry::redo(3, &ComponentId::new("gone", 7), Watermark::new(1, 1).encode()))?;
        journal.append(&JournalEntry::commit(3))?;

        let mut coordinator = TransactionCoordinator::new(journal);
        assert!(matches!(coordinator.recover(&mut [&mut log]), Err(Error::RecoveryMismatch(_))));
        assert!(!coordinator.journal().is_empty());
        Ok(())
    }
}
