use crate::config::StoreOptions;
use crate::error::{Error, Result};
use crate::storage_engine::byte_resource::ByteResource;
use crate::storage_engine::components::{Component, ComponentBackend, StateFile};
use crate::storage_engine::transaction::{ComponentId, TxnSnapshot, Watermark};

/// An append-only binary file. Its watermark is {length, length}: the committed length and
/// the append point coincide.
#[derive(Debug)]
pub struct BinaryFileBackend<R: ByteResource> {
    data: R,
}

impl<R: ByteResource> ComponentBackend for BinaryFileBackend<R> {
    fn initial_watermark(&self) -> Watermark {
        Watermark::default()
    }

    fn flush(&mut self) -> Result<Watermark> {
        let length = self.data.length();
        Ok(Watermark::new(length, length))
    }

    fn sync(&mut self) -> Result<()> {
        self.data.sync()
    }

    fn physical_length(&self) -> u64 {
        self.data.length()
    }

    fn truncate(&mut self, length: u64) -> Result<()> {
        self.data.truncate(length)
    }

    fn restore(&mut self, _watermark: &Watermark) -> Result<()> {
        Ok(())
    }

    fn begin_write(&mut self, _watermark: &Watermark) -> Result<()> {
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.data.close()
    }
}

/// A transactional append-only binary file.
pub type BinaryFile<R> = Component<BinaryFileBackend<R>>;

impl<R: ByteResource> Component<BinaryFileBackend<R>> {
    pub fn open(
        id: ComponentId,
        data: R,
        state: impl ByteResource + 'static,
        options: StoreOptions,
    ) -> Result<Self> {
        Self::with_backend(id, BinaryFileBackend { data }, StateFile::new(state), options)
    }

    /// Appends bytes, returning the position they were written at.
    pub fn write(&mut self, snapshot: &TxnSnapshot, bytes: &[u8]) -> Result<u64> {
        self.check_write(snapshot)?;
        self.backend.data.append(bytes)
    }

    /// Reads bytes visible to the transaction.
    pub fn read(&self, snapshot: &TxnSnapshot, pos: u64, len: usize) -> Result<Vec<u8>> {
        let visible = self.length(snapshot)?;
        if pos.checked_add(len as u64).map_or(true, |end| end > visible) {
            return Err(Error::Value(format!(
                "Read of {} bytes at {} exceeds visible length {}",
                len, pos, visible
            )));
        }
        self.backend.data.read_exact_at(pos, len)
    }

    /// The length visible to the transaction: the writer sees its own appends, readers see
    /// the length committed when they began.
    pub fn length(&self, snapshot: &TxnSnapshot) -> Result<u64> {
        self.check_read(snapshot)?;
        if self.is_writer(snapshot) {
            return Ok(self.backend.data.length());
        }
        Ok(snapshot.watermark().length)
    }
}

#[cfg(test)]
mod binary_file_tests {
    use super::*;
    use crate::storage_engine::byte_resource::{FileResource, MemoryResource};
    use crate::storage_engine::transaction::{Mode, Phase, TransactionalComponent};
    use pretty_assertions::assert_eq;
    use std::path::Path;

    fn memory() -> Result<BinaryFile<MemoryResource>> {
        BinaryFile::open(ComponentId::new("log", 1), MemoryResource::new(), MemoryResource::new(), StoreOptions::default())
    }

    fn on_disk(dir: &Path) -> Result<BinaryFile<FileResource>> {
        BinaryFile::open(
            ComponentId::new("log", 1),
            FileResource::open(dir.join("log.dat"))?,
            FileResource::open(dir.join("log.state"))?,
            StoreOptions::default(),
        )
    }

    fn commit(file: &mut BinaryFile<MemoryResource>, snapshot: &mut TxnSnapshot) -> Result<()> {
        file.commit_prepare(snapshot)?;
        file.commit(snapshot)?;
        file.commit_end(snapshot)?;
        file.complete(snapshot)
    }

    #[test]
    fn readers_see_committed_length() -> Result<()> {
        let mut file = memory()?;
        let mut writer = file.begin(1, Mode::ReadWrite)?;
        assert_eq!(0, file.write(&writer, &[7; 50])?);

        let mut before = file.begin(2, Mode::ReadOnly)?;
        assert_eq!(50, file.length(&writer)?);
        assert_eq!(0, file.length(&before)?);
        assert!(file.read(&before, 0, 1).is_err());

        commit(&mut file, &mut writer)?;
        let mut after = file.begin(3, Mode::ReadOnly)?;
        assert_eq!(0, file.length(&before)?);
        assert_eq!(50, file.length(&after)?);
        assert_eq!(vec![7; 50], file.read(&after, 0, 50)?);
        assert!(file.read(&after, 40, 11).is_err());

        file.complete(&mut before)?;
        file.complete(&mut after)?;
        assert!(matches!(file.length(&after), Err(Error::ConcurrencyMisuse(_))));
        Ok(())
    }

    #[test]
    fn prepare_does_not_advance_watermark() -> Result<()> {
        let mut file = memory()?;
        let mut writer = file.begin(1, Mode::ReadWrite)?;
        file.write(&writer, &[1; 50])?;
        let payload = file.commit_prepare(&mut writer)?;
        assert_eq!(Some(Watermark::new(50, 50).encode()), payload);
        assert_eq!(Watermark::default(), file.watermark());
        assert_eq!(0, file.begin(2, Mode::ReadOnly)?.watermark().length);

        // Prepared writers can no longer write.
        assert!(matches!(file.write(&writer, &[1]), Err(Error::ConcurrencyMisuse(_))));
        file.commit(&mut writer)?;
        assert_eq!(Watermark::new(50, 50), file.watermark());
        Ok(())
    }

    #[test]
    fn abort_restores_begin_length() -> Result<()> {
        let mut file = memory()?;
        let mut first = file.begin(1, Mode::ReadWrite)?;
        file.write(&first, &[1; 20])?;
        commit(&mut file, &mut first)?;

        let mut second = file.begin(2, Mode::ReadWrite)?;
        file.write(&second, &[2; 30])?;
        file.commit_prepare(&mut second)?;
        file.abort(&mut second)?;
        file.complete(&mut second)?;
        assert_eq!(20, file.backend().physical_length());
        assert_eq!(Watermark::new(20, 20), file.watermark());

        // The aborted writer is gone, so a new one may begin.
        let third = file.begin(3, Mode::ReadWrite)?;
        assert_eq!(20, file.write(&third, &[3])?);
        Ok(())
    }

    #[test]
    fn single_writer() -> Result<()> {
        let mut file = memory()?;
        let mut writer = file.begin(1, Mode::ReadWrite)?;
        assert!(matches!(file.begin(2, Mode::ReadWrite), Err(Error::ConcurrencyMisuse(_))));

        let mut reader = file.begin(3, Mode::ReadOnly)?;
        assert_eq!(Err(Error::ReadOnly), file.write(&reader, &[1]));
        assert!(matches!(file.promote(&mut reader), Err(Error::ConcurrencyMisuse(_))));

        // Completing an active writer is a misuse; it must commit or abort first.
        assert!(matches!(file.complete(&mut writer), Err(Error::ConcurrencyMisuse(_))));
        commit(&mut file, &mut writer)?;

        file.promote(&mut reader)?;
        assert_eq!(Mode::ReadWrite, reader.mode());
        assert_eq!(0, file.write(&reader, &[1])?);
        Ok(())
    }

    #[test]
    fn promote_rereads_watermark() -> Result<()> {
        let mut file = memory()?;
        let mut reader = file.begin(1, Mode::ReadOnly)?;
        let mut writer = file.begin(2, Mode::ReadWrite)?;
        file.write(&writer, &[9; 12])?;
        commit(&mut file, &mut writer)?;

        assert_eq!(0, file.length(&reader)?);
        file.promote(&mut reader)?;
        assert_eq!(12, file.length(&reader)?);
        assert_eq!(Watermark::new(12, 12), reader.watermark());
        Ok(())
    }

    #[test]
    fn readers_pass_through_commit_phases() -> Result<()> {
        let mut file = memory()?;
        let mut reader = file.begin(1, Mode::ReadOnly)?;
        assert_eq!(None, file.commit_prepare(&mut reader)?);
        file.commit(&mut reader)?;
        file.commit_end(&mut reader)?;
        assert_eq!(Phase::Ended, reader.phase());
        file.complete(&mut reader)?;
        file.complete(&mut reader)?;
        assert_eq!(Phase::Complete, reader.phase());
        Ok(())
    }

    #[test]
    fn crash_after_prepare_is_discarded() -> Result<()> {
        let dir = tempfile::tempdir()?;
        {
            let mut file = on_disk(dir.path())?;
            let mut writer = file.begin(1, Mode::ReadWrite)?;
            file.write(&writer, &[5; 50])?;
            let payload = file.commit_prepare(&mut writer)?;
            assert_eq!(Some(Watermark::new(50, 50).encode()), payload);
            // The process dies here, before commit.
        }

        let mut file = on_disk(dir.path())?;
        assert_eq!(Watermark::default(), file.watermark());
        assert_eq!(50, file.backend().physical_length());
        file.start_recovery()?;
        file.finish_recovery()?;
        assert_eq!(0, file.backend().physical_length());
        assert_eq!(0, file.begin(2, Mode::ReadOnly)?.watermark().length);
        Ok(())
    }

    #[test]
    fn recovery_replays_committed_payload() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let payload = {
            let mut file = on_disk(dir.path())?;
            let mut writer = file.begin(1, Mode::ReadWrite)?;
            file.write(&writer, &[5; 50])?;
            file.commit_prepare(&mut writer)?
        };
        let payload = payload.ok_or_else(|| Error::Internal("no payload".into()))?;

        // Replaying twice is the same as replaying once.
        let mut file = on_disk(dir.path())?;
        file.start_recovery()?;
        assert!(matches!(file.begin(2, Mode::ReadOnly), Err(Error::ConcurrencyMisuse(_))));
        file.recover(&payload)?;
        file.recover(&payload)?;
        file.finish_recovery()?;
        assert_eq!(Watermark::new(50, 50), file.watermark());
        assert_eq!(50, file.backend().physical_length());
        drop(file);

        let file = on_disk(dir.path())?;
        assert_eq!(Watermark::new(50, 50), file.watermark());
        Ok(())
    }

    #[test]
    fn recovery_mismatch_halts() -> Result<()> {
        let mut file = memory()?;
        file.start_recovery()?;
        file.recover(&Watermark::new(50, 50).encode())?;
        assert!(matches!(file.finish_recovery(), Err(Error::RecoveryMismatch(_))));
        assert!(file.is_halted());
        assert!(matches!(file.begin(1, Mode::ReadOnly), Err(Error::Corruption(_))));
        Ok(())
    }

    #[test]
    fn recover_requires_recovery_mode() -> Result<()> {
        let mut file = memory()?;
        assert!(matches!(file.recover(&Watermark::default().encode()), Err(Error::ConcurrencyMisuse(_))));
        file.start_recovery()?;
        assert!(matches!(file.recover(&[1, 2, 3]), Err(Error::Corruption(_))));
        assert!(file.is_halted());
        Ok(())
    }
}
