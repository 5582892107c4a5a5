use crate::config::StoreOptions;
use crate::error::{Error, Result};
use crate::storage_engine::byte_resource::ByteResource;
use crate::storage_engine::components::{Component, ComponentBackend, StateFile};
use crate::storage_engine::transaction::{ComponentId, TxnSnapshot, Watermark};

/// A single blob kept in an append-only file. Every new value is appended; the watermark is
/// {length: file length, position: start of the current value}, so the blob is the byte range
/// [position, length). Readers pinned to an older watermark keep reading the older value.
#[derive(Debug)]
pub struct BlobBackend<R: ByteResource> {
    data: R,
    /// Watermark the active writer started from.
    base: Watermark,
    /// The writer's latest value, once set.
    pending: Option<Watermark>,
}

impl<R: ByteResource> ComponentBackend for BlobBackend<R> {
    fn initial_watermark(&self) -> Watermark {
        Watermark::default()
    }

    fn flush(&mut self) -> Result<Watermark> {
        Ok(self.pending.unwrap_or(self.base))
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

    fn restore(&mut self, watermark: &Watermark) -> Result<()> {
        if watermark.position > watermark.length {
            return Err(Error::Corruption(format!("Blob starts past its end: {:?}", watermark)));
        }
        self.base = *watermark;
        self.pending = None;
        Ok(())
    }

    fn begin_write(&mut self, watermark: &Watermark) -> Result<()> {
        self.restore(watermark)
    }

    fn close(&mut self) -> Result<()> {
        self.data.close()
    }
}

/// A transactional single-blob store.
pub type Blob<R> = Component<BlobBackend<R>>;

impl<R: ByteResource> Component<BlobBackend<R>> {
    pub fn open(
        id: ComponentId,
        data: R,
        state: impl ByteResource + 'static,
        options: StoreOptions,
    ) -> Result<Self> {
        let backend = BlobBackend { data, base: Watermark::default(), pending: None };
        Self::with_backend(id, backend, StateFile::new(state), options)
    }

    /// Returns the blob as seen by the transaction. An unset blob is empty.
    pub fn get(&self, snapshot: &TxnSnapshot) -> Result<Vec<u8>> {
        self.check_read(snapshot)?;
        let watermark = match (self.is_writer(snapshot), self.backend.pending) {
            (true, Some(pending)) => pending,
            _ => snapshot.watermark(),
        };
        let len = watermark
            .length
            .checked_sub(watermark.position)
            .and_then(|len| usize::try_from(len).ok())
            .ok_or_else(|| Error::Corruption(format!("Invalid blob extent {:?}", watermark)))?;
        self.backend.data.read_exact_at(watermark.position, len)
    }

    /// Replaces the blob. The new value becomes visible to others at commit.
    pub fn set(&mut self, snapshot: &TxnSnapshot, bytes: &[u8]) -> Result<()> {
        self.check_write(snapshot)?;
        let position = self.backend.data.append(bytes)?;
        self.backend.pending = Some(Watermark::new(position + bytes.len() as u64, position));
        Ok(())
    }
}
