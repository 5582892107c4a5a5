use crate::error::{Error, Result};
use crate::storage_engine::byte_resource::ByteResource;
use crate::storage_engine::transaction::Watermark;
use core_models::state::StateRecord;

/// A small resource holding a component's committed watermark as a two-field state record.
pub struct StateFile {
    resource: Box<dyn ByteResource>,
}

impl std::fmt::Debug for StateFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "StateFile({} bytes)", self.resource.length())
    }
}

impl StateFile {
    pub fn new(resource: impl ByteResource + 'static) -> Self {
        Self { resource: Box::new(resource) }
    }

    /// Reads the stored watermark, or None if nothing was ever written.
    pub fn read(&self) -> Result<Option<Watermark>> {
        if self.resource.is_empty() {
            return Ok(None);
        }
        let length = self.resource.length();
        if length != StateRecord::<2>::SIZE as u64 {
            return Err(Error::Corruption(format!("State file of {} bytes", length)));
        }
        let bytes = self.resource.read_exact_at(0, StateRecord::<2>::SIZE)?;
        Ok(Some(Watermark::decode(&bytes)?))
    }

    /// Durably stores the watermark.
    pub fn write(&mut self, watermark: &Watermark) -> Result<()> {
        self.resource.write_at(0, &watermark.encode())?;
        self.resource.sync()
    }

    pub fn close(&mut self) -> Result<()> {
        self.resource.close()
    }
}
