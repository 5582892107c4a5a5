use crate::error::{Error, Result};
use crate::storage_engine::byte_resource::ByteResource;
use std::fmt::Display;

/// An in-memory byte resource. Sync is a no-op.
#[derive(Debug, Default)]
pub struct MemoryResource {
    data: Vec<u8>,
    closed: bool,
}

impl Display for MemoryResource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "memory")
    }
}

impl MemoryResource {
    pub fn new() -> Self {
        Self::default()
    }

    fn check_open(&self) -> Result<()> {
        if self.closed {
            return Err(Error::Internal("Memory resource is closed".into()));
        }
        Ok(())
    }
}

impl ByteResource for MemoryResource {
    fn read_at(&self, pos: u64, buf: &mut [u8]) -> Result<usize> {
        self.check_open()?;
        let start = (pos as usize).min(self.data.len());
        let n = buf.len().min(self.data.len() - start);
        buf[..n].copy_from_slice(&self.data[start..start + n]);
        Ok(n)
    }

    fn write_at(&mut self, pos: u64, buf: &[u8]) -> Result<()> {
        self.check_open()?;
        let start = pos as usize;
        let end = start + buf.len();
        if end > self.data.len() {
            self.data.resize(end, 0);
        }
        self.data[start..end].copy_from_slice(buf);
        Ok(())
    }

    fn length(&self) -> u64 {
        self.data.len() as u64
    }

    fn truncate(&mut self, len: u64) -> Result<()> {
        self.check_open()?;
        self.data.truncate(len as usize);
        Ok(())
    }

    fn sync(&mut self) -> Result<()> {
        self.check_open()
    }

    fn close(&mut self) -> Result<()> {
        self.closed = true;
        Ok(())
    }
}


#[cfg(test)]
mod memory_tests {
    use super::*;

    impl super::super::TestSuite<MemoryResource> for MemoryResource {
        type Guard = ();

        fn setup() -> Result<(Self, ())> {
            Ok((MemoryResource::new(), ()))
        }
    }

    #[test]
    fn tests() -> Result<()> {
        use super::super::TestSuite;
        MemoryResource::test()
    }
}
