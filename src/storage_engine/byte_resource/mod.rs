mod file;
mod memory;

pub use file::*;
pub use memory::*;

use crate::error::{Error, Result};

/// A byte-addressed storage resource: an append-only log file, a blob file or a block file.
/// Each resource is exclusively owned by one component, which serializes access to it.
pub trait ByteResource: Send {
    /// Reads into the buffer from the given position, returning the number of bytes read. Fewer
    /// bytes than requested are only returned at the end of the resource. Reads go through a
    /// shared reference but still share the owner's serialized access.
    fn read_at(&self, pos: u64, buf: &mut [u8]) -> Result<usize>;

    /// Writes the buffer at the given position, extending the resource if needed.
    fn write_at(&mut self, pos: u64, buf: &[u8]) -> Result<()>;

    /// Returns the physical length of the resource.
    fn length(&self) -> u64;

    /// Truncates the resource to the given length. Truncating beyond the end does nothing.
    fn truncate(&mut self, len: u64) -> Result<()>;

    /// Makes all writes durable.
    fn sync(&mut self) -> Result<()>;

    /// Flushes and closes the resource. Further calls fail.
    fn close(&mut self) -> Result<()>;

    /// Appends the buffer, returning the position it was written at.
    fn append(&mut self, buf: &[u8]) -> Result<u64> {
        let pos = self.length();
        self.write_at(pos, buf)?;
        Ok(pos)
    }

    /// The current write position, i.e. where the next append lands.
    fn position(&self) -> u64 {
        self.length()
    }

    fn is_empty(&self) -> bool {
        self.length() == 0
    }

    /// Reads exactly `len` bytes from the given position.
    fn read_exact_at(&self, pos: u64, len: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0; len];
        let n = self.read_at(pos, &mut buf)?;
        if n < len {
            return Err(Error::ShortIo { expected: len as u64, actual: n as u64 });
        }
        Ok(buf)
    }
}

impl<R: ByteResource + ?Sized> ByteResource for Box<R> {
    fn read_at(&self, pos: u64, buf: &mut [u8]) -> Result<usize> {
        (**self).read_at(pos, buf)
    }

    fn write_at(&mut self, pos: u64, buf: &[u8]) -> Result<()> {
        (**self).write_at(pos, buf)
    }

    fn length(&self) -> u64 {
        (**self).length()
    }

    fn truncate(&mut self, len: u64) -> Result<()> {
        (**self).truncate(len)
    }

    fn sync(&mut self) -> Result<()> {
        (**self).sync()
    }

    fn close(&mut self) -> Result<()> {
        (**self).close()
    }
}

#[cfg(test)]
trait TestSuite<R: ByteResource> {
    /// Whatever must outlive the resource, such as its temporary directory.
    type Guard;

    fn setup() -> Result<(R, Self::Guard)>;

    fn test() -> Result<()> {
        Self::test_append()?;
        Self::test_read_at()?;
        Self::test_write_at()?;
        Self::test_truncate()?;
        Self::test_close()?;
        Ok(())
    }

    fn test_append() -> Result<()> {
        let (mut r, _guard) = Self::setup()?;
        assert!(r.is_empty());
        assert_eq!(0, r.append(&[0x01, 0x02])?);
        assert_eq!(2, r.append(&[0x03])?);
        assert_eq!(3, r.length());
        assert_eq!(3, r.position());
        assert_eq!(vec![0x01, 0x02, 0x03], r.read_exact_at(0, 3)?);
        Ok(())
    }

    fn test_read_at() -> Result<()> {
        let (mut r, _guard) = Self::setup()?;
        r.append(&[0x01, 0x02, 0x03])?;
        let mut buf = [0u8; 4];
        assert_eq!(2, r.read_at(1, &mut buf)?);
        assert_eq!([0x02, 0x03], buf[..2]);
        assert_eq!(0, r.read_at(5, &mut buf)?);
        assert_eq!(Err(Error::ShortIo { expected: 4, actual: 3 }), r.read_exact_at(0, 4));
        Ok(())
    }

    fn test_write_at() -> Result<()> {
        let (mut r, _guard) = Self::setup()?;
        r.append(&[0x01, 0x02, 0x03])?;
        r.write_at(1, &[0x20])?;
        r.write_at(4, &[0x05])?;
        assert_eq!(5, r.length());
        assert_eq!(vec![0x01, 0x20, 0x03, 0x00, 0x05], r.read_exact_at(0, 5)?);
        Ok(())
    }

    fn test_truncate() -> Result<()> {
        let (mut r, _guard) = Self::setup()?;
        r.append(&[0x01, 0x02, 0x03])?;
        r.truncate(5)?;
        assert_eq!(3, r.length());
        r.truncate(1)?;
        r.sync()?;
        assert_eq!(1, r.length());
        assert_eq!(1, r.append(&[0x09])?);
        assert_eq!(vec![0x01, 0x09], r.read_exact_at(0, 2)?);
        Ok(())
    }

    fn test_close() -> Result<()> {
        let (mut r, _guard) = Self::setup()?;
        r.append(&[0x01])?;
        r.close()?;
        assert!(r.append(&[0x02]).is_err());
        Ok(())
    }
}
