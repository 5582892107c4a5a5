use crate::error::{Error, Result};
use crate::storage_engine::byte_resource::ByteResource;
use log::debug;
use std::fmt::Display;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// A byte resource backed by a file. The file length is tracked in memory, since the resource
/// is the file's only writer.
#[derive(Debug)]
pub struct FileResource {
    path: PathBuf,
    file: Option<File>,
    length: u64,
}

impl Display for FileResource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "file:{}", self.path.display())
    }
}

impl FileResource {
    /// Opens a file resource, creating the file if it does not exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().read(true).write(true).create(true).open(&path)?;
        let length = file.metadata()?.len();
        debug!("Opened {} with length {}", path.display(), length);
        Ok(Self { path, file: Some(file), length })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn file(&self) -> Result<&File> {
        match self.file.as_ref() {
            Some(file) => Ok(file),
            None => Err(Error::Internal(format!("File {} is closed", self.path.display()))),
        }
    }
}

impl ByteResource for FileResource {
    fn read_at(&self, pos: u64, buf: &mut [u8]) -> Result<usize> {
        let mut file = self.file()?;
        file.seek(SeekFrom::Start(pos))?;
        let mut n = 0;
        while n < buf.len() {
            match file.read(&mut buf[n..])? {
                0 => break,
                read => n += read,
            }
        }
        Ok(n)
    }

    fn write_at(&mut self, pos: u64, buf: &[u8]) -> Result<()> {
        let mut file = self.file()?;
        file.seek(SeekFrom::Start(pos))?;
        file.write_all(buf)?;
        self.length = self.length.max(pos + buf.len() as u64);
        Ok(())
    }

    fn length(&self) -> u64 {
        self.length
    }

    fn truncate(&mut self, len: u64) -> Result<()> {
        if len >= self.length {
            return Ok(());
        }
        self.file()?.set_len(len)?;
        self.length = len;
        Ok(())
    }

    fn sync(&mut self) -> Result<()> {
        self.file()?.sync_data()?;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if let Some(file) = self.file.take() {
            file.sync_all()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod file_tests {
    use super::*;

    impl super::super::TestSuite<FileResource> for FileResource {
        type Guard = tempfile::TempDir;

        fn setup() -> Result<(Self, tempfile::TempDir)> {
            let dir = tempfile::tempdir()?;
            let resource = FileResource::open(dir.path().join("resource"))?;
            Ok((resource, dir))
        }
    }

    #[test]
    fn tests() -> Result<()> {
        use super::super::TestSuite;
        FileResource::test()
    }

    #[test]
    fn reopen_sees_written_length() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("data");
        let mut r = FileResource::open(&path)?;
        r.append(&[1, 2, 3])?;
        r.close()?;

        let r = FileResource::open(&path)?;
        assert_eq!(3, r.length());
        assert_eq!(vec![1, 2, 3], r.read_exact_at(0, 3)?);
        Ok(())
    }
}
