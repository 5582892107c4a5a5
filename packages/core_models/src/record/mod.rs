use crate::CodecError;
use bytes::BufMut;
use std::cmp::Ordering;
use std::fmt;

/// A fixed-width record: a key and an optional value, both of the widths fixed by the
/// `RecordFactory` that built them. Records are ordered by key alone, compared as unsigned
/// bytes. Records are never mutated; an update is a delete plus an insert.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Record {
    key: Vec<u8>,
    value: Vec<u8>,
}

impl Record {
    pub fn key(&self) -> &[u8] {
        &self.key
    }

    /// The value bytes, empty for key-only records.
    pub fn value(&self) -> &[u8] {
        &self.value
    }

    /// Compares this record's key with the given key.
    pub fn cmp_key(&self, key: &[u8]) -> Ordering {
        self.key.as_slice().cmp(key)
    }
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.value.is_empty() {
            write!(f, "{:02x?}", self.key)
        } else {
            write!(f, "{:02x?}={:02x?}", self.key, self.value)
        }
    }
}

/// Builds and decodes records of one structure. All records of a structure share the key and
/// value widths.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RecordFactory {
    key_len: usize,
    value_len: usize,
}

impl RecordFactory {
    pub fn new(key_len: usize, value_len: usize) -> Self {
        Self { key_len, value_len }
    }

    pub fn key_len(&self) -> usize {
        self.key_len
    }

    pub fn value_len(&self) -> usize {
        self.value_len
    }

    /// Encoded width of one record.
    pub fn record_len(&self) -> usize {
        self.key_len + self.value_len
    }

    pub fn has_value(&self) -> bool {
        self.value_len > 0
    }

    /// Creates a record, checking both widths.
    pub fn create(&self, key: &[u8], value: &[u8]) -> Result<Record, CodecError> {
        self.check_key(key)?;
        if value.len() != self.value_len {
            return Err(CodecError::ValueWidth { expected: self.value_len, actual: value.len() });
        }
        Ok(Record { key: key.to_vec(), value: value.to_vec() })
    }

    /// Creates a key-only record. For factories with a value width the value is zero-filled.
    pub fn create_key(&self, key: &[u8]) -> Result<Record, CodecError> {
        self.check_key(key)?;
        Ok(Record { key: key.to_vec(), value: vec![0; self.value_len] })
    }

    pub fn check_key(&self, key: &[u8]) -> Result<(), CodecError> {
        if key.len() != self.key_len {
            return Err(CodecError::KeyWidth { expected: self.key_len, actual: key.len() });
        }
        Ok(())
    }

    /// Checks that a record built elsewhere matches this factory's widths.
    pub fn check(&self, record: &Record) -> Result<(), CodecError> {
        self.check_key(&record.key)?;
        if record.value.len() != self.value_len {
            return Err(CodecError::ValueWidth {
                expected: self.value_len,
                actual: record.value.len(),
            });
        }
        Ok(())
    }

    pub fn encode_into(&self, record: &Record, buf: &mut impl BufMut) {
        buf.put_slice(&record.key);
        buf.put_slice(&record.value);
    }

    pub fn decode(&self, bytes: &[u8]) -> Result<Record, CodecError> {
        if bytes.len() < self.record_len() {
            return Err(CodecError::Truncated { needed: self.record_len(), available: bytes.len() });
        }
        Ok(Record {
            key: bytes[..self.key_len].to_vec(),
            value: bytes[self.key_len..self.record_len()].to_vec(),
        })
    }
}


#[cfg(test)]
mod record_tests {
    use super::*;

    #[test]
    fn widths_are_enforced() {
        let factory = RecordFactory::new(2, 1);
        assert!(factory.create(&[1, 2], &[3]).is_ok());
        assert_eq!(
            factory.create(&[1], &[3]),
            Err(CodecError::KeyWidth { expected: 2, actual: 1 })
        );
        assert_eq!(
            factory.create(&[1, 2], &[]),
            Err(CodecError::ValueWidth { expected: 1, actual: 0 })
        );
    }

    #[test]
    fn keys_compare_as_unsigned_bytes() {
        let factory = RecordFactory::new(1, 0);
        let low = factory.create_key(&[0x7f]).unwrap();
        assert_eq!(low.cmp_key(&[0x80]), Ordering::Less);
        assert_eq!(low.cmp_key(&[0x7f]), Ordering::Equal);
    }

    #[test]
    fn decode_reads_one_record() {
        let factory = RecordFactory::new(2, 2);
        let record = factory.decode(&[1, 2, 3, 4, 5]).unwrap();
        assert_eq!(record.key(), &[1, 2]);
        assert_eq!(record.value(), &[3, 4]);
        assert_eq!(
            factory.decode(&[1, 2, 3]),
            Err(CodecError::Truncated { needed: 4, available: 3 })
        );
    }
}
