use crate::CodecError;
use byteorder::{BigEndian, ByteOrder};
use bytes::{BufMut, Bytes, BytesMut};

/// A fixed-size array of 8-byte integer fields with a fixed big-endian encoding. Components
/// use it to persist their commit-point metadata, both in their own state files and as journal
/// payloads.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StateRecord<const N: usize> {
    fields: [u64; N],
}

impl<const N: usize> StateRecord<N> {
    /// Encoded size in bytes.
    pub const SIZE: usize = N * 8;

    pub fn new(fields: [u64; N]) -> Self {
        Self { fields }
    }

    pub fn fields(&self) -> &[u64; N] {
        &self.fields
    }

    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(Self::SIZE);
        for field in self.fields {
            buf.put_u64(field);
        }
        buf.freeze()
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CodecError> {
        if bytes.len() != Self::SIZE {
            return Err(CodecError::Length { expected: Self::SIZE, actual: bytes.len() });
        }
        let mut fields = [0u64; N];
        for (i, chunk) in bytes.chunks_exact(8).enumerate() {
            fields[i] = BigEndian::read_u64(chunk);
        }
        Ok(Self { fields })
    }
}

impl<const N: usize> Default for StateRecord<N> {
    fn default() -> Self {
        Self { fields: [0; N] }
    }
}
