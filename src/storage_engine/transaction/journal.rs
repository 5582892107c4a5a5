use crate::error::{Error, Result};
use crate::storage_engine::byte_resource::ByteResource;
use crate::storage_engine::transaction::{ComponentId, TxnId};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

/// Size of an entry frame header: body length and CRC32 of the body, both big-endian u32.
const FRAME_HEADER: usize = 8;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryKind {
    /// A component's prepared state, applied at recovery if its transaction committed.
    Redo,
    /// The commit point of a transaction.
    Commit,
    Abort,
}

/// A journal entry, tagged with the transaction and (for redo entries) the component it
/// belongs to.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub kind: EntryKind,
    pub txn: TxnId,
    pub component: [u8; 16],
    pub payload: Vec<u8>,
}

impl JournalEntry {
    pub fn redo(txn: TxnId, component: &ComponentId, payload: Vec<u8>) -> Self {
        Self { kind: EntryKind::Redo, txn, component: *component.bytes(), payload }
    }

    pub fn commit(txn: TxnId) -> Self {
        Self { kind: EntryKind::Commit, txn, component: [0; 16], payload: Vec::new() }
    }

    pub fn abort(txn: TxnId) -> Self {
        Self { kind: EntryKind::Abort, txn, component: [0; 16], payload: Vec::new() }
    }
}

/// An append-only journal of framed entries: `[len:u32][crc32:u32][bincode entry]`. A torn or
/// corrupt frame ends the readable journal; everything before it is intact.
#[derive(Debug)]
pub struct Journal<R: ByteResource> {
    resource: R,
}

impl<R: ByteResource> Journal<R> {
    pub fn new(resource: R) -> Self {
        Self { resource }
    }

    /// Appends an entry, returning its position. The entry is durable only after `sync`.
    pub fn append(&mut self, entry: &JournalEntry) -> Result<u64> {
        let body = bincode::serialize(entry)?;
        let len = u32::try_from(body.len())
            .map_err(|_| Error::Value(format!("Journal entry of {} bytes is too large", body.len())))?;
        let mut frame = Vec::with_capacity(FRAME_HEADER + body.len());
        frame.extend_from_slice(&len.to_be_bytes());
        frame.extend_from_slice(&crc32fast::hash(&body).to_be_bytes());
        frame.extend_from_slice(&body);
        self.resource.append(&frame)
    }

    pub fn sync(&mut self) -> Result<()> {
        self.resource.sync()
    }

    /// Reads all intact entries from the start of the journal.
    pub fn entries(&self) -> Result<Vec<JournalEntry>> {
        let length = self.resource.length();
        let mut entries = Vec::new();
        let mut pos = 0;
        while pos < length {
            if length - pos < FRAME_HEADER as u64 {
                warn!("Ignoring torn journal frame header at {}", pos);
                break;
            }
            let header = self.resource.read_exact_at(pos, FRAME_HEADER)?;
            let len = u32::from_be_bytes([header[0], header[1], header[2], header[3]]) as u64;
            let crc = u32::from_be_bytes([header[4], header[5], header[6], header[7]]);
            let start = pos + FRAME_HEADER as u64;
            if length - start < len {
                warn!("Ignoring torn journal entry at {}", pos);
                break;
            }
            let body = self.resource.read_exact_at(start, len as usize)?;
            if crc32fast::hash(&body) != crc {
                warn!("Ignoring journal entry with bad checksum at {}", pos);
                break;
            }
            match bincode::deserialize(&body) {
                Ok(entry) => entries.push(entry),
                Err(err) => {
                    warn!("Ignoring undecodable journal entry at {}: {}", pos, err);
                    break;
                }
            }
            pos = start + len;
        }
        debug!("Read {} journal entries", entries.len());
        Ok(entries)
    }

    /// Empties the journal durably.
    pub fn reset(&mut self) -> Result<()> {
        self.resource.truncate(0)?;
        self.resource.sync()
    }

    pub fn is_empty(&self) -> bool {
        self.resource.is_empty()
    }

    pub fn resource(&self) -> &R {
        &self.resource
    }

    pub fn close(&mut self) -> Result<()> {
        self.resource.close()
    }
}
