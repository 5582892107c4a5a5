use super::{BranchPage, LeafPage, NodeType, Page, PageId};
use crate::record::RecordFactory;
use crate::{CodecError, HEADER, PAGE_ID_SIZE};
use byteorder::{BigEndian, ReadBytesExt};
use bytes::{BufMut, Bytes, BytesMut};
use std::io::Cursor;


/// A page as stored in a fixed-size block:
///
/// leaf:   [type:2][count:2][record_0]...[record_{count-1}]
/// branch: [type:2][count:2][child_0][key_0][child_1][key_1]...[child_count]
///
/// Counts and child ids are big-endian; a branch's count is its number of separator keys. The
/// rest of the block is zero-filled.
#[derive(Debug, PartialEq, Eq)]
pub struct BNode {
    pub data: Bytes,
}


impl BNode {
    pub fn load_from_bytes(value: &[u8]) -> BNode {
        let data = Bytes::copy_from_slice(value);

        BNode { data }
    }

    pub fn node_type(&self) -> Result<NodeType, CodecError> {
        let array: [u8; 2] = self.header_slice(0..2)?.try_into().map_err(|_| self.truncated(2))?;

        match NodeType::from(&array) {
            NodeType::Unknown => Err(CodecError::UnknownNodeType(array)),
            node_type => Ok(node_type),
        }
    }

    pub fn number_of_keys(&self) -> Result<u16, CodecError> {
        let mut rdr = Cursor::new(self.header_slice(2..4)?);
        rdr.read_u16::<BigEndian>().map_err(|_| self.truncated(HEADER))
    }

    /// Bytes needed to encode the page, before padding to a block.
    pub fn encoded_len(page: &Page, factory: &RecordFactory) -> usize {
        match page {
            Page::Leaf(leaf) => HEADER + leaf.len() * factory.record_len(),
            Page::Branch(branch) => {
                HEADER + branch.children.len() * PAGE_ID_SIZE + branch.keys.len() * factory.key_len()
            }
        }
    }

    /// Encodes a page into a zero-padded block of `block_size` bytes.
    pub fn from_page(page: &Page, factory: &RecordFactory, block_size: usize) -> Result<BNode, CodecError> {
        let needed = Self::encoded_len(page, factory);
        if needed > block_size {
            return Err(CodecError::Overflow { needed, block_size });
        }

        let node_type: [u8; 2] = page.node_type().into();
        let mut buf = BytesMut::with_capacity(block_size);
        buf.put_slice(&node_type);
        match page {
            Page::Leaf(leaf) => {
                buf.put_u16(leaf.len() as u16);
                for record in &leaf.records {
                    factory.encode_into(record, &mut buf);
                }
            }
            Page::Branch(branch) => {
                buf.put_u16(branch.keys.len() as u16);
                for (i, child) in branch.children.iter().enumerate() {
                    buf.put_u32(*child);
                    if let Some(key) = branch.keys.get(i) {
                        factory.check_key(key)?;
                        buf.put_slice(key);
                    }
                }
            }
        }
        buf.resize(block_size, 0);

        Ok(BNode { data: buf.freeze() })
    }

    /// Decodes the page held by this block.
    pub fn to_page(&self, factory: &RecordFactory) -> Result<Page, CodecError> {
        let count = self.number_of_keys()? as usize;
        match self.node_type()? {
            NodeType::BNodeLeaf => {
                let width = factory.record_len();
                let body = self.body(count * width)?;
                let records = (0..count)
                    .map(|i| factory.decode(&body[i * width..]))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Page::Leaf(LeafPage::new(records)))
            }
            NodeType::BNodeBranch => {
                let stride = PAGE_ID_SIZE + factory.key_len();
                let body = self.body(count * stride + PAGE_ID_SIZE)?;
                let mut rdr = Cursor::new(body);
                let mut keys = Vec::with_capacity(count);
                let mut children: Vec<PageId> = Vec::with_capacity(count + 1);
                for i in 0..=count {
                    children.push(rdr.read_u32::<BigEndian>().map_err(|_| self.truncated(HEADER + body.len()))?);
                    if i < count {
                        let start = rdr.position() as usize;
                        keys.push(body[start..start + factory.key_len()].to_vec());
                        rdr.set_position((start + factory.key_len()) as u64);
                    }
                }
                Ok(Page::Branch(BranchPage::new(keys, children)))
            }
            NodeType::Unknown => Err(CodecError::UnknownNodeType([0xf, 0xf])),
        }
    }

    fn header_slice(&self, range: std::ops::Range<usize>) -> Result<&[u8], CodecError> {
        let end = range.end;
        self.data.get(range).ok_or_else(|| self.truncated(end))
    }

    fn body(&self, len: usize) -> Result<&[u8], CodecError> {
        self.data.get(HEADER..HEADER + len).ok_or_else(|| self.truncated(HEADER + len))
    }

    fn truncated(&self, needed: usize) -> CodecError {
        CodecError::Truncated { needed, available: self.data.len() }
    }
}
