use crate::error::{Error, Result};
use crate::storage_engine::byte_resource::ByteResource;
use core_models::b_tree::{BNode, Page, PageId};
use core_models::record::RecordFactory;
use log::{debug, warn};
use std::fmt::Display;

/// Page storage for a B+Tree, addressed by page id.
pub trait PageStore {
    /// Loads a page.
    fn get(&self, id: PageId) -> Result<Page>;

    /// Reserves an unused page id. The page holds nothing until it is put.
    fn alloc(&mut self) -> Result<PageId>;

    /// Stores a page under an allocated id.
    fn put(&mut self, id: PageId, page: &Page) -> Result<()>;

    /// Gives up a page id that is no longer referenced by the tree.
    fn release(&mut self, id: PageId) -> Result<()>;

    /// Whether the page may be overwritten in place. Pages that are not writable belong to a
    /// committed tree and must be copied before they change.
    fn is_writable(&self, _id: PageId) -> bool {
        true
    }
}

/// An in-memory page store. Every page is writable and released ids are reused.
#[derive(Debug, Default)]
pub struct MemoryPageStore {
    pages: Vec<Option<Page>>,
    free: Vec<PageId>,
}

impl Display for MemoryPageStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "memory")
    }
}

impl MemoryPageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live pages.
    pub fn page_count(&self) -> usize {
        self.pages.iter().filter(|p| p.is_some()).count()
    }
}

impl PageStore for MemoryPageStore {
    fn get(&self, id: PageId) -> Result<Page> {
        match self.pages.get(id as usize) {
            Some(Some(page)) => Ok(page.clone()),
            _ => Err(Error::Corruption(format!("Dangling page id {}", id))),
        }
    }

    fn alloc(&mut self) -> Result<PageId> {
        if let Some(id) = self.free.pop() {
            return Ok(id);
        }
        let id = PageId::try_from(self.pages.len())
            .map_err(|_| Error::Internal("Page id space exhausted".into()))?;
        self.pages.push(None);
        Ok(id)
    }

    fn put(&mut self, id: PageId, page: &Page) -> Result<()> {
        match self.pages.get_mut(id as usize) {
            Some(slot) => {
                *slot = Some(page.clone());
                Ok(())
            }
            None => Err(Error::Internal(format!("Page {} was never allocated", id))),
        }
    }

    fn release(&mut self, id: PageId) -> Result<()> {
        match self.pages.get_mut(id as usize) {
            Some(slot) if slot.is_some() => {
                *slot = None;
                self.free.push(id);
                Ok(())
            }
            _ => Err(Error::Internal(format!("Released unknown page {}", id))),
        }
    }
}

/// A page store over a block file: page id n lives at byte offset n * block_size. Pages below
/// the sealed boundary belong to committed state and are never overwritten; fresh pages are
/// appended at the end of the file. Block 0 is reserved for the tree header.
#[derive(Debug)]
pub struct BlockPageStore<R: ByteResource> {
    resource: R,
    block_size: usize,
    factory: RecordFactory,
    sealed: PageId,
}

impl<R: ByteResource + Display> Display for BlockPageStore<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "blocks({})", self.resource)
    }
}

impl<R: ByteResource> BlockPageStore<R> {
    /// Wraps a block file. Every block already in the file is sealed. An empty file gets a
    /// zeroed header block. A partial trailing block is ignored.
    pub fn new(mut resource: R, block_size: usize, factory: RecordFactory) -> Result<Self> {
        if block_size == 0 {
            return Err(Error::Value("Block size must be positive".into()));
        }
        let torn = resource.length() % block_size as u64;
        if torn != 0 {
            // A crash mid-append. Recovery truncates it away.
            warn!("Block file ends with a partial block of {} bytes", torn);
        }
        if resource.is_empty() {
            resource.write_at(0, &vec![0; block_size])?;
        }
        let mut store = Self { resource, block_size, factory, sealed: 0 };
        store.seal()?;
        Ok(store)
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn factory(&self) -> &RecordFactory {
        &self.factory
    }

    /// Number of blocks in the file, header included.
    pub fn block_count(&self) -> Result<PageId> {
        PageId::try_from(self.resource.length() / self.block_size as u64)
            .map_err(|_| Error::Corruption("Block file exceeds the page id space".into()))
    }

    /// Seals every block currently in the file against in-place writes.
    pub fn seal(&mut self) -> Result<()> {
        self.sealed = self.block_count()?;
        Ok(())
    }

    /// Reads the raw header block.
    pub fn read_header(&self) -> Result<Vec<u8>> {
        self.resource.read_exact_at(0, self.block_size)
    }

    /// Writes the header block, zero-padded.
    pub fn write_header(&mut self, header: &[u8]) -> Result<()> {
        if header.len() > self.block_size {
            return Err(Error::Value(format!(
                "Header of {} bytes does not fit block size {}",
                header.len(),
                self.block_size
            )));
        }
        let mut block = vec![0; self.block_size];
        block[..header.len()].copy_from_slice(header);
        self.resource.write_at(0, &block)
    }

    pub fn resource(&self) -> &R {
        &self.resource
    }

    pub fn resource_mut(&mut self) -> &mut R {
        &mut self.resource
    }

    fn offset(&self, id: PageId) -> u64 {
        id as u64 * self.block_size as u64
    }
}

impl<R: ByteResource> PageStore for BlockPageStore<R> {
    fn get(&self, id: PageId) -> Result<Page> {
        if id == 0 || id >= self.block_count()? {
            return Err(Error::Corruption(format!("Dangling page id {}", id)));
        }
        let bytes = self.resource.read_exact_at(self.offset(id), self.block_size)?;
        Ok(BNode::load_from_bytes(&bytes).to_page(&self.factory)?)
    }

    fn alloc(&mut self) -> Result<PageId> {
        let id = self.block_count()?;
        self.resource.write_at(self.offset(id), &vec![0; self.block_size])?;
        Ok(id)
    }

    fn put(&mut self, id: PageId, page: &Page) -> Result<()> {
        if !self.is_writable(id) {
            return Err(Error::Internal(format!("Page {} is sealed", id)));
        }
        if id >= self.block_count()? {
            return Err(Error::Internal(format!("Page {} was never allocated", id)));
        }
        let node = BNode::from_page(page, &self.factory, self.block_size)?;
        self.resource.write_at(self.offset(id), &node.data)
    }

    fn release(&mut self, id: PageId) -> Result<()> {
        // Committed pages may still be read through older roots, so blocks are never reused.
        debug!("Released page {}", id);
        Ok(())
    }

    fn is_writable(&self, id: PageId) -> bool {
        id >= self.sealed
    }
}
