use crate::config::{StoreOptions, TreeParams};
use crate::error::{Error, Result};
use crate::storage_engine::b_tree::{BPlusTree, BlockPageStore, PageStore, RangeIter, TreeStats};
use crate::storage_engine::byte_resource::ByteResource;
use crate::storage_engine::components::{Component, ComponentBackend, StateFile};
use crate::storage_engine::transaction::{ComponentId, TxnSnapshot, Watermark};
use core_models::b_tree::PageId;
use core_models::record::Record;
use log::info;
use serde::{Deserialize, Serialize};

/// Identifies a tree block file.
pub const TREE_MAGIC: u32 = 0x4250_5431;

/// Tree metadata stored in block 0 of a tree file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeHeader {
    pub magic: u32,
    pub params: TreeParams,
    /// Root page when the file was formatted. The committed root lives in the watermark.
    pub root: PageId,
}

/// A B+Tree in a block file. Its watermark is {length: file length in bytes, position: root
/// page id}. Every page below the committed length is sealed, so a write transaction copies
/// pages on write and readers keep walking the root they began with.
pub struct TreeBackend<R: ByteResource> {
    tree: BPlusTree<BlockPageStore<R>>,
}

impl<R: ByteResource> std::fmt::Debug for TreeBackend<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TreeBackend").field("root", &self.tree.root()).field("params", self.tree.params()).finish()
    }
}

impl<R: ByteResource> TreeBackend<R> {
    /// Opens a tree file, formatting it with an empty tree if it is new. An existing file must
    /// have been formatted with the same parameters.
    pub fn open(data: R, params: TreeParams, block_size: usize) -> Result<Self> {
        params.validate()?;
        params.check_block(block_size)?;
        let fresh = data.is_empty();
        let store = BlockPageStore::new(data, block_size, params.record_factory())?;
        if fresh {
            let mut tree = BPlusTree::create(store, params)?;
            let header = TreeHeader { magic: TREE_MAGIC, params, root: tree.root() };
            tree.store_mut().write_header(&bincode::serialize(&header)?)?;
            tree.store_mut().resource_mut().sync()?;
            info!("Formatted tree file with order {} and root {}", params.order, header.root);
            return Ok(Self { tree });
        }
        let header: TreeHeader = bincode::deserialize(&store.read_header()?)
            .map_err(|err| Error::Corruption(format!("Unreadable tree header: {}", err)))?;
        if header.magic != TREE_MAGIC {
            return Err(Error::Corruption(format!("Bad tree file magic {:#x}", header.magic)));
        }
        if header.params != params {
            return Err(Error::Value(format!(
                "Tree file has {:?}, opened with {:?}",
                header.params, params
            )));
        }
        Ok(Self { tree: BPlusTree::open(store, params, header.root)? })
    }

    pub fn tree(&self) -> &BPlusTree<BlockPageStore<R>> {
        &self.tree
    }
}

impl<R: ByteResource> ComponentBackend for TreeBackend<R> {
    fn initial_watermark(&self) -> Watermark {
        Watermark::new(self.tree.store().resource().length(), self.tree.root() as u64)
    }

    fn flush(&mut self) -> Result<Watermark> {
        Ok(Watermark::new(self.tree.store().resource().length(), self.tree.root() as u64))
    }

    fn sync(&mut self) -> Result<()> {
        self.tree.store_mut().resource_mut().sync()
    }

    fn physical_length(&self) -> u64 {
        self.tree.store().resource().length()
    }

    fn truncate(&mut self, length: u64) -> Result<()> {
        self.tree.store_mut().resource_mut().truncate(length)
    }

    fn restore(&mut self, watermark: &Watermark) -> Result<()> {
        let block_size = self.tree.store().block_size() as u64;
        if watermark.length % block_size != 0 {
            return Err(Error::Corruption(format!(
                "Committed length {} is not a multiple of block size {}",
                watermark.length, block_size
            )));
        }
        let root = PageId::try_from(watermark.position)
            .map_err(|_| Error::Corruption(format!("Root page {} out of range", watermark.position)))?;
        self.tree.set_root(root);
        Ok(())
    }

    fn begin_write(&mut self, watermark: &Watermark) -> Result<()> {
        self.restore(watermark)?;
        self.tree.store_mut().seal()
    }

    fn close(&mut self) -> Result<()> {
        self.tree.store_mut().resource_mut().close()
    }
}

/// A transactional B+Tree.
pub type TreeComponent<R> = Component<TreeBackend<R>>;

impl<R: ByteResource> Component<TreeBackend<R>> {
    pub fn open(
        id: ComponentId,
        data: R,
        state: impl ByteResource + 'static,
        params: TreeParams,
        options: StoreOptions,
    ) -> Result<Self> {
        let backend = TreeBackend::open(data, params, options.block_size)?;
        Self::with_backend(id, backend, StateFile::new(state), options)
    }

    /// The root the transaction reads from: the writer's working root, or the root committed
    /// when a reader began.
    fn root_for(&self, snapshot: &TxnSnapshot) -> Result<PageId> {
        self.check_read(snapshot)?;
        if self.is_writer(snapshot) {
            return Ok(self.backend.tree.root());
        }
        PageId::try_from(snapshot.watermark().position)
            .map_err(|_| Error::Corruption(format!("Root page {} out of range", snapshot.watermark().position)))
    }

    /// Inserts a record, returning the record it replaced.
    pub fn insert(&mut self, snapshot: &TxnSnapshot, record: Record) -> Result<Option<Record>> {
        self.check_write(snapshot)?;
        self.backend.tree.insert(record)
    }

    pub fn delete(&mut self, snapshot: &TxnSnapshot, key: &[u8]) -> Result<Option<Record>> {
        self.check_write(snapshot)?;
        self.backend.tree.delete(key)
    }

    pub fn get(&self, snapshot: &TxnSnapshot, key: &[u8]) -> Result<Option<Record>> {
        let root = self.root_for(snapshot)?;
        self.backend.tree.get_from(root, key)
    }

    /// Iterates over records with `min <= key < max` as seen by the transaction.
    pub fn range(
        &self,
        snapshot: &TxnSnapshot,
        min: Option<&[u8]>,
        max: Option<&[u8]>,
    ) -> Result<RangeIter<'_, BlockPageStore<R>>> {
        let root = self.root_for(snapshot)?;
        Ok(self.backend.tree.range_from(root, min, max))
    }

    pub fn first(&self, snapshot: &TxnSnapshot) -> Result<Option<Record>> {
        let root = self.root_for(snapshot)?;
        self.backend.tree.first_from(root)
    }

    pub fn last(&self, snapshot: &TxnSnapshot) -> Result<Option<Record>> {
        let root = self.root_for(snapshot)?;
        self.backend.tree.last_from(root)
    }

    /// Verifies the tree as seen by the transaction.
    pub fn check(&self, snapshot: &TxnSnapshot) -> Result<TreeStats> {
        let root = self.root_for(snapshot)?;
        self.backend.tree.check_from(root)
    }

    pub fn params(&self) -> &TreeParams {
        self.backend.tree.params()
    }

    /// Creates a record of this tree's shape.
    pub fn record(&self, key: &[u8], value: &[u8]) -> Result<Record> {
        Ok(self.backend.tree.factory().create(key, value)?)
    }

    /// Whether the page is sealed against in-place writes.
    pub fn is_sealed(&self, id: PageId) -> bool {
        !self.backend.tree.store().is_writable(id)
    }
}
