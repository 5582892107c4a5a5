use crate::config::TreeParams;
use crate::error::{Error, Result};
use crate::storage_engine::b_tree::{PageStore, RangeIter};
use core_models::b_tree::{BranchPage, LeafPage, Page, PageId};
use core_models::record::{Record, RecordFactory};
use log::debug;

/// Deepest descent tolerated before a page cycle is assumed.
pub(crate) const MAX_HEIGHT: usize = 64;

/// A B+Tree of fixed-width records over a page store. Leaves hold records, branches hold
/// separator keys and child page ids. Leaves are not linked; ordered scans descend from the
/// root with a cursor per level.
///
/// Pages the store reports as not writable are never modified: a change copies the page to a
/// fresh id and rewrites the path above it, producing a new root. Readers holding an older
/// root keep seeing the tree as it was.
#[derive(Debug)]
pub struct BPlusTree<S: PageStore> {
    store: S,
    params: TreeParams,
    factory: RecordFactory,
    root: PageId,
}

/// Outcome of inserting below a page.
struct Inserted {
    /// The page's id after the write, which differs from the old id when the page was copied.
    id: PageId,
    /// Separator and id of a new right sibling, when the page split.
    split: Option<(Vec<u8>, PageId)>,
    replaced: Option<Record>,
}

/// Outcome of deleting below a page.
struct Deleted {
    id: PageId,
    removed: Option<Record>,
    occupancy: usize,
}

impl<S: PageStore> BPlusTree<S> {
    /// Creates an empty tree, consisting of an empty root leaf.
    pub fn create(mut store: S, params: TreeParams) -> Result<Self> {
        params.validate()?;
        let root = store.alloc()?;
        store.put(root, &Page::Leaf(LeafPage::default()))?;
        debug!("Created tree of order {} with root {}", params.order, root);
        Ok(Self { store, params, factory: params.record_factory(), root })
    }

    /// Opens an existing tree at the given root.
    pub fn open(store: S, params: TreeParams, root: PageId) -> Result<Self> {
        params.validate()?;
        store.get(root)?;
        Ok(Self { store, params, factory: params.record_factory(), root })
    }

    pub fn root(&self) -> PageId {
        self.root
    }

    /// Points the tree at another root, e.g. a committed one after abandoning changes.
    pub fn set_root(&mut self, root: PageId) {
        self.root = root;
    }

    pub fn params(&self) -> &TreeParams {
        &self.params
    }

    pub fn factory(&self) -> &RecordFactory {
        &self.factory
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    /// Fetches the record with the given key.
    pub fn get(&self, key: &[u8]) -> Result<Option<Record>> {
        self.get_from(self.root, key)
    }

    /// Fetches the record with the given key from the tree rooted at `root`.
    pub fn get_from(&self, root: PageId, key: &[u8]) -> Result<Option<Record>> {
        self.factory.check_key(key)?;
        let mut id = root;
        for _ in 0..MAX_HEIGHT {
            match self.store.get(id)? {
                Page::Branch(branch) => id = child(&branch, branch.child_index(key))?,
                Page::Leaf(leaf) => return Ok(leaf.get(key).cloned()),
            }
        }
        Err(too_deep(root))
    }

    /// Inserts a record. An existing record with the same key is replaced and returned.
    pub fn insert(&mut self, record: Record) -> Result<Option<Record>> {
        self.factory.check(&record)?;
        let inserted = self.insert_into(self.root, record, 0)?;
        self.root = match inserted.split {
            Some((separator, right)) => {
                let root = self.alloc_page(&Page::Branch(BranchPage::new(
                    vec![separator],
                    vec![inserted.id, right],
                )))?;
                debug!("Split root {} into new root {}", inserted.id, root);
                root
            }
            None => inserted.id,
        };
        Ok(inserted.replaced)
    }

    /// Removes and returns the record with the given key, if present.
    pub fn delete(&mut self, key: &[u8]) -> Result<Option<Record>> {
        self.factory.check_key(key)?;
        let deleted = self.delete_from(self.root, key, 0)?;
        let mut root = deleted.id;
        if deleted.removed.is_some() {
            // A branch root left with a single child is replaced by that child.
            while let Page::Branch(branch) = self.store.get(root)? {
                if branch.children.len() != 1 {
                    break;
                }
                debug!("Collapsed root {} into {}", root, branch.children[0]);
                self.store.release(root)?;
                root = branch.children[0];
            }
        }
        self.root = root;
        Ok(deleted.removed)
    }

    /// Iterates over records with `min <= key < max`, in key order. A missing bound is open.
    pub fn range(&self, min: Option<&[u8]>, max: Option<&[u8]>) -> RangeIter<'_, S> {
        self.range_from(self.root, min, max)
    }

    /// Like `range`, over the tree rooted at `root`.
    pub fn range_from(&self, root: PageId, min: Option<&[u8]>, max: Option<&[u8]>) -> RangeIter<'_, S> {
        RangeIter::new(&self.store, root, min, max)
    }

    /// Iterates over all records in key order.
    pub fn iter(&self) -> RangeIter<'_, S> {
        self.range(None, None)
    }

    /// The record with the smallest key.
    pub fn first(&self) -> Result<Option<Record>> {
        self.first_from(self.root)
    }

    pub fn first_from(&self, root: PageId) -> Result<Option<Record>> {
        self.edge(root, |leaf| leaf.records.first().cloned(), |_| 0)
    }

    /// The record with the largest key.
    pub fn last(&self) -> Result<Option<Record>> {
        self.last_from(self.root)
    }

    pub fn last_from(&self, root: PageId) -> Result<Option<Record>> {
        self.edge(root, |leaf| leaf.records.last().cloned(), |branch| branch.children.len().saturating_sub(1))
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.first()?.is_none())
    }

    /// Descends along one edge of the tree.
    fn edge(
        &self,
        root: PageId,
        pick: impl Fn(&LeafPage) -> Option<Record>,
        index: impl Fn(&BranchPage) -> usize,
    ) -> Result<Option<Record>> {
        let mut id = root;
        for _ in 0..MAX_HEIGHT {
            match self.store.get(id)? {
                Page::Branch(branch) => id = child(&branch, index(&branch))?,
                Page::Leaf(leaf) => return Ok(pick(&leaf)),
            }
        }
        Err(too_deep(root))
    }

    fn insert_into(&mut self, id: PageId, record: Record, depth: usize) -> Result<Inserted> {
        if depth >= MAX_HEIGHT {
            return Err(too_deep(self.root));
        }
        match self.store.get(id)? {
            Page::Leaf(mut leaf) => {
                let replaced = leaf.insert(record);
                let split = if leaf.len() > self.params.order {
                    let upper = leaf.split();
                    let separator = upper.records[0].key().to_vec();
                    Some((separator, self.alloc_page(&Page::Leaf(upper))?))
                } else {
                    None
                };
                let id = self.write_page(id, Page::Leaf(leaf))?;
                Ok(Inserted { id, split, replaced })
            }
            Page::Branch(mut branch) => {
                let i = branch.child_index(record.key());
                let old = child(&branch, i)?;
                let inserted = self.insert_into(old, record, depth + 1)?;
                if inserted.id == old && inserted.split.is_none() {
                    return Ok(Inserted { id, split: None, replaced: inserted.replaced });
                }
                branch.children[i] = inserted.id;
                if let Some((separator, right)) = inserted.split {
                    branch.keys.insert(i, separator);
                    branch.children.insert(i + 1, right);
                }
                let split = if branch.children.len() > self.params.order {
                    let (separator, upper) = branch.split();
                    Some((separator, self.alloc_page(&Page::Branch(upper))?))
                } else {
                    None
                };
                let id = self.write_page(id, Page::Branch(branch))?;
                Ok(Inserted { id, split, replaced: inserted.replaced })
            }
        }
    }

    fn delete_from(&mut self, id: PageId, key: &[u8], depth: usize) -> Result<Deleted> {
        if depth >= MAX_HEIGHT {
            return Err(too_deep(self.root));
        }
        match self.store.get(id)? {
            Page::Leaf(mut leaf) => {
                let removed = leaf.delete(key);
                let occupancy = leaf.len();
                let id = match removed {
                    Some(_) => self.write_page(id, Page::Leaf(leaf))?,
                    None => id,
                };
                Ok(Deleted { id, removed, occupancy })
            }
            Page::Branch(mut branch) => {
                let i = branch.child_index(key);
                let old = child(&branch, i)?;
                let deleted = self.delete_from(old, key, depth + 1)?;
                let underflow = deleted.occupancy < self.params.min_occupancy();
                if deleted.removed.is_none() || (deleted.id == old && !underflow) {
                    let occupancy = branch.children.len();
                    return Ok(Deleted { id, removed: deleted.removed, occupancy });
                }
                branch.children[i] = deleted.id;
                if underflow {
                    self.rebalance(&mut branch, i)?;
                }
                let occupancy = branch.children.len();
                let id = self.write_page(id, Page::Branch(branch))?;
                Ok(Deleted { id, removed: deleted.removed, occupancy })
            }
        }
    }

    /// Restores minimum occupancy of the child at index i: borrow from the left sibling, else
    /// from the right sibling, else merge with a sibling.
    fn rebalance(&mut self, parent: &mut BranchPage, i: usize) -> Result<()> {
        if parent.children.len() < 2 {
            return Err(Error::Corruption(format!("Branch with {} children", parent.children.len())));
        }
        let min = self.params.min_occupancy();
        let page = self.store.get(parent.children[i])?;
        if i > 0 {
            let left = self.store.get(parent.children[i - 1])?;
            if left.occupancy() > min {
                return self.shift_right(parent, i - 1, left, page);
            }
            if i + 1 == parent.children.len() {
                return self.merge(parent, i - 1, left, page);
            }
        }
        let right = self.store.get(parent.children[i + 1])?;
        if right.occupancy() > min {
            return self.shift_left(parent, i, page, right);
        }
        self.merge(parent, i, page, right)
    }

    /// Moves the last entry of child l into child l+1.
    fn shift_right(&mut self, parent: &mut BranchPage, l: usize, left: Page, right: Page) -> Result<()> {
        let (left, right) = match (left, right) {
            (Page::Leaf(mut left), Page::Leaf(mut right)) => {
                let record = left.records.pop().ok_or_else(|| empty(parent.children[l]))?;
                parent.keys[l] = record.key().to_vec();
                right.records.insert(0, record);
                (Page::Leaf(left), Page::Leaf(right))
            }
            (Page::Branch(mut left), Page::Branch(mut right)) => {
                let (key, moved) = match (left.keys.pop(), left.children.pop()) {
                    (Some(key), Some(moved)) => (key, moved),
                    _ => return Err(empty(parent.children[l])),
                };
                let separator = std::mem::replace(&mut parent.keys[l], key);
                right.keys.insert(0, separator);
                right.children.insert(0, moved);
                (Page::Branch(left), Page::Branch(right))
            }
            _ => return Err(mismatch(parent.children[l], parent.children[l + 1])),
        };
        parent.children[l] = self.write_page(parent.children[l], left)?;
        parent.children[l + 1] = self.write_page(parent.children[l + 1], right)?;
        Ok(())
    }

    /// Moves the first entry of child l+1 into child l.
    fn shift_left(&mut self, parent: &mut BranchPage, l: usize, left: Page, right: Page) -> Result<()> {
        let (left, right) = match (left, right) {
            (Page::Leaf(mut left), Page::Leaf(mut right)) => {
                if right.records.len() < 2 {
                    return Err(empty(parent.children[l + 1]));
                }
                left.records.push(right.records.remove(0));
                parent.keys[l] = right.records[0].key().to_vec();
                (Page::Leaf(left), Page::Leaf(right))
            }
            (Page::Branch(mut left), Page::Branch(mut right)) => {
                if right.keys.is_empty() {
                    return Err(empty(parent.children[l + 1]));
                }
                let key = right.keys.remove(0);
                let moved = right.children.remove(0);
                let separator = std::mem::replace(&mut parent.keys[l], key);
                left.keys.push(separator);
                left.children.push(moved);
                (Page::Branch(left), Page::Branch(right))
            }
            _ => return Err(mismatch(parent.children[l], parent.children[l + 1])),
        };
        parent.children[l] = self.write_page(parent.children[l], left)?;
        parent.children[l + 1] = self.write_page(parent.children[l + 1], right)?;
        Ok(())
    }

    /// Merges child l+1 into child l and drops the separator between them.
    fn merge(&mut self, parent: &mut BranchPage, l: usize, left: Page, right: Page) -> Result<()> {
        let merged = match (left, right) {
            (Page::Leaf(mut left), Page::Leaf(right)) => {
                left.records.extend(right.records);
                Page::Leaf(left)
            }
            (Page::Branch(mut left), Page::Branch(right)) => {
                left.keys.push(parent.keys[l].clone());
                left.keys.extend(right.keys);
                left.children.extend(right.children);
                Page::Branch(left)
            }
            _ => return Err(mismatch(parent.children[l], parent.children[l + 1])),
        };
        parent.keys.remove(l);
        let right_id = parent.children.remove(l + 1);
        parent.children[l] = self.write_page(parent.children[l], merged)?;
        self.store.release(right_id)?;
        Ok(())
    }

    fn alloc_page(&mut self, page: &Page) -> Result<PageId> {
        let id = self.store.alloc()?;
        self.store.put(id, page)?;
        Ok(id)
    }

    /// Writes a page in place if the store allows it, otherwise copies it to a fresh id and
    /// releases the old one. Returns the id the page now lives at.
    fn write_page(&mut self, id: PageId, page: Page) -> Result<PageId> {
        if self.store.is_writable(id) {
            self.store.put(id, &page)?;
            return Ok(id);
        }
        let copy = self.alloc_page(&page)?;
        self.store.release(id)?;
        Ok(copy)
    }
}

fn child(branch: &BranchPage, i: usize) -> Result<PageId> {
    branch
        .children
        .get(i)
        .copied()
        .ok_or_else(|| Error::Corruption(format!("Branch has no child at index {}", i)))
}

fn too_deep(root: PageId) -> Error {
    Error::Corruption(format!("Tree at root {} is deeper than {} levels", root, MAX_HEIGHT))
}

fn empty(id: PageId) -> Error {
    Error::Corruption(format!("Page {} has nothing to lend", id))
}

fn mismatch(left: PageId, right: PageId) -> Error {
    Error::Corruption(format!("Sibling pages {} and {} are of different kinds", left, right))
}
