use crate::error::{Error, Result};
use crate::storage_engine::b_tree::{PageStore, MAX_HEIGHT};
use core_models::b_tree::{Page, PageId};
use core_models::record::Record;

/// Position within one page of the descent path.
#[derive(Debug)]
enum Cursor {
    /// Children that may hold keys in range and have not been visited yet.
    Branch(std::vec::IntoIter<PageId>),
    /// Remaining records of a leaf, starting at the first key not below the lower bound.
    Leaf(std::vec::IntoIter<Record>),
}

/// Ordered scan over records with `min <= key < max`. Leaves are not linked, so the iterator
/// keeps a stack of cursors from the root down to the current leaf and moves to the next
/// subtree by popping exhausted levels. Only subtrees that intersect the range are visited.
pub struct RangeIter<'a, S: PageStore> {
    store: &'a S,
    root: PageId,
    min: Option<Vec<u8>>,
    max: Option<Vec<u8>>,
    stack: Vec<Cursor>,
    /// Set until the root has been loaded.
    pending: bool,
}

impl<'a, S: PageStore> RangeIter<'a, S> {
    pub(crate) fn new(store: &'a S, root: PageId, min: Option<&[u8]>, max: Option<&[u8]>) -> Self {
        let mut iter = Self {
            store,
            root,
            min: min.map(|k| k.to_vec()),
            max: max.map(|k| k.to_vec()),
            stack: Vec::new(),
            pending: false,
        };
        iter.restart();
        iter
    }

    /// Rewinds the scan to its first record.
    pub fn restart(&mut self) {
        self.stack.clear();
        self.pending = match (&self.min, &self.max) {
            (Some(min), Some(max)) => min < max,
            _ => true,
        };
    }

    /// next() with error handling.
    pub fn try_next(&mut self) -> Result<Option<Record>> {
        if self.pending {
            self.pending = false;
            self.descend(self.root)?;
        }
        loop {
            let next = match self.stack.last_mut() {
                None => return Ok(None),
                Some(Cursor::Leaf(records)) => records.next().map(Ok),
                Some(Cursor::Branch(children)) => children.next().map(Err),
            };
            match next {
                Some(Ok(record)) => {
                    if self.max.as_deref().map_or(false, |max| record.key() >= max) {
                        self.stack.clear();
                        return Ok(None);
                    }
                    return Ok(Some(record));
                }
                Some(Err(child)) => self.descend(child)?,
                None => {
                    self.stack.pop();
                }
            }
        }
    }

    /// Pushes a cursor over the part of a page that intersects the range.
    fn descend(&mut self, id: PageId) -> Result<()> {
        if self.stack.len() >= MAX_HEIGHT {
            return Err(Error::Corruption(format!("Scan below page {} exceeds {} levels", id, MAX_HEIGHT)));
        }
        let cursor = match self.store.get(id)? {
            Page::Branch(branch) => {
                let first = self.min.as_deref().map_or(0, |min| branch.child_index(min));
                let last = match self.max.as_deref() {
                    Some(max) => branch.last_child_below(max),
                    None => branch.keys.len(),
                };
                let children: Vec<PageId> =
                    branch.children.into_iter().take(last + 1).skip(first).collect();
                Cursor::Branch(children.into_iter())
            }
            Page::Leaf(mut leaf) => {
                let start = self.min.as_deref().map_or(0, |min| leaf.lower_bound(min));
                Cursor::Leaf(leaf.records.split_off(start).into_iter())
            }
        };
        self.stack.push(cursor);
        Ok(())
    }
}

impl<'a, S: PageStore> Iterator for RangeIter<'a, S> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.try_next() {
            Ok(next) => next.map(Ok),
            Err(err) => {
                self.stack.clear();
                Some(Err(err))
            }
        }
    }
}
