use crate::error::{Error, Result};
use crate::storage_engine::b_tree::{BPlusTree, PageStore, MAX_HEIGHT};
use core_models::b_tree::{Page, PageId};

/// Shape of a tree, as counted by a full check.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TreeStats {
    /// Number of levels, leaves included.
    pub height: usize,
    pub branch_pages: usize,
    pub leaf_pages: usize,
    pub records: usize,
}

/// Key interval a subtree must stay within: `low <= key < high`.
struct Bounds<'a> {
    low: Option<&'a [u8]>,
    high: Option<&'a [u8]>,
}

impl Bounds<'_> {
    fn contains(&self, key: &[u8]) -> bool {
        self.low.map_or(true, |low| low <= key) && self.high.map_or(true, |high| key < high)
    }
}

impl<S: PageStore> BPlusTree<S> {
    /// Walks the whole tree and verifies its invariants: strictly ascending keys, keys within
    /// their parent's separators, occupancy bounds, branch arity and uniform leaf depth.
    pub fn check(&self) -> Result<TreeStats> {
        self.check_from(self.root())
    }

    /// Counts pages and records. The walk verifies the same invariants as `check`.
    pub fn stats(&self) -> Result<TreeStats> {
        self.check()
    }

    pub fn check_from(&self, root: PageId) -> Result<TreeStats> {
        let mut stats = TreeStats::default();
        self.check_page(root, Bounds { low: None, high: None }, 1, &mut stats)?;
        Ok(stats)
    }

    fn check_page(&self, id: PageId, bounds: Bounds<'_>, depth: usize, stats: &mut TreeStats) -> Result<()> {
        if depth > MAX_HEIGHT {
            return Err(invalid(id, format!("deeper than {} levels", MAX_HEIGHT)));
        }
        let page = self.store().get(id)?;
        let is_root = depth == 1;
        let order = self.params().order;
        if page.occupancy() > order {
            return Err(invalid(id, format!("holds {} entries, order is {}", page.occupancy(), order)));
        }
        if !is_root && page.occupancy() < self.params().min_occupancy() {
            return Err(invalid(id, format!("holds {} entries, below minimum", page.occupancy())));
        }
        match page {
            Page::Leaf(leaf) => {
                if stats.height == 0 {
                    stats.height = depth;
                } else if stats.height != depth {
                    return Err(invalid(id, format!("leaf at depth {}, expected {}", depth, stats.height)));
                }
                if leaf.records.windows(2).any(|w| w[0].key() >= w[1].key()) {
                    return Err(invalid(id, "keys out of order".into()));
                }
                if !leaf.records.iter().all(|r| bounds.contains(r.key())) {
                    return Err(invalid(id, "key outside parent separators".into()));
                }
                stats.leaf_pages += 1;
                stats.records += leaf.len();
            }
            Page::Branch(branch) => {
                if branch.children.len() != branch.keys.len() + 1 {
                    return Err(invalid(
                        id,
                        format!("{} keys for {} children", branch.keys.len(), branch.children.len()),
                    ));
                }
                if branch.children.len() < 2 {
                    return Err(invalid(id, "branch with a single child".into()));
                }
                if branch.keys.windows(2).any(|w| w[0] >= w[1]) {
                    return Err(invalid(id, "separators out of order".into()));
                }
                if !branch.keys.iter().all(|k| bounds.contains(k)) {
                    return Err(invalid(id, "separator outside parent separators".into()));
                }
                stats.branch_pages += 1;
                for (i, child) in branch.children.iter().enumerate() {
                    let low = if i == 0 { bounds.low } else { Some(branch.keys[i - 1].as_slice()) };
                    let high = branch.keys.get(i).map(|k| k.as_slice()).or(bounds.high);
                    self.check_page(*child, Bounds { low, high }, depth + 1, stats)?;
                }
            }
        }
        Ok(())
    }
}

fn invalid(id: PageId, reason: String) -> Error {
    Error::Corruption(format!("Page {}: {}", id, reason))
}
