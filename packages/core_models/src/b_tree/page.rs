use super::{NodeType, PageId};
use crate::record::Record;

/// Leaf page records, strictly ascending by key, without duplicates. Lookups use binary search
/// over the keys.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LeafPage {
    pub records: Vec<Record>,
}

impl LeafPage {
    pub fn new(records: Vec<Record>) -> Self {
        Self { records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Finds the slot of a key: `Ok(i)` if present, else `Err(i)` with the insertion point.
    pub fn search(&self, key: &[u8]) -> Result<usize, usize> {
        self.records.binary_search_by(|r| r.cmp_key(key))
    }

    /// The first slot holding a key greater than or equal to the given key.
    pub fn lower_bound(&self, key: &[u8]) -> usize {
        self.records.partition_point(|r| r.key() < key)
    }

    pub fn get(&self, key: &[u8]) -> Option<&Record> {
        self.search(key).ok().map(|i| &self.records[i])
    }

    /// Inserts a record in key order. An existing record with the same key is replaced and
    /// returned.
    pub fn insert(&mut self, record: Record) -> Option<Record> {
        match self.search(record.key()) {
            Ok(i) => Some(std::mem::replace(&mut self.records[i], record)),
            Err(i) => {
                self.records.insert(i, record);
                None
            }
        }
    }

    /// Removes and returns the record with the given key, if any.
    pub fn delete(&mut self, key: &[u8]) -> Option<Record> {
        self.search(key).ok().map(|i| self.records.remove(i))
    }

    /// Splits the page at the midpoint. The lower half stays, the upper half is returned; its
    /// first key is the separator for the parent.
    pub fn split(&mut self) -> LeafPage {
        let at = self.records.len() / 2;
        LeafPage { records: self.records.split_off(at) }
    }
}

/// Branch page: N ascending separator keys and N+1 child page ids. The child at index i holds
/// the keys k with keys[i-1] <= k < keys[i], so a key equal to a separator routes right:
///
/// Index  Keys  Children
/// 0      d     a,b,c                Keys:          d       f
/// 1      f     d,e                  Children: a,b,c | d,e | f,g
/// 2            f,g
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BranchPage {
    pub keys: Vec<Vec<u8>>,
    pub children: Vec<PageId>,
}

impl BranchPage {
    pub fn new(keys: Vec<Vec<u8>>, children: Vec<PageId>) -> Self {
        Self { keys, children }
    }

    /// Index of the child responsible for the given key: the number of separators less than or
    /// equal to it.
    pub fn child_index(&self, key: &[u8]) -> usize {
        self.keys.partition_point(|k| k.as_slice() <= key)
    }

    /// Index of the last child that can hold keys strictly below the given exclusive bound.
    pub fn last_child_below(&self, key: &[u8]) -> usize {
        self.keys.partition_point(|k| k.as_slice() < key)
    }

    /// Splits an overfull branch at the midpoint. The lower half stays, the middle separator
    /// moves up to the parent and the upper half is returned.
    pub fn split(&mut self) -> (Vec<u8>, BranchPage) {
        let at = (self.children.len() + 1) / 2;
        let children = self.children.split_off(at);
        let mut keys = self.keys.split_off(at - 1);
        let separator = keys.remove(0);
        (separator, BranchPage { keys, children })
    }
}

/// A B+Tree page.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Page {
    Branch(BranchPage),
    Leaf(LeafPage),
}

impl Page {
    /// Records held by a leaf, or children held by a branch.
    pub fn occupancy(&self) -> usize {
        match self {
            Self::Branch(branch) => branch.children.len(),
            Self::Leaf(leaf) => leaf.len(),
        }
    }

    pub fn node_type(&self) -> NodeType {
        match self {
            Self::Branch(_) => NodeType::BNodeBranch,
            Self::Leaf(_) => NodeType::BNodeLeaf,
        }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self, Self::Leaf(_))
    }
}


#[cfg(test)]
mod page_tests {
    use super::*;
    use crate::record::RecordFactory;

    fn leaf(keys: &[u8]) -> LeafPage {
        let factory = RecordFactory::new(1, 0);
        LeafPage::new(keys.iter().map(|k| factory.create_key(&[*k]).unwrap()).collect())
    }

    fn keys(leaf: &LeafPage) -> Vec<u8> {
        leaf.records.iter().map(|r| r.key()[0]).collect()
    }

    #[test]
    fn leaf_insert_keeps_order_and_replaces() {
        let factory = RecordFactory::new(1, 1);
        let mut page = LeafPage::default();
        assert_eq!(page.insert(factory.create(&[5], &[0]).unwrap()), None);
        assert_eq!(page.insert(factory.create(&[1], &[0]).unwrap()), None);
        assert_eq!(page.insert(factory.create(&[3], &[0]).unwrap()), None);
        let old = page.insert(factory.create(&[3], &[9]).unwrap());
        assert_eq!(old, Some(factory.create(&[3], &[0]).unwrap()));
        assert_eq!(page.get(&[3]).map(|r| r.value().to_vec()), Some(vec![9]));
        assert_eq!(page.records.iter().map(|r| r.key()[0]).collect::<Vec<_>>(), vec![1, 3, 5]);
    }

    #[test]
    fn leaf_split_keeps_lower_half() {
        let mut page = leaf(&[1, 3, 5, 7, 9]);
        let upper = page.split();
        assert_eq!(keys(&page), vec![1, 3]);
        assert_eq!(keys(&upper), vec![5, 7, 9]);
    }

    #[test]
    fn separators_route_equal_keys_right() {
        let branch = BranchPage::new(vec![vec![4], vec![8]], vec![10, 11, 12]);
        assert_eq!(branch.child_index(&[0]), 0);
        assert_eq!(branch.child_index(&[4]), 1);
        assert_eq!(branch.child_index(&[7]), 1);
        assert_eq!(branch.child_index(&[8]), 2);
        assert_eq!(branch.last_child_below(&[8]), 1);
        assert_eq!(branch.last_child_below(&[9]), 2);
    }

    #[test]
    fn branch_split_promotes_middle_separator() {
        let mut branch = BranchPage::new(
            vec![vec![2], vec![4], vec![6], vec![8]],
            vec![1, 2, 3, 4, 5],
        );
        let (separator, upper) = branch.split();
        assert_eq!(separator, vec![6]);
        assert_eq!(branch, BranchPage::new(vec![vec![2], vec![4]], vec![1, 2, 3]));
        assert_eq!(upper, BranchPage::new(vec![vec![8]], vec![4, 5]));
    }
}
