pub mod b_tree;
pub mod record;
pub mod state;

mod error;

pub use error::CodecError;


/// Page header: node type and record or key count, two big-endian u16s.
pub const HEADER: usize = 4;
pub const PAGE_ID_SIZE: usize = 4;
/// Default block size of page files.
pub const BTREE_PAGE_SIZE: usize = 4096;
/// Widest key a tree accepts.
pub const BTREE_MAX_KEY_SIZE: usize = 1000;
pub const BTREE_MAX_VAL_SIZE: usize = 3000;


#[cfg(test)]
mod tests {
    use super::*;
    use more_asserts::{assert_ge, assert_le};


    #[test]
    fn largest_leaf_record_fits_page() {
        let node_max = HEADER + BTREE_MAX_KEY_SIZE + BTREE_MAX_VAL_SIZE;
        assert_le!(node_max, BTREE_PAGE_SIZE);
    }

    #[test]
    fn two_way_branch_fits_page() {
        let node_max = HEADER + 2 * PAGE_ID_SIZE + BTREE_MAX_KEY_SIZE;
        assert_ge!(BTREE_PAGE_SIZE, node_max);
    }
}
