/// Kind of a page, stored big-endian in the first two bytes of its block.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeType {
    BNodeBranch,
    BNodeLeaf,
    /// Any other tag, including the zeroes of a block that was allocated but never written.
    Unknown,
}

const BRANCH_TAG: [u8; 2] = [0x0, 0x1];
const LEAF_TAG: [u8; 2] = [0x0, 0x2];
const UNKNOWN_TAG: [u8; 2] = [0xf, 0xf];

impl From<&[u8; 2]> for NodeType {
    fn from(value: &[u8; 2]) -> NodeType {
        match *value {
            BRANCH_TAG => NodeType::BNodeBranch,
            LEAF_TAG => NodeType::BNodeLeaf,
            _ => NodeType::Unknown,
        }
    }
}

impl From<NodeType> for [u8; 2] {
    fn from(value: NodeType) -> Self {
        match value {
            NodeType::BNodeBranch => BRANCH_TAG,
            NodeType::BNodeLeaf => LEAF_TAG,
            NodeType::Unknown => UNKNOWN_TAG,
        }
    }
}
