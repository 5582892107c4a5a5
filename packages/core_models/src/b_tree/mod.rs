mod b_node;
mod node_type;
mod page;


pub use b_node::*;
pub use node_type::*;
pub use page::*;


/// Pages are addressed by a stable integer id, resolved through a page store. In a block file
/// the id is the block number.
pub type PageId = u32;
