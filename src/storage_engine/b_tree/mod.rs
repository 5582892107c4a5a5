mod check;
mod iterator;
mod page_store;
mod tree;

pub use check::*;
pub use iterator::*;
pub use page_store::*;
pub use tree::*;
