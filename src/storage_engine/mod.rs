pub mod b_tree;
pub mod byte_resource;
pub mod components;
pub mod transaction;
