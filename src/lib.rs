//! Transactional storage engine: a lifecycle protocol letting independently implemented
//! storage components (append-only files, blobs, B+Trees) take part in one atomic,
//! crash-recoverable transaction, and the disk-resident B+Tree range index those components
//! use as their primary sorted structure.

pub mod config;
pub mod error;
pub mod storage_engine;

pub use core_models::b_tree::PageId;
pub use core_models::record::{Record, RecordFactory};
pub use core_models::state::StateRecord;
