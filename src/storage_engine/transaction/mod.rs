mod component;
mod component_id;
mod coordinator;
mod journal;
mod lifecycle;
mod mode;
mod snapshot;

pub use component::*;
pub use component_id::*;
pub use coordinator::*;
pub use journal::*;
pub use lifecycle::*;
pub use mode::*;
pub use snapshot::*;

/// Transaction ids increase monotonically from 1.
pub type TxnId = u64;
