use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// A transaction mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mode {
    /// A read-write transaction. At most one is active per component.
    ReadWrite,
    /// A read-only transaction, pinned to the watermarks taken at begin.
    ReadOnly,
}

impl Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ReadWrite => write!(f, "read-write"),
            Self::ReadOnly => write!(f, "read-only"),
        }
    }
}

impl Mode {
    /// Checks whether the transaction mode can mutate data.
    pub fn mutable(&self) -> bool {
        matches!(self, Self::ReadWrite)
    }
}
