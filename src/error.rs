use core_models::CodecError;

/// Storage engine errors. None of them are retried internally: they propagate to the
/// transaction coordinator, which aborts the transaction. Corruption is never auto-repaired.
#[derive(thiserror::Error, Clone, Debug, PartialEq)]
pub enum Error {
    /// A read or write moved fewer bytes than requested.
    #[error("short I/O: expected {expected} bytes, got {actual}")]
    ShortIo { expected: u64, actual: u64 },
    /// A structural invariant does not hold: impossible occupancy, out-of-order keys, a
    /// dangling page id or an undecodable page.
    #[error("corruption: {0}")]
    Corruption(String),
    /// A write without an active write transaction, a second writer, or an illegal
    /// lifecycle transition.
    #[error("concurrency misuse: {0}")]
    ConcurrencyMisuse(String),
    /// Recorded state disagrees with the physical resource at recovery.
    #[error("recovery mismatch: {0}")]
    RecoveryMismatch(String),
    #[error("read-only transaction")]
    ReadOnly,
    #[error("invalid value: {0}")]
    Value(String),
    #[error("I/O error: {0}")]
    Io(String),
    #[error("internal error: {0}")]
    Internal(String),
}

/// A storage engine result.
pub type Result<T> = std::result::Result<T, Error>;

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}

impl From<bincode::Error> for Error {
    fn from(err: bincode::Error) -> Self {
        Error::Internal(err.to_string())
    }
}

impl From<CodecError> for Error {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::KeyWidth { .. } | CodecError::ValueWidth { .. } => Error::Value(err.to_string()),
            _ => Error::Corruption(err.to_string()),
        }
    }
}
