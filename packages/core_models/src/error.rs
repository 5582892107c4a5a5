/// Errors raised while encoding or decoding fixed-width byte structures.
#[derive(thiserror::Error, Clone, Debug, PartialEq, Eq)]
pub enum CodecError {
    #[error("wrong key width: expected {expected} bytes, got {actual}")]
    KeyWidth { expected: usize, actual: usize },
    #[error("wrong value width: expected {expected} bytes, got {actual}")]
    ValueWidth { expected: usize, actual: usize },
    #[error("buffer too short: need {needed} bytes, have {available}")]
    Truncated { needed: usize, available: usize },
    #[error("wrong buffer length: expected {expected} bytes, got {actual}")]
    Length { expected: usize, actual: usize },
    #[error("page needs {needed} bytes but the block is {block_size}")]
    Overflow { needed: usize, block_size: usize },
    #[error("unknown node type {0:02x?}")]
    UnknownNodeType([u8; 2]),
}
