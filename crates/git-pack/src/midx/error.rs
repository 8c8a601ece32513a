//! Error taxonomy for multi-pack-index read/write.

use std::fmt;

/// A 4-byte chunk tag, printed as ASCII for readable error messages.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChunkTag(pub [u8; 4]);

impl ChunkTag {
    pub const fn from_u32(v: u32) -> Self {
        Self(v.to_be_bytes())
    }

    pub const fn as_u32(&self) -> u32 {
        u32::from_be_bytes(self.0)
    }
}

impl fmt::Debug for ChunkTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match std::str::from_utf8(&self.0) {
            Ok(s) if s.chars().all(|c| c.is_ascii_graphic()) => write!(f, "{s:?}"),
            _ => write!(f, "{:?}", self.0),
        }
    }
}

impl fmt::Display for ChunkTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match std::str::from_utf8(&self.0) {
            Ok(s) if s.chars().all(|c| c.is_ascii_graphic()) => write!(f, "{s}"),
            _ => write!(f, "{:?}", self.0),
        }
    }
}

/// Errors produced while reading or writing a multi-pack-index.
#[derive(Debug, thiserror::Error)]
pub enum MidxError {
    #[error("malformed multi-pack-index: {0}")]
    MalformedFile(String),

    #[error("unsupported multi-pack-index format: {0}")]
    UnsupportedFormat(String),

    #[error("missing required chunk {0}")]
    MissingChunk(ChunkTag),

    #[error("chunk {0} appeared more than once")]
    RepeatedChunk(ChunkTag),

    #[error("pack-count mismatch: header says {header}, PNAM lists {names}")]
    PackCountMismatch { header: u32, names: u32 },

    #[error("chunk body too large to address")]
    TooLarge,

    #[error("invalid writer input: {0}")]
    InvalidInput(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Lock(#[from] git_utils::error::UtilError),

    #[error("internal error: {0}")]
    InternalError(String),

    #[error(transparent)]
    Hash(#[from] git_hash::HashError),
}
