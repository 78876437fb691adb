//! Error types for archive operations.

use std::io;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// The archive bytes do not follow the ar format: bad signature,
    /// malformed member header, truncated file or corrupt string table
    /// offset. A format error aborts the whole load since member offsets
    /// cannot be trusted past the first bad record.
    #[error("invalid archive format: {0}")]
    Format(String),

    #[error("failed to map archive into memory: {0}")]
    Resource(String),

    /// A member handle that no longer refers to a live member, e.g. after
    /// `erase` or a cross-archive splice.
    #[error("stale member handle")]
    StaleHandle,
}

impl Error {
    pub(crate) fn format(msg: impl Into<String>) -> Self {
        Error::Format(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
