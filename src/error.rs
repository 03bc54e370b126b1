//! Categorical error type surfaced by every public operation.
//!
//! Errors bubble to the outermost public operation unchanged; nothing in
//! this crate retries or silently recovers (see spec §7).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("not a directory: {0}")]
    NotADirectory(String),

    #[error("directory not empty: {0}")]
    NotEmpty(String),

    #[error("name too long ({len} bytes, max 42): {name}")]
    NameTooLong { name: String, len: usize },

    #[error("no space left on device")]
    NoSpace,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt filesystem: {0}")]
    Corrupt(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

pub type Result<T> = std::result::Result<T, Error>;
