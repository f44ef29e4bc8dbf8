use std::path::PathBuf;

use crate::{Error as CastoreError, ValidateNodeError};

/// Errors that occur while placing files into the directory tree and
/// persisting it.
#[derive(Debug, thiserror::Error)]
pub enum IngestionError {
    #[error("path {0:?} is not valid UTF-8")]
    NonUtf8Path(PathBuf),

    #[error("invalid entry: {0}")]
    InvalidName(#[from] ValidateNodeError),

    #[error("{0:?} was added more than once")]
    DuplicateEntry(String),

    #[error("{0:?} is both a file and a directory")]
    PathConflict(String),

    #[error("failed to store directory tree: {0}")]
    Store(#[from] CastoreError),
}
