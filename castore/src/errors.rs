use cid::Cid;
use thiserror::Error;

/// Errors related to encoding nodes and talking to a block store.
#[derive(Debug, Error, PartialEq)]
pub enum Error {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("internal storage error: {0}")]
    StorageError(String),

    /// A block with different contents is already stored under this CID.
    #[error("conflicting payload for block {0}")]
    Conflict(Cid),

    #[error("unable to derive cid: {0}")]
    InvalidDigest(String),

    #[error("unable to decode block {0}: {1}")]
    Decode(Cid, String),

    #[error("unsupported codec 0x{1:x} for block {0}")]
    UnsupportedCodec(Cid, u64),
}

impl From<cid::multihash::Error> for Error {
    fn from(value: cid::multihash::Error) -> Self {
        Error::InvalidDigest(value.to_string())
    }
}

impl From<Error> for std::io::Error {
    fn from(value: Error) -> Self {
        match value {
            Error::InvalidRequest(msg) => Self::new(std::io::ErrorKind::InvalidInput, msg),
            e => Self::new(std::io::ErrorKind::Other, e.to_string()),
        }
    }
}
