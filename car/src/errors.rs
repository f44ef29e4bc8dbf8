use cid::Cid;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("block {0} is referenced, but missing from the store")]
    MissingBlock(Cid),

    #[error("unable to decode block: {0}")]
    Decode(bodyshop_castore::Error),

    #[error("invalid header: {0}")]
    Header(String),

    #[error("frame of {0} bytes exceeds the maximum frame size")]
    FrameTooLarge(u64),

    #[error("invalid frame: {0}")]
    InvalidFrame(String),

    #[error("block {0} does not match its CID")]
    Mismatch(Cid),

    #[error("store error: {0}")]
    Store(bodyshop_castore::Error),

    #[error("cancelled")]
    Cancelled,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
