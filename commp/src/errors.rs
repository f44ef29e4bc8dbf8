#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("insufficient data: {0} bytes is less than the minimum of 65 bytes")]
    InsufficientData(u64),

    #[error("payload of {0} bytes is too large")]
    PayloadTooLarge(u64),

    #[error("invalid piece size {0}, must be a power of two between 128 bytes and 64GiB")]
    InvalidPieceSize(u64),

    #[error("target piece size {target} is smaller than the padded payload size {natural}")]
    TargetTooSmall { target: u64, natural: u64 },

    #[error("unable to build commitment CID: {0}")]
    InvalidDigest(String),

    #[error("cancelled")]
    Cancelled,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
