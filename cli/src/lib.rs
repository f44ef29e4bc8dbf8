pub mod pack;
pub mod tee;

pub use pack::{pack, Error, OnFileError, PackOptions, PackOutcome};
pub use tee::TeeWriter;
