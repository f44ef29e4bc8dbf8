//! Reading and writing archives in the CARv1 format.
//!
//! An archive is a header, followed by a sequence of frames. The header is a
//! varint-prefixed DAG-CBOR map listing the root CIDs and the version. Each
//! frame is a varint length, followed by a CID and the block it identifies.

mod errors;
pub mod header;
pub mod reader;
pub mod wire;
pub mod writer;

pub use errors::Error;
pub use header::CarHeader;
pub use reader::CarReader;
pub use writer::{write_dag, CarWriter, WriteSummary};
