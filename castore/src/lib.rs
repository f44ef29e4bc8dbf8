mod digests;
mod errors;

pub mod balanced;
pub mod blockstore;
pub mod chunker;
pub mod fixtures;
pub mod import;
pub mod listing;
pub mod nodes;
pub mod proto;

pub use balanced::{BuildParams, FileTree};
pub use digests::{cid_for, verify, DAG_PB, RAW, SHA2_256};
pub use errors::Error;
pub use nodes::{Directory, Internal, InternalKind, Link, Node, ValidateNodeError};

#[cfg(test)]
mod tests;
