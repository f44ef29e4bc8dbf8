//! Streaming computation of Filecoin piece commitments (CommP).
//!
//! The payload is Fr32-padded and hashed into a binary Merkle tree with
//! truncated sha2-256 nodes, while a speculative parser looks at the same
//! bytes to report on the archive they might contain.

mod errors;
pub mod calculator;
pub mod fr32;
pub mod hasher;
pub mod report;
pub mod scanner;

pub use calculator::{CommpOptions, StreamCalculator};
pub use errors::Error;
pub use hasher::{commp_cid, pad_commp, CommpHasher, Digest};
pub use report::CommpReport;
pub use scanner::{CarScanner, CarSummary};
