use cid::Cid;
use serde::{Deserialize, Serialize};

use crate::wire::CAR_VERSION;
use crate::Error;

/// The header of a CARv1 archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CarHeader {
    pub roots: Vec<Cid>,
    pub version: u64,
}

impl CarHeader {
    pub fn new(roots: Vec<Cid>) -> Self {
        Self {
            roots,
            version: CAR_VERSION,
        }
    }

    /// Returns the DAG-CBOR encoding of the header, without length prefix.
    pub fn encode(&self) -> Result<Vec<u8>, Error> {
        serde_ipld_dagcbor::to_vec(self).map_err(|e| Error::Header(e.to_string()))
    }

    /// Decodes a header from its DAG-CBOR encoding.
    /// Any version is accepted here, checking it is up to the caller.
    pub fn decode(buf: &[u8]) -> Result<Self, Error> {
        serde_ipld_dagcbor::from_slice(buf).map_err(|e| Error::Header(e.to_string()))
    }
}
