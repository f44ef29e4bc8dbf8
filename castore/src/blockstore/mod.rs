use bytes::Bytes;
use cid::Cid;

use crate::{Error, Node};

mod memory;

pub use memory::MemoryBlockStore;

/// A write-once mapping from [Cid] to the encoded bytes of a block.
///
/// Putting the same bytes under a CID a second time is a no-op, putting
/// different bytes under an existing CID is an error.
pub trait BlockStore: Send + Sync {
    /// Stores a block.
    fn put(&self, cid: Cid, data: Bytes) -> Result<(), Error>;

    /// Retrieves a block, or [None] if it is not present.
    fn get(&self, cid: &Cid) -> Result<Option<Bytes>, Error>;

    /// Checks if a block is present.
    fn has(&self, cid: &Cid) -> Result<bool, Error>;

    /// Number of blocks stored.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Encodes the node and stores it under its CID, which is returned.
    fn put_node(&self, node: &Node) -> Result<Cid, Error> {
        let cid = node.cid()?;
        self.put(cid, node.encode())?;
        Ok(cid)
    }

    /// Retrieves and decodes a node.
    fn get_node(&self, cid: &Cid) -> Result<Option<Node>, Error> {
        self.get(cid)?
            .map(|data| Node::decode(cid, data))
            .transpose()
    }
}
