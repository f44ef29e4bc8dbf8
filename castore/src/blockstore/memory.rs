use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use cid::Cid;
use parking_lot::RwLock;
use tracing::{instrument, warn};

use super::BlockStore;
use crate::Error;

#[derive(Clone, Default)]
pub struct MemoryBlockStore {
    db: Arc<RwLock<HashMap<Cid, Bytes>>>,
}

impl BlockStore for MemoryBlockStore {
    #[instrument(level = "trace", skip(self, data), fields(block.cid = %cid, block.size = data.len()), err)]
    fn put(&self, cid: Cid, data: Bytes) -> Result<(), Error> {
        let mut db = self.db.write();

        match db.get(&cid) {
            Some(existing) if *existing == data => Ok(()),
            Some(_) => {
                warn!(block.cid = %cid, "refusing to overwrite block with different contents");
                Err(Error::Conflict(cid))
            }
            None => {
                db.insert(cid, data);
                Ok(())
            }
        }
    }

    fn get(&self, cid: &Cid) -> Result<Option<Bytes>, Error> {
        Ok(self.db.read().get(cid).cloned())
    }

    fn has(&self, cid: &Cid) -> Result<bool, Error> {
        Ok(self.db.read().contains_key(cid))
    }

    fn len(&self) -> usize {
        self.db.read().len()
    }
}
