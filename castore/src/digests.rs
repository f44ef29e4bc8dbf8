use cid::{multihash::Multihash, Cid};
use sha2::{Digest, Sha256};

use crate::Error;

/// Multicodec of raw leaf blocks.
pub const RAW: u64 = 0x55;
/// Multicodec of dag-pb encoded (internal) nodes.
pub const DAG_PB: u64 = 0x70;
/// Multihash code of sha2-256.
pub const SHA2_256: u64 = 0x12;

/// Derives the CIDv1 for a block with the given codec, using sha2-256.
pub fn cid_for(codec: u64, data: &[u8]) -> Result<Cid, Error> {
    let digest = Sha256::digest(data);
    let hash = Multihash::<64>::wrap(SHA2_256, digest.as_slice())?;

    Ok(Cid::new_v1(codec, hash))
}

/// Checks the passed data hashes to the digest inside the CID.
/// Only sha2-256 is understood, any other hash function fails verification.
pub fn verify(cid: &Cid, data: &[u8]) -> bool {
    cid.hash().code() == SHA2_256 && cid.hash().digest() == Sha256::digest(data).as_slice()
}
