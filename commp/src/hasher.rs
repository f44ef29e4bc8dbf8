//! The piece commitment Merkle tree.
//!
//! Leaves are the 32-byte words produced by Fr32 padding. Inner nodes are the
//! sha2-256 of the concatenated children, with the two most significant bits
//! cleared. The tree is completed to a power of two with the commitments of
//! all-zero subtrees.

use cid::multihash::Multihash;
use cid::Cid;
use lazy_static::lazy_static;
use sha2::{Digest as _, Sha256};
use tracing::debug;

use crate::fr32::{pad_quad, IN_QUAD, OUT_QUAD};
use crate::Error;

/// A raw piece commitment.
pub type Digest = [u8; 32];

/// Payloads need at least this many bytes.
pub const MIN_PAYLOAD: u64 = 65;

/// The largest supported padded piece size, 64GiB.
pub const MAX_PIECE_SIZE: u64 = 1 << 36;

/// The largest payload fitting into [MAX_PIECE_SIZE].
pub const MAX_PAYLOAD: u64 = MAX_PIECE_SIZE / OUT_QUAD as u64 * IN_QUAD as u64;

/// The smallest padded piece size.
pub const MIN_PIECE_SIZE: u64 = OUT_QUAD as u64;

/// Multicodec `fil-commitment-unsealed`.
pub const FIL_COMMITMENT_UNSEALED: u64 = 0xf101;

/// Multihash code `sha2-256-trunc254-padded`.
pub const SHA2_256_TRUNC254_PADDED: u64 = 0x1012;

const MAX_HEIGHT: usize = (MAX_PIECE_SIZE / 32).trailing_zeros() as usize;

lazy_static! {
    /// The commitment of an all-zero subtree, by height.
    pub static ref ZERO_COMMITMENTS: Vec<Digest> = {
        let mut zeroes = vec![[0u8; 32]];
        for h in 0..MAX_HEIGHT {
            let next = hash_pair(&zeroes[h], &zeroes[h]);
            zeroes.push(next);
        }
        zeroes
    };
}

fn hash_pair(left: &Digest, right: &Digest) -> Digest {
    let mut hasher = Sha256::new();
    hasher.update(left);
    hasher.update(right);

    let mut out: Digest = hasher.finalize().into();
    out[31] &= 0x3f;
    out
}

/// Computes a piece commitment incrementally.
///
/// Only one pending node per tree level is kept, the same way a binary
/// counter carries, so memory use is logarithmic in the payload size.
pub struct CommpHasher {
    quad: [u8; IN_QUAD],
    quad_len: usize,
    layers: Vec<Option<Digest>>,
    leaves: u64,
    payload: u64,
}

impl Default for CommpHasher {
    fn default() -> Self {
        Self {
            quad: [0; IN_QUAD],
            quad_len: 0,
            layers: Vec::with_capacity(MAX_HEIGHT + 1),
            leaves: 0,
            payload: 0,
        }
    }
}

impl CommpHasher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of payload bytes consumed so far.
    pub fn payload_size(&self) -> u64 {
        self.payload
    }

    pub fn update(&mut self, mut data: &[u8]) {
        self.payload += data.len() as u64;

        // past the limit, finish reports the error
        if self.payload > MAX_PAYLOAD {
            return;
        }

        while !data.is_empty() {
            let n = (IN_QUAD - self.quad_len).min(data.len());
            self.quad[self.quad_len..self.quad_len + n].copy_from_slice(&data[..n]);
            self.quad_len += n;
            data = &data[n..];

            if self.quad_len == IN_QUAD {
                self.flush_quad();
            }
        }
    }

    fn flush_quad(&mut self) {
        let mut padded = [0u8; OUT_QUAD];
        pad_quad(&self.quad, &mut padded);
        self.quad_len = 0;

        for leaf in padded.chunks_exact(32) {
            let mut node: Digest = [0; 32];
            node.copy_from_slice(leaf);
            self.push(node);
        }
    }

    fn push(&mut self, mut node: Digest) {
        self.leaves += 1;

        let mut height = 0;
        loop {
            if self.layers.len() == height {
                self.layers.push(None);
            }
            match self.layers[height].take() {
                None => {
                    self.layers[height] = Some(node);
                    return;
                }
                Some(left) => {
                    node = hash_pair(&left, &node);
                    height += 1;
                }
            }
        }
    }

    /// Returns the raw commitment and the padded piece size.
    pub fn finish(mut self) -> Result<(Digest, u64), Error> {
        if self.payload < MIN_PAYLOAD {
            return Err(Error::InsufficientData(self.payload));
        }
        if self.payload > MAX_PAYLOAD {
            return Err(Error::PayloadTooLarge(self.payload));
        }

        if self.quad_len > 0 {
            self.quad[self.quad_len..].fill(0);
            self.flush_quad();
        }

        let padded_leaves = self.leaves.next_power_of_two();
        let height = padded_leaves.trailing_zeros() as usize;

        // fold the pending nodes from the bottom, completing the rightmost
        // subtree with zero commitments
        let mut acc: Option<Digest> = None;
        for h in 0..height {
            let layer = self.layers.get(h).copied().flatten();
            acc = match (layer, acc) {
                (Some(left), Some(right)) => Some(hash_pair(&left, &right)),
                (Some(left), None) => Some(hash_pair(&left, &ZERO_COMMITMENTS[h])),
                (None, Some(left)) => Some(hash_pair(&left, &ZERO_COMMITMENTS[h])),
                (None, None) => None,
            };
        }

        let digest = match acc {
            Some(digest) => digest,
            None => self.layers[height].ok_or_else(|| {
                Error::InvalidDigest(format!("no node at height {}", height))
            })?,
        };
        let padded_size = padded_leaves * 32;

        debug!(payload = self.payload, padded_size, "finished commitment");
        Ok((digest, padded_size))
    }
}

impl std::io::Write for CommpHasher {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Checks a piece size is a power of two within the supported range.
pub fn validate_piece_size(size: u64) -> Result<(), Error> {
    if !size.is_power_of_two() || !(MIN_PIECE_SIZE..=MAX_PIECE_SIZE).contains(&size) {
        return Err(Error::InvalidPieceSize(size));
    }
    Ok(())
}

/// Lifts a commitment over a piece of `from` bytes to one over a piece of
/// `to` bytes, as if the payload had been followed by zeroes.
pub fn pad_commp(digest: Digest, from: u64, to: u64) -> Result<Digest, Error> {
    validate_piece_size(from)?;
    validate_piece_size(to)?;
    if to < from {
        return Err(Error::TargetTooSmall {
            target: to,
            natural: from,
        });
    }

    let mut digest = digest;
    let target = (to / 32).trailing_zeros() as usize;
    for h in (from / 32).trailing_zeros() as usize..target {
        digest = hash_pair(&digest, &ZERO_COMMITMENTS[h]);
    }

    Ok(digest)
}

/// Wraps a raw commitment into its CID.
pub fn commp_cid(digest: &Digest) -> Result<Cid, Error> {
    let hash = Multihash::<64>::wrap(SHA2_256_TRUNC254_PADDED, digest)
        .map_err(|e| Error::InvalidDigest(e.to_string()))?;
    Ok(Cid::new_v1(FIL_COMMITMENT_UNSEALED, hash))
}
