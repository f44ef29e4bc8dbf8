use std::fmt;

use cid::Cid;
use data_encoding::HEXLOWER;
use serde::{Serialize, Serializer};

use crate::{CarSummary, Digest};

/// The outcome of a commitment calculation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommpReport {
    /// The commitment as CID.
    #[serde(serialize_with = "as_string")]
    pub commp: Cid,
    /// The raw commitment.
    #[serde(serialize_with = "as_hex")]
    pub raw_digest: Digest,
    /// Number of bytes read.
    pub payload_size: u64,
    /// The padded size without Fr32 expansion.
    pub unpadded_size: u64,
    pub padded_size: u64,
    /// Present if the payload started with an archive header.
    pub car: Option<CarSummary>,
}

fn as_string<S: Serializer>(cid: &Cid, s: S) -> Result<S::Ok, S::Error> {
    s.collect_str(cid)
}

fn as_hex<S: Serializer>(digest: &Digest, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&HEXLOWER.encode(digest))
}

impl CommpReport {
    /// Whether the payload was an archive consisting of complete frames only.
    pub fn well_formed_archive(&self) -> bool {
        self.car.as_ref().is_some_and(|c| c.well_formed)
    }

    pub fn declared_roots(&self) -> &[Cid] {
        self.car.as_ref().map(|c| c.roots.as_slice()).unwrap_or(&[])
    }

    pub fn frames_parsed(&self) -> u64 {
        self.car.as_ref().map(|c| c.blocks).unwrap_or(0)
    }
}

impl fmt::Display for CommpReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "CommPCid: {}", self.commp)?;
        writeln!(f, "Payload:        {:>12} bytes", self.payload_size)?;
        writeln!(f, "Unpadded piece: {:>12} bytes", self.unpadded_size)?;
        writeln!(f, "Padded piece:   {:>12} bytes", self.padded_size)?;

        if let Some(car) = &self.car {
            writeln!(f)?;
            if car.version == bodyshop_car::wire::CAR_VERSION && !car.well_formed {
                write!(f, "*CORRUPTED* ")?;
            }
            writeln!(f, "CARv{} detected in stream:", car.version)?;
            writeln!(f, "Blocks:  {:>8}", car.blocks)?;
            writeln!(f, "Roots:   {:>8}", car.roots.len())?;
            for (i, root) in car.roots.iter().enumerate() {
                writeln!(f, "{:>5}: {}", i + 1, root)?;
            }
        }

        Ok(())
    }
}
