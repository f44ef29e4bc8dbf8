use serde::Deserialize;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

use crate::fr32::{IN_QUAD, OUT_QUAD};
use crate::hasher::{validate_piece_size, MAX_PIECE_SIZE};
use crate::{commp_cid, pad_commp, CarScanner, CommpHasher, CommpReport, Error};

/// Size of the reads from the payload, a multiple of the quad size.
pub const BUF_SIZE: usize = (4 << 20) / OUT_QUAD * IN_QUAD;

/// Options of the [StreamCalculator].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CommpOptions {
    /// Pad the commitment to a piece of this size.
    pub target_piece_size: Option<u64>,
    /// Look for an archive in the payload.
    pub scan_archive: bool,
}

impl Default for CommpOptions {
    fn default() -> Self {
        Self {
            target_piece_size: None,
            scan_archive: true,
        }
    }
}

impl CommpOptions {
    pub fn validate(&self) -> Result<(), Error> {
        if let Some(target) = self.target_piece_size {
            validate_piece_size(target)?;
        }
        Ok(())
    }
}

/// Computes the piece commitment of everything read from a reader.
#[derive(Debug, Clone)]
pub struct StreamCalculator {
    options: CommpOptions,
}

impl StreamCalculator {
    pub fn new(options: CommpOptions) -> Result<Self, Error> {
        options.validate()?;
        Ok(Self { options })
    }

    /// Reads `reader` until EOF and returns the report.
    /// Cancellation is checked between reads.
    #[instrument(skip_all, err)]
    pub async fn calculate<R>(
        &self,
        mut reader: R,
        cancel: &CancellationToken,
    ) -> Result<CommpReport, Error>
    where
        R: AsyncRead + Unpin,
    {
        let mut hasher = CommpHasher::new();
        let mut scanner = self.options.scan_archive.then(CarScanner::new);
        let mut buf = vec![0u8; BUF_SIZE];

        loop {
            let n = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                n = reader.read(&mut buf) => n?,
            };
            if n == 0 {
                break;
            }

            hasher.update(&buf[..n]);
            if let Some(scanner) = scanner.as_mut() {
                scanner.update(&buf[..n]);
            }
        }

        let payload_size = hasher.payload_size();
        let (mut digest, mut padded_size) = hasher.finish()?;

        if let Some(target) = self.options.target_piece_size {
            if target < padded_size {
                return Err(Error::TargetTooSmall {
                    target,
                    natural: padded_size,
                });
            }
            digest = pad_commp(digest, padded_size, target)?;
            padded_size = target;
        }
        debug_assert!(padded_size <= MAX_PIECE_SIZE);

        let report = CommpReport {
            commp: commp_cid(&digest)?,
            raw_digest: digest,
            payload_size,
            unpadded_size: padded_size / OUT_QUAD as u64 * IN_QUAD as u64,
            padded_size,
            car: scanner.and_then(CarScanner::finish),
        };

        info!(
            commp = %report.commp,
            payload_size,
            padded_size,
            frames = report.frames_parsed(),
            "calculated piece commitment"
        );

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use bodyshop_car::write_dag;
    use bodyshop_castore::balanced::build_from_bytes;
    use bodyshop_castore::blockstore::{BlockStore, MemoryBlockStore};
    use bodyshop_castore::fixtures::{file_entry, BLOB_B};
    use bodyshop_castore::import::assemble;
    use bodyshop_castore::BuildParams;
    use rstest::rstest;
    use sha2::{Digest, Sha256};
    use tokio_util::sync::CancellationToken;

    use super::{CommpOptions, StreamCalculator};
    use crate::hasher::ZERO_COMMITMENTS;
    use crate::Error;

    /// Deterministic bytes that don't look like anything.
    fn noise(len: usize) -> Vec<u8> {
        let mut out = Vec::with_capacity(len + 32);
        let mut block = Sha256::digest(b"noise");
        while out.len() < len {
            out.extend_from_slice(&block);
            block = Sha256::digest(block);
        }
        out.truncate(len);
        out
    }

    async fn calculate(options: CommpOptions, data: &[u8]) -> Result<crate::CommpReport, Error> {
        StreamCalculator::new(options)?
            .calculate(Cursor::new(data.to_vec()), &CancellationToken::new())
            .await
    }

    /// Bytes that are not an archive still get a commitment.
    #[tokio::test]
    async fn not_an_archive() {
        let data = noise(10_000);
        let report = calculate(CommpOptions::default(), &data)
            .await
            .expect("must succeed");

        assert!(!report.well_formed_archive());
        assert_eq!(0, report.frames_parsed());
        assert_eq!(10_000, report.payload_size);
        assert_eq!(16384, report.padded_size);
        assert_eq!(16256, report.unpadded_size);
        assert_eq!(crate::hasher::FIL_COMMITMENT_UNSEALED, report.commp.codec());
    }

    #[tokio::test]
    async fn archive() {
        let store = MemoryBlockStore::default();
        let params = BuildParams {
            chunk_size: 4096,
            max_links: 16,
        };
        let assembled = assemble(
            &store,
            vec![
                (
                    file_entry("r/a", BLOB_B.len() as u64),
                    build_from_bytes(&BLOB_B, &params).unwrap(),
                ),
                (
                    file_entry("r/d/b", 1000),
                    build_from_bytes(&noise(1000), &params).unwrap(),
                ),
            ],
            "r",
        )
        .unwrap();

        let mut buf: Vec<u8> = vec![];
        let summary = write_dag(&store, &[assembled.root], &mut buf, &CancellationToken::new())
            .await
            .unwrap();

        let report = calculate(CommpOptions::default(), &buf).await.unwrap();

        assert!(report.well_formed_archive());
        assert_eq!(summary.frames, report.frames_parsed());
        assert_eq!(store.len() as u64, report.frames_parsed());
        assert_eq!(&[assembled.root], report.declared_roots());
        assert_eq!(buf.len() as u64, report.payload_size);
    }

    #[tokio::test]
    async fn scan_disabled() {
        let report = calculate(
            CommpOptions {
                scan_archive: false,
                ..Default::default()
            },
            &noise(100),
        )
        .await
        .unwrap();
        assert_eq!(None, report.car);
    }

    #[tokio::test]
    async fn deterministic() {
        let a = calculate(CommpOptions::default(), &noise(5000)).await.unwrap();
        let b = calculate(CommpOptions::default(), &noise(5000)).await.unwrap();
        assert_eq!(a, b);

        let c = calculate(CommpOptions::default(), &noise(5001)).await.unwrap();
        assert_ne!(a.commp, c.commp);
    }

    #[tokio::test]
    async fn padded_to_target() {
        let report = calculate(
            CommpOptions {
                target_piece_size: Some(1024),
                ..Default::default()
            },
            &[0; 127],
        )
        .await
        .unwrap();

        assert_eq!(1024, report.padded_size);
        assert_eq!(1016, report.unpadded_size);
        assert_eq!(ZERO_COMMITMENTS[5], report.raw_digest);
    }

    /// A target below the natural size is a configuration error, not a
    /// truncated commitment.
    #[tokio::test]
    async fn target_too_small() {
        let err = calculate(
            CommpOptions {
                target_piece_size: Some(128),
                ..Default::default()
            },
            &noise(1000),
        )
        .await
        .expect_err("must fail");

        assert!(matches!(
            err,
            Error::TargetTooSmall {
                target: 128,
                natural: 1024
            }
        ));
    }

    #[rstest]
    #[case::not_power_of_two(Some(1000))]
    #[case::too_small(Some(64))]
    #[case::too_large(Some(1 << 37))]
    fn invalid_target(#[case] target_piece_size: Option<u64>) {
        assert!(matches!(
            StreamCalculator::new(CommpOptions {
                target_piece_size,
                ..Default::default()
            }),
            Err(Error::InvalidPieceSize(_))
        ));
    }

    #[tokio::test]
    async fn too_little_data() {
        assert!(matches!(
            calculate(CommpOptions::default(), &noise(64)).await,
            Err(Error::InsufficientData(64))
        ));
    }

    #[tokio::test]
    async fn cancelled() {
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = StreamCalculator::new(CommpOptions::default())
            .unwrap()
            .calculate(Cursor::new(noise(1000)), &cancel)
            .await
            .expect_err("must fail");
        assert!(matches!(err, Error::Cancelled));
    }
}
