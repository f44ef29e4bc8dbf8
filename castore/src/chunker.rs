//! Splitting a byte source into fixed-size chunks.

use std::io::SeekFrom;
use std::path::PathBuf;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeekExt, BufReader, Take};
use tracing::instrument;

use crate::import::FileEntry;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("unable to open {0}: {1}")]
    Open(PathBuf, std::io::Error),

    #[error("unable to read {0}: {1}")]
    Read(PathBuf, std::io::Error),

    #[error("invalid byte range {start}..{end} for {path}")]
    InvalidRange { path: PathBuf, start: u64, end: u64 },

    #[error("unexpected size for {path} wanted: {wanted} got: {got}")]
    UnexpectedSize { path: PathBuf, wanted: u64, got: u64 },

    #[error("unable to encode node for {0}: {1}")]
    Encode(PathBuf, crate::Error),

    #[error("cancelled")]
    Cancelled,
}

/// Reads consecutive chunks of `chunk_size` bytes from a reader.
/// Only the last chunk may be shorter. A source without any bytes produces a
/// single empty chunk.
pub struct Chunker<R> {
    reader: R,
    chunk_size: usize,
    done: bool,
    emitted: bool,
}

impl<R> Chunker<R>
where
    R: AsyncRead + Unpin,
{
    pub fn new(reader: R, chunk_size: usize) -> Self {
        Self {
            reader,
            chunk_size,
            done: false,
            emitted: false,
        }
    }

    /// Returns the next chunk, or [None] once the source is exhausted.
    pub async fn next_chunk(&mut self) -> std::io::Result<Option<Bytes>> {
        if self.done {
            return Ok(None);
        }

        let mut buf = BytesMut::with_capacity(self.chunk_size);
        while buf.len() < self.chunk_size {
            let want = (self.chunk_size - buf.len()) as u64;
            let n = (&mut self.reader).take(want).read_buf(&mut buf).await?;
            if n == 0 {
                self.done = true;
                break;
            }
        }

        if buf.is_empty() && self.emitted {
            return Ok(None);
        }

        self.emitted = true;
        Ok(Some(buf.freeze()))
    }
}

/// Opens the source of a [FileEntry], positioned at the start of its range
/// and limited to its end, if a range is set.
#[instrument(level = "debug", skip_all, fields(path = ?entry.path), err)]
pub async fn open_source(
    entry: &FileEntry,
) -> Result<Take<BufReader<tokio::fs::File>>, Error> {
    let mut file = tokio::fs::File::open(&entry.path)
        .await
        .map_err(|e| Error::Open(entry.path.clone(), e))?;

    match &entry.range {
        None => Ok(BufReader::new(file).take(u64::MAX)),
        Some(range) => {
            if range.start > range.end {
                return Err(Error::InvalidRange {
                    path: entry.path.clone(),
                    start: range.start,
                    end: range.end,
                });
            }

            file.seek(SeekFrom::Start(range.start))
                .await
                .map_err(|e| Error::Read(entry.path.clone(), e))?;

            Ok(BufReader::new(file).take(range.end - range.start))
        }
    }
}
