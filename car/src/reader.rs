//! Parsing archives.

use std::io::Cursor;

use bytes::Bytes;
use cid::Cid;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, warn};

use crate::wire::{read_varint, CAR_VERSION, MAX_HEADER_LEN, MAX_READ_FRAME_LEN};
use crate::{CarHeader, Error};

/// Reads an archive from an [AsyncRead], frame by frame.
pub struct CarReader<R> {
    reader: R,
    header: CarHeader,
    verify: bool,
    frames: u64,
}

impl<R> CarReader<R>
where
    R: AsyncRead + Unpin,
{
    /// Reads and checks the header.
    pub async fn new(mut reader: R) -> Result<Self, Error> {
        let len = read_varint(&mut reader)
            .await?
            .ok_or_else(|| Error::Header("empty archive".to_string()))?;

        if len == 0 || len > MAX_HEADER_LEN {
            return Err(Error::Header(format!("invalid header length {}", len)));
        }

        let mut buf = vec![0; len as usize];
        reader.read_exact(&mut buf).await?;

        let header = CarHeader::decode(&buf)?;
        if header.version != CAR_VERSION {
            return Err(Error::Header(format!(
                "unsupported version {}",
                header.version
            )));
        }

        debug!(roots = header.roots.len(), "read header");

        Ok(Self {
            reader,
            header,
            verify: false,
            frames: 0,
        })
    }

    /// If enabled, every block is hashed and compared against its CID.
    pub fn with_verify(mut self, verify: bool) -> Self {
        self.verify = verify;
        self
    }

    pub fn header(&self) -> &CarHeader {
        &self.header
    }

    /// Number of frames returned so far.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Returns the next frame, or [None] at the end of the archive.
    pub async fn next_frame(&mut self) -> Result<Option<(Cid, Bytes)>, Error> {
        let len = match read_varint(&mut self.reader).await? {
            None => return Ok(None),
            Some(len) => len,
        };

        if len > MAX_READ_FRAME_LEN {
            return Err(Error::FrameTooLarge(len));
        }

        let mut buf = vec![0; len as usize];
        self.reader.read_exact(&mut buf).await?;

        let mut cursor = Cursor::new(&buf[..]);
        let cid = Cid::read_bytes(&mut cursor)
            .map_err(|e| Error::InvalidFrame(format!("invalid cid: {}", e)))?;
        let pos = cursor.position() as usize;
        let data = Bytes::from(buf).slice(pos..);

        if self.verify && !bodyshop_castore::verify(&cid, &data) {
            warn!(%cid, "block does not match its cid");
            return Err(Error::Mismatch(cid));
        }

        self.frames += 1;
        Ok(Some((cid, data)))
    }
}
