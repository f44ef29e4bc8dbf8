//! Framing primitives shared by the reader, the writer and anything that
//! scans archives.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use unsigned_varint::{decode, encode};

use crate::Error;

/// Frames (CID plus block) longer than this are taken as a sign of
/// corruption when a stream is scanned speculatively.
pub const SCAN_MAX_FRAME_LEN: u64 = 2 << 20;

/// The largest frame the reader allocates for.
pub const MAX_READ_FRAME_LEN: u64 = 1 << 30;

/// The largest header we accept.
pub const MAX_HEADER_LEN: u64 = 1 << 20;

/// Maximum number of bytes of an unsigned varint encoding a u64.
pub const MAX_VARINT_LEN: usize = 10;

/// The only archive version understood.
pub const CAR_VERSION: u64 = 1;

/// Writes `n` as an unsigned varint.
pub async fn write_varint<W>(w: &mut W, n: u64) -> std::io::Result<usize>
where
    W: AsyncWrite + Unpin,
{
    let mut buf = encode::u64_buffer();
    let encoded = encode::u64(n, &mut buf);
    w.write_all(encoded).await?;
    Ok(encoded.len())
}

/// Reads an unsigned varint.
/// Returns [None] if the reader is at EOF before the first byte, a reader
/// ending in the middle of a varint is an error.
pub async fn read_varint<R>(r: &mut R) -> Result<Option<u64>, Error>
where
    R: AsyncRead + Unpin,
{
    let mut buf = [0u8; MAX_VARINT_LEN];

    for i in 0..MAX_VARINT_LEN {
        let n = r.read(&mut buf[i..=i]).await?;
        if n == 0 {
            if i == 0 {
                return Ok(None);
            }
            return Err(std::io::Error::from(std::io::ErrorKind::UnexpectedEof).into());
        }

        if decode::is_last(buf[i]) {
            let (value, _) = decode::u64(&buf[..=i])
                .map_err(|e| Error::InvalidFrame(format!("invalid varint: {}", e)))?;
            return Ok(Some(value));
        }
    }

    Err(Error::InvalidFrame("varint too long".to_string()))
}

/// Decodes a varint from the start of `buf`.
/// Returns [None] if more bytes are needed.
pub fn decode_varint(buf: &[u8]) -> Result<Option<(u64, usize)>, decode::Error> {
    match decode::u64(buf) {
        Ok((value, rest)) => Ok(Some((value, buf.len() - rest.len()))),
        Err(decode::Error::Insufficient) if buf.len() < MAX_VARINT_LEN => Ok(None),
        Err(e) => Err(e),
    }
}
