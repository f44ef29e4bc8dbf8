//! Speculative parsing of a byte stream as an archive.
//!
//! The scanner is fed the same bytes as the hasher, in whatever pieces they
//! arrive. It never fails: a stream that doesn't start with a decodable
//! header is simply not an archive, and a stream that goes wrong after a
//! valid header is reported as broken.

use bodyshop_car::wire::{
    decode_varint, CAR_VERSION, MAX_HEADER_LEN, MAX_VARINT_LEN, SCAN_MAX_FRAME_LEN,
};
use bodyshop_car::CarHeader;
use cid::Cid;
use serde::{Serialize, Serializer};
use tracing::{debug, warn};

/// What the scanner found out about the stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CarSummary {
    /// Version declared in the header.
    pub version: u64,
    /// Whether every byte after the header was part of a complete frame.
    pub well_formed: bool,
    /// Roots declared in the header.
    #[serde(serialize_with = "cids_as_strings")]
    pub roots: Vec<Cid>,
    /// Number of complete frames.
    pub blocks: u64,
}

fn cids_as_strings<S: Serializer>(cids: &[Cid], s: S) -> Result<S::Ok, S::Error> {
    s.collect_seq(cids.iter().map(|c| c.to_string()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    HeaderLen,
    Header { len: usize },
    FrameLen,
    Frame { remaining: u64 },
    Done,
}

/// What a length prefix announces.
#[derive(Debug, Clone, Copy)]
enum Prefix {
    Header,
    Frame,
}

/// A push-based archive parser.
#[derive(Debug)]
pub struct CarScanner {
    state: State,
    buf: Vec<u8>,
    header: Option<CarHeader>,
    blocks: u64,
    broken: bool,
    offset: u64,
}

impl Default for CarScanner {
    fn default() -> Self {
        Self {
            state: State::HeaderLen,
            buf: Vec::with_capacity(MAX_VARINT_LEN),
            header: None,
            blocks: 0,
            broken: false,
            offset: 0,
        }
    }
}

impl CarScanner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, mut data: &[u8]) {
        while !data.is_empty() {
            let consumed = match self.state {
                State::Done => return,
                State::HeaderLen => self.push_varint_byte(data[0], Prefix::Header),
                State::FrameLen => self.push_varint_byte(data[0], Prefix::Frame),
                State::Header { len } => {
                    let n = (len - self.buf.len()).min(data.len());
                    self.buf.extend_from_slice(&data[..n]);
                    if self.buf.len() == len {
                        self.parse_header();
                    }
                    n
                }
                State::Frame { remaining } => {
                    let n = remaining.min(data.len() as u64);
                    if n == remaining {
                        self.blocks += 1;
                        self.state = State::FrameLen;
                    } else {
                        self.state = State::Frame {
                            remaining: remaining - n,
                        };
                    }
                    n as usize
                }
            };

            self.offset += consumed as u64;
            data = &data[consumed..];
        }
    }

    fn push_varint_byte(&mut self, b: u8, prefix: Prefix) -> usize {
        self.buf.push(b);

        let value = match decode_varint(&self.buf) {
            Ok(None) => return 1,
            Ok(Some((value, _))) => Some(value),
            Err(e) => {
                debug!(offset = self.offset, err = %e, "undecodable varint");
                None
            }
        };
        self.buf.clear();

        match (prefix, value) {
            (Prefix::Header, Some(len)) if len > 0 && len <= MAX_HEADER_LEN => {
                self.buf.reserve(len as usize);
                self.state = State::Header { len: len as usize };
            }
            (Prefix::Header, _) => self.state = State::Done,
            (Prefix::Frame, Some(len)) if len <= SCAN_MAX_FRAME_LEN => {
                self.state = if len == 0 {
                    self.blocks += 1;
                    State::FrameLen
                } else {
                    State::Frame { remaining: len }
                };
            }
            (Prefix::Frame, Some(len)) => {
                warn!(offset = self.offset, len, "unexpectedly large frame length");
                self.mark_broken();
            }
            (Prefix::Frame, None) => {
                warn!(offset = self.offset, "undecodable frame length");
                self.mark_broken();
            }
        }

        1
    }

    fn parse_header(&mut self) {
        let buf = std::mem::take(&mut self.buf);

        match CarHeader::decode(&buf) {
            Err(e) => {
                debug!(err = %e, "stream does not start with an archive header");
                self.state = State::Done;
            }
            Ok(header) => {
                self.state = if header.version == CAR_VERSION {
                    State::FrameLen
                } else {
                    debug!(version = header.version, "unknown archive version");
                    State::Done
                };
                self.header = Some(header);
            }
        }
    }

    fn mark_broken(&mut self) {
        self.broken = true;
        self.state = State::Done;
    }

    /// Ends the stream. Returns [None] if no header could be decoded.
    pub fn finish(mut self) -> Option<CarSummary> {
        match self.state {
            State::Frame { remaining } => {
                warn!(offset = self.offset, remaining, "truncated frame");
                self.broken = true;
            }
            State::FrameLen if !self.buf.is_empty() => {
                warn!(offset = self.offset, "truncated frame length");
                self.broken = true;
            }
            _ => {}
        }

        let header = self.header?;
        Some(CarSummary {
            version: header.version,
            well_formed: header.version == CAR_VERSION && !self.broken,
            roots: header.roots,
            blocks: self.blocks,
        })
    }
}
