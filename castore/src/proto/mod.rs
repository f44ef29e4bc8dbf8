//! Wire types of the dag-pb codec and the UnixFS data envelope.
//!
//! These mirror the upstream `merkledag.proto` and `unixfs.proto`
//! definitions. Decoding goes through [prost::Message], encoding of a
//! [PbNode] has to go through [encode_node], as dag-pb mandates the `Links`
//! field (tag 2) to be serialized *before* the `Data` field (tag 1), which
//! is not what a derived [prost::Message::encode] produces.

use prost::encoding::{encode_key, encode_varint, WireType};
use prost::Message;

#[cfg(test)]
mod tests;

/// A link inside a dag-pb node.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PbLink {
    /// Binary CID of the target.
    #[prost(bytes = "vec", optional, tag = "1")]
    pub hash: Option<Vec<u8>>,
    /// UTF-8 name of the link.
    #[prost(string, optional, tag = "2")]
    pub name: Option<String>,
    /// Cumulative size of the target.
    #[prost(uint64, optional, tag = "3")]
    pub tsize: Option<u64>,
}

/// A dag-pb node.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PbNode {
    /// Opaque user data, a serialized [Data] for UnixFS.
    #[prost(bytes = "vec", optional, tag = "1")]
    pub data: Option<Vec<u8>>,
    #[prost(message, repeated, tag = "2")]
    pub links: Vec<PbLink>,
}

/// UnixFS data envelope, carried in [PbNode::data].
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Data {
    #[prost(enumeration = "data::DataType", required, tag = "1")]
    pub r#type: i32,
    #[prost(bytes = "vec", optional, tag = "2")]
    pub data: Option<Vec<u8>>,
    #[prost(uint64, optional, tag = "3")]
    pub filesize: Option<u64>,
    #[prost(uint64, repeated, packed = "false", tag = "4")]
    pub blocksizes: Vec<u64>,
    #[prost(uint64, optional, tag = "5")]
    pub hash_type: Option<u64>,
    #[prost(uint64, optional, tag = "6")]
    pub fanout: Option<u64>,
}

/// Nested message and enum types in `Data`.
pub mod data {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
    #[repr(i32)]
    pub enum DataType {
        Raw = 0,
        Directory = 1,
        File = 2,
        Metadata = 3,
        Symlink = 4,
        HamtShard = 5,
    }
}

/// Serializes a dag-pb node in its canonical form: all links (in the order
/// given), followed by the data field.
pub fn encode_node(links: &[PbLink], data: Option<&[u8]>) -> Vec<u8> {
    let mut buf = Vec::new();

    for link in links {
        let encoded = link.encode_to_vec();
        encode_key(2, WireType::LengthDelimited, &mut buf);
        encode_varint(encoded.len() as u64, &mut buf);
        buf.extend_from_slice(&encoded);
    }

    if let Some(data) = data {
        encode_key(1, WireType::LengthDelimited, &mut buf);
        encode_varint(data.len() as u64, &mut buf);
        buf.extend_from_slice(data);
    }

    buf
}
