//! This holds types describing nodes of the Merkle DAG.
mod directory;

use bytes::Bytes;
use cid::Cid;
use prost::Message;

use crate::proto::{self, data::DataType};
use crate::{cid_for, Error, DAG_PB, RAW};
pub use directory::Directory;

/// A named, sized pointer to another node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    /// Name of the link, empty for the links between chunks of a file.
    pub name: String,
    /// The CID of the target node.
    pub cid: Cid,
    /// Cumulative size of the target: its encoded bytes plus the cumulative
    /// sizes of everything it links to.
    pub size: u64,
}

/// What an [Internal] node represents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InternalKind {
    /// An inner node of a chunked file. `blocksizes` holds the content size of
    /// each linked child, `filesize` their sum.
    File { filesize: u64, blocksizes: Vec<u64> },
    /// A directory, its links are the directory entries.
    Directory,
}

/// A dag-pb node with an ordered list of links.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Internal {
    pub kind: InternalKind,
    pub links: Vec<Link>,
}

/// A Node is either a raw [Node::Leaf], holding a chunk of file content
/// without any envelope, or an [Node::Internal] node linking to others.
/// The variant is decided when the node is constructed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Leaf(Bytes),
    Internal(Internal),
}

/// Errors that occur while validating link names.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum ValidateNodeError {
    #[error("invalid name {0:?}")]
    InvalidName(String),
    #[error("{0:?} is a duplicate name")]
    DuplicateName(String),
}

impl Node {
    /// The multicodec this node is encoded with.
    pub fn codec(&self) -> u64 {
        match self {
            Node::Leaf(_) => RAW,
            Node::Internal(_) => DAG_PB,
        }
    }

    /// Returns the canonical encoding of the node.
    /// Leaves are stored verbatim.
    pub fn encode(&self) -> Bytes {
        match self {
            Node::Leaf(data) => data.clone(),
            Node::Internal(internal) => internal.encode().into(),
        }
    }

    /// Calculates the CID of this node over its canonical encoding.
    pub fn cid(&self) -> Result<Cid, Error> {
        cid_for(self.codec(), &self.encode())
    }

    /// All outgoing links, in order. Leaves have none.
    pub fn links(&self) -> &[Link] {
        match self {
            Node::Leaf(_) => &[],
            Node::Internal(internal) => &internal.links,
        }
    }

    /// The number of content bytes this node represents.
    /// Directories carry no content of their own.
    pub fn content_size(&self) -> u64 {
        match self {
            Node::Leaf(data) => data.len() as u64,
            Node::Internal(Internal {
                kind: InternalKind::File { filesize, .. },
                ..
            }) => *filesize,
            Node::Internal(_) => 0,
        }
    }

    pub fn is_directory(&self) -> bool {
        matches!(
            self,
            Node::Internal(Internal {
                kind: InternalKind::Directory,
                ..
            })
        )
    }

    /// The encoded size of this node plus the cumulative sizes of all
    /// nodes it links to.
    pub fn cumulative_size(&self) -> u64 {
        self.cumulative_size_of(&self.encode())
    }

    fn cumulative_size_of(&self, encoded: &[u8]) -> u64 {
        self.links()
            .iter()
            .fold(encoded.len() as u64, |acc, l| acc.saturating_add(l.size))
    }

    /// Produces a [Link] with the given name pointing to this node.
    pub fn link(&self, name: impl Into<String>) -> Result<Link, Error> {
        let encoded = self.encode();

        Ok(Link {
            name: name.into(),
            cid: cid_for(self.codec(), &encoded)?,
            size: self.cumulative_size_of(&encoded),
        })
    }

    /// Decodes a block previously produced by [Node::encode].
    /// The codec is taken from the CID.
    pub fn decode(cid: &Cid, data: Bytes) -> Result<Node, Error> {
        match cid.codec() {
            RAW => Ok(Node::Leaf(data)),
            DAG_PB => {
                let pb = proto::PbNode::decode(data)
                    .map_err(|e| Error::Decode(*cid, e.to_string()))?;
                let unixfs = proto::Data::decode(pb.data.unwrap_or_default().as_slice())
                    .map_err(|e| Error::Decode(*cid, e.to_string()))?;

                let kind = match unixfs.r#type() {
                    DataType::Directory => InternalKind::Directory,
                    DataType::File => InternalKind::File {
                        filesize: unixfs.filesize.unwrap_or_default(),
                        blocksizes: unixfs.blocksizes,
                    },
                    other => {
                        return Err(Error::Decode(
                            *cid,
                            format!("unsupported unixfs type {:?}", other),
                        ))
                    }
                };

                let links = pb
                    .links
                    .into_iter()
                    .map(|l| {
                        Ok(Link {
                            name: l.name.unwrap_or_default(),
                            cid: Cid::try_from(l.hash.unwrap_or_default().as_slice())
                                .map_err(|e| Error::Decode(*cid, e.to_string()))?,
                            size: l.tsize.unwrap_or_default(),
                        })
                    })
                    .collect::<Result<Vec<_>, Error>>()?;

                Ok(Node::Internal(Internal { kind, links }))
            }
            codec => Err(Error::UnsupportedCodec(*cid, codec)),
        }
    }
}

impl Internal {
    fn encode(&self) -> Vec<u8> {
        let data = match &self.kind {
            InternalKind::Directory => proto::Data {
                r#type: DataType::Directory as i32,
                ..Default::default()
            },
            InternalKind::File {
                filesize,
                blocksizes,
            } => proto::Data {
                r#type: DataType::File as i32,
                filesize: Some(*filesize),
                blocksizes: blocksizes.clone(),
                ..Default::default()
            },
        };

        let links: Vec<proto::PbLink> = self
            .links
            .iter()
            .map(|l| proto::PbLink {
                hash: Some(l.cid.to_bytes()),
                name: Some(l.name.clone()),
                tsize: Some(l.size),
            })
            .collect();

        proto::encode_node(&links, Some(&data.encode_to_vec()))
    }
}

impl From<Directory> for Node {
    fn from(value: Directory) -> Self {
        Node::Internal(Internal {
            kind: InternalKind::Directory,
            links: value.into_links(),
        })
    }
}
