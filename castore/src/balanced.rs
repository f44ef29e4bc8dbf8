//! Building balanced Merkle trees out of file contents.
//!
//! Every chunk of a file becomes a raw leaf. If there is only one chunk, that
//! leaf is the file node. Otherwise leaves are grouped into internal UnixFS
//! file nodes of at most [BuildParams::max_links] children, and those again,
//! until a single root remains. All leaves end up at the same depth.

use std::io::Write;

use bytes::Bytes;
use cid::Cid;
use serde::Deserialize;
use tokio::io::AsyncRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use crate::blockstore::BlockStore;
use crate::chunker::{open_source, Chunker, Error};
use crate::import::FileEntry;
use crate::{Error as CastoreError, Internal, InternalKind, Link, Node};

/// Default size of a chunk, 1 MiB.
pub const DEFAULT_CHUNK_SIZE: usize = 1 << 20;

/// Default maximum number of links per internal node.
pub const DEFAULT_MAX_LINKS: usize = 1 << 10;

/// Largest accepted chunk size. Frames of the archive, which carry a CID plus
/// a leaf, have to stay below 2 MiB.
pub const MAX_CHUNK_SIZE: usize = (2 << 20) - 1024;

/// Parameters controlling the shape of file trees.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BuildParams {
    pub chunk_size: usize,
    pub max_links: usize,
}

impl Default for BuildParams {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_links: DEFAULT_MAX_LINKS,
        }
    }
}

impl BuildParams {
    pub fn validate(&self) -> Result<(), CastoreError> {
        if self.chunk_size == 0 || self.chunk_size > MAX_CHUNK_SIZE {
            return Err(CastoreError::InvalidRequest(format!(
                "chunk size must be within 1..={}, got {}",
                MAX_CHUNK_SIZE, self.chunk_size
            )));
        }
        if self.max_links < 2 {
            return Err(CastoreError::InvalidRequest(format!(
                "max links must be at least 2, got {}",
                self.max_links
            )));
        }
        Ok(())
    }
}

/// The tree built for a single file.
#[derive(Debug, Clone)]
pub struct FileTree {
    /// The root node of the file.
    pub node: Node,
    /// The CID of the root node.
    pub cid: Cid,
    /// Cumulative size of the root node.
    pub size: u64,
    /// Number of content bytes.
    pub content_size: u64,
    /// Every block of the tree, leaves first, the root last.
    pub blocks: Vec<(Cid, Bytes)>,
}

impl FileTree {
    /// A [Link] to the root of this file, named `name`.
    pub fn link(&self, name: impl Into<String>) -> Link {
        Link {
            name: name.into(),
            cid: self.cid,
            size: self.size,
        }
    }

    /// Reassembles the content of this file from the blocks in `store`.
    pub fn read_back(&self, store: &dyn BlockStore) -> Result<Vec<u8>, CastoreError> {
        let mut out = Vec::with_capacity(self.content_size as usize);
        read_content(store, &self.cid, &mut out)?;
        Ok(out)
    }
}

/// A node of the layer currently being grouped.
struct Child {
    link: Link,
    content_size: u64,
}

/// Accumulates chunks and assembles the balanced tree once all are known.
pub struct BalancedBuilder {
    params: BuildParams,
    leaves: Vec<Child>,
    blocks: Vec<(Cid, Bytes)>,
    last: Option<Node>,
}

impl BalancedBuilder {
    pub fn new(params: BuildParams) -> Self {
        Self {
            params,
            leaves: Vec::new(),
            blocks: Vec::new(),
            last: None,
        }
    }

    /// Adds the next chunk of the file as a raw leaf.
    pub fn push_chunk(&mut self, chunk: Bytes) -> Result<(), CastoreError> {
        let content_size = chunk.len() as u64;
        let leaf = Node::Leaf(chunk);
        let link = leaf.link("")?;

        self.blocks.push((link.cid, leaf.encode()));
        self.leaves.push(Child { link, content_size });
        self.last = Some(leaf);
        Ok(())
    }

    /// Groups the leaves into internal nodes, level by level, and returns the
    /// resulting tree.
    pub fn finish(mut self) -> Result<FileTree, CastoreError> {
        if self.leaves.is_empty() {
            self.push_chunk(Bytes::new())?;
        }

        let mut layer = std::mem::take(&mut self.leaves);
        let mut root = self.last.take();

        while layer.len() > 1 {
            let mut next = Vec::with_capacity(layer.len().div_ceil(self.params.max_links));

            for group in layer.chunks(self.params.max_links) {
                let blocksizes: Vec<u64> = group.iter().map(|c| c.content_size).collect();
                let content_size = blocksizes.iter().sum();

                let node = Node::Internal(Internal {
                    kind: InternalKind::File {
                        filesize: content_size,
                        blocksizes,
                    },
                    links: group.iter().map(|c| c.link.clone()).collect(),
                });
                let link = node.link("")?;

                self.blocks.push((link.cid, node.encode()));
                next.push(Child { link, content_size });
                root = Some(node);
            }

            layer = next;
        }

        let top = layer
            .pop()
            .ok_or_else(|| CastoreError::InvalidRequest("no chunks".to_string()))?;
        let node = root.ok_or_else(|| CastoreError::InvalidRequest("no root".to_string()))?;

        Ok(FileTree {
            node,
            cid: top.link.cid,
            size: top.link.size,
            content_size: top.content_size,
            blocks: self.blocks,
        })
    }
}

/// Builds the tree for a file held in memory.
pub fn build_from_bytes(data: &[u8], params: &BuildParams) -> Result<FileTree, CastoreError> {
    let mut builder = BalancedBuilder::new(params.clone());
    for chunk in data.chunks(params.chunk_size) {
        builder.push_chunk(Bytes::copy_from_slice(chunk))?;
    }
    builder.finish()
}

/// Builds the tree for everything read from `reader`.
/// `path` is only used for error reporting.
pub async fn build_file<R>(
    reader: R,
    path: &std::path::Path,
    params: &BuildParams,
    cancel: &CancellationToken,
) -> Result<FileTree, Error>
where
    R: AsyncRead + Unpin,
{
    let mut chunker = Chunker::new(reader, params.chunk_size);
    let mut builder = BalancedBuilder::new(params.clone());

    while let Some(chunk) = chunker
        .next_chunk()
        .await
        .map_err(|e| Error::Read(path.to_path_buf(), e))?
    {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        builder
            .push_chunk(chunk)
            .map_err(|e| Error::Encode(path.to_path_buf(), e))?;
    }

    builder
        .finish()
        .map_err(|e| Error::Encode(path.to_path_buf(), e))
}

/// Opens the source of the entry and builds its tree.
/// If the entry declares a byte range, fewer bytes than that is an error.
#[instrument(skip_all, fields(path = ?entry.path, range = ?entry.range), err)]
pub async fn build_entry(
    entry: &FileEntry,
    params: &BuildParams,
    cancel: &CancellationToken,
) -> Result<FileTree, Error> {
    let reader = open_source(entry).await?;
    let tree = build_file(reader, &entry.path, params, cancel).await?;

    if let Some(range) = &entry.range {
        let wanted = range.end - range.start;
        if tree.content_size != wanted {
            return Err(Error::UnexpectedSize {
                path: entry.path.clone(),
                wanted,
                got: tree.content_size,
            });
        }
    }

    debug!(cid = %tree.cid, size = tree.content_size, blocks = tree.blocks.len(), "built file");
    Ok(tree)
}

/// Writes the content of the file rooted at `cid` to `w`, by walking the
/// tree depth-first and emitting the leaves in order.
pub fn read_content<W: Write>(
    store: &dyn BlockStore,
    cid: &Cid,
    w: &mut W,
) -> Result<u64, CastoreError> {
    let mut stack = vec![*cid];
    let mut written = 0u64;

    while let Some(cid) = stack.pop() {
        let node = store
            .get_node(&cid)?
            .ok_or_else(|| CastoreError::StorageError(format!("block {} does not exist", cid)))?;

        match node {
            Node::Leaf(data) => {
                w.write_all(&data)
                    .map_err(|e| CastoreError::StorageError(e.to_string()))?;
                written += data.len() as u64;
            }
            Node::Internal(Internal {
                kind: InternalKind::File { .. },
                links,
            }) => stack.extend(links.iter().rev().map(|l| l.cid)),
            Node::Internal(_) => {
                return Err(CastoreError::InvalidRequest(format!(
                    "{} is a directory, not a file",
                    cid
                )))
            }
        }
    }

    Ok(written)
}
