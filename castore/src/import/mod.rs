//! Placing built files into a tree of directories.
//!
//! Every [FileEntry] carries a source path. Its position in the resulting
//! tree is the directory of that source path, relative to a parent path, see
//! [FileEntry::virtual_directory].
//!
//! [DirectoryAssembler] keeps a map from directory keys (path segments joined
//! by `/`, the root being the empty string) to the entries of the directory
//! at that path. Adding a file attaches it to its directory and makes sure
//! every ancestor lists the directory below it. Directories are only encoded
//! when finalizing, deepest first, so the links to subdirectories are known
//! by the time their parent is encoded.

use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::ops::Range;
use std::path::{Component, Path, PathBuf};

use bytes::Bytes;
use cid::Cid;
use path_clean::PathClean;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::blockstore::BlockStore;
use crate::{Directory, Error as CastoreError, FileTree, Link, Node};

mod error;
pub mod fs;

pub use error::IngestionError;

/// A file to be packed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    /// Where to read the contents from.
    pub path: PathBuf,
    /// The name of the file inside its directory.
    pub name: String,
    /// Size of the file, or of the range, in bytes.
    pub size: u64,
    /// An optional `[start, end)` byte range of the source to use instead of
    /// the whole file.
    #[serde(default)]
    pub range: Option<Range<u64>>,
}

impl FileEntry {
    /// Returns the segments of the directory this entry is placed in.
    ///
    /// Both `parent_path` and the source path are lexically cleaned first.
    /// If they are equal, the entry sits in the root. Otherwise the parent
    /// path is stripped from the directory of the source path, and the
    /// remainder is split into its components.
    pub fn virtual_directory(
        &self,
        parent_path: impl AsRef<Path>,
    ) -> Result<Vec<String>, IngestionError> {
        let parent_path = parent_path.as_ref();
        for p in [parent_path, self.path.as_path()] {
            if p.to_str().is_none() {
                return Err(IngestionError::NonUtf8Path(p.to_path_buf()));
            }
        }

        let parent = parent_path.to_path_buf().clean();
        let path = self.path.clean();

        if parent == path {
            return Ok(vec![]);
        }

        let dir = path.parent().unwrap_or_else(|| Path::new(""));
        let relative = if parent == Path::new(".") {
            dir
        } else {
            dir.strip_prefix(&parent).unwrap_or(dir)
        };

        relative
            .components()
            .filter_map(|c| match c {
                Component::Normal(segment) => Some(
                    segment
                        .to_str()
                        .map(str::to_owned)
                        .ok_or_else(|| IngestionError::NonUtf8Path(self.path.clone())),
                ),
                // kept, so name validation rejects it
                Component::ParentDir => Some(Ok("..".to_owned())),
                Component::RootDir | Component::CurDir | Component::Prefix(_) => None,
            })
            .collect()
    }
}

/// The persisted root of an assembled tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Assembled {
    /// CID of the root directory.
    pub root: Cid,
    /// Cumulative size of the root directory.
    pub size: u64,
    /// Number of distinct directory blocks written, including the root.
    /// Identical directories at different paths are stored once.
    pub directories: usize,
}

/// An entry of a directory that is still being assembled.
#[derive(Debug)]
enum Child {
    File(Link),
    /// Its key is the key of the parent joined with the name.
    Directory,
}

/// Merges files into directories, see the module documentation.
#[derive(Debug)]
pub struct DirectoryAssembler {
    parent_path: PathBuf,
    directories: HashMap<String, BTreeMap<String, Child>>,
    file_keys: HashSet<String>,
    blocks: Vec<(Cid, Bytes)>,
}

impl DirectoryAssembler {
    pub fn new(parent_path: impl Into<PathBuf>) -> Self {
        Self {
            parent_path: parent_path.into(),
            directories: HashMap::new(),
            file_keys: HashSet::new(),
            blocks: Vec::new(),
        }
    }

    /// Adds a built file to the tree.
    /// On error, the assembler is left unchanged.
    pub fn add_file(&mut self, entry: &FileEntry, tree: FileTree) -> Result<(), IngestionError> {
        let segments = entry.virtual_directory(&self.parent_path)?;

        Directory::validate_name(&entry.name)?;
        for segment in &segments {
            Directory::validate_name(segment)?;
        }

        let dir_key = segments.join("/");
        let file_key = join_key(&dir_key, &entry.name);

        if self.directories.contains_key(&file_key) {
            return Err(IngestionError::PathConflict(file_key));
        }
        if self.file_keys.contains(&file_key) {
            return Err(IngestionError::DuplicateEntry(file_key));
        }
        for level in 1..=segments.len() {
            let key = segments[..level].join("/");
            if self.file_keys.contains(&key) {
                return Err(IngestionError::PathConflict(key));
            }
        }

        // every ancestor lists the directory below it
        let mut parent_key = String::new();
        self.directories.entry(String::new()).or_default();
        for segment in &segments {
            let key = join_key(&parent_key, segment);
            self.directories
                .entry(parent_key)
                .or_default()
                .entry(segment.clone())
                .or_insert(Child::Directory);
            self.directories.entry(key.clone()).or_default();
            parent_key = key;
        }

        self.directories
            .entry(dir_key)
            .or_default()
            .insert(entry.name.clone(), Child::File(tree.link(entry.name.as_str())));

        debug!(key = %file_key, cid = %tree.cid, "placed file");
        self.file_keys.insert(file_key);
        self.blocks.extend(tree.blocks);

        Ok(())
    }

    /// Encodes all directories bottom-up and writes them, together with all
    /// file blocks, into the store. Returns the root, which is the empty
    /// directory if no files were added.
    #[instrument(skip_all, fields(directories = self.directories.len(), blocks = self.blocks.len()), err)]
    pub fn finalize(mut self, store: &dyn BlockStore) -> Result<Assembled, IngestionError> {
        for (cid, data) in self.blocks {
            store.put(cid, data)?;
        }

        self.directories.entry(String::new()).or_default();

        // deepest first, so the links to all subdirectories are known when
        // their parent is encoded
        let mut keys: Vec<String> = self.directories.keys().cloned().collect();
        keys.sort_by_key(|key| Reverse(depth(key)));

        let mut links: HashMap<String, Link> = HashMap::with_capacity(keys.len());
        let mut written: HashSet<Cid> = HashSet::new();

        for key in keys {
            let children = self.directories.remove(&key).unwrap_or_default();
            let child_links = children
                .into_iter()
                .map(|(name, child)| match child {
                    Child::File(link) => Ok(link),
                    Child::Directory => {
                        let child_key = join_key(&key, &name);
                        links.remove(&child_key).ok_or_else(|| missing(&child_key))
                    }
                })
                .collect::<Result<Vec<_>, IngestionError>>()?;

            let node = Node::from(Directory::from_links(child_links)?);
            let name = key.rsplit('/').next().unwrap_or_default();
            let link = node.link(name)?;

            store.put(link.cid, node.encode())?;
            written.insert(link.cid);
            links.insert(key, link);
        }

        let root = links.remove("").ok_or_else(|| missing(""))?;

        Ok(Assembled {
            root: root.cid,
            size: root.size,
            directories: written.len(),
        })
    }
}

fn missing(key: &str) -> IngestionError {
    IngestionError::Store(CastoreError::StorageError(format!(
        "directory {:?} was not built",
        key
    )))
}

/// Number of segments of a directory key.
fn depth(key: &str) -> usize {
    if key.is_empty() {
        0
    } else {
        key.split('/').count()
    }
}

fn join_key(dir_key: &str, name: &str) -> String {
    if dir_key.is_empty() {
        name.to_owned()
    } else {
        format!("{}/{}", dir_key, name)
    }
}

/// Places all files below `parent_path` and persists the resulting tree.
/// Files are merged in the order given, though the root does not depend on
/// that order.
pub fn assemble<I>(
    store: &dyn BlockStore,
    files: I,
    parent_path: impl Into<PathBuf>,
) -> Result<Assembled, IngestionError>
where
    I: IntoIterator<Item = (FileEntry, FileTree)>,
{
    let mut assembler = DirectoryAssembler::new(parent_path);
    for (entry, tree) in files {
        assembler.add_file(&entry, tree)?;
    }
    assembler.finalize(store)
}
