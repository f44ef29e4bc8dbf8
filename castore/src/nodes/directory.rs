use bytes::Bytes;
use cid::Cid;

use super::{Link, Node, ValidateNodeError};
use crate::Error;

/// A Directory holds named [Link]s to files and other directories.
/// Its links are kept sorted by name (byte-wise), so the encoding and with it
/// the CID only depends on the set of entries, not on the order they were
/// added in.
///
/// Directories are values: [Directory::with_link] returns a new Directory and
/// leaves the one it was called on untouched.
///
/// The names of Directory entries:
///  - MUST not contain slashes or null bytes
///  - MUST not be '.' or '..'
///  - MUST be unique
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct Directory {
    links: Vec<Link>,
}

impl Directory {
    pub fn new() -> Self {
        Directory { links: vec![] }
    }

    /// Allows iterating over all entries, ordered by their name.
    pub fn links(&self) -> impl Iterator<Item = &Link> + Send + Sync + '_ {
        self.links.iter()
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    /// Looks up the entry with the given name.
    pub fn get(&self, name: &str) -> Option<&Link> {
        self.position(name).ok().map(|pos| &self.links[pos])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_ok()
    }

    fn position(&self, name: &str) -> Result<usize, usize> {
        self.links
            .binary_search_by(|l| l.name.as_bytes().cmp(name.as_bytes()))
    }

    /// Checks a name for validity as a directory entry.
    /// We disallow slashes, null bytes, '.', '..' and the empty string.
    pub fn validate_name(name: &str) -> Result<(), ValidateNodeError> {
        if name.is_empty()
            || name == ".."
            || name == "."
            || name.contains('\0')
            || name.contains('/')
        {
            Err(ValidateNodeError::InvalidName(name.to_owned()))
        } else {
            Ok(())
        }
    }

    /// Returns a new Directory with the passed link added.
    /// An existing entry with the same name is an error.
    pub fn add(&self, link: Link) -> Result<Directory, ValidateNodeError> {
        Self::validate_name(&link.name)?;

        match self.position(&link.name) {
            Ok(_) => Err(ValidateNodeError::DuplicateName(link.name)),
            Err(pos) => {
                let mut links = self.links.clone();
                links.insert(pos, link);
                Ok(Directory { links })
            }
        }
    }

    /// Returns a new Directory with the passed link in it. If an entry with
    /// the same name exists, it is replaced, otherwise the link is added.
    pub fn with_link(&self, link: Link) -> Result<Directory, ValidateNodeError> {
        Self::validate_name(&link.name)?;

        let mut links = self.links.clone();
        match self.position(&link.name) {
            Ok(pos) => links[pos] = link,
            Err(pos) => links.insert(pos, link),
        }

        Ok(Directory { links })
    }

    /// Builds a Directory from links in any order.
    /// Duplicate or invalid names are an error.
    pub fn from_links(
        links: impl IntoIterator<Item = Link>,
    ) -> Result<Directory, ValidateNodeError> {
        let mut links: Vec<Link> = links.into_iter().collect();
        for link in &links {
            Self::validate_name(&link.name)?;
        }

        links.sort_by(|a, b| a.name.as_bytes().cmp(b.name.as_bytes()));
        if let Some(pair) = links.windows(2).find(|pair| pair[0].name == pair[1].name) {
            return Err(ValidateNodeError::DuplicateName(pair[0].name.clone()));
        }

        Ok(Directory { links })
    }

    pub(super) fn into_links(self) -> Vec<Link> {
        self.links
    }

    /// Returns the dag-pb encoding of this directory.
    pub fn encode(&self) -> Bytes {
        Node::from(self.clone()).encode()
    }

    /// Calculates the CID of a Directory, the sha2-256 of its dag-pb encoding.
    pub fn cid(&self) -> Result<Cid, Error> {
        Node::from(self.clone()).cid()
    }

    /// Produces a [Link] with the given name pointing to this directory.
    pub fn link(&self, name: impl Into<String>) -> Result<Link, Error> {
        Node::from(self.clone()).link(name)
    }
}
