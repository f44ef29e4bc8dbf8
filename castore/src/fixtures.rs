use std::path::Path;

use bytes::Bytes;
use cid::Cid;
use lazy_static::lazy_static;

use crate::{cid_for, import::FileEntry, Link, RAW};

pub const HELLOWORLD_BLOB_CONTENTS: &[u8] = b"Hello World!";

/// CIDv1 of a UnixFS directory without any entries.
pub const EMPTY_DIRECTORY_CID: &str =
    "bafybeiczsscdsbs7ffqz55asqdf3smv6klcw3gofszvwlyarci47bgf354";

lazy_static! {
    pub static ref DUMMY_CID: Cid = cid_for(RAW, b"dummy").expect("valid cid");

    // 2 bytes
    pub static ref BLOB_A: Bytes = vec![0x00, 0x01].into();

    // 1MB
    pub static ref BLOB_B: Bytes = (0..255).collect::<Vec<u8>>().repeat(4 * 1024).into();

    // 5 bytes each, used for the small tree fixtures
    pub static ref BLOB_FIVE_A: Bytes = Bytes::from_static(b"aaaaa");
    pub static ref BLOB_FIVE_B: Bytes = Bytes::from_static(b"bbbbb");
    pub static ref BLOB_FIVE_C: Bytes = Bytes::from_static(b"ccccc");
}

/// A link with the given name, pointing to [DUMMY_CID].
pub fn dummy_link(name: &str) -> Link {
    Link {
        name: name.to_owned(),
        cid: *DUMMY_CID,
        size: 1,
    }
}

/// A [FileEntry] for the whole file at `path`, named after its last component.
pub fn file_entry(path: impl AsRef<Path>, size: u64) -> FileEntry {
    let path = path.as_ref();
    FileEntry {
        path: path.to_path_buf(),
        name: path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
        size,
        range: None,
    }
}
