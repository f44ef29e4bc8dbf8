//! A JSON-friendly view of the directory tree that was built.

use cid::Cid;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::blockstore::BlockStore;
use crate::import::Assembled;
use crate::{Error, Link, Node};

/// An entry in the listing. Directories carry their entries as children,
/// files never have any.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ListingEntry {
    /// Name inside the parent directory, empty for the root.
    pub name: String,
    /// The CID, as a string.
    pub hash: String,
    /// Cumulative size.
    pub size: u64,
    #[serde(rename = "Link", default)]
    pub children: Vec<ListingEntry>,
}

/// Walks the tree rooted at `root` in `store` and returns its listing.
#[instrument(skip_all, fields(root = %root.root), err)]
pub fn build_listing(store: &dyn BlockStore, root: &Assembled) -> Result<ListingEntry, Error> {
    let link = Link {
        name: String::new(),
        cid: root.root,
        size: root.size,
    };
    entry_for(store, &link)
}

fn entry_for(store: &dyn BlockStore, link: &Link) -> Result<ListingEntry, Error> {
    let mut entry = ListingEntry {
        name: link.name.clone(),
        hash: link.cid.to_string(),
        size: link.size,
        children: vec![],
    };

    // files are not descended into
    if link.cid.codec() != crate::DAG_PB {
        return Ok(entry);
    }

    let node = get_node(store, &link.cid)?;
    if node.is_directory() {
        entry.children = node
            .links()
            .iter()
            .map(|child| entry_for(store, child))
            .collect::<Result<_, _>>()?;
    }

    Ok(entry)
}

fn get_node(store: &dyn BlockStore, cid: &Cid) -> Result<Node, Error> {
    store
        .get_node(cid)?
        .ok_or_else(|| Error::StorageError(format!("block {} does not exist", cid)))
}

#[cfg(test)]
mod tests {
    use super::{build_listing, ListingEntry};
    use crate::balanced::build_from_bytes;
    use crate::blockstore::MemoryBlockStore;
    use crate::fixtures::{file_entry, BLOB_FIVE_A, BLOB_FIVE_B};
    use crate::import::assemble;
    use crate::BuildParams;

    #[test]
    fn mirrors_the_tree() {
        let store = MemoryBlockStore::default();
        let params = BuildParams::default();
        let a = build_from_bytes(&BLOB_FIVE_A, &params).unwrap();
        let b = build_from_bytes(&BLOB_FIVE_B, &params).unwrap();

        let assembled = assemble(
            &store,
            vec![
                (file_entry("/d/sub/b", 5), b.clone()),
                (file_entry("/d/a", 5), a.clone()),
            ],
            "/d",
        )
        .unwrap();

        let listing = build_listing(&store, &assembled).expect("must build listing");

        assert_eq!(assembled.root.to_string(), listing.hash);
        assert_eq!(assembled.size, listing.size);
        assert_eq!(
            vec!["a", "sub"],
            listing
                .children
                .iter()
                .map(|c| c.name.as_str())
                .collect::<Vec<_>>()
        );

        let sub = &listing.children[1];
        assert_eq!(
            vec![ListingEntry {
                name: "b".to_string(),
                hash: b.cid.to_string(),
                size: 5,
                children: vec![],
            }],
            sub.children
        );
    }

    #[test]
    fn serializes_like_fs_nodes() {
        let entry = ListingEntry {
            name: "a".to_string(),
            hash: "bafk".to_string(),
            size: 5,
            children: vec![],
        };

        assert_eq!(
            r#"{"Name":"a","Hash":"bafk","Size":5,"Link":[]}"#,
            serde_json::to_string(&entry).unwrap()
        );
    }

    #[test]
    fn missing_block() {
        let store = MemoryBlockStore::default();
        let other = MemoryBlockStore::default();
        let assembled = assemble(
            &other,
            vec![(
                file_entry("/d/sub/b", 5),
                build_from_bytes(&BLOB_FIVE_B, &BuildParams::default()).unwrap(),
            )],
            "/d",
        )
        .unwrap();

        build_listing(&store, &assembled).expect_err("must fail");
    }
}
