use std::collections::BTreeMap;

use bytes::Bytes;
use proptest::prelude::*;

use crate::balanced::build_from_bytes;
use crate::blockstore::{BlockStore, MemoryBlockStore};
use crate::fixtures::{file_entry, BLOB_FIVE_A, BLOB_FIVE_B, BLOB_FIVE_C};
use crate::import::{assemble, Assembled};
use crate::{BuildParams, Directory, Link};

/// Reads the directory at `cid` back from the store.
fn directory_at(store: &MemoryBlockStore, cid: &cid::Cid) -> Vec<Link> {
    let node = store
        .get_node(cid)
        .expect("must decode")
        .expect("must exist");
    assert!(node.is_directory(), "{} must be a directory", cid);
    node.links().to_vec()
}

fn names(links: &[Link]) -> Vec<&str> {
    links.iter().map(|l| l.name.as_str()).collect()
}

fn pack(files: &[(&str, Bytes)], params: &BuildParams) -> (MemoryBlockStore, Assembled) {
    let store = MemoryBlockStore::default();
    let files = files
        .iter()
        .map(|(path, data)| {
            (
                file_entry(path, data.len() as u64),
                build_from_bytes(data, params).expect("must build"),
            )
        })
        .collect::<Vec<_>>();

    let assembled = assemble(&store, files, "").expect("must assemble");
    (store, assembled)
}

#[test]
fn three_files_in_nested_directories() {
    let (store, assembled) = pack(
        &[
            ("a.txt", BLOB_FIVE_A.clone()),
            ("dir/b.txt", BLOB_FIVE_B.clone()),
            ("dir/sub/c.txt", BLOB_FIVE_C.clone()),
        ],
        &BuildParams::default(),
    );

    let root = directory_at(&store, &assembled.root);
    assert_eq!(vec!["a.txt", "dir"], names(&root));

    let dir = directory_at(&store, &root[1].cid);
    assert_eq!(vec!["b.txt", "sub"], names(&dir));

    let sub = directory_at(&store, &dir[1].cid);
    assert_eq!(vec!["c.txt"], names(&sub));
    assert_eq!(5, sub[0].size);

    // every stored directory matches the CID recomputed from its links
    for (cid, links) in [
        (assembled.root, root.clone()),
        (root[1].cid, dir.clone()),
        (dir[1].cid, sub),
    ] {
        let recomputed = links
            .into_iter()
            .try_fold(Directory::new(), |d, l| d.add(l))
            .expect("stored names must be valid")
            .cid()
            .unwrap();
        assert_eq!(cid, recomputed);
    }

    assert_eq!(3, assembled.directories);
    // three leaves and three directories
    assert_eq!(6, store.len());
}

#[test]
fn sizes_accumulate_up_to_the_root() {
    let (store, assembled) = pack(
        &[
            ("dir/b.txt", BLOB_FIVE_B.clone()),
            ("dir/sub/c.txt", BLOB_FIVE_C.clone()),
        ],
        &BuildParams::default(),
    );

    let root = store.get_node(&assembled.root).unwrap().unwrap();
    assert_eq!(root.cumulative_size(), assembled.size);

    let dir_link = &root.links()[0];
    let dir = store.get_node(&dir_link.cid).unwrap().unwrap();
    assert_eq!(dir.cumulative_size(), dir_link.size);
    assert_eq!(
        dir.encode().len() as u64 + 5 + dir.links()[1].size,
        dir_link.size
    );
}

#[test]
fn multi_chunk_file_round_trips() {
    let params = BuildParams {
        chunk_size: 16,
        max_links: 2,
    };
    let data: Bytes = (0..200u8).collect::<Vec<_>>().into();
    let (store, assembled) = pack(&[("big/file", data.clone())], &params);

    let file = &directory_at(&store, &directory_at(&store, &assembled.root)[0].cid)[0];
    let mut out = vec![];
    crate::balanced::read_content(&store, &file.cid, &mut out).unwrap();
    assert_eq!(&data[..], &out[..]);
}

fn arb_files() -> impl Strategy<Value = Vec<(String, Vec<u8>)>> {
    prop::collection::btree_map(
        "([a-c]/){0,2}f[0-9]",
        prop::collection::vec(any::<u8>(), 0..64),
        1..12,
    )
    .prop_map(|m: BTreeMap<String, Vec<u8>>| m.into_iter().collect())
}

fn to_bytes(files: &[(String, Vec<u8>)]) -> Vec<(&str, Bytes)> {
    files
        .iter()
        .map(|(p, d)| (p.as_str(), Bytes::from(d.clone())))
        .collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// The root only depends on the set of files, not the order they are
    /// added in.
    #[test]
    fn root_is_independent_of_order(
        (files, shuffled) in arb_files().prop_flat_map(|f| (Just(f.clone()), Just(f).prop_shuffle()))
    ) {
        let params = BuildParams { chunk_size: 8, max_links: 3 };
        let (_, a) = pack(&to_bytes(&files), &params);
        let (_, b) = pack(&to_bytes(&shuffled), &params);

        prop_assert_eq!(a, b);
    }

    /// Content read back from the store matches what was put in.
    #[test]
    fn content_round_trips(
        data in prop::collection::vec(any::<u8>(), 0..2048),
        chunk_size in 1usize..128,
        max_links in 2usize..6,
    ) {
        let params = BuildParams { chunk_size, max_links };
        let tree = build_from_bytes(&data, &params).unwrap();

        let store = MemoryBlockStore::default();
        for (cid, block) in &tree.blocks {
            store.put(*cid, block.clone()).unwrap();
        }

        prop_assert_eq!(data, tree.read_back(&store).unwrap());
    }
}
