//! Serializing a DAG from a [BlockStore] into an archive.

use std::collections::HashSet;

use bodyshop_castore::blockstore::BlockStore;
use bodyshop_castore::{Node, DAG_PB};
use cid::Cid;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, trace};

use crate::wire::write_varint;
use crate::{CarHeader, Error};

/// Counters of a finished archive.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WriteSummary {
    /// Number of frames written.
    pub frames: u64,
    /// Number of bytes written, including the header.
    pub bytes: u64,
}

/// Writes an archive to an [AsyncWrite], one frame at a time.
pub struct CarWriter<W> {
    writer: W,
    summary: WriteSummary,
}

impl<W> CarWriter<W>
where
    W: AsyncWrite + Unpin,
{
    /// Starts a new archive by writing the header with the given roots.
    pub async fn new(mut writer: W, roots: Vec<Cid>) -> Result<Self, Error> {
        let header = CarHeader::new(roots).encode()?;

        let mut bytes = write_varint(&mut writer, header.len() as u64).await? as u64;
        writer.write_all(&header).await?;
        bytes += header.len() as u64;

        Ok(Self {
            writer,
            summary: WriteSummary { frames: 0, bytes },
        })
    }

    /// Writes a single frame.
    pub async fn write_frame(&mut self, cid: &Cid, data: &[u8]) -> Result<(), Error> {
        let cid_bytes = cid.to_bytes();
        let len = (cid_bytes.len() + data.len()) as u64;
        let prefix = write_varint(&mut self.writer, len).await? as u64;
        self.writer.write_all(&cid_bytes).await?;
        self.writer.write_all(data).await?;

        self.summary.frames += 1;
        self.summary.bytes += prefix + len;
        Ok(())
    }

    /// Flushes and shuts down the underlying writer.
    pub async fn finish(mut self) -> Result<WriteSummary, Error> {
        self.writer.flush().await?;
        self.writer.shutdown().await?;
        Ok(self.summary)
    }
}

/// Writes the DAG below `roots` from `store` into `writer` as an archive, and
/// shuts the writer down afterwards.
///
/// Nodes are emitted depth-first, a parent before its children, children in
/// link order. A node reachable over several paths is only emitted the first
/// time it is reached.
#[instrument(skip_all, fields(roots = roots.len()), err)]
pub async fn write_dag<W>(
    store: &dyn BlockStore,
    roots: &[Cid],
    writer: W,
    cancel: &CancellationToken,
) -> Result<WriteSummary, Error>
where
    W: AsyncWrite + Unpin,
{
    let mut car = CarWriter::new(writer, roots.to_vec()).await?;

    let mut visited: HashSet<Cid> = HashSet::new();
    let mut stack: Vec<Cid> = roots.iter().rev().copied().collect();

    while let Some(cid) = stack.pop() {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        if !visited.insert(cid) {
            trace!(%cid, "already written");
            continue;
        }

        let data = store
            .get(&cid)
            .map_err(Error::Store)?
            .ok_or(Error::MissingBlock(cid))?;

        car.write_frame(&cid, &data).await?;

        if cid.codec() == DAG_PB {
            let node = Node::decode(&cid, data).map_err(Error::Decode)?;
            stack.extend(node.links().iter().rev().map(|l| l.cid));
        }
    }

    let summary = car.finish().await?;
    debug!(frames = summary.frames, bytes = summary.bytes, "wrote archive");

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use bodyshop_castore::balanced::build_from_bytes;
    use bodyshop_castore::blockstore::{BlockStore, MemoryBlockStore};
    use bodyshop_castore::fixtures::{file_entry, BLOB_FIVE_A, BLOB_FIVE_B, DUMMY_CID};
    use bodyshop_castore::import::{assemble, Assembled};
    use bodyshop_castore::{BuildParams, Directory};
    use bytes::Bytes;
    use tokio_util::sync::CancellationToken;

    use super::{write_dag, CarWriter};
    use crate::{CarReader, Error};

    fn populate(store: &MemoryBlockStore) -> Assembled {
        let params = BuildParams {
            chunk_size: 2,
            max_links: 2,
        };
        let files = vec![
            (
                file_entry("d/x/a", 5),
                build_from_bytes(&BLOB_FIVE_A, &params).unwrap(),
            ),
            (
                file_entry("d/y/a", 5),
                build_from_bytes(&BLOB_FIVE_A, &params).unwrap(),
            ),
            (
                file_entry("d/b", 5),
                build_from_bytes(&BLOB_FIVE_B, &params).unwrap(),
            ),
        ];
        assemble(store, files, "d").unwrap()
    }

    async fn frames_of(buf: &[u8]) -> Vec<cid::Cid> {
        let mut reader = CarReader::new(buf).await.expect("must read header");
        let mut cids = vec![];
        while let Some((cid, _)) = reader.next_frame().await.expect("must read frame") {
            cids.push(cid);
        }
        cids
    }

    /// Every block is written exactly once, the root first, and all of them
    /// can be read back.
    #[tokio::test]
    async fn writes_every_block_once() {
        let store = MemoryBlockStore::default();
        let assembled = populate(&store);

        let mut buf: Vec<u8> = vec![];
        let summary = write_dag(&store, &[assembled.root], &mut buf, &CancellationToken::new())
            .await
            .expect("must write");

        let cids = frames_of(&buf).await;
        assert_eq!(store.len() as u64, summary.frames);
        assert_eq!(buf.len() as u64, summary.bytes);
        assert_eq!(assembled.root, cids[0]);

        let mut unique = cids.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(cids.len(), unique.len());
    }

    /// Every node but the root is preceded by a node linking to it.
    #[tokio::test]
    async fn parents_first() {
        let store = MemoryBlockStore::default();
        let assembled = populate(&store);

        let mut buf: Vec<u8> = vec![];
        write_dag(&store, &[assembled.root], &mut buf, &CancellationToken::new())
            .await
            .unwrap();
        let cids = frames_of(&buf).await;

        for (i, cid) in cids.iter().enumerate().skip(1) {
            assert!(
                cids[..i].iter().any(|parent| store
                    .get_node(parent)
                    .unwrap()
                    .unwrap()
                    .links()
                    .iter()
                    .any(|l| &l.cid == cid)),
                "{} written before any of its parents",
                cid
            );
        }
    }

    #[tokio::test]
    async fn deterministic() {
        let mut outputs = vec![];
        for _ in 0..2 {
            let store = MemoryBlockStore::default();
            let assembled = populate(&store);
            let mut buf: Vec<u8> = vec![];
            write_dag(&store, &[assembled.root], &mut buf, &CancellationToken::new())
                .await
                .unwrap();
            outputs.push(buf);
        }

        assert_eq!(outputs[0], outputs[1]);
    }

    #[tokio::test]
    async fn missing_block() {
        let store = MemoryBlockStore::default();
        let dir = Directory::new()
            .add(bodyshop_castore::fixtures::dummy_link("gone"))
            .unwrap();
        let root = store.put_node(&dir.into()).unwrap();

        let err = write_dag(&store, &[root], &mut Vec::<u8>::new(), &CancellationToken::new())
            .await
            .expect_err("must fail");
        assert!(matches!(err, Error::MissingBlock(cid) if cid == *DUMMY_CID));
    }

    #[tokio::test]
    async fn cancelled() {
        let store = MemoryBlockStore::default();
        let assembled = populate(&store);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = write_dag(&store, &[assembled.root], &mut Vec::<u8>::new(), &cancel)
            .await
            .expect_err("must fail");
        assert!(matches!(err, Error::Cancelled));
    }

    /// A directory block of several MiB is written and read back whole.
    #[tokio::test]
    async fn large_directory_block() {
        let store = MemoryBlockStore::default();
        store.put(*DUMMY_CID, Bytes::from_static(b"dummy")).unwrap();

        let dir = Directory::from_links(
            (0..50_000).map(|i| bodyshop_castore::fixtures::dummy_link(&format!("entry-{:06}", i))),
        )
        .unwrap();
        let root = store.put_node(&dir.into()).unwrap();

        let mut buf = vec![];
        let summary = write_dag(&store, &[root], &mut buf, &CancellationToken::new())
            .await
            .expect("must succeed");
        assert_eq!(2, summary.frames);

        let mut reader = CarReader::new(&buf[..]).await.unwrap().with_verify(true);
        let (cid, data) = reader.next_frame().await.unwrap().expect("root frame");
        assert_eq!(root, cid);
        assert!(data.len() > 2 << 20);
        assert_eq!(store.get(&root).unwrap().unwrap(), data);
        assert_eq!(*DUMMY_CID, reader.next_frame().await.unwrap().expect("leaf").0);
        assert!(reader.next_frame().await.unwrap().is_none());
    }
}
