//! Packs a list of files into an archive, computing its piece commitment on
//! the way out.
//!
//! Files are chunked concurrently by a bounded pool of workers. Once all of
//! them are done, the directory tree is assembled and written as an archive
//! to the sink, while the same bytes are fed through a pipe into the
//! commitment calculator.

use std::path::PathBuf;
use std::sync::Arc;

use bodyshop_car::{write_dag, WriteSummary};
use bodyshop_castore::balanced::build_entry;
use bodyshop_castore::blockstore::MemoryBlockStore;
use bodyshop_castore::chunker;
use bodyshop_castore::import::{assemble, FileEntry, IngestionError};
use bodyshop_castore::listing::{build_listing, ListingEntry};
use bodyshop_castore::{BuildParams, FileTree};
use bodyshop_commp::{CommpOptions, CommpReport, StreamCalculator};
use cid::Cid;
use serde::{Serialize, Serializer};
use tokio::io::AsyncWrite;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn, Instrument, Span};
use tracing_indicatif::span_ext::IndicatifSpanExt;

use crate::tee::TeeWriter;

/// Default capacity of the pipe between archive writer and calculator.
pub const DEFAULT_PIPE_CAPACITY: usize = 1 << 20;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid build parameters: {0}")]
    InvalidParams(bodyshop_castore::Error),

    #[error(transparent)]
    File(#[from] chunker::Error),

    #[error(transparent)]
    Ingestion(#[from] IngestionError),

    #[error("unable to build listing: {0}")]
    Listing(bodyshop_castore::Error),

    #[error(transparent)]
    Archive(#[from] bodyshop_car::Error),

    #[error(transparent)]
    Commp(#[from] bodyshop_commp::Error),

    #[error("worker failed: {0}")]
    Worker(#[from] JoinError),

    #[error("cancelled")]
    Cancelled,
}

/// What to do when a single file can't be read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OnFileError {
    /// Log a warning and leave the file out.
    #[default]
    Skip,
    /// Fail the whole pack.
    Abort,
}

#[derive(Debug, Clone)]
pub struct PackOptions {
    /// Source paths are placed relative to this path.
    pub parent_path: PathBuf,
    /// Upper bound of files chunked at the same time.
    pub parallelism: usize,
    pub params: BuildParams,
    pub on_file_error: OnFileError,
    pub commp: CommpOptions,
    /// Bytes buffered between the archive writer and the calculator.
    pub pipe_capacity: usize,
}

impl Default for PackOptions {
    fn default() -> Self {
        Self {
            parent_path: PathBuf::new(),
            parallelism: available_parallelism(),
            params: BuildParams::default(),
            on_file_error: OnFileError::default(),
            commp: CommpOptions::default(),
            pipe_capacity: DEFAULT_PIPE_CAPACITY,
        }
    }
}

fn available_parallelism() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// The result of [pack].
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PackOutcome {
    #[serde(serialize_with = "as_string")]
    pub root: Cid,
    pub listing: ListingEntry,
    #[serde(rename = "commp")]
    pub report: CommpReport,
    /// Entries left out because they couldn't be read.
    pub skipped: Vec<FileEntry>,
    #[serde(skip)]
    pub archive: WriteSummary,
}

fn as_string<S: Serializer>(cid: &Cid, s: S) -> Result<S::Ok, S::Error> {
    s.collect_str(cid)
}

/// Packs `entries` into an archive written to `sink`.
///
/// The sink is shut down once the archive is complete. Whatever was written
/// to it before an error is not a valid archive.
#[instrument(skip_all, fields(files = entries.len(), parent = ?options.parent_path), err)]
pub async fn pack<W>(
    entries: Vec<FileEntry>,
    options: &PackOptions,
    sink: W,
    cancel: &CancellationToken,
) -> Result<PackOutcome, Error>
where
    W: AsyncWrite + Unpin,
{
    options.params.validate().map_err(Error::InvalidParams)?;
    let calculator = StreamCalculator::new(options.commp.clone())?;

    let trees = build_files(&entries, options, cancel).await?;

    let mut files = Vec::with_capacity(entries.len());
    let mut skipped = Vec::new();
    for (entry, tree) in entries.into_iter().zip(trees) {
        match tree {
            Some(tree) => files.push((entry, tree)),
            None => skipped.push(entry),
        }
    }

    let store = MemoryBlockStore::default();
    let assembled = assemble(&store, files, &options.parent_path)?;
    let listing = build_listing(&store, &assembled).map_err(Error::Listing)?;

    let (pipe_writer, pipe_reader) = tokio::io::duplex(options.pipe_capacity.max(1));
    let (archive, report) = tokio::try_join!(
        async {
            write_dag(
                &store,
                &[assembled.root],
                TeeWriter::new(sink, pipe_writer),
                cancel,
            )
            .await
            .map_err(Error::from)
        },
        async {
            calculator
                .calculate(pipe_reader, cancel)
                .await
                .map_err(Error::from)
        },
    )?;

    info!(
        root = %assembled.root,
        commp = %report.commp,
        frames = archive.frames,
        bytes = archive.bytes,
        skipped = skipped.len(),
        "packed"
    );

    Ok(PackOutcome {
        root: assembled.root,
        listing,
        report,
        skipped,
        archive,
    })
}

/// Builds the trees of all entries on a bounded worker pool.
/// The returned slots line up with `entries`, a skipped entry leaves its slot
/// empty.
#[instrument(skip_all, fields(indicatif.pb_show = 1))]
async fn build_files(
    entries: &[FileEntry],
    options: &PackOptions,
    cancel: &CancellationToken,
) -> Result<Vec<Option<FileTree>>, Error> {
    let parallelism = options.parallelism.clamp(1, available_parallelism());

    let span = Span::current();
    span.pb_set_style(&bodyshop_tracing::PB_PROGRESS_STYLE);
    span.pb_set_message("Chunking files");
    span.pb_set_length(entries.len() as u64);
    span.pb_start();

    let semaphore = Arc::new(Semaphore::new(parallelism));
    let mut tasks: JoinSet<(usize, Result<FileTree, chunker::Error>)> = JoinSet::new();

    for (index, entry) in entries.iter().enumerate() {
        let permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            // the semaphore is never closed
            permit = semaphore.clone().acquire_owned() => permit.map_err(|_| Error::Cancelled)?,
        };

        tasks.spawn(
            {
                let entry = entry.clone();
                let params = options.params.clone();
                let cancel = cancel.clone();
                async move {
                    let result = if cancel.is_cancelled() {
                        Err(chunker::Error::Cancelled)
                    } else {
                        build_entry(&entry, &params, &cancel).await
                    };
                    drop(permit);
                    (index, result)
                }
            }
            .in_current_span(),
        );
    }

    let mut slots: Vec<Option<FileTree>> = std::iter::repeat_with(|| None)
        .take(entries.len())
        .collect();

    while let Some(joined) = tasks.join_next().await {
        let (index, result) = joined?;
        span.pb_inc(1);

        match result {
            Ok(tree) => slots[index] = Some(tree),
            Err(chunker::Error::Cancelled) => return Err(Error::Cancelled),
            Err(e) => match options.on_file_error {
                OnFileError::Skip => {
                    warn!(path = ?entries[index].path, err = %e, "skipping file");
                }
                OnFileError::Abort => return Err(e.into()),
            },
        }
    }

    Ok(slots)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use bodyshop_car::CarReader;
    use bodyshop_castore::import::FileEntry;
    use bodyshop_castore::BuildParams;
    use tokio_util::sync::CancellationToken;

    use super::{pack, Error, OnFileError, PackOptions};

    fn write_file(dir: &std::path::Path, name: &str, contents: &[u8]) -> FileEntry {
        let path = dir.join(name);
        std::fs::File::create(&path)
            .and_then(|mut f| f.write_all(contents))
            .unwrap();
        FileEntry {
            path,
            name: name.to_owned(),
            size: contents.len() as u64,
            range: None,
        }
    }

    fn options(dir: &std::path::Path) -> PackOptions {
        PackOptions {
            parent_path: dir.to_path_buf(),
            parallelism: 2,
            params: BuildParams {
                chunk_size: 1024,
                max_links: 4,
            },
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn archive_matches_report() {
        let dir = tempfile::tempdir().unwrap();
        let entries = vec![
            write_file(dir.path(), "a", &[0x01; 5000]),
            write_file(dir.path(), "b", b"Hello World!"),
        ];

        let mut out: Vec<u8> = vec![];
        let outcome = pack(entries, &options(dir.path()), &mut out, &CancellationToken::new())
            .await
            .expect("must succeed");

        assert_eq!(out.len() as u64, outcome.report.payload_size);
        assert_eq!(out.len() as u64, outcome.archive.bytes);
        assert!(outcome.report.well_formed_archive());
        assert_eq!(outcome.archive.frames, outcome.report.frames_parsed());
        assert_eq!(&[outcome.root], outcome.report.declared_roots());
        assert!(outcome.skipped.is_empty());

        let names: Vec<_> = outcome.listing.children.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(vec!["a", "b"], names);
        assert_eq!(outcome.root.to_string(), outcome.listing.hash);

        let mut reader = CarReader::new(&out[..]).await.unwrap().with_verify(true);
        let mut frames = 0;
        while reader.next_frame().await.unwrap().is_some() {
            frames += 1;
        }
        assert_eq!(outcome.archive.frames, frames);
    }

    #[tokio::test]
    async fn skips_unreadable_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut missing = write_file(dir.path(), "gone", b"");
        missing.path = dir.path().join("does-not-exist");
        let entries = vec![write_file(dir.path(), "here", &[0x02; 200]), missing];

        let mut out: Vec<u8> = vec![];
        let outcome = pack(entries, &options(dir.path()), &mut out, &CancellationToken::new())
            .await
            .expect("must succeed");

        assert_eq!(1, outcome.skipped.len());
        assert_eq!("gone", outcome.skipped[0].name);
        assert_eq!(1, outcome.listing.children.len());
    }

    #[tokio::test]
    async fn aborts_on_unreadable_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut missing = write_file(dir.path(), "gone", b"");
        missing.path = dir.path().join("does-not-exist");

        let options = PackOptions {
            on_file_error: OnFileError::Abort,
            ..options(dir.path())
        };

        let mut out: Vec<u8> = vec![];
        let err = pack(vec![missing], &options, &mut out, &CancellationToken::new())
            .await
            .expect_err("must fail");
        assert!(matches!(err, Error::File(_)));
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn cancelled() {
        let dir = tempfile::tempdir().unwrap();
        let entries = vec![write_file(dir.path(), "a", &[0x03; 300])];

        let cancel = CancellationToken::new();
        cancel.cancel();

        let mut out: Vec<u8> = vec![];
        let err = pack(entries, &options(dir.path()), &mut out, &cancel)
            .await
            .expect_err("must fail");
        assert!(matches!(err, Error::Cancelled));
    }

    #[tokio::test]
    async fn invalid_params() {
        let options = PackOptions {
            params: BuildParams {
                chunk_size: 0,
                max_links: 4,
            },
            ..Default::default()
        };

        let mut out: Vec<u8> = vec![];
        let err = pack(vec![], &options, &mut out, &CancellationToken::new())
            .await
            .expect_err("must fail");
        assert!(matches!(err, Error::InvalidParams(_)));
    }
}
