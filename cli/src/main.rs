use std::io::Write;
use std::path::PathBuf;

use bodyshop_car::CarReader;
use bodyshop_castore::balanced::{DEFAULT_CHUNK_SIZE, DEFAULT_MAX_LINKS};
use bodyshop_castore::import::fs::entries_from_path;
use bodyshop_castore::import::FileEntry;
use bodyshop_castore::BuildParams;
use bodyshop_cli::pack::DEFAULT_PIPE_CAPACITY;
use bodyshop_cli::{pack, OnFileError, PackOptions};
use bodyshop_commp::{CommpOptions, StreamCalculator};
use bodyshop_tracing::TracingHandle;
use clap::{Parser, Subcommand};
use mimalloc::MiMalloc;
use tokio::io::AsyncRead;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Level};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Whether to log in JSON
    #[arg(long, env = "BODYSHOP_LOG_JSON")]
    json: bool,

    #[arg(long, env = "BODYSHOP_LOG_LEVEL", default_value_t = Level::INFO)]
    log_level: Level,

    /// Show progress bars
    #[arg(long, env = "BODYSHOP_PROGRESS")]
    progress: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Packs files into an archive and computes its piece commitment.
    ///
    /// The listing and commitment are printed to stdout as JSON.
    Pack {
        /// Directories to walk for files. Ignored if a manifest is given.
        #[clap(value_name = "PATH")]
        paths: Vec<PathBuf>,

        /// A JSON array of file entries to pack.
        #[arg(long, short = 'm', env = "BODYSHOP_MANIFEST")]
        manifest: Option<PathBuf>,

        /// Source paths are placed relative to this path. Defaults to the
        /// walked directory if exactly one is given.
        #[arg(long, env = "BODYSHOP_PARENT_PATH")]
        parent_path: Option<PathBuf>,

        /// Where to write the archive.
        #[arg(long, short = 'o')]
        out: PathBuf,

        #[arg(long, env = "BODYSHOP_PARALLELISM")]
        parallelism: Option<usize>,

        #[arg(long, env = "BODYSHOP_CHUNK_SIZE", default_value_t = DEFAULT_CHUNK_SIZE)]
        chunk_size: usize,

        #[arg(long, env = "BODYSHOP_MAX_LINKS", default_value_t = DEFAULT_MAX_LINKS)]
        max_links: usize,

        #[arg(long, env = "BODYSHOP_ON_FILE_ERROR", value_enum, default_value_t = OnFileError::Skip)]
        on_file_error: OnFileError,

        /// Pad the commitment to a piece of this many bytes.
        #[arg(long, env = "BODYSHOP_PIECE_SIZE")]
        piece_size: Option<u64>,

        #[arg(long, env = "BODYSHOP_PIPE_CAPACITY", default_value_t = DEFAULT_PIPE_CAPACITY)]
        pipe_capacity: usize,
    },
    /// Computes the piece commitment of a file, or of stdin.
    Commp {
        #[clap(value_name = "PATH")]
        path: Option<PathBuf>,

        /// Pad the commitment to a piece of this many bytes.
        #[arg(long, env = "BODYSHOP_PIECE_SIZE")]
        piece_size: Option<u64>,

        /// Don't look for an archive in the payload.
        #[arg(long)]
        skip_archive_check: bool,

        /// Print the report as JSON to stdout.
        #[arg(long)]
        report_json: bool,
    },
    /// Lists the frames of an archive.
    Inspect {
        #[clap(value_name = "PATH")]
        path: Option<PathBuf>,

        /// Hash every block and compare it to its CID.
        #[arg(long)]
        verify: bool,
    },
}

async fn open_input(
    path: Option<PathBuf>,
) -> std::io::Result<Box<dyn AsyncRead + Unpin + Send>> {
    Ok(match path {
        Some(path) => Box::new(tokio::fs::File::open(path).await?),
        None => Box::new(tokio::io::stdin()),
    })
}

async fn read_manifest(path: PathBuf) -> Result<Vec<FileEntry>, Box<dyn std::error::Error>> {
    let data = tokio::fs::read(&path).await?;
    Ok(serde_json::from_slice(&data)?)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut tracing = bodyshop_tracing::TracingBuilder::default().level(cli.log_level);
    if cli.json {
        tracing = tracing.enable_json();
    }
    if cli.progress {
        tracing = tracing.enable_progressbar();
    }
    let handle = tracing.build()?;

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupted, cancelling");
                cancel.cancel();
            }
        }
    });

    match cli.command {
        Commands::Pack {
            paths,
            manifest,
            parent_path,
            out,
            parallelism,
            chunk_size,
            max_links,
            on_file_error,
            piece_size,
            pipe_capacity,
        } => {
            let entries = match manifest {
                Some(manifest) => read_manifest(manifest).await?,
                None => {
                    let mut entries = vec![];
                    for path in &paths {
                        entries.extend(entries_from_path(path)?);
                    }
                    entries
                }
            };

            let parent_path = match (parent_path, paths.as_slice()) {
                (Some(parent_path), _) => parent_path,
                (None, [single]) => single.clone(),
                (None, _) => PathBuf::new(),
            };

            let defaults = PackOptions::default();
            let options = PackOptions {
                parent_path,
                parallelism: parallelism.unwrap_or(defaults.parallelism),
                params: BuildParams {
                    chunk_size,
                    max_links,
                },
                on_file_error,
                commp: CommpOptions {
                    target_piece_size: piece_size,
                    ..Default::default()
                },
                pipe_capacity,
            };

            let sink = tokio::fs::File::create(&out).await?;
            let outcome = pack(entries, &options, sink, &cancel).await?;

            info!(out = ?out, root = %outcome.root, "wrote archive");
            write!(handle.get_stderr_writer(), "{}", outcome.report)?;
            write_json(&handle, &outcome)?;
        }
        Commands::Commp {
            path,
            piece_size,
            skip_archive_check,
            report_json,
        } => {
            let calculator = StreamCalculator::new(CommpOptions {
                target_piece_size: piece_size,
                scan_archive: !skip_archive_check,
            })?;

            let report = calculator
                .calculate(open_input(path).await?, &cancel)
                .await?;

            if report_json {
                write_json(&handle, &report)?;
            } else {
                write!(handle.get_stderr_writer(), "{}", report)?;
            }
        }
        Commands::Inspect { path, verify } => {
            let mut reader = CarReader::new(open_input(path).await?)
                .await?
                .with_verify(verify);

            let mut stdout = handle.get_stdout_writer();
            for root in &reader.header().roots {
                writeln!(stdout, "root {}", root)?;
            }
            while let Some((cid, data)) = reader.next_frame().await? {
                writeln!(stdout, "{} {}", cid, data.len())?;
            }

            info!(frames = reader.frames(), verified = verify, "read archive");
        }
    }

    Ok(())
}

fn write_json<T: serde::Serialize>(
    handle: &TracingHandle,
    value: &T,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut stdout = handle.get_stdout_writer();
    serde_json::to_writer_pretty(&mut stdout, value)?;
    writeln!(stdout)?;
    Ok(())
}
