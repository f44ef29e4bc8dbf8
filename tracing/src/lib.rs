//! Log and progress output of the bodyshop tools.

use indicatif::ProgressStyle;
use lazy_static::lazy_static;
use tracing::Level;
use tracing_indicatif::{filter::IndicatifFilter, writer, IndicatifLayer, IndicatifWriter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

lazy_static! {
    /// For spans with a known amount of work, like the files of a pack.
    pub static ref PB_PROGRESS_STYLE: ProgressStyle = ProgressStyle::with_template(
        "{span_child_prefix} {wide_msg} {bar:10} ({elapsed}) {pos:>7}/{len:7}"
    )
    .expect("invalid progress template");
    pub static ref PB_SPINNER_STYLE: ProgressStyle = ProgressStyle::with_template(
        "{span_child_prefix}{spinner} {wide_msg} ({elapsed})"
    )
    .expect("invalid progress template");
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("unable to install subscriber: {0}")]
    Init(#[from] tracing_subscriber::util::TryInitError),

    #[error("invalid RUST_LOG: {0}")]
    Filter(#[from] tracing_subscriber::filter::FromEnvError),
}

/// Writers for program output that suspend progress bars while writing.
#[derive(Clone)]
pub struct TracingHandle {
    stdout: IndicatifWriter<writer::Stdout>,
    stderr: IndicatifWriter<writer::Stderr>,
}

impl TracingHandle {
    /// Use this instead of `println!`, so results don't get mixed into a
    /// progress bar.
    pub fn get_stdout_writer(&self) -> IndicatifWriter<writer::Stdout> {
        self.stdout.clone()
    }

    pub fn get_stderr_writer(&self) -> IndicatifWriter<writer::Stderr> {
        self.stderr.clone()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TracingBuilder {
    level: Level,
    progress_bar: bool,
    json: bool,
}

impl Default for TracingBuilder {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            progress_bar: false,
            json: false,
        }
    }
}

impl TracingBuilder {
    /// The level used when RUST_LOG is unset.
    pub fn level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    /// Draw progress bars for spans carrying an `indicatif.pb_show` field.
    pub fn enable_progressbar(mut self) -> Self {
        self.progress_bar = true;
        self
    }

    /// Emit log lines as JSON objects instead of the compact text format.
    pub fn enable_json(mut self) -> Self {
        self.json = true;
        self
    }

    /// Installs the global subscriber. Logs go to stderr.
    pub fn build(self) -> Result<TracingHandle, Error> {
        let indicatif = IndicatifLayer::new().with_progress_style(PB_SPINNER_STYLE.clone());
        let handle = TracingHandle {
            stdout: indicatif.get_stdout_writer(),
            stderr: indicatif.get_stderr_writer(),
        };

        let filter = EnvFilter::builder()
            .with_default_directive(self.level.into())
            .from_env()?;

        let json = self.json.then(|| {
            tracing_subscriber::fmt::layer()
                .with_writer(handle.get_stderr_writer())
                .json()
        });
        let compact = (!self.json).then(|| {
            tracing_subscriber::fmt::layer()
                .with_writer(handle.get_stderr_writer())
                .compact()
        });
        let progress = self
            .progress_bar
            .then(|| indicatif.with_filter(IndicatifFilter::new(false)));

        tracing_subscriber::registry()
            .with(filter)
            .with(json)
            .with(compact)
            .with(progress)
            .try_init()?;

        Ok(handle)
    }
}
