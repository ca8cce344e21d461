//! Bulk copy orchestration shared by the `s3cp` tool
//!
//! This crate turns a source [`Location`] into a stream of keys and copies each of them to a
//! destination [`Location`] with server-side copies, bounded by a concurrency limit and a single
//! batch-wide [`Deadline`].
//!
//! # Components
//!
//! - [`list`] - the key lister: one explicit key, or a paginated listing of a prefix
//! - [`copy`] - the copy worker: one copy request plus an optional visibility wait
//! - [`dispatch`] - admits listed keys under the concurrency limit and joins every worker
//! - [`deadline`] - the batch-wide cancellation signal
//! - [`progress`] - counters shared by the workers and the progress reporter
//!
//! # Error Handling
//!
//! Failures of a single object (copy, confirmation or deadline) are reported by the worker that
//! hit them and only show up in the [`copy::Summary`]. Failures of the batch as a whole
//! (configuration, session, listing) are returned as [`Error`], each with its own process exit
//! code.
//!
//! # Logging
//!
//! Logs go to stderr through `tracing`. Default level is ERROR; `-v` raises it to INFO, `-vv` to
//! DEBUG and `-vvv` to TRACE, which also enables AWS SDK internals. `RUST_LOG` overrides the
//! verbosity flags but not `-q`, which turns logging off. Per-object success records are printed
//! on stdout.

use anyhow::anyhow;
use std::io::IsTerminal;
use std::sync::{Arc, LazyLock};
use tracing::instrument;

pub mod config;
pub mod copy;
pub mod deadline;
pub mod dispatch;
pub mod list;
pub mod location;
pub mod progress;

#[cfg(test)]
mod testutils;

pub use config::{OutputConfig, RuntimeConfig, ThrottleConfig};
pub use deadline::Deadline;
pub use location::Location;

static PROGRESS: LazyLock<progress::Progress> = LazyLock::new(progress::Progress::new);

/// Batch-level failures. Each variant maps to a distinct process exit code.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid source address: {0}")]
    SourceAddress(#[source] location::Error),
    #[error("invalid destination address: {0}")]
    DestinationAddress(#[source] location::Error),
    #[error("{0}")]
    Scheme(#[source] location::Error),
    #[error("failed to create session: {0:#}")]
    Session(#[source] anyhow::Error),
    #[error("{0}")]
    Listing(#[source] dispatch::Error),
    #[error("{0}")]
    InvalidOption(String),
    #[error("{0:#}")]
    Runtime(#[source] anyhow::Error),
}

impl Error {
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::SourceAddress(_) | Error::Runtime(_) => 1,
            Error::DestinationAddress(_) => 2,
            Error::Scheme(_) => 3,
            Error::Session(_) => 4,
            Error::Listing(_) => 5,
            Error::InvalidOption(_) => 6,
        }
    }

    /// Partial summary of a batch that was aborted after it started copying.
    #[must_use]
    pub fn summary(&self) -> Option<copy::Summary> {
        match self {
            Error::Listing(error) => Some(error.summary),
            _ => None,
        }
    }
}

/// Parses the source and destination addresses.
///
/// Malformed addresses are checked first (source, then destination); a well-formed address with
/// a scheme other than `s3` is reported only once both parse.
pub fn parse_locations(source: &str, destination: &str) -> Result<(Location, Location), Error> {
    let source = Location::parse(source);
    let destination = Location::parse(destination);
    match (source, destination) {
        (Ok(source), Ok(destination)) => Ok((source, destination)),
        (Err(error @ location::Error::Malformed { .. }), _) => Err(Error::SourceAddress(error)),
        (_, Err(error @ location::Error::Malformed { .. })) => {
            Err(Error::DestinationAddress(error))
        }
        (Err(error), _) | (_, Err(error)) => Err(Error::Scheme(error)),
    }
}

/// Creates the S3 session, failing before any listing or copying starts.
#[instrument]
pub async fn connect(
    config: &store::s3::SessionConfig,
) -> Result<Arc<dyn store::ObjectStore>, Error> {
    let store = store::s3::connect(config).await.map_err(Error::Session)?;
    Ok(Arc::new(store))
}

/// Runs the whole batch, reporting progress through the process-wide tracker.
pub async fn copy_batch(
    store: Arc<dyn store::ObjectStore>,
    source: &Location,
    target: &Location,
    settings: &dispatch::Settings,
    deadline: &Deadline,
) -> Result<copy::Summary, Error> {
    dispatch::run(&PROGRESS, store, source, target, settings, deadline)
        .await
        .map_err(Error::Listing)
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum ProgressType {
    /// Progress bar when stderr is a terminal, text updates otherwise
    #[default]
    #[value(name = "Auto", alias = "auto")]
    Auto,
    /// Animated single-line status
    #[value(name = "ProgressBar", alias = "progress-bar")]
    ProgressBar,
    /// Periodic multi-line reports, suitable for log files
    #[value(name = "TextUpdates", alias = "text-updates")]
    TextUpdates,
}

#[derive(Debug, Clone, Default)]
pub struct ProgressSettings {
    pub progress_type: ProgressType,
    /// Human readable delay between updates, e.g. "200ms" or "10s"
    pub progress_delay: Option<String>,
}

impl ProgressSettings {
    fn resolve(&self) -> Result<(bool, std::time::Duration), Error> {
        let interactive = match self.progress_type {
            ProgressType::Auto => std::io::stderr().is_terminal(),
            ProgressType::ProgressBar => true,
            ProgressType::TextUpdates => false,
        };
        let delay = match &self.progress_delay {
            Some(delay) => humantime::parse_duration(delay).map_err(|err| {
                Error::InvalidOption(format!("invalid --progress-delay {delay:?}: {err}"))
            })?,
            None if interactive => std::time::Duration::from_millis(200),
            None => std::time::Duration::from_secs(10),
        };
        Ok((interactive, delay))
    }
}

struct ProgressTracker {
    done: std::sync::mpsc::Sender<()>,
    handle: std::thread::JoinHandle<()>,
}

impl ProgressTracker {
    fn start(interactive: bool, delay: std::time::Duration) -> Self {
        let (done, stop) = std::sync::mpsc::channel::<()>();
        let handle = std::thread::spawn(move || {
            let mut printer = progress::ProgressPrinter::new(&PROGRESS);
            let bar = interactive.then(|| {
                let bar = indicatif::ProgressBar::new_spinner();
                bar.set_style(
                    indicatif::ProgressStyle::with_template("{spinner:.cyan} [{elapsed}] {msg}")
                        .unwrap_or_else(|_| indicatif::ProgressStyle::default_spinner()),
                );
                bar
            });
            loop {
                let finished = !matches!(
                    stop.recv_timeout(delay),
                    Err(std::sync::mpsc::RecvTimeoutError::Timeout)
                );
                match &bar {
                    Some(bar) => {
                        bar.set_message(printer.print_line());
                        bar.tick();
                    }
                    None => eprintln!("{}", printer.print()),
                }
                if finished {
                    break;
                }
            }
            if let Some(bar) = bar {
                bar.finish();
            }
        });
        Self { done, handle }
    }

    fn stop(self) {
        drop(self.done);
        if self.handle.join().is_err() {
            tracing::error!("progress reporter thread failed");
        }
    }
}

/// `-q` silences logging even when `RUST_LOG` is set; otherwise a valid `RUST_LOG` wins over `-v`.
fn log_filter(output: &OutputConfig, env: Option<&str>) -> tracing_subscriber::EnvFilter {
    let fallback = || tracing_subscriber::EnvFilter::new(output.log_directives());
    if output.quiet {
        return fallback();
    }
    env.and_then(|directives| tracing_subscriber::EnvFilter::try_new(directives).ok())
        .unwrap_or_else(fallback)
}

fn init_logging(output: &OutputConfig) {
    let env = std::env::var(tracing_subscriber::EnvFilter::DEFAULT_ENV).ok();
    let filter = log_filter(output, env.as_deref());
    // a subscriber may already be installed by an embedding process
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Sets up logging, the tokio runtime and the ops throttle, then runs `func` to completion.
///
/// Prints the summary on stdout when `output.print_summary` is set (or with `-v`), including the
/// partial summary of a batch that failed while listing.
pub fn run<Fut>(
    progress: Option<ProgressSettings>,
    output: OutputConfig,
    runtime: RuntimeConfig,
    throttle: ThrottleConfig,
    func: impl FnOnce() -> Fut,
) -> Result<copy::Summary, Error>
where
    Fut: std::future::Future<Output = Result<copy::Summary, Error>>,
{
    init_logging(&output);
    // walltime is measured from here
    LazyLock::force(&PROGRESS);
    let progress = progress.as_ref().map(ProgressSettings::resolve).transpose()?;
    let mut builder = tokio::runtime::Builder::new_multi_thread();
    builder.enable_all();
    if runtime.max_workers > 0 {
        builder.worker_threads(runtime.max_workers);
    }
    if runtime.max_blocking_threads > 0 {
        builder.max_blocking_threads(runtime.max_blocking_threads);
    }
    let tokio_runtime = builder
        .build()
        .map_err(|err| Error::Runtime(anyhow!(err).context("failed to start tokio runtime")))?;
    if throttle.ops_throttle > 0 {
        let (tokens, interval) = throttle::replenish_schedule(throttle.ops_throttle);
        tracing::debug!("throttling to {} request(s) every {:?}", tokens, interval);
        throttle::init_ops_tokens(tokens);
        tokio_runtime.spawn(throttle::run_ops_replenish_thread(tokens, interval));
    }
    let tracker = progress.map(|(interactive, delay)| ProgressTracker::start(interactive, delay));
    let res = tokio_runtime.block_on(func());
    if let Some(tracker) = tracker {
        tracker.stop();
    }
    let print_summary = output.print_summary || (output.verbose > 0 && !output.quiet);
    if print_summary {
        let summary = match &res {
            Ok(summary) => Some(*summary),
            Err(error) => error.summary(),
        };
        if let Some(summary) = summary {
            println!("{summary}");
            println!("walltime: {:.2?}", PROGRESS.get_duration());
        }
    }
    res
}
