use anyhow::anyhow;
use std::sync::Arc;
use tracing::{Instrument, instrument};

use crate::copy::{self, CopyTask, Summary};
use crate::deadline::Deadline;
use crate::list::KeyLister;
use crate::location::Location;
use crate::progress;

/// Error type for the batch as a whole. Carries the summary of everything that completed before
/// the batch was aborted.
#[derive(Debug, thiserror::Error)]
#[error("{source:#}")]
pub struct Error {
    #[source]
    pub source: anyhow::Error,
    pub summary: Summary,
}

impl Error {
    #[must_use]
    pub fn new(source: anyhow::Error, summary: Summary) -> Self {
        Error { source, summary }
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    /// Maximum number of copy workers in flight at any time
    pub concurrency: std::num::NonZeroUsize,
    pub recursive: bool,
    pub copy: copy::Settings,
}

type WorkerResult = Result<Result<Summary, copy::Error>, tokio::task::JoinError>;

/// Folds one finished worker into `summary`. A worker that did not run to completion is
/// remembered in `worker_error`; its siblings keep running.
fn reap(result: WorkerResult, summary: &mut Summary, worker_error: &mut Option<anyhow::Error>) {
    match result {
        Ok(Ok(done)) => *summary = *summary + done,
        // already reported by the worker, only account for it
        Ok(Err(error)) => *summary = *summary + error.summary(),
        Err(error) => {
            tracing::error!("copy worker failed: {}", error);
            worker_error.get_or_insert(anyhow!(error).context("copy worker failed"));
        }
    }
}

/// Copies every key produced for `source` to `target` with at most `settings.concurrency` copies
/// in flight.
///
/// Keys are admitted page by page as the listing progresses. The batch returns only after every
/// launched worker reported its outcome. Per-item failures are folded into the returned
/// [`Summary`]; only a listing failure (or a worker that died without reporting) fails the batch,
/// and only after every other worker finished.
#[instrument(skip(prog_track, store, deadline))]
pub async fn run(
    prog_track: &'static progress::Progress,
    store: Arc<dyn store::ObjectStore>,
    source: &Location,
    target: &Location,
    settings: &Settings,
    deadline: &Deadline,
) -> Result<Summary, Error> {
    let limit = throttle::ConcurrencyLimit::new(settings.concurrency);
    let copy_settings = Arc::new(settings.copy.clone());
    let mut lister = KeyLister::new(source, settings.recursive);
    let mut join_set = tokio::task::JoinSet::new();
    let mut summary = Summary::default();
    let mut worker_error = None;
    let listing_error = loop {
        let page = match lister.next_page(store.as_ref(), deadline).await {
            Ok(Some(page)) => page,
            Ok(None) => break None,
            Err(error) => break Some(error),
        };
        for key in page {
            prog_track.keys_listed.inc();
            summary.keys_listed += 1;
            let task = CopyTask::new(source, target, key);
            let slot = match deadline.run(limit.acquire()).await {
                Ok(slot) => slot,
                Err(exceeded) => {
                    prog_track.deadline_aborts.inc();
                    tracing::error!(
                        "Deadline exceeded for object {}: not started, {}",
                        task.source_key,
                        exceeded
                    );
                    summary.deadline_aborts += 1;
                    continue;
                }
            };
            while let Some(result) = join_set.try_join_next() {
                reap(result, &mut summary, &mut worker_error);
            }
            tracing::trace!("launching copy of {}", task.source_key);
            join_set.spawn(
                copy::run(
                    prog_track,
                    store.clone(),
                    task,
                    copy_settings.clone(),
                    deadline.clone(),
                    slot,
                )
                .in_current_span(),
            );
        }
    };
    if listing_error.is_some() {
        tracing::debug!("listing failed, waiting for {} launched worker(s)", join_set.len());
    }
    while let Some(result) = join_set.join_next().await {
        reap(result, &mut summary, &mut worker_error);
    }
    if let Some(error) = listing_error {
        return Err(Error::new(
            error.context(format!("failed to list objects for source bucket {}", source.bucket())),
            summary,
        ));
    }
    if let Some(error) = worker_error {
        return Err(Error::new(error, summary));
    }
    Ok(summary)
}
