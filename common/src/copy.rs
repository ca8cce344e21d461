use anyhow::anyhow;
use tracing::instrument;

use crate::deadline::Deadline;
use crate::location::Location;
use crate::progress;

/// Which stage of a copy failed.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Failure {
    /// The copy request itself failed; the target was not written.
    Copy,
    /// The copy succeeded but the target could not be confirmed to exist. The object may well be
    /// there, reconciling is left to the caller.
    Confirm,
    /// The batch deadline fired before the copy request completed.
    Deadline,
}

/// Error type for a single copy that records which stage failed.
///
/// # Logging Convention
/// The Display implementation shows the full error chain, so it can be logged with `{}`.
#[derive(Debug, thiserror::Error)]
#[error("{source:#}")]
pub struct Error {
    pub kind: Failure,
    #[source]
    pub source: anyhow::Error,
}

impl Error {
    #[must_use]
    pub fn new(kind: Failure, source: anyhow::Error) -> Self {
        Error { kind, source }
    }

    /// The summary contribution of this failed item.
    #[must_use]
    pub fn summary(&self) -> Summary {
        match self.kind {
            Failure::Copy => Summary {
                copy_failures: 1,
                ..Default::default()
            },
            Failure::Confirm => Summary {
                confirm_failures: 1,
                ..Default::default()
            },
            Failure::Deadline => Summary {
                deadline_aborts: 1,
                ..Default::default()
            },
        }
    }
}

/// Single unit of work, immutable once created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyTask {
    pub source_bucket: String,
    pub source_key: String,
    pub target_bucket: String,
    pub target_key: String,
}

/// Joins a destination prefix and a source key, preserving the key's relative structure.
///
/// `join_key("backup", "a/b/c.txt") == "backup/a/b/c.txt"`; an empty prefix leaves the key as is.
#[must_use]
pub fn join_key(prefix: &str, key: &str) -> String {
    let prefix = prefix.trim_end_matches('/');
    let key = key.trim_start_matches('/');
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{prefix}/{key}")
    }
}

impl CopyTask {
    #[must_use]
    pub fn new(source: &Location, target: &Location, key: String) -> Self {
        Self {
            source_bucket: source.bucket().to_string(),
            target_bucket: target.bucket().to_string(),
            target_key: join_key(target.prefix(), &key),
            source_key: key,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Settings {
    pub attributes: store::ObjectAttributes,
    /// Block until the target is visible before reporting success
    pub wait: Option<store::WaitSettings>,
    /// Print the per-item success record on stdout
    pub print_records: bool,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Summary {
    pub keys_listed: usize,
    pub objects_copied: usize,
    pub copy_failures: usize,
    pub confirm_failures: usize,
    pub deadline_aborts: usize,
}

impl Summary {
    #[must_use]
    pub fn failures(&self) -> usize {
        self.copy_failures + self.confirm_failures + self.deadline_aborts
    }

    /// Number of items with a known outcome.
    #[must_use]
    pub fn completions(&self) -> usize {
        self.objects_copied + self.failures()
    }
}

impl std::ops::Add for Summary {
    type Output = Self;
    fn add(self, other: Self) -> Self {
        Self {
            keys_listed: self.keys_listed + other.keys_listed,
            objects_copied: self.objects_copied + other.objects_copied,
            copy_failures: self.copy_failures + other.copy_failures,
            confirm_failures: self.confirm_failures + other.confirm_failures,
            deadline_aborts: self.deadline_aborts + other.deadline_aborts,
        }
    }
}

impl std::fmt::Display for Summary {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "keys listed: {}\n\
            objects copied: {}\n\
            copy failures: {}\n\
            confirmation failures: {}\n\
            deadline aborts: {}",
            self.keys_listed,
            self.objects_copied,
            self.copy_failures,
            self.confirm_failures,
            self.deadline_aborts,
        )
    }
}

/// Copies one object and, if configured, waits until the target is visible. Both steps are bound
/// to `deadline`.
#[instrument(skip(store, settings, deadline))]
pub async fn copy(
    store: &dyn store::ObjectStore,
    task: &CopyTask,
    settings: &Settings,
    deadline: &Deadline,
) -> Result<Summary, Error> {
    let request = store::CopyRequest {
        source_bucket: task.source_bucket.clone(),
        source_key: task.source_key.clone(),
        target_bucket: task.target_bucket.clone(),
        target_key: task.target_key.clone(),
        attributes: settings.attributes.clone(),
    };
    tracing::debug!("copying {} to {}", request.source_url(), request.target_url());
    deadline
        .run(store.copy_object(&request))
        .await
        .map_err(|exceeded| {
            Error::new(
                Failure::Deadline,
                anyhow!(exceeded).context(format!("copy of {} aborted", request.source_url())),
            )
        })?
        .map_err(|err| Error::new(Failure::Copy, err.into()))?;
    if let Some(wait) = &settings.wait {
        tracing::debug!("waiting for {} to become visible", request.target_url());
        deadline
            .run(store.wait_for_object_exists(&task.target_bucket, &task.target_key, wait))
            .await
            .map_err(|exceeded| {
                // the copy already landed, only its confirmation was cut short
                Error::new(
                    Failure::Confirm,
                    anyhow!(exceeded).context(format!(
                        "waiting for {} aborted, the copy itself succeeded",
                        request.target_url()
                    )),
                )
            })?
            .map_err(|err| Error::new(Failure::Confirm, err.into()))?;
    }
    Ok(Summary {
        objects_copied: 1,
        ..Default::default()
    })
}

/// Worker entry point: runs one copy while holding its concurrency slot, reports the outcome for
/// this key and hands it back to the dispatcher.
#[instrument(skip(prog_track, store, settings, deadline, _slot))]
pub async fn run(
    prog_track: &'static progress::Progress,
    store: std::sync::Arc<dyn store::ObjectStore>,
    task: CopyTask,
    settings: std::sync::Arc<Settings>,
    deadline: Deadline,
    _slot: throttle::Slot,
) -> Result<Summary, Error> {
    let _op_guard = prog_track.ops.guard();
    let result = copy(store.as_ref(), &task, &settings, &deadline).await;
    match &result {
        Ok(_) => {
            prog_track.objects_copied.inc();
            if settings.print_records {
                println!(
                    "Item {:?} successfully copied from bucket {:?} to bucket {:?}",
                    task.source_key, task.source_bucket, task.target_bucket
                );
            }
        }
        Err(error) => {
            match error.kind {
                Failure::Copy => {
                    prog_track.copy_failures.inc();
                    tracing::error!("Failed to copy object {}: {}", task.source_key, error);
                }
                Failure::Confirm => {
                    prog_track.confirm_failures.inc();
                    tracing::error!("Failed to wait for object {}: {}", task.target_key, error);
                }
                Failure::Deadline => {
                    prog_track.deadline_aborts.inc();
                    tracing::error!("Deadline exceeded for object {}: {}", task.source_key, error);
                }
            }
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutils::MemoryStore;
    use std::sync::Arc;
    use std::time::Duration;
    use tracing_test::traced_test;

    fn task(key: &str, prefix: &str) -> CopyTask {
        let source = Location::parse("s3://src").unwrap();
        let target = Location::parse(&format!("s3://dst/{prefix}")).unwrap();
        CopyTask::new(&source, &target, key.to_string())
    }

    // a fresh single-slot pool per worker, the dispatcher tests cover sharing
    async fn slot() -> throttle::Slot {
        throttle::ConcurrencyLimit::new(std::num::NonZeroUsize::MIN)
            .acquire()
            .await
    }

    #[test]
    fn join_key_preserves_structure() {
        assert_eq!(join_key("backup", "a/b/c.txt"), "backup/a/b/c.txt");
        assert_eq!(join_key("backup/", "a/b/c.txt"), "backup/a/b/c.txt");
        assert_eq!(join_key("backup", "/file.txt"), "backup/file.txt");
        assert_eq!(join_key("", "a/b/c.txt"), "a/b/c.txt");
        assert_eq!(join_key("x/y", "dir/"), "x/y/dir/");
    }

    #[test]
    fn task_targets_destination_prefix() {
        let task = task("a/b/c.txt", "backup/");
        assert_eq!(
            task,
            CopyTask {
                source_bucket: "src".to_string(),
                source_key: "a/b/c.txt".to_string(),
                target_bucket: "dst".to_string(),
                target_key: "backup/a/b/c.txt".to_string(),
            }
        );
    }

    #[test]
    fn summary_adds_up() {
        let summary = Summary {
            objects_copied: 2,
            ..Default::default()
        } + Error::new(Failure::Confirm, anyhow!("x")).summary()
            + Error::new(Failure::Deadline, anyhow!("y")).summary();
        assert_eq!(summary.objects_copied, 2);
        assert_eq!(summary.confirm_failures, 1);
        assert_eq!(summary.deadline_aborts, 1);
        assert_eq!(summary.failures(), 2);
        assert_eq!(summary.completions(), 4);
        assert!(summary.to_string().contains("confirmation failures: 1"));
    }

    #[tokio::test]
    async fn copy_issues_request_with_attributes() -> anyhow::Result<()> {
        let store = MemoryStore::new().with_objects("src", ["file.txt"]);
        let settings = Settings {
            attributes: store::ObjectAttributes::new(
                Some("bucket-owner-full-control".to_string()),
                Some("STANDARD_IA".to_string()),
            )?,
            ..Default::default()
        };
        let summary = copy(&store, &task("file.txt", "backup"), &settings, &Deadline::none()).await?;
        assert_eq!(summary.objects_copied, 1);
        let copies = store.copies();
        assert_eq!(copies.len(), 1);
        assert_eq!(copies[0].target_key, "backup/file.txt");
        assert_eq!(copies[0].attributes, settings.attributes);
        assert!(store.contains("dst", "backup/file.txt"));
        Ok(())
    }

    #[tokio::test]
    async fn missing_source_is_a_copy_failure() {
        let store = MemoryStore::new();
        let error = copy(&store, &task("nope.txt", ""), &Settings::default(), &Deadline::none())
            .await
            .unwrap_err();
        assert_eq!(error.kind, Failure::Copy);
        assert!(error.to_string().contains("NoSuchKey"), "{error}");
    }

    #[tokio::test(start_paused = true)]
    async fn invisible_target_is_a_confirmation_failure() {
        let store = MemoryStore::new()
            .with_objects("src", ["file.txt"])
            .invisible("file.txt");
        let settings = Settings {
            wait: Some(store::WaitSettings {
                delay: Duration::from_secs(1),
                max_wait: Duration::from_secs(3),
            }),
            ..Default::default()
        };
        let error = copy(&store, &task("file.txt", ""), &settings, &Deadline::none())
            .await
            .unwrap_err();
        assert_eq!(error.kind, Failure::Confirm);
        // the copy itself went through
        assert_eq!(store.copies().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn wait_confirms_visible_target() -> anyhow::Result<()> {
        let store = MemoryStore::new().with_objects("src", ["file.txt"]);
        let settings = Settings {
            wait: Some(store::WaitSettings::default()),
            ..Default::default()
        };
        copy(&store, &task("file.txt", "b"), &settings, &Deadline::none()).await?;
        assert!(store.head_calls() >= 1);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_aborts_slow_copy() {
        let store = MemoryStore::new()
            .with_objects("src", ["file.txt"])
            .with_copy_delay(Duration::from_secs(3600));
        let deadline = Deadline::start(Some(Duration::from_secs(1)));
        let error = copy(&store, &task("file.txt", ""), &Settings::default(), &deadline)
            .await
            .unwrap_err();
        assert_eq!(error.kind, Failure::Deadline);
        assert_eq!(store.in_flight(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_during_wait_is_a_confirmation_failure() {
        let store = MemoryStore::new()
            .with_objects("src", ["file.txt"])
            .invisible("file.txt");
        let settings = Settings {
            wait: Some(store::WaitSettings {
                delay: Duration::from_secs(1),
                max_wait: Duration::from_secs(100),
            }),
            ..Default::default()
        };
        let deadline = Deadline::start(Some(Duration::from_secs(5)));
        let error = copy(&store, &task("file.txt", ""), &settings, &deadline)
            .await
            .unwrap_err();
        assert_eq!(error.kind, Failure::Confirm);
        assert!(
            error.to_string().contains("the copy itself succeeded"),
            "{error}"
        );
        assert_eq!(store.copies().len(), 1);
        let summary = error.summary();
        assert_eq!(summary.confirm_failures, 1);
        assert_eq!(summary.deadline_aborts, 0);
    }

    #[tokio::test]
    #[traced_test]
    async fn worker_reports_failure_for_its_key() {
        let progress: &'static progress::Progress = Box::leak(Box::new(progress::Progress::new()));
        let store: Arc<dyn store::ObjectStore> =
            Arc::new(MemoryStore::new().with_objects("src", ["bad.txt"]).failing_copy("bad.txt"));
        let result = run(
            progress,
            store,
            task("bad.txt", ""),
            Arc::new(Settings::default()),
            Deadline::none(),
            slot().await,
        )
        .await;
        assert!(result.is_err());
        assert_eq!(progress.copy_failures.get(), 1);
        assert_eq!(progress.objects_copied.get(), 0);
        let status = progress.ops.get();
        assert_eq!(status.started, status.finished);
        assert!(logs_contain("Failed to copy object bad.txt"));
    }
}
