use tracing::{Level, event, instrument};

#[derive(Debug)]
pub struct TlsCounter {
    // mutex is used primarily from one thread, so it's not a bottleneck
    count: thread_local::ThreadLocal<std::sync::Mutex<u64>>,
}

impl TlsCounter {
    #[must_use]
    pub fn new() -> Self {
        Self {
            count: thread_local::ThreadLocal::new(),
        }
    }

    pub fn add(&self, value: u64) {
        let mutex = self.count.get_or(|| std::sync::Mutex::new(0));
        let mut guard = mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        *guard += value;
    }

    pub fn inc(&self) {
        self.add(1);
    }

    pub fn get(&self) -> u64 {
        self.count.iter().fold(0, |x, y| {
            x + *y.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
        })
    }
}

impl Default for TlsCounter {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug)]
pub struct ProgressCounter {
    started: TlsCounter,
    finished: TlsCounter,
}

impl Default for ProgressCounter {
    fn default() -> Self {
        Self::new()
    }
}

pub struct ProgressGuard<'a> {
    progress: &'a ProgressCounter,
}

impl<'a> ProgressGuard<'a> {
    pub fn new(progress: &'a ProgressCounter) -> Self {
        progress.started.inc();
        Self { progress }
    }
}

impl Drop for ProgressGuard<'_> {
    fn drop(&mut self) {
        self.progress.finished.inc();
    }
}

pub struct Status {
    pub started: u64,
    pub finished: u64,
}

impl ProgressCounter {
    #[must_use]
    pub fn new() -> Self {
        Self {
            started: TlsCounter::new(),
            finished: TlsCounter::new(),
        }
    }

    pub fn guard(&self) -> ProgressGuard<'_> {
        ProgressGuard::new(self)
    }

    #[instrument]
    pub fn get(&self) -> Status {
        let mut status = Status {
            started: self.started.get(),
            finished: self.finished.get(),
        };
        if status.finished > status.started {
            event!(
                Level::DEBUG,
                "Progress inversion - started: {}, finished {}",
                status.started,
                status.finished
            );
            status.started = status.finished;
        }
        status
    }
}

/// Batch-wide counters, updated by the lister and the copy workers.
#[derive(Debug)]
pub struct Progress {
    pub keys_listed: TlsCounter,
    /// One op per copy worker, from launch until its outcome is known
    pub ops: ProgressCounter,
    pub objects_copied: TlsCounter,
    pub copy_failures: TlsCounter,
    pub confirm_failures: TlsCounter,
    pub deadline_aborts: TlsCounter,
    start_time: std::time::Instant,
}

impl Progress {
    #[must_use]
    pub fn new() -> Self {
        Self {
            keys_listed: Default::default(),
            ops: Default::default(),
            objects_copied: Default::default(),
            copy_failures: Default::default(),
            confirm_failures: Default::default(),
            deadline_aborts: Default::default(),
            start_time: std::time::Instant::now(),
        }
    }

    pub fn get_duration(&self) -> std::time::Duration {
        self.start_time.elapsed()
    }
}

impl Default for Progress {
    fn default() -> Self {
        Self::new()
    }
}

pub struct ProgressPrinter<'a> {
    progress: &'a Progress,
    last_copied: u64,
    last_update: std::time::Instant,
}

impl<'a> ProgressPrinter<'a> {
    pub fn new(progress: &'a Progress) -> Self {
        Self {
            progress,
            last_copied: progress.objects_copied.get(),
            last_update: std::time::Instant::now(),
        }
    }

    fn rates(&mut self) -> (u64, f64, f64) {
        let time_now = std::time::Instant::now();
        let copied = self.progress.objects_copied.get();
        let total_duration_secs = self.progress.get_duration().as_secs_f64();
        let curr_duration_secs = (time_now - self.last_update).as_secs_f64();
        let average_rate = copied as f64 / total_duration_secs.max(f64::EPSILON);
        let current_rate =
            copied.saturating_sub(self.last_copied) as f64 / curr_duration_secs.max(f64::EPSILON);
        self.last_copied = copied;
        self.last_update = time_now;
        (copied, average_rate, current_rate)
    }

    /// Single-line status, used as the progress bar message.
    pub fn print_line(&mut self) -> String {
        let ops = self.progress.ops.get();
        let (copied, _, current_rate) = self.rates();
        format!(
            "listed: {} | in flight: {} | copied: {} ({:.1}/s) | failed: {}",
            self.progress.keys_listed.get(),
            ops.started - ops.finished,
            copied,
            current_rate,
            self.progress.copy_failures.get()
                + self.progress.confirm_failures.get()
                + self.progress.deadline_aborts.get(),
        )
    }

    /// Multi-line status, used for periodic text updates.
    pub fn print(&mut self) -> String {
        let ops = self.progress.ops.get();
        let (copied, average_rate, current_rate) = self.rates();
        format!(
            "---------------------\n\
            OBJECTS:\n\
            listed:    {:>10}\n\
            in flight: {:>10}\n\
            copied:    {:>10}\n\
            average:   {:>10.2} objects/s\n\
            current:   {:>10.2} objects/s\n\
            -----------------------\n\
            FAILED:\n\
            copy:         {:>10}\n\
            confirmation: {:>10}\n\
            deadline:     {:>10}",
            self.progress.keys_listed.get(),
            ops.started - ops.finished,
            copied,
            average_rate,
            current_rate,
            self.progress.copy_failures.get(),
            self.progress.confirm_failures.get(),
            self.progress.deadline_aborts.get(),
        )
    }
}
