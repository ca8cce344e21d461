use std::sync::atomic::{AtomicBool, Ordering};

/// Token bucket backed by a tokio semaphore. Disabled until `setup` is called with a non-zero value.
pub struct TokenBucket {
    enabled: AtomicBool,
    sem: tokio::sync::Semaphore,
}

impl TokenBucket {
    pub const fn new() -> Self {
        Self {
            enabled: AtomicBool::new(false),
            sem: tokio::sync::Semaphore::const_new(0),
        }
    }

    pub fn setup(&self, tokens: usize) {
        self.enabled.store(tokens > 0, Ordering::Release);
        if tokens == 0 {
            return;
        }
        self.sem.forget_permits(self.sem.available_permits());
        self.sem.add_permits(tokens);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    pub async fn consume(&self) {
        if self.is_enabled() {
            self.sem
                .acquire()
                .await
                .expect("token bucket semaphore is never closed")
                .forget();
        }
    }

    pub async fn run_replenish_thread(&self, replenish: usize, interval: std::time::Duration) {
        if !self.is_enabled() {
            return;
        }
        loop {
            tokio::time::sleep(interval).await;
            let curr_permits = self.sem.available_permits();
            if curr_permits >= replenish {
                continue;
            }
            self.sem.add_permits(replenish - curr_permits);
        }
    }
}
