use std::num::NonZeroUsize;
use std::sync::Arc;

/// Fixed pool of concurrency slots.
///
/// Every in-flight remote operation holds one [`Slot`]; the number of outstanding slots never
/// exceeds the configured limit. Cloning the limit shares the same pool.
#[derive(Debug, Clone)]
pub struct ConcurrencyLimit {
    sem: Arc<tokio::sync::Semaphore>,
    limit: NonZeroUsize,
}

/// A single acquired slot. The slot goes back to its pool when dropped, whatever the outcome of
/// the work it guarded.
#[derive(Debug)]
pub struct Slot {
    _permit: tokio::sync::OwnedSemaphorePermit,
}

impl ConcurrencyLimit {
    #[must_use]
    pub fn new(limit: NonZeroUsize) -> Self {
        Self {
            sem: Arc::new(tokio::sync::Semaphore::new(limit.get())),
            limit,
        }
    }

    #[must_use]
    pub fn limit(&self) -> usize {
        self.limit.get()
    }

    /// Number of slots currently free.
    #[must_use]
    pub fn available(&self) -> usize {
        self.sem.available_permits()
    }

    /// Number of slots currently held.
    #[must_use]
    pub fn in_use(&self) -> usize {
        self.limit.get() - self.available()
    }

    /// Waits until a slot is free. Cancel-safe: dropping the future before it resolves does not
    /// consume a slot.
    pub async fn acquire(&self) -> Slot {
        let permit = self
            .sem
            .clone()
            .acquire_owned()
            .await
            .expect("concurrency semaphore is never closed");
        Slot { _permit: permit }
    }
}
