use std::collections::{BTreeSet, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::anyhow;

/// In-memory [`store::ObjectStore`] with knobs for paging, latency and injected failures.
#[derive(Debug, Default)]
pub struct MemoryStore {
    objects: Mutex<BTreeSet<(String, String)>>,
    page_size: Option<usize>,
    listing_fails_after: Option<usize>,
    copy_delay: Option<std::time::Duration>,
    failing_copies: HashSet<String>,
    panicking_copies: HashSet<String>,
    invisible: HashSet<String>,
    copies: Mutex<Vec<store::CopyRequest>>,
    list_calls: AtomicUsize,
    head_calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

struct InFlightGuard<'a> {
    store: &'a MemoryStore,
}

impl<'a> InFlightGuard<'a> {
    fn new(store: &'a MemoryStore) -> Self {
        let current = store.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        store.max_in_flight.fetch_max(current, Ordering::SeqCst);
        Self { store }
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.store.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_objects<'a>(self, bucket: &str, keys: impl IntoIterator<Item = &'a str>) -> Self {
        {
            let mut objects = self.objects.lock().unwrap();
            for key in keys {
                objects.insert((bucket.to_string(), key.to_string()));
            }
        }
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = Some(page_size);
        self
    }

    /// Every listing call after the first `pages` ones fails.
    pub fn failing_listing_after(mut self, pages: usize) -> Self {
        self.listing_fails_after = Some(pages);
        self
    }

    /// Each copy takes `delay` before it lands.
    pub fn with_copy_delay(mut self, delay: std::time::Duration) -> Self {
        self.copy_delay = Some(delay);
        self
    }

    /// Copies of this source key are rejected.
    pub fn failing_copy(mut self, key: &str) -> Self {
        self.failing_copies.insert(key.to_string());
        self
    }

    /// The worker copying this source key crashes instead of reporting.
    pub fn panicking_copy(mut self, key: &str) -> Self {
        self.panicking_copies.insert(key.to_string());
        self
    }

    /// Copies of this source key land but never become visible.
    pub fn invisible(mut self, key: &str) -> Self {
        self.invisible.insert(key.to_string());
        self
    }

    pub fn contains(&self, bucket: &str, key: &str) -> bool {
        self.objects
            .lock()
            .unwrap()
            .contains(&(bucket.to_string(), key.to_string()))
    }

    pub fn copies(&self) -> Vec<store::CopyRequest> {
        self.copies.lock().unwrap().clone()
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn head_calls(&self) -> usize {
        self.head_calls.load(Ordering::SeqCst)
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl store::ObjectStore for MemoryStore {
    async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
        continuation: Option<String>,
    ) -> Result<store::ListPage, store::Error> {
        let call = self.list_calls.fetch_add(1, Ordering::SeqCst);
        if self.listing_fails_after.is_some_and(|pages| call >= pages) {
            return Err(store::Error::List {
                bucket: bucket.to_string(),
                prefix: prefix.to_string(),
                source: anyhow!("InternalError: We encountered an internal error"),
            });
        }
        let start: usize = match continuation {
            Some(token) => token.parse().map_err(|_| store::Error::List {
                bucket: bucket.to_string(),
                prefix: prefix.to_string(),
                source: anyhow!("InvalidArgument: bad continuation token {token:?}"),
            })?,
            None => 0,
        };
        let matching: Vec<String> = self
            .objects
            .lock()
            .unwrap()
            .iter()
            .filter(|(b, k)| b == bucket && k.starts_with(prefix))
            .map(|(_, k)| k.clone())
            .collect();
        let page_size = self.page_size.unwrap_or(1000);
        let end = (start + page_size).min(matching.len());
        let keys = matching.get(start..end).unwrap_or_default().to_vec();
        Ok(store::ListPage {
            keys,
            continuation: (end < matching.len()).then(|| end.to_string()),
        })
    }

    async fn copy_object(&self, request: &store::CopyRequest) -> Result<(), store::Error> {
        let _guard = InFlightGuard::new(self);
        let fail = |reason: &str| store::Error::Copy {
            from: request.source_url(),
            to: request.target_url(),
            source: anyhow!("{reason}"),
        };
        if self.panicking_copies.contains(&request.source_key) {
            panic!("crashed copying {}", request.source_key);
        }
        if let Some(delay) = self.copy_delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing_copies.contains(&request.source_key) {
            return Err(fail("AccessDenied: Access Denied"));
        }
        let mut objects = self.objects.lock().unwrap();
        if !objects.contains(&(request.source_bucket.clone(), request.source_key.clone())) {
            return Err(fail("NoSuchKey: The specified key does not exist."));
        }
        objects.insert((request.target_bucket.clone(), request.target_key.clone()));
        self.copies.lock().unwrap().push(request.clone());
        Ok(())
    }

    async fn object_exists(&self, bucket: &str, key: &str) -> Result<bool, store::Error> {
        self.head_calls.fetch_add(1, Ordering::SeqCst);
        let hidden = self
            .copies
            .lock()
            .unwrap()
            .iter()
            .any(|copy| copy.target_key == key && self.invisible.contains(&copy.source_key));
        Ok(!hidden && self.contains(bucket, key))
    }
}
