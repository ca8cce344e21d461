use anyhow::anyhow;
use tracing::instrument;

use crate::deadline::Deadline;
use crate::location::Location;

/// Produces the source keys of a batch, one page at a time.
#[derive(Debug)]
pub enum KeyLister {
    /// Non-recursive mode: the source key, taken verbatim, then nothing.
    Single(Option<String>),
    /// Recursive mode: every key under `prefix`, in listing order.
    Listing {
        bucket: String,
        prefix: String,
        continuation: Option<String>,
        exhausted: bool,
    },
}

impl KeyLister {
    #[must_use]
    pub fn new(source: &Location, recursive: bool) -> Self {
        if recursive {
            KeyLister::Listing {
                bucket: source.bucket().to_string(),
                prefix: source.key().to_string(),
                continuation: None,
                exhausted: false,
            }
        } else {
            KeyLister::Single(Some(source.key().to_string()))
        }
    }

    /// Next page of keys, or `None` once the listing is complete. Pages may be empty.
    ///
    /// Any failure (including the deadline firing mid-request) is fatal for the batch: a partial
    /// listing is never trusted.
    #[instrument(skip(store, deadline))]
    pub async fn next_page(
        &mut self,
        store: &dyn store::ObjectStore,
        deadline: &Deadline,
    ) -> anyhow::Result<Option<Vec<String>>> {
        match self {
            KeyLister::Single(key) => Ok(key.take().map(|key| vec![key])),
            KeyLister::Listing {
                bucket,
                prefix,
                continuation,
                exhausted,
            } => {
                if *exhausted {
                    return Ok(None);
                }
                let page = deadline
                    .run(store.list_objects(bucket, prefix, continuation.take()))
                    .await
                    .map_err(|exceeded| anyhow!(exceeded).context("listing interrupted"))??;
                tracing::debug!("received page with {} key(s)", page.keys.len());
                match page.continuation {
                    Some(token) => *continuation = Some(token),
                    None => *exhausted = true,
                }
                Ok(Some(page.keys))
            }
        }
    }
}
