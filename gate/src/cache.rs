use crate::metrics_defs::{CACHE_HIT, CACHE_MISS, CACHE_WRITE};
use crate::store::{FINAL_URL_KEY, StateStore};
use shared::counter;
use std::sync::Arc;
use url::Url;

/// Memo of the last live `Remote` outcome.
///
/// Entries never expire. The only invalidation is an external
/// [`StateStore::clear`].
#[derive(Clone)]
pub struct ResultCache {
    store: Arc<dyn StateStore>,
}

impl ResultCache {
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        ResultCache { store }
    }

    /// Returns the cached destination, if any. An unreadable store or an
    /// entry that no longer parses counts as a miss.
    pub fn load(&self) -> Option<Url> {
        let cached = match self.store.get(FINAL_URL_KEY) {
            Ok(cached) => cached,
            Err(err) => {
                tracing::warn!(error = %err, "Could not read cached destination");
                None
            }
        };

        let url = cached.and_then(|raw| match Url::parse(&raw) {
            Ok(url) => Some(url),
            Err(err) => {
                tracing::warn!(cached = %raw, error = %err, "Ignoring unparsable cached destination");
                None
            }
        });

        let metric_def = if url.is_some() { CACHE_HIT } else { CACHE_MISS };
        counter!(metric_def).increment(1);
        url
    }

    pub fn store(&self, url: &Url) {
        match self.store.set(FINAL_URL_KEY, url.as_str()) {
            Ok(()) => {
                counter!(CACHE_WRITE).increment(1);
                tracing::info!(url = %url, "Cached final URL");
            }
            Err(err) => tracing::error!(url = %url, error = %err, "Could not cache final URL"),
        }
    }
}
