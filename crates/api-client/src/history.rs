use brewfeed_core::{AuthContext, FetchError, HistorySource, ItemNormalizer, NormalizedBatch};
use tracing::{debug, warn};

use crate::client::ApiClient;

/// Pulls the current feed window over HTTP and normalizes it.
///
/// There is no retry here: the controller decides when to fetch again.
#[derive(Clone)]
pub struct HistoryFetcher {
    api: ApiClient,
    normalizer: ItemNormalizer,
}

impl HistoryFetcher {
    pub fn new(api: ApiClient) -> Self {
        Self {
            api,
            normalizer: ItemNormalizer::new(),
        }
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }
}

impl HistorySource for HistoryFetcher {
    async fn fetch_window(&self, auth: &AuthContext) -> Result<NormalizedBatch, FetchError> {
        let records = match self.api.feed_window(auth).await {
            Ok(records) => records,
            Err(e) => {
                warn!("Feed history fetch failed: {e}");
                return Err(e.into());
            }
        };
        let batch = self.normalizer.normalize_batch(&records, None);
        debug!(
            "Fetched feed window: {} items, {} dropped",
            batch.items.len(),
            batch.dropped
        );
        Ok(batch)
    }
}
