use anyhow::{Context, Result};
use brewfeed_api_client::{ApiClient, HistoryFetcher};
use brewfeed_core::{FeedFilter, FeedStore, HistorySource};
use brewfeed_runtime_config::FeedConfig;
use tracing::{info, warn};

use crate::FeedArgs;
use crate::config::auth_context;
use crate::output::print_items;

/// One-shot history fetch through the same normalize/merge/filter path the
/// live feed uses.
pub async fn run_fetch(config: &FeedConfig, args: &FeedArgs) -> Result<()> {
    let auth = auth_context(config)?;
    let api = ApiClient::new(&config.server.url, config.server.request_timeout())
        .context("Failed to build HTTP client")?;
    let fetcher = HistoryFetcher::new(api);

    let batch = fetcher
        .fetch_window(&auth)
        .await
        .with_context(|| format!("Failed to fetch feed from {}", config.server.url))?;
    if batch.dropped > 0 {
        warn!("Skipped {} malformed records", batch.dropped);
    }

    let mut store = FeedStore::new();
    store.merge_batch(batch.items);
    let filter = FeedFilter::new(args.search.as_deref().unwrap_or_default());
    let items = filter.apply(&store.snapshot());
    info!("{} of {} items shown", items.len(), store.len());

    print_items(&items, args.json)
}
