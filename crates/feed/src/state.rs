use brewfeed_core::{FeedFilter, FeedItem, FeedStore, FetchError, MergeOutcome, NormalizedBatch};
use brewfeed_live::ChannelState;

use crate::view::FeedView;

/// Synchronous half of the controller: the store plus everything the view
/// is derived from. Never suspends.
#[derive(Debug)]
pub(crate) struct FeedState {
    store: FeedStore,
    filter: FeedFilter,
    search: String,
    loading: bool,
    /// The first history fetch of this activation has settled, either way.
    settled: bool,
    /// A history window has been merged; later history inserts are unseen.
    baseline: bool,
    fetch_error: Option<String>,
    connectivity_warning: Option<String>,
    channel: ChannelState,
    reconnecting: bool,
    unseen: usize,
    history_dropped: usize,
}

impl FeedState {
    pub(crate) fn new(search: &str) -> Self {
        Self {
            store: FeedStore::new(),
            filter: FeedFilter::new(search),
            search: search.to_string(),
            loading: false,
            settled: false,
            baseline: false,
            fetch_error: None,
            connectivity_warning: None,
            channel: ChannelState::Disconnected,
            reconnecting: false,
            unseen: 0,
            history_dropped: 0,
        }
    }

    pub(crate) fn search(&self) -> &str {
        &self.search
    }

    pub(crate) fn is_loading(&self) -> bool {
        self.loading
    }

    pub(crate) fn has_settled(&self) -> bool {
        self.settled
    }

    /// Back to an empty, never-fetched feed. The search text survives.
    pub(crate) fn reset(&mut self) {
        self.store.clear();
        self.loading = false;
        self.settled = false;
        self.baseline = false;
        self.fetch_error = None;
        self.connectivity_warning = None;
        self.channel = ChannelState::Disconnected;
        self.reconnecting = false;
        self.unseen = 0;
        self.history_dropped = 0;
    }

    pub(crate) fn begin_fetch(&mut self) {
        self.loading = true;
        self.fetch_error = None;
    }

    pub(crate) fn clear_errors(&mut self) {
        self.fetch_error = None;
        self.connectivity_warning = None;
    }

    /// Merge a history window. Returns how many keys were new.
    pub(crate) fn apply_history(&mut self, batch: NormalizedBatch) -> usize {
        self.loading = false;
        self.history_dropped += batch.dropped;
        let inserted = self.store.merge_batch(batch.items);
        if self.baseline {
            self.unseen += inserted;
        }
        self.settled = true;
        self.baseline = true;
        inserted
    }

    /// Existing content stays; only the banner changes.
    pub(crate) fn fetch_failed(&mut self, error: &FetchError) {
        self.loading = false;
        self.settled = true;
        self.fetch_error = Some(format!("Could not refresh the feed: {error}"));
    }

    pub(crate) fn apply_live(&mut self, item: FeedItem) -> MergeOutcome {
        let outcome = self.store.merge_one(item);
        if outcome == MergeOutcome::Inserted && self.settled {
            self.unseen += 1;
        }
        outcome
    }

    pub(crate) fn set_channel(&mut self, state: ChannelState) {
        self.channel = state;
        if state == ChannelState::Connected {
            self.reconnecting = false;
            self.connectivity_warning = None;
        }
    }

    pub(crate) fn set_reconnecting(&mut self) {
        self.reconnecting = true;
    }

    pub(crate) fn retry_budget_exhausted(&mut self, failures: u32) {
        self.connectivity_warning = Some(format!(
            "Live updates unavailable after {failures} attempts; showing last known feed"
        ));
    }

    pub(crate) fn set_search(&mut self, text: &str) {
        self.filter = FeedFilter::new(text);
        self.search = text.to_string();
    }

    pub(crate) fn mark_seen(&mut self) {
        self.unseen = 0;
    }

    pub(crate) fn view(&self, active: bool, live_dropped: usize) -> FeedView {
        let snapshot = self.store.snapshot();
        FeedView {
            total: snapshot.len(),
            items: self.filter.apply(&snapshot),
            search: self.search.clone(),
            active,
            loading: self.loading,
            fetch_error: self.fetch_error.clone(),
            connectivity_warning: self.connectivity_warning.clone(),
            channel: self.channel,
            reconnecting: self.reconnecting,
            unseen: self.unseen,
            dropped: self.history_dropped + live_dropped,
        }
    }
}
