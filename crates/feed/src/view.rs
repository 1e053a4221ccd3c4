use std::sync::Arc;

use brewfeed_core::FeedItem;
use brewfeed_live::ChannelState;

/// What the hosting UI renders. Published by the controller after every
/// change; cheap to clone since items are shared.
#[derive(Debug, Clone)]
pub struct FeedView {
    /// Filtered items, newest first.
    pub items: Vec<Arc<FeedItem>>,
    /// Items in the store before filtering.
    pub total: usize,
    pub search: String,
    pub active: bool,
    pub loading: bool,
    /// Last history fetch failure. Transient: cleared by the next fetch.
    pub fetch_error: Option<String>,
    /// Set once the live channel has exceeded its retry budget; cleared when
    /// it connects again.
    pub connectivity_warning: Option<String>,
    pub channel: ChannelState,
    pub reconnecting: bool,
    /// Items that arrived after the initial load and have not been marked
    /// seen.
    pub unseen: usize,
    /// Records dropped as malformed, from history and live delivery.
    pub dropped: usize,
}

impl Default for FeedView {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            total: 0,
            search: String::new(),
            active: false,
            loading: false,
            fetch_error: None,
            connectivity_warning: None,
            channel: ChannelState::Disconnected,
            reconnecting: false,
            unseen: 0,
            dropped: 0,
        }
    }
}

impl FeedView {
    /// The single banner line to show, if any. A persistent connectivity
    /// warning outranks a transient fetch error.
    pub fn message(&self) -> Option<&str> {
        self.connectivity_warning
            .as_deref()
            .or(self.fetch_error.as_deref())
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
