use std::sync::Arc;

use crate::item::FeedItem;

/// Free-text predicate over feed items.
///
/// Matching is a case-insensitive substring test against each item's
/// precomputed search text. The input order is preserved and items are
/// shared, never copied.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedFilter {
    needle: String,
}

impl FeedFilter {
    pub fn new(text: &str) -> Self {
        Self {
            needle: text.trim().to_lowercase(),
        }
    }

    /// True when the predicate matches everything.
    pub fn is_empty(&self) -> bool {
        self.needle.is_empty()
    }

    pub fn matches(&self, item: &FeedItem) -> bool {
        self.is_empty() || item.searchable_text().contains(&self.needle)
    }

    pub fn apply(&self, items: &[Arc<FeedItem>]) -> Vec<Arc<FeedItem>> {
        if self.is_empty() {
            return items.to_vec();
        }
        items
            .iter()
            .filter(|item| self.matches(item))
            .cloned()
            .collect()
    }
}

/// One-shot form of [`FeedFilter::apply`].
pub fn apply(items: &[Arc<FeedItem>], predicate: &str) -> Vec<Arc<FeedItem>> {
    FeedFilter::new(predicate).apply(items)
}
