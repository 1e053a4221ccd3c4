use chrono::{DateTime, Utc};
use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::item::{FeedItem, FeedKey};

/// Position of an entry: newest first, then by first-insertion sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct OrderKey {
    created_at: Reverse<DateTime<Utc>>,
    seq: u64,
}

#[derive(Debug)]
struct Slot {
    order: OrderKey,
    item: Arc<FeedItem>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    Inserted,
    Replaced,
}

/// Ordered, deduplicated set of feed items keyed by [`FeedKey`].
///
/// Upserting an existing key replaces its content but keeps its original
/// sequence number, so a re-fetch never reorders items that tie on
/// `created_at`.
#[derive(Debug, Default)]
pub struct FeedStore {
    slots: HashMap<FeedKey, Slot>,
    order: BTreeMap<OrderKey, FeedKey>,
    next_seq: u64,
}

impl FeedStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Upsert one item. O(log n).
    pub fn merge_one(&mut self, item: FeedItem) -> MergeOutcome {
        let key = item.key();
        let created_at = Reverse(item.created_at());
        let item = Arc::new(item);

        if let Some(slot) = self.slots.get_mut(&key) {
            if slot.order.created_at != created_at {
                self.order.remove(&slot.order);
                slot.order.created_at = created_at;
                self.order.insert(slot.order, key);
            }
            slot.item = item;
            return MergeOutcome::Replaced;
        }

        let order = OrderKey {
            created_at,
            seq: self.next_seq,
        };
        self.next_seq += 1;
        self.order.insert(order, key.clone());
        self.slots.insert(key, Slot { order, item });
        MergeOutcome::Inserted
    }

    /// Upsert every item in order; returns how many keys were not present before.
    pub fn merge_batch(&mut self, items: impl IntoIterator<Item = FeedItem>) -> usize {
        items
            .into_iter()
            .map(|item| self.merge_one(item))
            .filter(|outcome| *outcome == MergeOutcome::Inserted)
            .count()
    }

    /// Items in display order. The returned vector is independent of the store.
    pub fn snapshot(&self) -> Vec<Arc<FeedItem>> {
        self.order
            .values()
            .filter_map(|key| self.slots.get(key))
            .map(|slot| Arc::clone(&slot.item))
            .collect()
    }

    pub fn get(&self, key: &FeedKey) -> Option<Arc<FeedItem>> {
        self.slots.get(key).map(|slot| Arc::clone(&slot.item))
    }

    pub fn contains(&self, key: &FeedKey) -> bool {
        self.slots.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn clear(&mut self) {
        self.slots.clear();
        self.order.clear();
    }
}
