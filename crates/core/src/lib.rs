pub mod auth;
pub mod filter;
pub mod item;
pub mod normalize;
pub mod source;
pub mod store;

pub use auth::AuthContext;
pub use filter::FeedFilter;
pub use item::*;
pub use normalize::{ItemNormalizer, MalformedItemError, NormalizedBatch};
pub use source::{FetchError, HistorySource};
pub use store::{FeedStore, MergeOutcome};

#[cfg(any(test, feature = "testing"))]
pub mod testing;
