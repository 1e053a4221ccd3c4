pub mod client;
pub mod history;

pub use brewfeed_core;
pub use client::{ApiClient, ClientError, FEED_PATH, FEED_STREAM_PATH};
pub use history::HistoryFetcher;
