use std::future::Future;
use thiserror::Error;

use crate::auth::AuthContext;
use crate::normalize::NormalizedBatch;

/// The history request failed as a whole. Always recoverable: callers keep
/// what they already have and may retry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum FetchError {
    #[error("request failed: {0}")]
    Transport(String),
    #[error("server returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("unexpected response body: {0}")]
    Decode(String),
}

/// Pull-based source of the current feed window.
pub trait HistorySource: Send + Sync + 'static {
    fn fetch_window(
        &self,
        auth: &AuthContext,
    ) -> impl Future<Output = Result<NormalizedBatch, FetchError>> + Send;
}
