use brewfeed_core::AuthContext;
use std::future::Future;
use thiserror::Error;

/// Connection-level failure. Never fatal: the channel backs off and retries.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    #[error("subscription rejected: {0}")]
    Rejected(String),
    #[error("transport error: {0}")]
    Transport(String),
}

/// A push source that can open subscriptions to a named topic.
pub trait LiveTransport: Send + Sync + 'static {
    type Subscription: LiveSubscription;

    /// Resolves once the server has acknowledged the subscription.
    fn subscribe(
        &self,
        topic: &str,
        auth: &AuthContext,
    ) -> impl Future<Output = Result<Self::Subscription, ChannelError>> + Send;
}

/// An open subscription delivering raw message payloads.
pub trait LiveSubscription: Send + 'static {
    /// Next payload. `None` (or an error) means the transport dropped.
    fn recv(&mut self) -> impl Future<Output = Option<Result<String, ChannelError>>> + Send;

    fn unsubscribe(self) -> impl Future<Output = ()> + Send
    where
        Self: Sized,
    {
        async {}
    }
}
