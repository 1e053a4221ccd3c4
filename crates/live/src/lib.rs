pub mod backoff;
pub mod channel;
pub mod sse;
pub mod transport;

pub use backoff::Backoff;
pub use channel::{ChannelState, LiveChannel, LiveEvent, LiveOptions};
pub use sse::{SseDecoder, SseTransport};
pub use transport::{ChannelError, LiveSubscription, LiveTransport};

#[cfg(any(test, feature = "testing"))]
pub mod testing;
