use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};

use brewfeed_core::AuthContext;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::transport::{ChannelError, LiveSubscription, LiveTransport};

struct Connection {
    id: u32,
    tx: mpsc::UnboundedSender<String>,
}

#[derive(Default)]
struct Inner {
    fail_next: u32,
    current: Option<Connection>,
    subscribes: u32,
    unsubscribes: u32,
    topics: Vec<String>,
}

/// In-process pub/sub transport for tests.
///
/// Clones share state, so a test keeps one handle to publish or drop the
/// connection while the channel owns another.
#[derive(Clone, Default)]
pub struct MemoryTransport {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Make the next `n` subscribe attempts fail.
    pub fn fail_next(&self, n: u32) {
        self.lock().fail_next = n;
    }

    /// Deliver a raw payload to the open subscription, if any.
    pub fn publish(&self, payload: impl Into<String>) -> bool {
        match &self.lock().current {
            Some(conn) => conn.tx.send(payload.into()).is_ok(),
            None => false,
        }
    }

    pub fn publish_json(&self, value: &Value) -> bool {
        self.publish(value.to_string())
    }

    /// Close the open subscription as if the network went away.
    pub fn drop_connection(&self) -> bool {
        self.lock().current.take().is_some()
    }

    pub fn is_connected(&self) -> bool {
        self.lock()
            .current
            .as_ref()
            .is_some_and(|conn| !conn.tx.is_closed())
    }

    pub fn subscribe_count(&self) -> u32 {
        self.lock().subscribes
    }

    pub fn unsubscribe_count(&self) -> u32 {
        self.lock().unsubscribes
    }

    pub fn topics(&self) -> Vec<String> {
        self.lock().topics.clone()
    }

    fn open(&self, topic: &str) -> Result<MemorySubscription, ChannelError> {
        let mut inner = self.lock();
        inner.subscribes += 1;
        inner.topics.push(topic.to_string());
        if inner.fail_next > 0 {
            inner.fail_next -= 1;
            return Err(ChannelError::Transport("scripted failure".to_string()));
        }
        let (tx, rx) = mpsc::unbounded_channel();
        let id = inner.subscribes;
        inner.current = Some(Connection { id, tx });
        Ok(MemorySubscription {
            id,
            rx,
            inner: Arc::clone(&self.inner),
        })
    }
}

impl LiveTransport for MemoryTransport {
    type Subscription = MemorySubscription;

    fn subscribe(
        &self,
        topic: &str,
        _auth: &AuthContext,
    ) -> impl Future<Output = Result<MemorySubscription, ChannelError>> + Send {
        std::future::ready(self.open(topic))
    }
}

pub struct MemorySubscription {
    id: u32,
    rx: mpsc::UnboundedReceiver<String>,
    inner: Arc<Mutex<Inner>>,
}

impl LiveSubscription for MemorySubscription {
    async fn recv(&mut self) -> Option<Result<String, ChannelError>> {
        self.rx.recv().await.map(Ok)
    }

    async fn unsubscribe(self) {
        let mut inner = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        inner.unsubscribes += 1;
        // A newer connection may already be open; leave it alone.
        if inner.current.as_ref().is_some_and(|conn| conn.id == self.id) {
            inner.current = None;
        }
    }
}
