use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use brewfeed_core::{AuthContext, FeedItem, ItemNormalizer};
use brewfeed_runtime_config::LiveSettings;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::backoff::Backoff;
use crate::transport::{LiveSubscription, LiveTransport};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Disconnected,
    Connecting,
    Connected,
}

/// What the channel reports to its owner.
#[derive(Debug, Clone)]
pub enum LiveEvent {
    Item(FeedItem),
    State(ChannelState),
    /// The connection is down; the next attempt starts after `delay`.
    Reconnecting { attempt: u32, delay: Duration },
    /// More than `max_reconnect_attempts` consecutive failures. Sent once per
    /// outage; retries continue at the capped delay.
    RetryBudgetExhausted { failures: u32 },
}

#[derive(Debug, Clone)]
pub struct LiveOptions {
    pub topic: String,
    pub backoff: Backoff,
    pub max_reconnect_attempts: u32,
    /// A connection that stays up this long resets the backoff even if it
    /// delivered nothing.
    pub stable_after: Duration,
}

impl Default for LiveOptions {
    fn default() -> Self {
        Self::from(&LiveSettings::default())
    }
}

impl From<&LiveSettings> for LiveOptions {
    fn from(settings: &LiveSettings) -> Self {
        Self {
            topic: settings.topic.clone(),
            backoff: Backoff::new(
                settings.base_delay(),
                settings.backoff_factor,
                settings.max_delay(),
            ),
            max_reconnect_attempts: settings.max_reconnect_attempts,
            stable_after: settings.stable_after(),
        }
    }
}

struct Worker {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Subscription to the live feed topic with automatic reconnect.
///
/// `start` and `stop` are idempotent. While started, a background task walks
/// `Connecting -> Connected -> Disconnected` and back, backing off between
/// attempts, until `stop` is called or the event receiver is dropped.
pub struct LiveChannel<T: LiveTransport> {
    transport: Arc<T>,
    options: LiveOptions,
    state: Arc<watch::Sender<ChannelState>>,
    dropped: Arc<AtomicUsize>,
    worker: Option<Worker>,
}

impl<T: LiveTransport> LiveChannel<T> {
    pub fn new(transport: T, options: LiveOptions) -> Self {
        let (state, _) = watch::channel(ChannelState::Disconnected);
        Self {
            transport: Arc::new(transport),
            options,
            state: Arc::new(state),
            dropped: Arc::new(AtomicUsize::new(0)),
            worker: None,
        }
    }

    pub fn state(&self) -> ChannelState {
        *self.state.borrow()
    }

    /// Watch the channel state without going through the event stream.
    pub fn watch_state(&self) -> watch::Receiver<ChannelState> {
        self.state.subscribe()
    }

    /// Payloads that could not be decoded or normalized since creation.
    pub fn dropped_payloads(&self) -> usize {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn is_running(&self) -> bool {
        self.worker
            .as_ref()
            .is_some_and(|worker| !worker.handle.is_finished())
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Begin connecting. Items and status changes go to `events`.
    pub fn start(&mut self, auth: AuthContext, events: mpsc::UnboundedSender<LiveEvent>) {
        if self.is_running() {
            debug!("Live channel already running, ignoring start");
            return;
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let ctx = WorkerContext {
            transport: Arc::clone(&self.transport),
            options: self.options.clone(),
            state: Arc::clone(&self.state),
            dropped: Arc::clone(&self.dropped),
            normalizer: ItemNormalizer::new(),
            events,
        };
        let handle = tokio::spawn(run_worker(ctx, auth, shutdown_rx));
        self.worker = Some(Worker {
            shutdown: shutdown_tx,
            handle,
        });
    }

    /// Unsubscribe and cancel any pending reconnect. The state becomes
    /// `Disconnected` immediately and stays there until the next `start`.
    pub fn stop(&mut self) {
        if let Some(worker) = self.worker.take() {
            let _ = worker.shutdown.send(true);
            debug!("Live channel stop requested");
        }
        self.state.send_replace(ChannelState::Disconnected);
    }

    /// Like [`LiveChannel::stop`], but waits for the worker to finish
    /// unsubscribing.
    pub async fn shutdown(&mut self) {
        if let Some(worker) = self.worker.take() {
            let _ = worker.shutdown.send(true);
            if let Err(e) = worker.handle.await {
                warn!("Live channel worker ended abnormally: {e}");
            }
        }
        self.state.send_replace(ChannelState::Disconnected);
    }
}

impl<T: LiveTransport> Drop for LiveChannel<T> {
    fn drop(&mut self) {
        self.stop();
    }
}

struct WorkerContext<T> {
    transport: Arc<T>,
    options: LiveOptions,
    state: Arc<watch::Sender<ChannelState>>,
    dropped: Arc<AtomicUsize>,
    normalizer: ItemNormalizer,
    events: mpsc::UnboundedSender<LiveEvent>,
}

impl<T> WorkerContext<T> {
    fn set_state(&self, state: ChannelState, shutdown: &watch::Receiver<bool>) {
        // After stop the owner has already published the terminal state.
        if *shutdown.borrow() {
            return;
        }
        self.state.send_replace(state);
        let _ = self.events.send(LiveEvent::State(state));
    }

    fn emit(&self, event: LiveEvent) -> bool {
        self.events.send(event).is_ok()
    }

    fn handle_payload(&self, payload: &str) -> bool {
        let item = serde_json::from_str::<serde_json::Value>(payload)
            .map_err(|e| e.to_string())
            .and_then(|value| {
                self.normalizer
                    .normalize(&value, None)
                    .map_err(|e| e.to_string())
            });
        match item {
            Ok(item) => self.emit(LiveEvent::Item(item)),
            Err(reason) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                warn!("Dropping malformed live payload: {reason}");
                true
            }
        }
    }
}

enum PumpOutcome {
    Stopped,
    Dropped { received: usize, reason: String },
}

/// Resolves when the owner asks to stop or stops listening.
async fn stop_requested(
    shutdown: &mut watch::Receiver<bool>,
    events: &mpsc::UnboundedSender<LiveEvent>,
) {
    let stop = async {
        // A dropped sender counts as a stop too.
        let _ = shutdown.wait_for(|stopped| *stopped).await.map(|_| ());
    };
    tokio::select! {
        _ = stop => {}
        _ = events.closed() => {}
    }
}

async fn run_worker<T: LiveTransport>(
    ctx: WorkerContext<T>,
    auth: AuthContext,
    mut shutdown: watch::Receiver<bool>,
) {
    let topic = ctx.options.topic.clone();
    let mut failures: u32 = 0;
    let mut warned = false;

    loop {
        ctx.set_state(ChannelState::Connecting, &shutdown);
        let subscribed = tokio::select! {
            biased;
            _ = stop_requested(&mut shutdown, &ctx.events) => break,
            result = ctx.transport.subscribe(&topic, &auth) => result,
        };

        match subscribed {
            Ok(mut subscription) => {
                info!("Live channel connected to topic {topic}");
                ctx.set_state(ChannelState::Connected, &shutdown);
                warned = false;
                let connected_at = Instant::now();

                match pump(&ctx, &mut subscription, &mut shutdown).await {
                    PumpOutcome::Stopped => {
                        subscription.unsubscribe().await;
                        break;
                    }
                    PumpOutcome::Dropped { received, reason } => {
                        if received > 0 || connected_at.elapsed() >= ctx.options.stable_after {
                            failures = 0;
                        }
                        warn!("Live channel dropped after {received} messages: {reason}");
                    }
                }
            }
            Err(e) => warn!("Live channel subscribe failed: {e}"),
        }

        ctx.set_state(ChannelState::Disconnected, &shutdown);
        failures = failures.saturating_add(1);
        if failures > ctx.options.max_reconnect_attempts && !warned {
            warned = true;
            warn!("Live channel still down after {failures} consecutive failures");
            ctx.emit(LiveEvent::RetryBudgetExhausted { failures });
        }

        let delay = ctx.options.backoff.delay(failures - 1);
        info!("Reconnecting live channel in {delay:?} (attempt {failures})");
        if !ctx.emit(LiveEvent::Reconnecting {
            attempt: failures,
            delay,
        }) {
            break;
        }

        tokio::select! {
            biased;
            _ = stop_requested(&mut shutdown, &ctx.events) => break,
            _ = tokio::time::sleep(delay) => {}
        }
    }

    debug!("Live channel worker for topic {topic} stopped");
}

async fn pump<T, S: LiveSubscription>(
    ctx: &WorkerContext<T>,
    subscription: &mut S,
    shutdown: &mut watch::Receiver<bool>,
) -> PumpOutcome {
    let mut received = 0usize;
    loop {
        let next = tokio::select! {
            biased;
            _ = stop_requested(shutdown, &ctx.events) => return PumpOutcome::Stopped,
            next = subscription.recv() => next,
        };

        match next {
            Some(Ok(payload)) => {
                received += 1;
                if !ctx.handle_payload(&payload) {
                    return PumpOutcome::Stopped;
                }
            }
            Some(Err(e)) => {
                return PumpOutcome::Dropped {
                    received,
                    reason: e.to_string(),
                };
            }
            None => {
                return PumpOutcome::Dropped {
                    received,
                    reason: "stream closed".to_string(),
                };
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_follow_settings() {
        let settings = LiveSettings {
            topic: "bars".to_string(),
            base_delay_ms: 500,
            backoff_factor: 3,
            max_delay_ms: 4_000,
            max_reconnect_attempts: 2,
            stable_after_secs: 7,
            ..LiveSettings::default()
        };
        let options = LiveOptions::from(&settings);
        assert_eq!(options.topic, "bars");
        assert_eq!(options.backoff.delay(0), Duration::from_millis(500));
        assert_eq!(options.backoff.delay(1), Duration::from_millis(1_500));
        assert_eq!(options.backoff.delay(3), Duration::from_millis(4_000));
        assert_eq!(options.max_reconnect_attempts, 2);
        assert_eq!(options.stable_after, Duration::from_secs(7));
    }
}
