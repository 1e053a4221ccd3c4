use std::sync::Arc;

use brewfeed_core::{AuthContext, FetchError, HistorySource, NormalizedBatch};
use brewfeed_live::{ChannelState, LiveChannel, LiveEvent, LiveOptions, LiveTransport};
use brewfeed_runtime_config::FeedConfig;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::state::FeedState;
use crate::view::FeedView;

#[derive(Debug, Clone)]
pub struct ControllerOptions {
    /// Re-fetch history when the live channel comes back after a drop.
    pub refresh_on_reconnect: bool,
    /// `None` runs the feed from history fetches only.
    pub live: Option<LiveOptions>,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self {
            refresh_on_reconnect: true,
            live: Some(LiveOptions::default()),
        }
    }
}

impl From<&FeedConfig> for ControllerOptions {
    fn from(config: &FeedConfig) -> Self {
        Self {
            refresh_on_reconnect: config.feed.refresh_on_reconnect,
            live: config
                .live
                .enabled
                .then(|| LiveOptions::from(&config.live)),
        }
    }
}

enum Command {
    Activate(AuthContext),
    Refresh,
    SetSearch(String),
    MarkSeen,
    Deactivate,
    Shutdown,
}

/// Handle to a running feed controller.
///
/// All methods enqueue work for a single background task that owns the
/// store, so merges from history and live delivery never interleave. The
/// current [`FeedView`] is published on a watch channel after every change.
pub struct FeedController {
    commands: mpsc::UnboundedSender<Command>,
    view: watch::Receiver<FeedView>,
    task: Option<JoinHandle<()>>,
}

impl FeedController {
    /// Start the controller task. Must be called inside a tokio runtime.
    pub fn spawn<H, T>(history: H, transport: T, options: ControllerOptions) -> Self
    where
        H: HistorySource,
        T: LiveTransport,
    {
        let (task, commands, view) = ControllerTask::new(history, transport, options);
        let task = tokio::spawn(task.run());
        Self {
            commands,
            view,
            task: Some(task),
        }
    }

    fn send(&self, command: Command) {
        if self.commands.send(command).is_err() {
            debug!("Feed controller already stopped, dropping command");
        }
    }

    /// Load history for `auth` and go live. Activating again for the same
    /// user refreshes; a different user starts from an empty store.
    pub fn activate(&self, auth: AuthContext) {
        self.send(Command::Activate(auth));
    }

    /// Re-fetch history without touching the live channel. Ignored while a
    /// fetch is already running or the feed is inactive.
    pub fn refresh(&self) {
        self.send(Command::Refresh);
    }

    pub fn set_search(&self, text: impl Into<String>) {
        self.send(Command::SetSearch(text.into()));
    }

    pub fn mark_seen(&self) {
        self.send(Command::MarkSeen);
    }

    /// Stop the live channel and drop the feed. Idempotent; results of any
    /// fetch still in flight are discarded.
    pub fn deactivate(&self) {
        self.send(Command::Deactivate);
    }

    pub fn view(&self) -> FeedView {
        self.view.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<FeedView> {
        self.view.clone()
    }

    /// Deactivate and wait for the controller task (and the live channel)
    /// to finish.
    pub async fn shutdown(mut self) {
        self.send(Command::Shutdown);
        if let Some(task) = self.task.take()
            && let Err(e) = task.await
        {
            warn!("Feed controller task ended abnormally: {e}");
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FetchReason {
    Activation,
    Reactivation,
    Refresh,
    Reconnect,
}

impl FetchReason {
    fn as_str(self) -> &'static str {
        match self {
            Self::Activation => "activation",
            Self::Reactivation => "re-activation",
            Self::Refresh => "refresh",
            Self::Reconnect => "reconnect",
        }
    }
}

struct FetchDone {
    generation: u64,
    result: Result<NormalizedBatch, FetchError>,
}

enum Input {
    Command(Command),
    Fetched(FetchDone),
    Live(LiveEvent),
}

struct ControllerTask<H, T: LiveTransport> {
    history: Arc<H>,
    channel: Option<LiveChannel<T>>,
    refresh_on_reconnect: bool,
    state: FeedState,
    auth: Option<AuthContext>,
    /// Bumped on every teardown; results tagged with an older value are stale.
    generation: u64,
    inflight: Option<JoinHandle<()>>,
    /// A reconnect arrived while a fetch was running; fetch again once it
    /// settles, since that window predates the outage.
    refresh_pending: bool,
    has_connected: bool,
    live_dropped_base: usize,
    commands: mpsc::UnboundedReceiver<Command>,
    fetch_tx: mpsc::UnboundedSender<FetchDone>,
    fetch_rx: mpsc::UnboundedReceiver<FetchDone>,
    live_events: Option<mpsc::UnboundedReceiver<LiveEvent>>,
    view: watch::Sender<FeedView>,
}

impl<H: HistorySource, T: LiveTransport> ControllerTask<H, T> {
    fn new(
        history: H,
        transport: T,
        options: ControllerOptions,
    ) -> (
        Self,
        mpsc::UnboundedSender<Command>,
        watch::Receiver<FeedView>,
    ) {
        let (command_tx, commands) = mpsc::unbounded_channel();
        let (fetch_tx, fetch_rx) = mpsc::unbounded_channel();
        let (view, view_rx) = watch::channel(FeedView::default());
        let task = Self {
            history: Arc::new(history),
            channel: options
                .live
                .map(|live| LiveChannel::new(transport, live)),
            refresh_on_reconnect: options.refresh_on_reconnect,
            state: FeedState::new(""),
            auth: None,
            generation: 0,
            inflight: None,
            refresh_pending: false,
            has_connected: false,
            live_dropped_base: 0,
            commands,
            fetch_tx,
            fetch_rx,
            live_events: None,
            view,
        };
        (task, command_tx, view_rx)
    }

    async fn run(mut self) {
        loop {
            let input = tokio::select! {
                command = self.commands.recv() => match command {
                    Some(command) => Input::Command(command),
                    None => break,
                },
                Some(done) = self.fetch_rx.recv() => Input::Fetched(done),
                event = next_live(&mut self.live_events) => Input::Live(event),
            };

            match input {
                Input::Command(Command::Shutdown) => break,
                Input::Command(command) => self.handle_command(command),
                Input::Fetched(done) => self.handle_fetch(done),
                Input::Live(event) => self.handle_live(event),
            }
            self.publish();
        }

        self.teardown();
        self.publish();
        if let Some(channel) = self.channel.as_mut() {
            channel.shutdown().await;
        }
        debug!("Feed controller stopped");
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Activate(auth) => self.activate(auth),
            Command::Refresh => {
                if self.auth.is_some() {
                    self.start_fetch(FetchReason::Refresh);
                } else {
                    debug!("Refresh ignored: feed is not active");
                }
            }
            Command::SetSearch(text) => self.state.set_search(&text),
            Command::MarkSeen => self.state.mark_seen(),
            Command::Deactivate => {
                if self.auth.is_some() {
                    info!("Deactivating feed");
                }
                self.teardown();
            }
            Command::Shutdown => {}
        }
    }

    fn activate(&mut self, auth: AuthContext) {
        let same_user = self.auth.as_ref().map(|current| current.same_user(&auth));
        match same_user {
            Some(true) => {
                debug!("Feed already active for user {}, refreshing", auth.user_id);
                self.auth = Some(auth);
                self.state.clear_errors();
                self.start_fetch(FetchReason::Reactivation);
                return;
            }
            Some(false) => {
                info!("Active user changed, resetting feed");
                self.teardown();
            }
            None => {}
        }

        info!("Activating feed for user {}", auth.user_id);
        self.auth = Some(auth);
        self.state.clear_errors();
        self.start_fetch(FetchReason::Activation);
    }

    /// Drop everything tied to the current activation. The search text is
    /// the only thing that survives.
    fn teardown(&mut self) {
        self.generation = self.generation.wrapping_add(1);
        if let Some(fetch) = self.inflight.take() {
            fetch.abort();
        }
        if let Some(channel) = self.channel.as_mut() {
            channel.stop();
        }
        self.live_events = None;
        self.auth = None;
        self.refresh_pending = false;
        self.has_connected = false;
        self.state.reset();
    }

    fn start_fetch(&mut self, reason: FetchReason) {
        let Some(auth) = self.auth.clone() else {
            return;
        };
        if self.state.is_loading() {
            if reason == FetchReason::Reconnect {
                debug!("History fetch already in flight, deferring reconnect refresh");
                self.refresh_pending = true;
            } else {
                debug!("History fetch already in flight, skipping {}", reason.as_str());
            }
            return;
        }

        debug!("Fetching feed history ({})", reason.as_str());
        self.state.begin_fetch();
        let history = Arc::clone(&self.history);
        let results = self.fetch_tx.clone();
        let generation = self.generation;
        self.inflight = Some(tokio::spawn(async move {
            let result = history.fetch_window(&auth).await;
            let _ = results.send(FetchDone { generation, result });
        }));
    }

    fn handle_fetch(&mut self, done: FetchDone) {
        if done.generation != self.generation || self.auth.is_none() {
            debug!("Discarding history result from a previous activation");
            return;
        }
        self.inflight = None;

        let initial = !self.state.has_settled();
        match done.result {
            Ok(batch) => {
                let inserted = self.state.apply_history(batch);
                debug!("Merged history window, {inserted} new items");
            }
            Err(e) => {
                warn!("Keeping current feed after failed fetch: {e}");
                self.state.fetch_failed(&e);
            }
        }

        // The channel goes live once the first load settles either way.
        if initial {
            self.start_live();
        }
        if std::mem::take(&mut self.refresh_pending) {
            self.start_fetch(FetchReason::Reconnect);
        }
    }

    fn start_live(&mut self) {
        let Some(auth) = self.auth.clone() else {
            return;
        };
        let Some(channel) = self.channel.as_mut() else {
            return;
        };
        if channel.is_running() {
            return;
        }

        let (tx, rx) = mpsc::unbounded_channel();
        self.live_dropped_base = channel.dropped_payloads();
        channel.start(auth, tx);
        self.live_events = Some(rx);
    }

    fn handle_live(&mut self, event: LiveEvent) {
        match event {
            LiveEvent::Item(item) => {
                let key = item.key();
                let outcome = self.state.apply_live(item);
                debug!("Live item {key}: {outcome:?}");
            }
            LiveEvent::State(state) => {
                self.state.set_channel(state);
                if state == ChannelState::Connected {
                    if self.has_connected && self.refresh_on_reconnect {
                        info!("Live channel reconnected, refreshing history");
                        self.start_fetch(FetchReason::Reconnect);
                    }
                    self.has_connected = true;
                }
            }
            LiveEvent::Reconnecting { attempt, delay } => {
                debug!("Live channel reconnecting (attempt {attempt}, in {delay:?})");
                self.state.set_reconnecting();
            }
            LiveEvent::RetryBudgetExhausted { failures } => {
                warn!("Live channel unavailable after {failures} attempts");
                self.state.retry_budget_exhausted(failures);
            }
        }
    }

    fn publish(&self) {
        let live_dropped = self
            .channel
            .as_ref()
            .map_or(0, |channel| channel.dropped_payloads())
            .saturating_sub(self.live_dropped_base);
        self.view
            .send_replace(self.state.view(self.auth.is_some(), live_dropped));
    }
}

/// Next event from the active channel. Pending forever when there is none.
async fn next_live(events: &mut Option<mpsc::UnboundedReceiver<LiveEvent>>) -> LiveEvent {
    if let Some(rx) = events {
        match rx.recv().await {
            Some(event) => return event,
            None => *events = None,
        }
    }
    std::future::pending().await
}
