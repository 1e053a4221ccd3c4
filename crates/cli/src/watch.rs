use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use brewfeed_api_client::{ApiClient, HistoryFetcher};
use brewfeed_core::{FeedItem, FeedKey};
use brewfeed_feed::{ControllerOptions, FeedController, FeedView};
use brewfeed_live::SseTransport;
use brewfeed_runtime_config::FeedConfig;
use tokio::time::{Instant, Interval};
use tracing::{debug, info};

use crate::FeedArgs;
use crate::config::auth_context;
use crate::output::{print_items, status_line};

/// Run the feed controller until SIGINT/SIGTERM, printing items as they
/// appear or change.
pub async fn run_watch(config: &FeedConfig, args: &FeedArgs) -> Result<()> {
    let auth = auth_context(config)?;
    let timeout = config.server.request_timeout();
    let api = ApiClient::new(&config.server.url, timeout).context("Failed to build HTTP client")?;
    // The stream stays open indefinitely; only silence on it is bounded.
    let stream_api = ApiClient::streaming(&config.server.url, timeout, config.live.idle_timeout())
        .context("Failed to build HTTP client")?;

    let controller = FeedController::spawn(
        HistoryFetcher::new(api),
        SseTransport::new(stream_api),
        ControllerOptions::from(config),
    );
    if let Some(search) = &args.search {
        controller.set_search(search.clone());
    }
    info!("Watching feed at {}", config.server.url);
    controller.activate(auth);

    let mut views = controller.subscribe();
    let mut printer = Printer::new(args.json);
    let mut refresh = refresh_interval(config.feed.refresh_interval_secs);
    let shutdown = wait_for_shutdown();
    tokio::pin!(shutdown);

    let result = loop {
        tokio::select! {
            signal = &mut shutdown => break signal,
            changed = views.changed() => {
                if changed.is_err() {
                    break Ok(());
                }
                let view = views.borrow_and_update().clone();
                printer.render(&view)?;
                if view.unseen > 0 {
                    controller.mark_seen();
                }
            }
            _ = next_tick(&mut refresh) => {
                debug!("Periodic feed refresh");
                controller.refresh();
            }
        }
    };

    info!("Stopping feed");
    controller.deactivate();
    controller.shutdown().await;
    result
}

fn refresh_interval(secs: u64) -> Option<Interval> {
    (secs > 0).then(|| {
        let period = Duration::from_secs(secs);
        tokio::time::interval_at(Instant::now() + period, period)
    })
}

async fn next_tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

async fn wait_for_shutdown() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        let mut sigterm = signal(SignalKind::terminate()).context("Failed to register SIGTERM")?;
        let mut sigint = signal(SignalKind::interrupt()).context("Failed to register SIGINT")?;
        tokio::select! {
            _ = sigterm.recv() => info!("Received SIGTERM"),
            _ = sigint.recv() => info!("Received SIGINT"),
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c()
            .await
            .context("Failed to register Ctrl+C handler")?;
        info!("Received Ctrl+C");
    }
    Ok(())
}

/// Prints only what changed since the previous view: items not shown yet
/// or whose content was replaced, plus the status line when it differs.
struct Printer {
    json: bool,
    shown: HashMap<FeedKey, Arc<FeedItem>>,
    last_status: Option<String>,
}

impl Printer {
    fn new(json: bool) -> Self {
        Self {
            json,
            shown: HashMap::new(),
            last_status: None,
        }
    }

    fn render(&mut self, view: &FeedView) -> Result<()> {
        let fresh: Vec<Arc<FeedItem>> = view
            .items
            .iter()
            .filter(|item| {
                self.shown
                    .get(&item.key())
                    .is_none_or(|seen| !Arc::ptr_eq(seen, item))
            })
            .cloned()
            .collect();
        if !fresh.is_empty() {
            print_items(&fresh, self.json)?;
            for item in fresh {
                self.shown.insert(item.key(), item);
            }
        }

        let status = status_line(view);
        if self.last_status.as_deref() != Some(status.as_str()) {
            eprintln!("{status}");
            self.last_status = Some(status);
        }
        Ok(())
    }
}
