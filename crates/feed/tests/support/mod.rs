#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use brewfeed_core::{AuthContext, FeedItem, FetchError, HistorySource, NormalizedBatch};
use brewfeed_feed::FeedView;
use tokio::sync::{Semaphore, watch};

#[derive(Default)]
struct Script {
    responses: VecDeque<Result<Vec<FeedItem>, FetchError>>,
    /// Returned once the script runs out.
    fallback: Vec<FeedItem>,
    users: Vec<String>,
    completed: usize,
}

/// History source that answers from a queue of scripted responses.
///
/// With a gate, every fetch waits for [`ScriptedHistory::release`] before
/// answering.
#[derive(Clone, Default)]
pub struct ScriptedHistory {
    script: Arc<Mutex<Script>>,
    gate: Option<Arc<Semaphore>>,
}

impl ScriptedHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn gated() -> Self {
        Self {
            gate: Some(Arc::new(Semaphore::new(0))),
            ..Self::default()
        }
    }

    pub fn push(&self, response: Result<Vec<FeedItem>, FetchError>) -> &Self {
        self.script.lock().unwrap().responses.push_back(response);
        self
    }

    pub fn set_fallback(&self, items: Vec<FeedItem>) {
        self.script.lock().unwrap().fallback = items;
    }

    pub fn release(&self) {
        if let Some(gate) = &self.gate {
            gate.add_permits(1);
        }
    }

    pub fn calls(&self) -> usize {
        self.script.lock().unwrap().users.len()
    }

    pub fn completed(&self) -> usize {
        self.script.lock().unwrap().completed
    }

    pub fn users(&self) -> Vec<String> {
        self.script.lock().unwrap().users.clone()
    }
}

impl HistorySource for ScriptedHistory {
    async fn fetch_window(&self, auth: &AuthContext) -> Result<NormalizedBatch, FetchError> {
        let response = {
            let mut script = self.script.lock().unwrap();
            script.users.push(auth.user_id.clone());
            let fallback = script.fallback.clone();
            script.responses.pop_front().unwrap_or(Ok(fallback))
        };
        if let Some(gate) = &self.gate {
            gate.acquire().await.unwrap().forget();
        }
        self.script.lock().unwrap().completed += 1;
        response.map(|items| NormalizedBatch { items, dropped: 0 })
    }
}

pub fn auth(user: &str) -> AuthContext {
    AuthContext::new("token", user)
}

/// Wait (in paused time) until the published view satisfies `pred`.
pub async fn wait_view(
    rx: &mut watch::Receiver<FeedView>,
    pred: impl FnMut(&FeedView) -> bool,
) -> FeedView {
    tokio::time::timeout(Duration::from_secs(600), rx.wait_for(pred))
        .await
        .expect("view condition not reached")
        .expect("controller stopped")
        .clone()
}

pub fn ids(view: &FeedView) -> Vec<String> {
    view.items.iter().map(|item| item.id().to_string()).collect()
}
