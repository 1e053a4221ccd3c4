use std::time::Duration;

use brewfeed_core::{AuthContext, FetchError};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

/// History window endpoint, relative to `/api`.
pub const FEED_PATH: &str = "/feed";
/// Server-sent events endpoint for live feed updates, relative to `/api`.
pub const FEED_STREAM_PATH: &str = "/feed/stream";

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{status}: {body}")]
    Status { status: u16, body: String },
    #[error("decode error: {0}")]
    Decode(String),
}

impl ClientError {
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::Http(e) => e.status().map(|s| s.as_u16()),
            Self::Decode(_) => None,
        }
    }
}

impl From<ClientError> for FetchError {
    fn from(e: ClientError) -> Self {
        match e {
            ClientError::Http(e) => FetchError::Transport(e.to_string()),
            ClientError::Status { status, body } => FetchError::Status { status, body },
            ClientError::Decode(msg) => FetchError::Decode(msg),
        }
    }
}

/// The history endpoint answers either `{"items": [...]}` or a bare array.
#[derive(Deserialize)]
#[serde(untagged)]
enum FeedWindowBody {
    Wrapped { items: Vec<Value> },
    Bare(Vec<Value>),
}

/// Typed HTTP client for the brewfeed backend.
///
/// Auth is passed per request: the session layer owns the credentials and
/// the client never stores them.
#[derive(Clone)]
pub struct ApiClient {
    client: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    /// Create a new client with the given base URL and request timeout.
    ///
    /// The timeout applies to whole requests, so the live stream is opened
    /// through a separate client without one (see [`ApiClient::streaming`]).
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ClientError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(client, base_url))
    }

    /// Client for long-lived streaming responses. There is no overall
    /// deadline; `idle_timeout` bounds the silence between reads, so a
    /// half-open stream fails instead of hanging. Size it above the server's
    /// keepalive interval.
    pub fn streaming(
        base_url: &str,
        connect_timeout: Duration,
        idle_timeout: Option<Duration>,
    ) -> Result<Self, ClientError> {
        let mut builder = reqwest::Client::builder().connect_timeout(connect_timeout);
        if let Some(idle) = idle_timeout {
            builder = builder.read_timeout(idle);
        }
        let client = builder.build()?;
        Ok(Self::with_client(client, base_url))
    }

    /// Create from an existing `reqwest::Client` (e.g. shared in tests).
    pub fn with_client(client: reqwest::Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Access the underlying `reqwest::Client`.
    pub fn reqwest_client(&self) -> &reqwest::Client {
        &self.client
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}/api{}", self.base_url, path)
    }

    fn authed(&self, req: reqwest::RequestBuilder, auth: &AuthContext) -> reqwest::RequestBuilder {
        let req = if auth.token.is_empty() {
            req
        } else {
            req.bearer_auth(&auth.token)
        };
        if auth.user_id.is_empty() {
            req
        } else {
            req.header("X-User-Id", &auth.user_id)
        }
    }

    // ── Feed ──────────────────────────────────────────────────────────────

    /// Raw records of the current feed window, newest first as the server
    /// sees it. Records are not normalized here.
    pub async fn feed_window(&self, auth: &AuthContext) -> Result<Vec<Value>, ClientError> {
        let req = self.authed(self.client.get(self.url(FEED_PATH)), auth);
        let resp = req.send().await?;
        let body: FeedWindowBody = parse_response(resp).await?;
        Ok(match body {
            FeedWindowBody::Wrapped { items } => items,
            FeedWindowBody::Bare(items) => items,
        })
    }

    /// Open the event stream for `topic`. A successful return means the
    /// server acknowledged the subscription; the body carries the events.
    pub async fn open_feed_stream(
        &self,
        auth: &AuthContext,
        topic: &str,
    ) -> Result<reqwest::Response, ClientError> {
        let url = format!(
            "{}?topic={}",
            self.url(FEED_STREAM_PATH),
            urlencoding::encode(topic)
        );
        let req = self
            .authed(self.client.get(url), auth)
            .header("Accept", "text/event-stream")
            .header("Cache-Control", "no-cache");
        let resp = req.send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ClientError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(resp)
    }
}

/// Parse an HTTP response: return the deserialized body on 2xx,
/// or an error containing the status and body text.
async fn parse_response<T: serde::de::DeserializeOwned>(
    resp: reqwest::Response,
) -> Result<T, ClientError> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(ClientError::Status {
            status: status.as_u16(),
            body,
        });
    }
    let bytes = resp.bytes().await?;
    serde_json::from_slice(&bytes).map_err(|e| ClientError::Decode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_joins_api_prefix_and_trims_slash() {
        let client = ApiClient::with_client(reqwest::Client::new(), "http://localhost:8080/");
        assert_eq!(client.url(FEED_PATH), "http://localhost:8080/api/feed");
    }

    #[test]
    fn status_errors_map_to_fetch_errors() {
        let err: FetchError = ClientError::Status {
            status: 503,
            body: "down".to_string(),
        }
        .into();
        assert_eq!(
            err,
            FetchError::Status {
                status: 503,
                body: "down".to_string()
            }
        );
    }

    #[test]
    fn window_body_accepts_both_shapes() {
        let wrapped: FeedWindowBody = serde_json::from_str(r#"{"items":[{"id":1}]}"#).unwrap();
        let bare: FeedWindowBody = serde_json::from_str(r#"[{"id":1},{"id":2}]"#).unwrap();
        assert!(matches!(wrapped, FeedWindowBody::Wrapped { items } if items.len() == 1));
        assert!(matches!(bare, FeedWindowBody::Bare(items) if items.len() == 2));
    }
}
