use std::collections::VecDeque;

use brewfeed_api_client::{ApiClient, ClientError};
use brewfeed_core::AuthContext;
use tracing::debug;

use crate::transport::{ChannelError, LiveSubscription, LiveTransport};

/// Live transport over server-sent events.
///
/// A 2xx response to the stream request is the subscription ack. Each SSE
/// event's `data:` lines make one message; the body ending is a drop.
#[derive(Clone)]
pub struct SseTransport {
    api: ApiClient,
}

impl SseTransport {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }
}

impl LiveTransport for SseTransport {
    type Subscription = SseSubscription;

    async fn subscribe(
        &self,
        topic: &str,
        auth: &AuthContext,
    ) -> Result<SseSubscription, ChannelError> {
        let response = self
            .api
            .open_feed_stream(auth, topic)
            .await
            .map_err(|e| match e {
                ClientError::Status { .. } => ChannelError::Rejected(e.to_string()),
                _ => ChannelError::Transport(e.to_string()),
            })?;
        debug!("SSE stream opened for topic {topic}");
        Ok(SseSubscription {
            response,
            decoder: SseDecoder::default(),
            pending: VecDeque::new(),
        })
    }
}

pub struct SseSubscription {
    response: reqwest::Response,
    decoder: SseDecoder,
    pending: VecDeque<String>,
}

impl LiveSubscription for SseSubscription {
    async fn recv(&mut self) -> Option<Result<String, ChannelError>> {
        loop {
            if let Some(message) = self.pending.pop_front() {
                return Some(Ok(message));
            }
            match self.response.chunk().await {
                Ok(Some(bytes)) => self.pending.extend(self.decoder.feed(&bytes)),
                Ok(None) => return None,
                Err(e) => return Some(Err(ChannelError::Transport(e.to_string()))),
            }
        }
    }
}

/// Incremental `text/event-stream` decoder that yields event data only.
///
/// Chunks may split lines (or UTF-8 sequences) anywhere; partial lines are
/// buffered until their newline arrives.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buf: Vec<u8>,
    data: Vec<String>,
}

impl SseDecoder {
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(chunk);
        let mut events = Vec::new();

        while let Some(pos) = self.buf.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.buf.drain(..=pos).collect();
            let text = String::from_utf8_lossy(&raw);
            let line = text.trim_end_matches(|c: char| c == '\n' || c == '\r');

            if line.is_empty() {
                if !self.data.is_empty() {
                    events.push(self.data.join("\n"));
                    self.data.clear();
                }
                continue;
            }
            if line.starts_with(':') {
                continue;
            }

            let (field, value) = match line.split_once(':') {
                Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
                None => (line, ""),
            };
            if field == "data" {
                self.data.push(value.to_string());
            }
        }

        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_single_event() {
        let mut decoder = SseDecoder::default();
        let events = decoder.feed(b"event: item\ndata: {\"id\":1}\n\n");
        assert_eq!(events, vec!["{\"id\":1}".to_string()]);
    }

    #[test]
    fn joins_multiline_data_and_skips_comments() {
        let mut decoder = SseDecoder::default();
        let events = decoder.feed(b": keepalive\n\ndata: a\r\ndata:b\r\n\r\n");
        assert_eq!(events, vec!["a\nb".to_string()]);
    }

    #[test]
    fn buffers_events_split_across_chunks() {
        let mut decoder = SseDecoder::default();
        assert!(decoder.feed(b"data: {\"na").is_empty());
        assert!(decoder.feed(b"me\":\"caf\xC3").is_empty());
        let events = decoder.feed(b"\xA9\"}\n\ndata: 2\n\n");
        assert_eq!(
            events,
            vec!["{\"name\":\"café\"}".to_string(), "2".to_string()]
        );
    }

    #[test]
    fn ignores_id_and_retry_fields() {
        let mut decoder = SseDecoder::default();
        let events = decoder.feed(b"id: 7\nretry: 1000\n\n");
        assert!(events.is_empty());
    }
}
