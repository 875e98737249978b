//! Horizon REST/SSE client for the payments feed.
//!
//! # Responsibilities
//! - Query the newest payment paging token
//! - Open a server-sent-events subscription on `/payments`
//! - Decode SSE frames into operation records
//! - Surface end-of-stream as an error, never as a clean finish

use async_trait::async_trait;
use futures_util::stream::{self, BoxStream, StreamExt};
use reqwest::header::ACCEPT;
use serde::Deserialize;
use std::collections::VecDeque;
use std::time::Duration;
use url::Url;

use crate::config::HorizonConfig;
use crate::ledger::client::{LedgerClient, OperationStream};
use crate::ledger::types::{Cursor, LedgerError, LedgerResult, RawOperation};

/// Largest page Horizon will serve.
pub const MAX_PAGE_LIMIT: u64 = 200;

/// Horizon client.
#[derive(Clone)]
pub struct HorizonClient {
    http: reqwest::Client,
    base_url: Url,
    request_timeout: Duration,
}

impl HorizonClient {
    /// Create a client for the configured Horizon server.
    ///
    /// The HTTP client carries only a connect timeout; the request timeout
    /// is applied to one-shot queries so it never cuts a live subscription.
    pub fn new(config: &HorizonConfig) -> LedgerResult<Self> {
        let base_url: Url = config
            .url
            .parse()
            .map_err(|_| LedgerError::InvalidUrl(config.url.clone()))?;
        let request_timeout = Duration::from_secs(config.request_timeout_secs);

        let http = reqwest::Client::builder()
            .connect_timeout(request_timeout)
            .build()
            .map_err(|e| LedgerError::Http(e.to_string()))?;

        tracing::info!(url = %base_url, "Horizon client initialized");

        Ok(Self {
            http,
            base_url,
            request_timeout,
        })
    }

    fn payments_url(&self, query: &[(&str, &str)]) -> LedgerResult<Url> {
        let mut url = self
            .base_url
            .join("payments")
            .map_err(|_| LedgerError::InvalidUrl(self.base_url.to_string()))?;
        url.query_pairs_mut().extend_pairs(query);
        Ok(url)
    }
}

#[derive(Deserialize)]
struct Page {
    #[serde(rename = "_embedded")]
    embedded: Embedded,
}

#[derive(Deserialize)]
struct Embedded {
    records: Vec<PageRecord>,
}

#[derive(Deserialize)]
struct PageRecord {
    paging_token: String,
}

#[async_trait]
impl LedgerClient for HorizonClient {
    async fn latest_cursor(&self) -> LedgerResult<Option<Cursor>> {
        let url = self.payments_url(&[("order", "desc"), ("limit", "1")])?;
        tracing::info!(url = %url, "Fetching the latest payment record");

        let response = self
            .http
            .get(url)
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(|e| LedgerError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(LedgerError::Status(status.as_u16()));
        }

        let page: Page = response
            .json()
            .await
            .map_err(|e| LedgerError::Decode(e.to_string()))?;

        let cursor = page
            .embedded
            .records
            .into_iter()
            .next()
            .map(|record| Cursor::new(record.paging_token));
        match &cursor {
            Some(c) => tracing::info!(cursor = %c, "Latest cursor fetched from the network"),
            None => tracing::info!("No payments found on the network"),
        }
        Ok(cursor)
    }

    async fn subscribe(&self, from: &Cursor) -> LedgerResult<OperationStream> {
        let limit = MAX_PAGE_LIMIT.to_string();
        let url = self.payments_url(&[
            ("cursor", from.as_str()),
            ("order", "asc"),
            ("limit", limit.as_str()),
            ("join", "transactions"),
        ])?;
        tracing::info!(url = %url, "Opening payment stream");

        let response = self
            .http
            .get(url)
            .header(ACCEPT, "text/event-stream")
            .send()
            .await
            .map_err(|e| LedgerError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(LedgerError::Status(status.as_u16()));
        }

        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map(|bytes| bytes.to_vec()))
            .boxed();
        Ok(operation_stream(body))
    }
}

impl std::fmt::Debug for HorizonClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HorizonClient")
            .field("base_url", &self.base_url.as_str())
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

struct StreamState {
    body: BoxStream<'static, reqwest::Result<Vec<u8>>>,
    decoder: SseDecoder,
    pending: VecDeque<LedgerResult<RawOperation>>,
    finished: bool,
}

fn operation_stream(body: BoxStream<'static, reqwest::Result<Vec<u8>>>) -> OperationStream {
    let state = StreamState {
        body,
        decoder: SseDecoder::default(),
        pending: VecDeque::new(),
        finished: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(item) = state.pending.pop_front() {
                return Some((item, state));
            }
            if state.finished {
                return None;
            }
            match state.body.next().await {
                Some(Ok(chunk)) => {
                    for event in state.decoder.push(&chunk) {
                        if let Some(op) = decode_event(event) {
                            state.pending.push_back(Ok(op));
                        }
                    }
                }
                Some(Err(e)) => {
                    state.finished = true;
                    return Some((Err(LedgerError::Http(e.to_string())), state));
                }
                None => {
                    state.finished = true;
                    return Some((Err(LedgerError::StreamClosed), state));
                }
            }
        }
    })
    .boxed()
}

/// One server-sent event.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SseEvent {
    pub id: Option<String>,
    pub data: String,
}

/// Incremental SSE frame decoder.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buf: Vec<u8>,
    id: Option<String>,
    data: Vec<String>,
}

impl SseDecoder {
    /// Feed a chunk of the response body, returning every event it completes.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buf.extend_from_slice(chunk);
        let mut events = Vec::new();

        while let Some(pos) = self.buf.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buf.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line);
            let line = line.trim_end_matches(['\n', '\r']);

            if line.is_empty() {
                if !self.data.is_empty() {
                    events.push(SseEvent {
                        id: self.id.take(),
                        data: self.data.join("\n"),
                    });
                    self.data.clear();
                }
                self.id = None;
                continue;
            }
            if line.starts_with(':') {
                continue;
            }

            let (field, value) = match line.split_once(':') {
                Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
                None => (line, ""),
            };
            match field {
                "data" => self.data.push(value.to_string()),
                "id" => self.id = Some(value.to_string()),
                _ => {}
            }
        }
        events
    }
}

/// Turn an SSE event into an operation record.
///
/// Horizon sends `"hello"` and `"byebye"` string payloads around the real
/// records; those are skipped. A record that fails to decode becomes an
/// undecodable placeholder so its position is not lost.
fn decode_event(event: SseEvent) -> Option<RawOperation> {
    let data = event.data.trim();
    if !data.starts_with('{') {
        return None;
    }
    match serde_json::from_str::<RawOperation>(data) {
        Ok(op) => Some(op),
        Err(e) => {
            tracing::warn!(id = ?event.id, error = %e, "Undecodable feed record");
            event.id.map(RawOperation::undecodable)
        }
    }
}
