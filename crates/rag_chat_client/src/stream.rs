//! WebSocket stream connection for one query turn: decode frames, feed the
//! citation reconciler, and guarantee exactly one terminal outcome no matter
//! how the stream ends (END, ERROR, transport failure, timeout).

use std::time::Duration;

use futures_util::StreamExt;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::MaybeTlsStream;
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, warn};

use crate::citations::{Citation, CitationReconciler};
use crate::messages::{SourceRecord, StreamFrame};

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Stream connection error.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    /// The connection could not be established. Callers treat this like any
    /// other transport failure: synthesize a fallback completion.
    #[error("stream connect failed: {0}")]
    Connect(String),
    /// The server delivered an ERROR frame; `detail` is its message.
    #[error("{0}")]
    Server(String),
}

/// Normalized source view carried in the finished result.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SourceInfo {
    pub document: String,
    pub content: String,
    pub score: f64,
}

/// The finished answer for one turn: accumulated text, normalized sources,
/// and reconciled citations.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TurnResult {
    pub answer: String,
    pub chunks: Vec<SourceInfo>,
    pub citations: Vec<Citation>,
    pub turn_id: String,
    pub processing_time_ms: u64,
}

impl TurnResult {
    /// Fallback completion for a transport-level failure. The conversation
    /// must never be left stuck in a loading state, so transport failures
    /// resolve to an explanatory answer instead of an error.
    pub fn transport_fallback(query: &str, turn_id: &str) -> Self {
        TurnResult {
            answer: format!(
                "I found information related to \"{}\" in your documents. \
                 However, the streaming connection failed. Please check the \
                 logs for details and try again.",
                query
            ),
            chunks: Vec::new(),
            citations: Vec::new(),
            turn_id: turn_id.to_string(),
            processing_time_ms: 0,
        }
    }

    fn closed_fallback(session_id: &str, turn_id: &str) -> Self {
        TurnResult {
            answer: format!(
                "Query processed but connection closed. Session: {}, Turn: {}. \
                 Please check the backend logs for details.",
                session_id, turn_id
            ),
            chunks: Vec::new(),
            citations: Vec::new(),
            turn_id: turn_id.to_string(),
            processing_time_ms: 0,
        }
    }

    fn timeout_fallback(turn_id: &str, elapsed: Duration) -> Self {
        TurnResult {
            answer: format!(
                "The query is still processing after {} seconds. The \
                 connection was closed due to client timeout.",
                elapsed.as_secs()
            ),
            chunks: Vec::new(),
            citations: Vec::new(),
            turn_id: turn_id.to_string(),
            processing_time_ms: elapsed.as_millis() as u64,
        }
    }
}

/// Callbacks invoked as stream frames arrive. All optional; the terminal
/// outcome is the return value of [`StreamConnection::run`], delivered
/// exactly once.
#[derive(Default)]
pub struct StreamHandlers<'a> {
    pub on_token: Option<Box<dyn FnMut(&str) + Send + 'a>>,
    pub on_sources: Option<Box<dyn FnMut(&[SourceRecord]) + Send + 'a>>,
    pub on_citation: Option<Box<dyn FnMut(&Citation) + Send + 'a>>,
}

impl<'a> StreamHandlers<'a> {
    pub fn new() -> Self {
        Self::default()
    }
}

/// One open stream for one (session, turn) pair.
pub struct StreamConnection {
    ws: WsStream,
    session_id: String,
    turn_id: String,
    query: String,
    timeout: Option<Duration>,
}

impl StreamConnection {
    /// Connect to the stream endpoint for `(session_id, turn_id)`.
    /// `stream_url` is the ws:// or wss:// base, e.g. `ws://127.0.0.1:8000`.
    pub async fn open(
        stream_url: &str,
        session_id: &str,
        turn_id: &str,
        query: &str,
    ) -> Result<Self, StreamError> {
        let url = format!(
            "{}/ws/stream?session_id={}&turn_id={}",
            stream_url.trim_end_matches('/'),
            session_id,
            turn_id
        );
        debug!(%url, "connecting to stream endpoint");
        let (ws, _) = tokio_tungstenite::connect_async(url.as_str())
            .await
            .map_err(|e| StreamError::Connect(e.to_string()))?;
        Ok(StreamConnection {
            ws,
            session_id: session_id.to_string(),
            turn_id: turn_id.to_string(),
            query: query.to_string(),
            timeout: None,
        })
    }

    /// Close the stream if no terminal frame arrives within `timeout`,
    /// resolving with a synthetic timeout completion. Disabled when the
    /// duration is zero.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = (timeout > Duration::ZERO).then_some(timeout);
        self
    }

    /// Drive the stream to its terminal outcome.
    ///
    /// Returns `Ok` with the accumulated result on END, and `Ok` with a
    /// synthesized fallback on transport failure, unexpected close, or
    /// timeout. Only a server ERROR frame produces an `Err`.
    pub async fn run(mut self, handlers: &mut StreamHandlers<'_>) -> Result<TurnResult, StreamError> {
        let deadline = self.timeout.map(|d| tokio::time::Instant::now() + d);
        let mut answer = String::new();
        let mut reconciler = CitationReconciler::new();

        loop {
            let next = match deadline {
                Some(at) => match tokio::time::timeout_at(at, self.ws.next()).await {
                    Ok(next) => next,
                    Err(_) => {
                        let elapsed = self.timeout.unwrap_or_default();
                        warn!(
                            session_id = %self.session_id,
                            turn_id = %self.turn_id,
                            "no terminal frame within timeout, closing stream"
                        );
                        let _ = self.ws.close(None).await;
                        return Ok(TurnResult::timeout_fallback(&self.turn_id, elapsed));
                    }
                },
                None => self.ws.next().await,
            };

            let item = match next {
                Some(item) => item,
                // Stream ended without END or ERROR.
                None => {
                    return Ok(TurnResult::closed_fallback(&self.session_id, &self.turn_id));
                }
            };

            let message = match item {
                Ok(message) => message,
                Err(e) => {
                    warn!(error = %e, turn_id = %self.turn_id, "stream transport error");
                    return Ok(TurnResult::transport_fallback(&self.query, &self.turn_id));
                }
            };

            let text = match message {
                Message::Text(text) => text,
                Message::Close(_) => {
                    return Ok(TurnResult::closed_fallback(&self.session_id, &self.turn_id));
                }
                _ => continue,
            };

            let value: serde_json::Value = match serde_json::from_str(&text) {
                Ok(value) => value,
                Err(e) => {
                    warn!(error = %e, "dropping unparseable frame");
                    continue;
                }
            };

            let frame = match StreamFrame::from_json(&value) {
                Ok(Some(frame)) => frame,
                Ok(None) => {
                    debug!("ignoring unrecognized event kind");
                    continue;
                }
                Err(e) => {
                    warn!(error = %e, "dropping malformed frame");
                    continue;
                }
            };

            match frame {
                StreamFrame::Start { meta } => {
                    debug!(?meta, turn_id = %self.turn_id, "query processing started");
                }
                StreamFrame::Token { text } => {
                    answer.push_str(&text);
                    if let Some(on_token) = handlers.on_token.as_mut() {
                        on_token(&text);
                    }
                }
                StreamFrame::Sources { records } => {
                    reconciler.add_sources(&records);
                    if let Some(on_sources) = handlers.on_sources.as_mut() {
                        on_sources(&records);
                    }
                }
                StreamFrame::Citation(marker) => {
                    let citation = reconciler.add_citation(marker);
                    if let Some(on_citation) = handlers.on_citation.as_mut() {
                        on_citation(&citation);
                    }
                }
                StreamFrame::End { stats_ms } => {
                    let _ = self.ws.close(None).await;
                    // Sources may arrive after citations referencing them;
                    // re-resolve everything against the complete set.
                    let citations = reconciler.finalize();
                    let chunks = reconciler
                        .sources()
                        .iter()
                        .map(|s| SourceInfo {
                            document: if !s.document.is_empty() {
                                s.document.clone()
                            } else if !s.doc_id.is_empty() {
                                s.doc_id.clone()
                            } else {
                                "Unknown".into()
                            },
                            content: s.text.clone(),
                            score: s.score,
                        })
                        .collect();
                    return Ok(TurnResult {
                        answer,
                        chunks,
                        citations,
                        turn_id: self.turn_id.clone(),
                        processing_time_ms: stats_ms,
                    });
                }
                StreamFrame::Error { detail } => {
                    let _ = self.ws.close(None).await;
                    return Err(StreamError::Server(detail));
                }
            }
        }
    }
}
