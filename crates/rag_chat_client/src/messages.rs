//! Stream wire protocol: JSON frames tagged by an "event" field.
//! Server → client only; the client sends nothing after the socket opens.

use serde::{Deserialize, Serialize};

/// A retrieved evidence unit, normalized from the aliased wire form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRecord {
    pub label: i64,
    pub doc_id: String,
    pub chunk_id: Option<String>,
    pub page_start: Option<u32>,
    pub text: String,
    pub score: f64,
    /// Display name; falls back to `doc_id` when the server sends none.
    pub document: String,
}

/// SOURCES entry as it appears on the wire. Field names are accepted under
/// several aliases for backend compatibility; `normalize` folds them into a
/// `SourceRecord`.
#[derive(Debug, Clone, Deserialize)]
pub struct RawSource {
    #[serde(default, alias = "index")]
    pub label: i64,
    #[serde(default, alias = "docId", alias = "documentId", alias = "document_id")]
    pub doc_id: String,
    #[serde(default, alias = "chunkId")]
    pub chunk_id: Option<String>,
    #[serde(default, alias = "pageStart", alias = "page")]
    pub page_number: Option<u32>,
    #[serde(default, alias = "content", alias = "snippet")]
    pub text: String,
    #[serde(default, alias = "similarity")]
    pub score: Option<f64>,
    #[serde(default, alias = "filename", alias = "name")]
    pub document: Option<String>,
}

impl RawSource {
    pub fn normalize(self) -> SourceRecord {
        let document = self
            .document
            .filter(|d| !d.is_empty())
            .unwrap_or_else(|| self.doc_id.clone());
        SourceRecord {
            label: self.label,
            doc_id: self.doc_id,
            chunk_id: self.chunk_id,
            page_start: self.page_number,
            text: self.text,
            score: self.score.unwrap_or(0.0),
            document,
        }
    }
}

/// CITATION frame payload: a label plus an optional chunk identifier whose
/// prefix before the first `#` encodes a document id.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CitationMarker {
    pub label: i64,
    #[serde(default, alias = "chunkId")]
    pub chunk_id: Option<String>,
}

impl CitationMarker {
    /// Document id inferred from the chunk identifier, if one is carried.
    pub fn inferred_doc_id(&self) -> Option<&str> {
        self.chunk_id
            .as_deref()
            .and_then(|c| c.split('#').next())
            .filter(|p| !p.is_empty())
    }
}

#[derive(Debug, Clone, Deserialize)]
struct TokenFrame {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Clone, Deserialize)]
struct SourcesFrame {
    #[serde(default)]
    sources: Vec<RawSource>,
}

#[derive(Debug, Clone, Deserialize)]
struct EndFrame {
    #[serde(default)]
    stats: Option<EndStats>,
}

#[derive(Debug, Clone, Deserialize)]
struct EndStats {
    #[serde(default)]
    ms: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
struct ErrorFrame {
    #[serde(default)]
    detail: Option<String>,
}

/// One inbound stream frame; discriminator is the JSON "event" field.
/// END is terminal; no frame is delivered after END or ERROR.
#[derive(Debug, Clone)]
pub enum StreamFrame {
    Start { meta: serde_json::Value },
    Token { text: String },
    Sources { records: Vec<SourceRecord> },
    Citation(CitationMarker),
    End { stats_ms: u64 },
    Error { detail: String },
}

impl StreamFrame {
    /// Decode a frame from its JSON value. Returns `Ok(None)` for event kinds
    /// this client does not recognize (they are ignored, not an error) and
    /// `Err` when the discriminator is missing or a known kind fails to parse.
    pub fn from_json(value: &serde_json::Value) -> Result<Option<Self>, String> {
        let event = value
            .get("event")
            .and_then(|e| e.as_str())
            .ok_or("missing event")?;
        match event {
            "START" => Ok(Some(StreamFrame::Start {
                meta: value.get("meta").cloned().unwrap_or(serde_json::Value::Null),
            })),
            "TOKEN" => {
                let f: TokenFrame =
                    serde_json::from_value(value.clone()).map_err(|e| e.to_string())?;
                Ok(Some(StreamFrame::Token { text: f.text }))
            }
            "SOURCES" => {
                let f: SourcesFrame =
                    serde_json::from_value(value.clone()).map_err(|e| e.to_string())?;
                Ok(Some(StreamFrame::Sources {
                    records: f.sources.into_iter().map(RawSource::normalize).collect(),
                }))
            }
            "CITATION" => {
                let m: CitationMarker =
                    serde_json::from_value(value.clone()).map_err(|e| e.to_string())?;
                Ok(Some(StreamFrame::Citation(m)))
            }
            "END" => {
                let f: EndFrame =
                    serde_json::from_value(value.clone()).map_err(|e| e.to_string())?;
                let stats_ms = f.stats.and_then(|s| s.ms).unwrap_or(0.0).max(0.0) as u64;
                Ok(Some(StreamFrame::End { stats_ms }))
            }
            "ERROR" => {
                let f: ErrorFrame =
                    serde_json::from_value(value.clone()).map_err(|e| e.to_string())?;
                Ok(Some(StreamFrame::Error {
                    detail: f.detail.unwrap_or_else(|| "Streaming error".into()),
                }))
            }
            _ => Ok(None),
        }
    }
}
