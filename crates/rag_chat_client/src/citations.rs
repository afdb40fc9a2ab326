//! Citation reconciliation: sources and citation markers arrive in separate
//! frames, in no guaranteed order, so every resolution must be re-runnable
//! once the full source set is known.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::messages::{CitationMarker, SourceRecord};

/// A citation reference resolved against the best-known source for its label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    #[serde(default)]
    pub chunk_index: i64,
    #[serde(default)]
    pub doc_id: String,
    #[serde(default)]
    pub doc_title: String,
    #[serde(default)]
    pub page_number: Option<u32>,
    #[serde(default)]
    pub relevance_score: f64,
    #[serde(default)]
    pub content_preview: String,
}

/// Relevance assigned to a citation whose source never arrived.
const UNMATCHED_RELEVANCE: f64 = 0.8;

/// Buffers source records and citation markers as they arrive and resolves
/// each marker against the matching source. Lookups go by label first, then
/// by the document id encoded in the marker's chunk identifier.
#[derive(Debug, Default)]
pub struct CitationReconciler {
    by_label: HashMap<i64, SourceRecord>,
    by_doc: HashMap<String, SourceRecord>,
    ordered: Vec<SourceRecord>,
    markers: Vec<CitationMarker>,
}

impl CitationReconciler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index a batch of sources. Later batches extend the set; an entry with
    /// a label or document id already seen replaces the earlier one.
    pub fn add_sources(&mut self, sources: &[SourceRecord]) {
        for source in sources {
            self.by_label.insert(source.label, source.clone());
            if !source.doc_id.is_empty() {
                self.by_doc.insert(source.doc_id.clone(), source.clone());
            }
            self.ordered.push(source.clone());
        }
    }

    /// Record a citation marker and resolve it against the sources known so
    /// far. The returned citation may still be upgraded by `finalize` if its
    /// source arrives in a later frame.
    pub fn add_citation(&mut self, marker: CitationMarker) -> Citation {
        let citation = self.resolve(&marker);
        self.markers.push(marker);
        citation
    }

    /// Re-resolve every recorded marker against the complete source set.
    /// Idempotent: with no new input, repeated calls yield identical output.
    pub fn finalize(&self) -> Vec<Citation> {
        self.markers.iter().map(|m| self.resolve(m)).collect()
    }

    /// Sources in arrival order.
    pub fn sources(&self) -> &[SourceRecord] {
        &self.ordered
    }

    /// Resolve one marker: exact label match wins; otherwise look up by the
    /// document id inferred from the chunk identifier; otherwise keep the
    /// marker's own fields as a best-effort placeholder.
    fn resolve(&self, marker: &CitationMarker) -> Citation {
        let inferred = marker.inferred_doc_id().unwrap_or("");
        let source = self
            .by_label
            .get(&marker.label)
            .or_else(|| self.by_doc.get(inferred));
        match source {
            Some(s) => {
                let doc_id = if !s.doc_id.is_empty() {
                    s.doc_id.clone()
                } else {
                    inferred.to_string()
                };
                Citation {
                    chunk_index: marker.label,
                    doc_title: first_non_empty(&[s.document.as_str(), s.doc_id.as_str(), inferred]),
                    doc_id,
                    page_number: s.page_start,
                    relevance_score: s.score,
                    content_preview: s.text.clone(),
                }
            }
            None => Citation {
                chunk_index: marker.label,
                doc_id: inferred.to_string(),
                doc_title: first_non_empty(&[inferred]),
                page_number: None,
                relevance_score: UNMATCHED_RELEVANCE,
                content_preview: String::new(),
            },
        }
    }
}

fn first_non_empty(candidates: &[&str]) -> String {
    candidates
        .iter()
        .find(|c| !c.is_empty())
        .map(|c| c.to_string())
        .unwrap_or_else(|| "Unknown".into())
}
