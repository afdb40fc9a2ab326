//! Tests for citation reconciliation independent of any transport: sources
//! and markers in arbitrary interleavings, resolution order, idempotence.

use rag_chat_client::messages::{CitationMarker, SourceRecord};
use rag_chat_client::CitationReconciler;

fn source(label: i64, doc_id: &str, document: &str, score: f64, text: &str) -> SourceRecord {
    SourceRecord {
        label,
        doc_id: doc_id.into(),
        chunk_id: None,
        page_start: None,
        text: text.into(),
        score,
        document: document.into(),
    }
}

fn marker(label: i64, chunk_id: Option<&str>) -> CitationMarker {
    CitationMarker {
        label,
        chunk_id: chunk_id.map(String::from),
    }
}

#[test]
fn label_match_uses_source_fields() {
    let mut reconciler = CitationReconciler::new();
    reconciler.add_sources(&[source(1, "doc-7", "policy.pdf", 0.92, "Refunds within 30 days")]);

    let citation = reconciler.add_citation(marker(1, None));
    assert_eq!(citation.doc_id, "doc-7");
    assert_eq!(citation.doc_title, "policy.pdf");
    assert_eq!(citation.relevance_score, 0.92);
    assert_eq!(citation.content_preview, "Refunds within 30 days");
}

#[test]
fn doc_id_lookup_applies_when_label_misses() {
    let mut reconciler = CitationReconciler::new();
    reconciler.add_sources(&[source(1, "doc-7", "policy.pdf", 0.92, "Refunds")]);

    // Label 5 is unknown, but the chunk id prefix names doc-7.
    let citation = reconciler.add_citation(marker(5, Some("doc-7#4")));
    assert_eq!(citation.doc_id, "doc-7");
    assert_eq!(citation.doc_title, "policy.pdf");
    assert_eq!(citation.relevance_score, 0.92);
}

#[test]
fn label_match_wins_over_doc_id_match() {
    let mut reconciler = CitationReconciler::new();
    reconciler.add_sources(&[
        source(1, "doc-a", "a.pdf", 0.5, "from label"),
        source(2, "doc-b", "b.pdf", 0.9, "from doc id"),
    ]);

    // Both lookups could apply: label 1 and chunk prefix doc-b.
    let citation = reconciler.add_citation(marker(1, Some("doc-b#0")));
    assert_eq!(citation.doc_title, "a.pdf");
    assert_eq!(citation.content_preview, "from label");
}

#[test]
fn unmatched_citation_defaults_to_placeholder() {
    let mut reconciler = CitationReconciler::new();
    let citation = reconciler.add_citation(marker(2, Some("doc-9#3")));

    assert_eq!(citation.doc_id, "doc-9");
    assert_eq!(citation.doc_title, "doc-9");
    assert_eq!(citation.relevance_score, 0.8);
    assert_eq!(citation.content_preview, "");
}

#[test]
fn doc_title_is_never_empty() {
    let mut reconciler = CitationReconciler::new();
    // No chunk id, no source: nothing to infer a title from.
    reconciler.add_citation(marker(4, None));
    // Source with an empty display name falls back to its doc id.
    reconciler.add_sources(&[source(5, "doc-5", "", 0.4, "text")]);
    reconciler.add_citation(marker(5, None));

    for citation in reconciler.finalize() {
        assert!(!citation.doc_title.is_empty(), "{:?}", citation);
    }
}

#[test]
fn finalize_upgrades_citations_recorded_before_their_sources() {
    let mut reconciler = CitationReconciler::new();

    let early = reconciler.add_citation(marker(3, Some("doc-2#0")));
    assert_eq!(early.relevance_score, 0.8);
    assert_eq!(early.doc_title, "doc-2");

    reconciler.add_sources(&[source(3, "doc-2", "manual.md", 0.77, "Install steps")]);

    let finalized = reconciler.finalize();
    assert_eq!(finalized.len(), 1);
    assert_eq!(finalized[0].doc_title, "manual.md");
    assert_eq!(finalized[0].relevance_score, 0.77);
    assert_eq!(finalized[0].content_preview, "Install steps");
}

#[test]
fn finalize_is_idempotent() {
    let mut reconciler = CitationReconciler::new();
    reconciler.add_sources(&[
        source(1, "doc-1", "one.pdf", 0.9, "first"),
        source(2, "doc-2", "two.pdf", 0.8, "second"),
    ]);
    reconciler.add_citation(marker(1, None));
    reconciler.add_citation(marker(2, Some("doc-2#1")));
    reconciler.add_citation(marker(9, Some("doc-x#0")));

    let first = reconciler.finalize();
    let second = reconciler.finalize();
    assert_eq!(first, second);
}

#[test]
fn later_source_batches_extend_the_index() {
    let mut reconciler = CitationReconciler::new();
    reconciler.add_sources(&[source(1, "doc-1", "one.pdf", 0.9, "first")]);
    reconciler.add_sources(&[source(2, "doc-2", "two.pdf", 0.8, "second")]);

    reconciler.add_citation(marker(1, None));
    reconciler.add_citation(marker(2, None));
    let finalized = reconciler.finalize();

    assert_eq!(finalized[0].doc_title, "one.pdf");
    assert_eq!(finalized[1].doc_title, "two.pdf");
    assert_eq!(reconciler.sources().len(), 2);
}
