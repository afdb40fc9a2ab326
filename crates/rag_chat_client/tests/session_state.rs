//! Tests for the session state tracker: navigation while a turn is
//! processing, stale history fetches, and terminal cleanup.

use rag_chat_client::rest::TurnRecord;
use rag_chat_client::{ChatMessage, SessionStateTracker, ViewTransition};

fn turn(turn_id: &str, query: &str, response: &str) -> TurnRecord {
    serde_json::from_value(serde_json::json!({
        "turn_id": turn_id,
        "query": query,
        "response": response,
        "timestamp": "2026-08-07T12:00:00Z",
        "sources": [],
    }))
    .unwrap()
}

/// Put session `a` in the foreground with one user message and a turn in
/// flight that has streamed some text.
fn tracker_with_processing_session(partial: &str) -> SessionStateTracker {
    let mut tracker = SessionStateTracker::new();
    tracker.start_new("a");
    tracker.begin_turn("a").unwrap();
    tracker.push_user_message("a", ChatMessage::user("what is the refund policy?"));
    tracker.append_stream_text("a", partial);
    tracker
}

#[test]
fn begin_turn_rejects_a_second_turn_for_the_same_session() {
    let mut tracker = SessionStateTracker::new();
    tracker.start_new("a");
    tracker.begin_turn("a").unwrap();
    let err = tracker.begin_turn("a").unwrap_err();
    assert_eq!(err.session_id, "a");

    // A different session is not blocked.
    tracker.begin_turn("b").unwrap();
}

#[test]
fn navigate_away_and_back_restores_the_exact_snapshot() {
    let mut tracker = tracker_with_processing_session("Refunds are");

    // Away to another conversation: fresh view, history fetch.
    assert_eq!(tracker.switch_to("b"), ViewTransition::LoadHistory);
    assert!(tracker.foreground().unwrap().messages.is_empty());

    // Back to the processing one: buffered state, no fetch.
    assert_eq!(tracker.switch_to("a"), ViewTransition::Restored);
    let fg = tracker.foreground().unwrap();
    assert_eq!(fg.messages.len(), 1);
    assert_eq!(fg.messages[0].content, "what is the refund policy?");
    assert_eq!(fg.partial_text, "Refunds are");
    assert!(fg.streaming);
}

#[test]
fn restored_snapshot_is_unchanged_by_an_interleaved_fetch() {
    let mut tracker = tracker_with_processing_session("Refunds are");
    tracker.switch_to("b");
    tracker.switch_to("a");

    // A history fetch for the processing session resolves late: discarded.
    let applied = tracker.apply_history("a", &[turn("t1", "old query", "old answer")]);
    assert!(!applied);

    let fg = tracker.foreground().unwrap();
    assert_eq!(fg.messages.len(), 1);
    assert_eq!(fg.partial_text, "Refunds are");
}

#[test]
fn tokens_streamed_while_backgrounded_do_not_alter_the_snapshot() {
    let mut tracker = tracker_with_processing_session("Refunds are");
    tracker.switch_to("b");

    // The stream keeps running for session a while b is foregrounded.
    tracker.append_stream_text("a", " allowed within 30 days.");
    assert_eq!(tracker.foreground().unwrap().partial_text, "");

    tracker.switch_to("a");
    assert_eq!(tracker.foreground().unwrap().partial_text, "Refunds are");
}

#[test]
fn history_applies_to_a_non_processing_foreground_session() {
    let mut tracker = tracker_with_processing_session("partial");
    assert_eq!(tracker.switch_to("b"), ViewTransition::LoadHistory);

    let applied = tracker.apply_history("b", &[turn("t1", "hello", "hi there")]);
    assert!(applied);
    let fg = tracker.foreground().unwrap();
    assert_eq!(fg.messages.len(), 2);
    assert_eq!(fg.messages[0].content, "hello");
    assert_eq!(fg.messages[1].content, "hi there");
}

#[test]
fn stale_history_for_a_backgrounded_session_is_discarded() {
    let mut tracker = SessionStateTracker::new();
    tracker.start_new("a");
    tracker.switch_to("b");

    // The fetch for a resolves after the user already moved to b.
    let applied = tracker.apply_history("a", &[turn("t1", "q", "r")]);
    assert!(!applied);
    assert!(tracker.foreground().unwrap().messages.is_empty());
}

#[test]
fn empty_history_never_clobbers_a_populated_view() {
    let mut tracker = SessionStateTracker::new();
    tracker.start_new("a");
    tracker.push_user_message("a", ChatMessage::user("optimistic message"));

    let applied = tracker.apply_history("a", &[]);
    assert!(!applied);
    assert_eq!(tracker.foreground().unwrap().messages.len(), 1);
}

#[test]
fn completion_clears_processing_state_for_a_backgrounded_session() {
    let mut tracker = tracker_with_processing_session("partial");
    tracker.switch_to("b");

    tracker.complete_turn("a", None);
    assert!(!tracker.is_processing("a"));
    assert_eq!(tracker.processing_session(), None);

    // Coming back now loads history instead of a stale buffer.
    assert_eq!(tracker.switch_to("a"), ViewTransition::LoadHistory);
    assert!(tracker.apply_history("a", &[turn("t1", "q", "full answer")]));
}

#[test]
fn completion_in_the_foreground_appends_the_answer_and_stops_streaming() {
    let mut tracker = tracker_with_processing_session("Refunds are");

    tracker.complete_turn(
        "a",
        Some(ChatMessage::assistant(
            "Refunds are allowed within 30 days.",
            Vec::new(),
            Some("t1".into()),
        )),
    );

    let fg = tracker.foreground().unwrap();
    assert_eq!(fg.messages.len(), 2);
    assert_eq!(fg.messages[1].content, "Refunds are allowed within 30 days.");
    assert_eq!(fg.partial_text, "");
    assert!(!fg.streaming);
    assert!(!tracker.is_processing("a"));
}

#[test]
fn switching_to_the_current_session_is_a_no_op() {
    let mut tracker = tracker_with_processing_session("partial");
    assert_eq!(tracker.switch_to("a"), ViewTransition::Unchanged);
    assert_eq!(tracker.foreground().unwrap().partial_text, "partial");
}

#[test]
fn new_chat_keeps_the_processing_guard_for_a_running_turn() {
    let mut tracker = tracker_with_processing_session("partial");
    tracker.switch_to("b");

    tracker.start_new("c");
    // The background turn for a is still guarded.
    assert_eq!(tracker.processing_session(), Some("a"));
    assert!(!tracker.apply_history("a", &[turn("t1", "q", "r")]));

    tracker.complete_turn("a", None);
    tracker.start_new("d");
    assert_eq!(tracker.processing_session(), None);
}
