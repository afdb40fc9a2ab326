//! Per-conversation state: which session is foregrounded, which one has a
//! turn in flight, and the side buffers that keep a navigated-away stream
//! intact. The registry lives for the process lifetime and is only written
//! through this tracker.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::citations::Citation;
use crate::rest::TurnRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// UI-facing projection of one message. Derived from turns and stream
/// progress, never the source of truth.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    #[serde(default)]
    pub timestamp: String,
    #[serde(default)]
    pub citations: Vec<Citation>,
    #[serde(default)]
    pub turn_id: Option<String>,
}

impl ChatMessage {
    pub fn user(content: &str) -> Self {
        ChatMessage {
            role: Role::User,
            content: content.to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            citations: Vec::new(),
            turn_id: None,
        }
    }

    pub fn assistant(content: &str, citations: Vec<Citation>, turn_id: Option<String>) -> Self {
        ChatMessage {
            role: Role::Assistant,
            content: content.to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            citations,
            turn_id,
        }
    }
}

/// Snapshot of an in-progress conversation view, taken when the user
/// navigates away mid-stream and restored when they come back.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BufferedState {
    pub messages: Vec<ChatMessage>,
    pub partial_text: String,
}

/// The conversation currently rendered.
#[derive(Debug, Clone, PartialEq)]
pub struct ForegroundView {
    pub session_id: String,
    pub messages: Vec<ChatMessage>,
    /// Streamed answer text accumulated so far for the pending turn.
    pub partial_text: String,
    pub streaming: bool,
}

impl ForegroundView {
    fn empty(session_id: &str) -> Self {
        ForegroundView {
            session_id: session_id.to_string(),
            messages: Vec::new(),
            partial_text: String::new(),
            streaming: false,
        }
    }
}

/// What a navigation means for the view contents.
#[derive(Debug, Clone, PartialEq)]
pub enum ViewTransition {
    /// Already foregrounded; nothing to do.
    Unchanged,
    /// The target is the session with the turn in flight: its buffered
    /// partial state was restored, no history fetch needed.
    Restored,
    /// Fresh view; the caller should fetch history and apply it through
    /// [`SessionStateTracker::apply_history`].
    LoadHistory,
}

/// A second submit was attempted while a turn is still processing.
#[derive(Debug, thiserror::Error)]
#[error("a turn is already processing for session {session_id}")]
pub struct AlreadyProcessing {
    pub session_id: String,
}

#[derive(Debug, Default)]
struct SessionEntry {
    processing: bool,
    buffer: Option<BufferedState>,
}

/// Session registry plus foreground view state. Exactly one session is
/// foregrounded at a time; any number may be processing concurrently, but at
/// most one turn per session.
#[derive(Debug, Default)]
pub struct SessionStateTracker {
    sessions: HashMap<String, SessionEntry>,
    foreground: Option<ForegroundView>,
    /// The session whose turn is in flight, remembered across navigation.
    processing: Option<String>,
}

impl SessionStateTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn foreground(&self) -> Option<&ForegroundView> {
        self.foreground.as_ref()
    }

    pub fn processing_session(&self) -> Option<&str> {
        self.processing.as_deref()
    }

    pub fn is_processing(&self, session_id: &str) -> bool {
        self.sessions
            .get(session_id)
            .map_or(false, |e| e.processing)
    }

    /// Mark a turn as in flight for `session_id`. Turns are serialized per
    /// session: a second submit while one is processing is rejected.
    pub fn begin_turn(&mut self, session_id: &str) -> Result<(), AlreadyProcessing> {
        let entry = self.sessions.entry(session_id.to_string()).or_default();
        if entry.processing {
            return Err(AlreadyProcessing {
                session_id: session_id.to_string(),
            });
        }
        entry.processing = true;
        self.processing = Some(session_id.to_string());
        if let Some(fg) = self.foreground.as_mut() {
            if fg.session_id == session_id {
                fg.partial_text.clear();
                fg.streaming = true;
            }
        }
        Ok(())
    }

    /// Append the outgoing user message to the view (when foregrounded).
    pub fn push_user_message(&mut self, session_id: &str, message: ChatMessage) {
        if let Some(fg) = self.foreground.as_mut() {
            if fg.session_id == session_id {
                fg.messages.push(message);
            }
        }
    }

    /// Record streamed answer text. Only the foreground view accumulates;
    /// a backgrounded session's snapshot stays exactly as it was at the
    /// moment of navigating away.
    pub fn append_stream_text(&mut self, session_id: &str, text: &str) {
        if let Some(fg) = self.foreground.as_mut() {
            if fg.session_id == session_id {
                fg.partial_text.push_str(text);
                fg.streaming = true;
            }
        }
    }

    /// Navigate to an existing session. Snapshots the outgoing view into the
    /// registry when it belongs to the processing session (the stream keeps
    /// running; nothing is cancelled), and restores the snapshot when coming
    /// back to it.
    pub fn switch_to(&mut self, target: &str) -> ViewTransition {
        if self
            .foreground
            .as_ref()
            .map_or(false, |fg| fg.session_id == target)
        {
            return ViewTransition::Unchanged;
        }

        // Leaving the processing session: save its in-progress state.
        if let Some(fg) = self.foreground.take() {
            let is_processing_fg = self.processing.as_deref() == Some(fg.session_id.as_str())
                && self.is_processing(&fg.session_id);
            if is_processing_fg {
                let entry = self.sessions.entry(fg.session_id.clone()).or_default();
                entry.buffer = Some(BufferedState {
                    messages: fg.messages,
                    partial_text: fg.partial_text,
                });
            }
        }

        // Returning to the processing session: restore instead of refetching.
        if self.processing.as_deref() == Some(target) {
            if let Some(buffer) = self.sessions.get(target).and_then(|e| e.buffer.clone()) {
                self.foreground = Some(ForegroundView {
                    session_id: target.to_string(),
                    messages: buffer.messages,
                    partial_text: buffer.partial_text,
                    streaming: true,
                });
                return ViewTransition::Restored;
            }
        }

        self.foreground = Some(ForegroundView::empty(target));
        ViewTransition::LoadHistory
    }

    /// Open a brand-new conversation. The active-processing marker survives
    /// while a background turn is still running so its guard keeps working.
    pub fn start_new(&mut self, session_id: &str) {
        self.foreground = Some(ForegroundView::empty(session_id));
        let still_processing = self
            .processing
            .as_deref()
            .map_or(false, |id| self.is_processing(id));
        if !still_processing {
            self.processing = None;
        }
    }

    /// Apply a fetched history to the visible list. Discarded as stale unless
    /// the target is still foregrounded and no processing guard is set for
    /// it; an empty turn list never clobbers an already-populated view.
    /// Returns whether the fetch was applied.
    pub fn apply_history(&mut self, session_id: &str, turns: &[TurnRecord]) -> bool {
        if self.processing.as_deref() == Some(session_id) && self.is_processing(session_id) {
            return false;
        }
        let Some(fg) = self.foreground.as_mut() else {
            return false;
        };
        if fg.session_id != session_id {
            return false;
        }
        if turns.is_empty() {
            // Session exists but has no turns yet; keep what is shown.
            return false;
        }
        let mut messages = Vec::with_capacity(turns.len() * 2);
        for turn in turns {
            messages.push(ChatMessage {
                role: Role::User,
                content: turn.query.clone(),
                timestamp: turn.timestamp.clone(),
                citations: Vec::new(),
                turn_id: Some(turn.turn_id.clone()),
            });
            messages.push(ChatMessage {
                role: Role::Assistant,
                content: turn.response.clone(),
                timestamp: turn.timestamp.clone(),
                citations: turn.sources.clone(),
                turn_id: Some(turn.turn_id.clone()),
            });
        }
        fg.messages = messages;
        true
    }

    /// Terminal transition for a turn: clear the processing flag and side
    /// buffer regardless of which session is foregrounded, and append the
    /// finished (or error) message when the session is visible.
    pub fn complete_turn(&mut self, session_id: &str, message: Option<ChatMessage>) {
        if let Some(entry) = self.sessions.get_mut(session_id) {
            entry.processing = false;
            entry.buffer = None;
        }
        if self.processing.as_deref() == Some(session_id) {
            self.processing = None;
        }
        if let Some(fg) = self.foreground.as_mut() {
            if fg.session_id == session_id {
                if let Some(message) = message {
                    fg.messages.push(message);
                }
                fg.partial_text.clear();
                fg.streaming = false;
            }
        }
    }
}
