//! Query session orchestration: submit a turn over REST, drive its stream to
//! completion, keep the session tracker and external caches informed.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tracing::{debug, warn};
use uuid::Uuid;

use crate::rest::{ApiClient, ApiError, ConversationSummary};
use crate::session::{
    AlreadyProcessing, ChatMessage, SessionStateTracker, ViewTransition,
};
use crate::stream::{StreamConnection, StreamError, StreamHandlers, TurnResult};

/// Message shown in place of an answer when a turn fails outright.
const TURN_FAILED_TEXT: &str =
    "Sorry, I encountered an error processing your query. Please try again.";

/// Default wait before asking the backend for a title, so the finished turn
/// is durably persisted first.
const DEFAULT_TITLE_DELAY: Duration = Duration::from_secs(3);

/// Submission or stream failure for one turn.
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error(transparent)]
    Submit(#[from] ApiError),
    #[error(transparent)]
    Stream(#[from] StreamError),
    #[error(transparent)]
    TurnInFlight(#[from] AlreadyProcessing),
}

/// Advisory notifications to external collaborators (e.g. a UI data cache).
/// Not correctness-critical; the default implementation ignores them.
pub trait SessionNotifier: Send + Sync {
    /// The stream for a new turn opened; the session now exists server-side.
    fn session_started(&self, _session_id: &str) {}
    /// A turn finished (successfully or not); turn counts changed.
    fn turn_completed(&self, _session_id: &str) {}
}

struct NoopNotifier;

impl SessionNotifier for NoopNotifier {}

/// Public entry point for the streaming query protocol.
pub struct QuerySessionManager {
    api: ApiClient,
    stream_url: String,
    stream_timeout: Option<Duration>,
    auto_title: bool,
    title_delay: Duration,
    tracker: Arc<Mutex<SessionStateTracker>>,
    notifier: Arc<dyn SessionNotifier>,
}

impl QuerySessionManager {
    pub fn new(api: ApiClient, stream_url: &str) -> Self {
        QuerySessionManager {
            api,
            stream_url: stream_url.trim_end_matches('/').to_string(),
            stream_timeout: None,
            auto_title: true,
            title_delay: DEFAULT_TITLE_DELAY,
            tracker: Arc::new(Mutex::new(SessionStateTracker::new())),
            notifier: Arc::new(NoopNotifier),
        }
    }

    /// Close a turn's stream when no terminal frame arrives within `timeout`.
    /// Zero disables the timeout.
    pub fn with_stream_timeout(mut self, timeout: Duration) -> Self {
        self.stream_timeout = (timeout > Duration::ZERO).then_some(timeout);
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn SessionNotifier>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Configure auto title generation after a session's first turn.
    pub fn with_auto_title(mut self, enabled: bool, delay: Duration) -> Self {
        self.auto_title = enabled;
        self.title_delay = delay;
        self
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    /// Shared session tracker (also drives the view in embedding UIs).
    pub fn tracker(&self) -> &Arc<Mutex<SessionStateTracker>> {
        &self.tracker
    }

    fn lock_tracker(&self) -> MutexGuard<'_, SessionStateTracker> {
        self.tracker.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Open a fresh conversation with a client-generated session id.
    pub fn start_conversation(&self) -> String {
        let session_id = format!("session-{}", Uuid::new_v4());
        self.lock_tracker().start_new(&session_id);
        session_id
    }

    /// Submit one query turn for `session_id` and drive it to completion.
    ///
    /// Exactly one terminal outcome per call: the finished result (including
    /// synthesized transport/timeout fallbacks) or an error for submission
    /// failures, server ERROR frames, and the per-session turn guard.
    pub async fn submit(
        &self,
        session_id: &str,
        query: &str,
        mut handlers: StreamHandlers<'_>,
    ) -> Result<TurnResult, QueryError> {
        let is_first_turn;
        {
            let mut tracker = self.lock_tracker();
            tracker.begin_turn(session_id)?;
            is_first_turn = tracker
                .foreground()
                .map_or(false, |fg| fg.session_id == session_id && fg.messages.is_empty());
            tracker.push_user_message(session_id, ChatMessage::user(query));
        }

        let submission = match self.api.submit_query(Some(session_id), query).await {
            Ok(submission) => submission,
            Err(e) => {
                self.lock_tracker().complete_turn(
                    session_id,
                    Some(ChatMessage::assistant(TURN_FAILED_TEXT, Vec::new(), None)),
                );
                return Err(e.into());
            }
        };
        debug!(
            session_id = %submission.session_id,
            turn_id = %submission.turn_id,
            "query submitted"
        );

        // Tokens also feed the tracker so a foregrounded view shows progress.
        let tracker = Arc::clone(&self.tracker);
        let tracked_session = session_id.to_string();
        let mut caller_on_token = handlers.on_token.take();
        handlers.on_token = Some(Box::new(move |text: &str| {
            tracker
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .append_stream_text(&tracked_session, text);
            if let Some(on_token) = caller_on_token.as_mut() {
                on_token(text);
            }
        }));

        let outcome = match StreamConnection::open(
            &self.stream_url,
            &submission.session_id,
            &submission.turn_id,
            query,
        )
        .await
        {
            Ok(connection) => {
                self.notifier.session_started(&submission.session_id);
                let connection = match self.stream_timeout {
                    Some(timeout) => connection.with_timeout(timeout),
                    None => connection,
                };
                connection.run(&mut handlers).await
            }
            Err(StreamError::Connect(e)) => {
                // Transport failures recover locally with a fallback answer.
                warn!(error = %e, turn_id = %submission.turn_id, "stream connect failed");
                Ok(TurnResult::transport_fallback(query, &submission.turn_id))
            }
            Err(other) => Err(other),
        };

        match outcome {
            Ok(result) => {
                self.lock_tracker().complete_turn(
                    session_id,
                    Some(ChatMessage::assistant(
                        &result.answer,
                        result.citations.clone(),
                        Some(result.turn_id.clone()),
                    )),
                );
                self.notifier.turn_completed(&submission.session_id);
                if is_first_turn && self.auto_title {
                    self.spawn_title_generation(&submission.session_id);
                }
                Ok(result)
            }
            Err(e) => {
                self.lock_tracker().complete_turn(
                    session_id,
                    Some(ChatMessage::assistant(TURN_FAILED_TEXT, Vec::new(), None)),
                );
                Err(e.into())
            }
        }
    }

    /// Navigate to `session_id`, fetching history when the tracker asks for
    /// it. A missing conversation (404) is treated as empty rather than an
    /// error so an optimistic view is never clobbered.
    pub async fn load_conversation(
        &self,
        session_id: &str,
    ) -> Result<ViewTransition, ApiError> {
        let transition = self.lock_tracker().switch_to(session_id);
        if transition == ViewTransition::LoadHistory {
            match self.api.conversation_detail(session_id).await {
                Ok(detail) => {
                    self.lock_tracker().apply_history(session_id, &detail.turns);
                }
                Err(ApiError::Status { status: 404, .. }) => {
                    debug!(%session_id, "no stored conversation yet");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(transition)
    }

    pub async fn conversations(&self) -> Result<Vec<ConversationSummary>, ApiError> {
        self.api.conversations().await
    }

    pub async fn delete_conversation(&self, session_id: &str) -> Result<(), ApiError> {
        self.api.delete_conversation(session_id).await
    }

    /// Fire-and-forget title generation; failure never blocks the user.
    fn spawn_title_generation(&self, session_id: &str) {
        let api = self.api.clone();
        let delay = self.title_delay;
        let session_id = session_id.to_string();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            match api.generate_title(&session_id).await {
                Ok(title) => {
                    debug!(%session_id, title = ?title.title, "conversation title generated")
                }
                Err(e) => warn!(error = %e, %session_id, "title generation failed"),
            }
        });
    }
}
