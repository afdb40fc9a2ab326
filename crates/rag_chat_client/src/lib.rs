//! Streaming query session client for the RAG chat backend: REST submission,
//! WebSocket answer streaming, citation reconciliation, and per-conversation
//! state tracking. Used by the TUI binary and embedding UIs.

pub mod citations;
pub mod config;
pub mod manager;
pub mod messages;
pub mod rest;
pub mod session;
pub mod stream;

pub use citations::{Citation, CitationReconciler};
pub use config::{default_config_path, Config, ConfigError};
pub use manager::{QueryError, QuerySessionManager, SessionNotifier};
pub use messages::{CitationMarker, SourceRecord, StreamFrame};
pub use rest::{ApiClient, ApiError, ConversationDetail, ConversationSummary, TurnRecord};
pub use session::{
    BufferedState, ChatMessage, ForegroundView, Role, SessionStateTracker, ViewTransition,
};
pub use stream::{SourceInfo, StreamConnection, StreamError, StreamHandlers, TurnResult};
