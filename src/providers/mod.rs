//! Remote assistant integrations

pub mod claude;

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AssistantError {
    /// Connectivity or auth failure; recoverable by retry, fatal after one
    #[error("remote assistant unavailable: {0}")]
    RemoteUnavailable(String),

    /// A response unit that cannot be parsed, or arrived out of order
    #[error("malformed response: {0}")]
    Malformed(String),
}

/// Per-request configuration carried alongside the prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryOptions {
    pub max_turns: u32,
    #[serde(default)]
    pub allowed_tools: Vec<String>,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            max_turns: 1,
            allowed_tools: Vec::new(),
        }
    }
}

/// One unit on the wire. `seq` is the position within this response; the
/// engine checks contiguity and treats reordering or duplication as
/// [`AssistantError::Malformed`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WireEvent {
    Text { seq: u64, text: String },
    ToolUse { seq: u64, name: String, input: Value },
    ToolResult { seq: u64, output: Value },
    Result { seq: u64, status: String },
    Error { message: String },
}

impl WireEvent {
    pub fn seq(&self) -> Option<u64> {
        match self {
            WireEvent::Text { seq, .. }
            | WireEvent::ToolUse { seq, .. }
            | WireEvent::ToolResult { seq, .. }
            | WireEvent::Result { seq, .. } => Some(*seq),
            WireEvent::Error { .. } => None,
        }
    }

    /// A terminal event closes the response stream
    pub fn is_terminal(&self) -> bool {
        matches!(self, WireEvent::Result { .. } | WireEvent::Error { .. })
    }
}

/// Ordered stream of wire events for one response, ending at a terminal event.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<WireEvent, AssistantError>> + Send>>;

/// The remote assistant boundary. One `query` is one suspension point: the
/// caller awaits the stream to its terminal event, under its own timeout.
#[async_trait]
pub trait Assistant: Send + Sync {
    async fn query(&self, prompt: &str, opts: &QueryOptions)
        -> Result<EventStream, AssistantError>;
}
