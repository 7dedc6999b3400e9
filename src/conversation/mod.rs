//! Conversation types: messages, turns and the session aggregate

pub mod record;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use record::DesignRecord;

/// One unit received from the remote assistant, tagged by kind so the engine
/// can handle each case exhaustively.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MessageKind {
    Text { text: String },
    ToolUse { name: String, input: Value },
    ToolResult { output: Value },
    FinalResult { status: String },
    Error { message: String },
}

/// A message with its global position in the conversation.
///
/// Sequence numbers are strictly increasing and gap-free across the whole
/// conversation; [`Conversation::push_turn`] enforces this on append.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub sequence: u64,
    #[serde(flatten)]
    pub kind: MessageKind,
}

impl Message {
    /// The text body, for text messages only
    pub fn as_text(&self) -> Option<&str> {
        match &self.kind {
            MessageKind::Text { text } => Some(text),
            _ => None,
        }
    }

    pub fn is_final(&self) -> bool {
        matches!(self.kind, MessageKind::FinalResult { .. })
    }
}

/// How a turn ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnStatus {
    Completed,
    Failed,
}

/// One prompt/response round-trip. Turns are only appended once fully
/// received; an abandoned response never produces a half-recorded turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub prompt: String,
    pub messages: Vec<Message>,
    pub status: TurnStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SessionMode {
    Interactive,
    NonInteractive,
}

/// The top-level session aggregate: metadata, the ordered turn log and the
/// design record being built.
///
/// The conversation engine exclusively owns and mutates this for the
/// session's lifetime; the transcript store only ever reads a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: Uuid,
    pub started_at: DateTime<Utc>,
    pub mode: SessionMode,
    pub max_turns: u32,
    /// The initiating prompt; also the transcript slug source
    pub kickoff_prompt: String,
    pub turns: Vec<Turn>,
    pub record: DesignRecord,
}

impl Conversation {
    pub fn new(
        started_at: DateTime<Utc>,
        mode: SessionMode,
        max_turns: u32,
        kickoff_prompt: String,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            started_at,
            mode,
            max_turns,
            kickoff_prompt,
            turns: Vec::new(),
            record: DesignRecord::default(),
        }
    }

    /// Total messages across all turns; also the next free sequence number.
    pub fn message_count(&self) -> u64 {
        self.turns.iter().map(|t| t.messages.len() as u64).sum()
    }

    /// Append a completed turn, checking the gap-free sequence invariant.
    ///
    /// Panics in debug builds if the turn's messages do not continue the
    /// conversation's sequence exactly; the engine assigns sequences, so a
    /// violation here is a programming error, not bad input.
    pub fn push_turn(&mut self, turn: Turn) {
        debug_assert!(
            turn.messages
                .iter()
                .zip(self.message_count()..)
                .all(|(m, expected)| m.sequence == expected),
            "turn messages must continue the conversation sequence"
        );
        self.turns.push(turn);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fixed_start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 14, 9, 26, 53).unwrap()
    }

    fn text(sequence: u64, body: &str) -> Message {
        Message {
            sequence,
            kind: MessageKind::Text {
                text: body.to_string(),
            },
        }
    }

    #[test]
    fn test_message_kind_tagged_serialization() {
        let msg = Message {
            sequence: 3,
            kind: MessageKind::ToolUse {
                name: "search".into(),
                input: serde_json::json!({"query": "rust"}),
            },
        };

        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["kind"], "tool_use");
        assert_eq!(json["sequence"], 3);
        assert_eq!(json["name"], "search");
    }

    #[test]
    fn test_round_trip_equality() {
        let mut conversation = Conversation::new(
            fixed_start(),
            SessionMode::Interactive,
            5,
            "Design a task tracker".into(),
        );
        conversation.push_turn(Turn {
            prompt: "Design a task tracker".into(),
            messages: vec![
                text(0, "QUESTION: who are the users?"),
                Message {
                    sequence: 1,
                    kind: MessageKind::FinalResult {
                        status: "success".into(),
                    },
                },
            ],
            status: TurnStatus::Completed,
        });
        conversation.record.push_answer("target users", "small teams");

        let serialized = serde_json::to_string(&conversation).unwrap();
        let parsed: Conversation = serde_json::from_str(&serialized).unwrap();
        assert_eq!(parsed, conversation);
    }

    #[test]
    fn test_message_count_spans_turns() {
        let mut conversation =
            Conversation::new(fixed_start(), SessionMode::NonInteractive, 3, "go".into());
        conversation.push_turn(Turn {
            prompt: "go".into(),
            messages: vec![text(0, "a"), text(1, "b")],
            status: TurnStatus::Completed,
        });
        conversation.push_turn(Turn {
            prompt: "more".into(),
            messages: vec![text(2, "c")],
            status: TurnStatus::Completed,
        });

        assert_eq!(conversation.message_count(), 3);
    }

    #[test]
    #[should_panic(expected = "continue the conversation sequence")]
    #[cfg(debug_assertions)]
    fn test_push_turn_rejects_sequence_gap() {
        let mut conversation =
            Conversation::new(fixed_start(), SessionMode::NonInteractive, 3, "go".into());
        conversation.push_turn(Turn {
            prompt: "go".into(),
            messages: vec![text(5, "out of order")],
            status: TurnStatus::Completed,
        });
    }
}
