//! Conversation engine: the bounded interview turn loop
//!
//! The engine owns one [`Conversation`] for a session's lifetime. Each
//! iteration dispatches a prompt, collects the ordered message sequence for
//! that turn, feeds the answers into the design record, persists the whole
//! conversation, and then decides between another turn and a terminal state.
//! The transcript on disk always reflects the most recent completed turn, so
//! an interruption never loses progress.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::config::prompts::{self, PromptSet};
use crate::conversation::record::{DesignRecord, ProjectType, TurnExtract};
use crate::conversation::{Conversation, Message, MessageKind, SessionMode, Turn, TurnStatus};
use crate::providers::{Assistant, AssistantError, QueryOptions, WireEvent};
use crate::store::{StoreError, TranscriptStore};

/// How long an in-flight turn may keep running after a cancellation signal
/// before it is abandoned.
const CANCEL_GRACE: Duration = Duration::from_secs(2);

/// Everything a session needs, passed explicitly; there is no process-wide
/// session state.
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub project_name: Option<String>,
    pub project_type: Option<ProjectType>,
    pub mode: SessionMode,
    pub max_turns: u32,
    pub turn_timeout: Duration,
}

/// Terminal states of a session. Exhausting the turn budget and cancellation
/// are normal outcomes, not errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Completed,
    TurnLimitReached,
    Cancelled,
}

#[derive(Debug)]
pub struct SessionOutcome {
    pub status: SessionStatus,
    pub conversation: Conversation,
    pub transcript_path: PathBuf,
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// A turn failed after its one retry. The transcript path, when present,
    /// points at the last persisted state so the session can be resumed or
    /// reported.
    #[error("turn {turn_index} failed: {source}")]
    Turn {
        turn_index: usize,
        transcript: Option<PathBuf>,
        #[source]
        source: AssistantError,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Seam for the interactive "design complete?" confirmation. The CLI asks the
/// terminal; tests answer directly. The engine never reads stdin itself.
#[async_trait]
pub trait ConfirmGate: Send + Sync {
    async fn confirm_complete(&self, record: &DesignRecord) -> bool;
}

/// Callback invoked for every ingested message, for progressive rendering.
pub type MessageObserver = Box<dyn Fn(&Message) + Send + Sync>;

pub struct ConversationEngine {
    assistant: Arc<dyn Assistant>,
    store: Arc<TranscriptStore>,
    prompts: PromptSet,
    gate: Option<Arc<dyn ConfirmGate>>,
    observer: Option<MessageObserver>,
}

impl ConversationEngine {
    pub fn new(
        assistant: Arc<dyn Assistant>,
        store: Arc<TranscriptStore>,
        prompts: PromptSet,
    ) -> Self {
        Self {
            assistant,
            store,
            prompts,
            gate: None,
            observer: None,
        }
    }

    /// Attach the interactive completion gate
    pub fn with_gate(mut self, gate: Arc<dyn ConfirmGate>) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Observe each message as it is ingested, for progressive rendering
    pub fn with_observer(mut self, observer: MessageObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Initialize a conversation with the kickoff prompt for this context.
    pub fn start(&self, ctx: &SessionContext) -> Conversation {
        let type_hint = ctx.project_type.map(|t| t.to_string());
        let kickoff = prompts::kickoff(
            &self.prompts,
            ctx.project_name.as_deref(),
            type_hint.as_deref(),
            ctx.mode,
        );

        let mut conversation = Conversation::new(Utc::now(), ctx.mode, ctx.max_turns, kickoff);
        conversation.record.project_name = ctx.project_name.clone();
        conversation.record.project_type = ctx.project_type;
        conversation
    }

    /// Run a full session: kickoff, turn loop, terminal persistence.
    pub async fn run(
        &self,
        ctx: SessionContext,
        cancel: CancellationToken,
    ) -> Result<SessionOutcome, EngineError> {
        let conversation = self.start(&ctx);
        self.run_turn_loop(conversation, &ctx, cancel).await
    }

    async fn run_turn_loop(
        &self,
        mut conversation: Conversation,
        ctx: &SessionContext,
        cancel: CancellationToken,
    ) -> Result<SessionOutcome, EngineError> {
        let mut next_prompt = conversation.kickoff_prompt.clone();
        let mut pending_question: Option<String> = None;
        let mut transcript: Option<PathBuf> = None;
        let mut counted_turns: u32 = 0;
        let mut clarified = false;

        let status = loop {
            if cancel.is_cancelled() {
                break SessionStatus::Cancelled;
            }
            if counted_turns >= ctx.max_turns {
                break SessionStatus::TurnLimitReached;
            }

            let turn = match self.run_turn(&conversation, &next_prompt, ctx, &cancel).await {
                Ok(Some(turn)) => turn,
                // Abandoned mid-flight by cancellation; nothing half-recorded
                Ok(None) => break SessionStatus::Cancelled,
                Err(source) => {
                    return Err(EngineError::Turn {
                        turn_index: conversation.turns.len(),
                        transcript,
                        source,
                    })
                }
            };
            counted_turns += 1;

            let failed = turn.status == TurnStatus::Failed;
            let extract =
                conversation
                    .record
                    .absorb_turn(&turn, &self.prompts.markers, pending_question.as_deref());
            if let Some(question) = extract.asked.last() {
                pending_question = Some(question.clone());
            }

            let remote_error = turn.messages.iter().rev().find_map(|m| match &m.kind {
                MessageKind::Error { message } => Some(message.clone()),
                _ => None,
            });
            conversation.push_turn(turn);
            transcript = Some(self.store.save(&conversation)?);

            if failed {
                return Err(EngineError::Turn {
                    turn_index: conversation.turns.len() - 1,
                    transcript,
                    source: AssistantError::RemoteUnavailable(
                        remote_error.unwrap_or_else(|| "assistant reported an error".into()),
                    ),
                });
            }

            // One clarification round if the basics are still unknown; it
            // does not count against the turn budget.
            if !clarified
                && (conversation.record.project_name.is_none()
                    || conversation.record.project_type.is_none())
            {
                clarified = true;
                let prompt = prompts::clarification(
                    &self.prompts,
                    conversation.record.project_name.is_none(),
                    conversation.record.project_type.is_none(),
                );
                match self.run_turn(&conversation, &prompt, ctx, &cancel).await {
                    Ok(Some(turn)) => {
                        conversation.record.absorb_turn(
                            &turn,
                            &self.prompts.markers,
                            pending_question.as_deref(),
                        );
                        conversation.push_turn(turn);
                        transcript = Some(self.store.save(&conversation)?);
                    }
                    Ok(None) => break SessionStatus::Cancelled,
                    Err(source) => {
                        return Err(EngineError::Turn {
                            turn_index: conversation.turns.len(),
                            transcript,
                            source,
                        })
                    }
                }
            }

            if self.is_session_complete(&conversation, ctx.mode, &extract).await {
                break SessionStatus::Completed;
            }

            let latest_answer = conversation
                .record
                .answers
                .last()
                .map(|entry| entry.answer.clone());
            next_prompt = prompts::follow_up(&self.prompts, latest_answer.as_deref(), &extract.open);
        };

        // Terminal write: cancellation and exhaustion still leave a durable,
        // parseable transcript behind.
        let transcript_path = self.store.save(&conversation)?;

        Ok(SessionOutcome {
            status,
            conversation,
            transcript_path,
        })
    }

    async fn is_session_complete(
        &self,
        conversation: &Conversation,
        mode: SessionMode,
        extract: &TurnExtract,
    ) -> bool {
        let signalled = extract.complete
            || conversation.turns.last().map_or(false, |turn| {
                turn.messages.iter().any(|m| {
                    matches!(&m.kind, MessageKind::FinalResult { status } if status == "complete")
                })
            });

        match mode {
            SessionMode::NonInteractive => {
                signalled || conversation.record.is_minimally_complete()
            }
            SessionMode::Interactive => {
                if !signalled && !extract.open.is_empty() {
                    return false;
                }
                match &self.gate {
                    Some(gate) => gate.confirm_complete(&conversation.record).await,
                    None => signalled,
                }
            }
        }
    }

    /// One prompt/response round-trip, with the single local retry for
    /// transient failures. `Ok(None)` means the turn was abandoned because of
    /// cancellation and must not be recorded.
    async fn run_turn(
        &self,
        conversation: &Conversation,
        prompt: &str,
        ctx: &SessionContext,
        cancel: &CancellationToken,
    ) -> Result<Option<Turn>, AssistantError> {
        let base_sequence = conversation.message_count();

        let mut last_err = None;
        for attempt in 0..2 {
            let collect = self.collect_turn(prompt, base_sequence, ctx);
            tokio::pin!(collect);

            let result = tokio::select! {
                result = &mut collect => Some(result),
                _ = cancel.cancelled() => None,
            };

            let result = match result {
                Some(result) => result,
                // Cancelled mid-turn: let the response finish within the
                // grace period, otherwise abandon it.
                None => match tokio::time::timeout(CANCEL_GRACE, &mut collect).await {
                    Ok(result) => result,
                    Err(_) => return Ok(None),
                },
            };

            match result {
                Ok(turn) if turn.status == TurnStatus::Failed && attempt == 0 => {
                    tracing::warn!("assistant reported an error, retrying turn once");
                }
                Ok(turn) => return Ok(Some(turn)),
                Err(e) if attempt == 0 => {
                    tracing::warn!("turn attempt failed ({}), retrying once", e);
                    last_err = Some(e);
                }
                Err(e) => return Err(e),
            }

            if cancel.is_cancelled() {
                return Ok(None);
            }
        }

        // Unreachable: the second iteration always returns
        Err(last_err.unwrap_or_else(|| AssistantError::RemoteUnavailable("retry exhausted".into())))
    }

    /// Collect one response stream into a closed turn, enforcing the wire
    /// ordering contract and the per-turn timeout.
    async fn collect_turn(
        &self,
        prompt: &str,
        base_sequence: u64,
        ctx: &SessionContext,
    ) -> Result<Turn, AssistantError> {
        let opts = QueryOptions {
            max_turns: ctx.max_turns,
            allowed_tools: Vec::new(),
        };

        let gather = async {
            let mut stream = self.assistant.query(prompt, &opts).await?;
            let mut messages: Vec<Message> = Vec::new();
            let mut expected_seq = 0u64;

            while let Some(event) = stream.next().await {
                let event = event?;

                if let Some(seq) = event.seq() {
                    if seq != expected_seq {
                        return Err(AssistantError::Malformed(format!(
                            "wire event out of order: got seq {}, expected {}",
                            seq, expected_seq
                        )));
                    }
                    expected_seq += 1;
                }

                let terminal = event.is_terminal();
                let message = Message {
                    sequence: base_sequence + messages.len() as u64,
                    kind: kind_from_event(event),
                };
                if let Some(ref observer) = self.observer {
                    observer(&message);
                }
                messages.push(message);

                if terminal {
                    break;
                }
            }

            let status = match messages.last() {
                Some(m) if m.is_final() => TurnStatus::Completed,
                Some(m) if matches!(m.kind, MessageKind::Error { .. }) => TurnStatus::Failed,
                _ => {
                    return Err(AssistantError::Malformed(
                        "response ended without a terminal message".into(),
                    ))
                }
            };

            Ok(Turn {
                prompt: prompt.to_string(),
                messages,
                status,
            })
        };

        tokio::time::timeout(ctx.turn_timeout, gather)
            .await
            .map_err(|_| AssistantError::RemoteUnavailable("turn timed out".into()))?
    }
}

fn kind_from_event(event: WireEvent) -> MessageKind {
    match event {
        WireEvent::Text { text, .. } => MessageKind::Text { text },
        WireEvent::ToolUse { name, input, .. } => MessageKind::ToolUse { name, input },
        WireEvent::ToolResult { output, .. } => MessageKind::ToolResult { output },
        WireEvent::Result { status, .. } => MessageKind::FinalResult { status },
        WireEvent::Error { message } => MessageKind::Error { message },
    }
}
