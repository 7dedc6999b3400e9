//! Command surface consumed by the CLI layer
//!
//! Three entry points: start a session, list stored sessions, generate
//! documents from a stored session. The CLI in `main.rs` is glue over these;
//! nothing here reads the terminal.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::config::prompts::PromptSet;
use crate::config::Config;
use crate::conversation::record::ProjectType;
use crate::conversation::SessionMode;
use crate::core::{
    ConfirmGate, ConversationEngine, DocumentGenerator, EngineError, GenerateError,
    GenerationReport, MessageObserver, SessionContext, SessionOutcome,
};
use crate::providers::claude::ClaudeProvider;
use crate::providers::Assistant;
use crate::store::{SessionSummary, StoreError, TranscriptStore};

#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Generate(#[from] GenerateError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("no stored session named '{0}'")]
    UnknownSession(String),

    #[error("prompt overrides failed to load: {0}")]
    Prompts(#[from] crate::config::prompts::PromptError),
}

async fn prompt_set(config: &Config) -> Result<PromptSet, CommandError> {
    match &config.prompts_file {
        Some(path) => Ok(PromptSet::load_from_file(path).await?),
        None => Ok(PromptSet::default()),
    }
}

/// Run one interview session end to end and return its terminal outcome.
pub async fn start_session(
    config: &Config,
    project_name: Option<String>,
    project_type: Option<ProjectType>,
    mode: SessionMode,
    gate: Option<Arc<dyn ConfirmGate>>,
    observer: Option<MessageObserver>,
    cancel: CancellationToken,
) -> Result<SessionOutcome, CommandError> {
    let assistant: Arc<dyn Assistant> = Arc::new(ClaudeProvider::new(config));
    start_session_with(
        assistant,
        config,
        project_name,
        project_type,
        mode,
        gate,
        observer,
        cancel,
    )
    .await
}

#[allow(clippy::too_many_arguments)]
pub(crate) async fn start_session_with(
    assistant: Arc<dyn Assistant>,
    config: &Config,
    project_name: Option<String>,
    project_type: Option<ProjectType>,
    mode: SessionMode,
    gate: Option<Arc<dyn ConfirmGate>>,
    observer: Option<MessageObserver>,
    cancel: CancellationToken,
) -> Result<SessionOutcome, CommandError> {
    let store = Arc::new(TranscriptStore::new(&config.data_dir)?);
    let prompts = prompt_set(config).await?;

    let mut engine = ConversationEngine::new(assistant, store, prompts);
    if let Some(gate) = gate {
        engine = engine.with_gate(gate);
    }
    if let Some(observer) = observer {
        engine = engine.with_observer(observer);
    }

    let ctx = SessionContext {
        project_name,
        project_type,
        mode,
        max_turns: config.max_turns,
        turn_timeout: Duration::from_secs(config.turn_timeout_secs),
    };

    Ok(engine.run(ctx, cancel).await?)
}

/// Stored sessions, newest first.
pub fn list_sessions(config: &Config) -> Result<Vec<SessionSummary>, CommandError> {
    let store = TranscriptStore::new(&config.data_dir)?;
    let summaries = store.list()?.collect();
    Ok(summaries)
}

/// Generate the three documents from a stored session's design record.
pub async fn generate_documents(
    config: &Config,
    session_id: &str,
    out_dir: &Path,
) -> Result<GenerationReport, CommandError> {
    let assistant: Arc<dyn Assistant> = Arc::new(ClaudeProvider::new(config));
    generate_documents_with(assistant, config, session_id, out_dir).await
}

pub(crate) async fn generate_documents_with(
    assistant: Arc<dyn Assistant>,
    config: &Config,
    session_id: &str,
    out_dir: &Path,
) -> Result<GenerationReport, CommandError> {
    let store = TranscriptStore::new(&config.data_dir)?;

    let path: PathBuf = store.resolve(session_id);
    if !path.exists() {
        return Err(CommandError::UnknownSession(session_id.to_string()));
    }

    let conversation = store.load(&path)?;
    let generator =
        DocumentGenerator::new(assistant, Duration::from_secs(config.turn_timeout_secs));

    let report = generator.generate(&conversation.record, out_dir).await?;
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::{Conversation, Message, MessageKind, Turn, TurnStatus};
    use crate::providers::{AssistantError, EventStream, QueryOptions, WireEvent};
    use async_trait::async_trait;
    use chrono::TimeZone;

    struct EchoAssistant;

    #[async_trait]
    impl Assistant for EchoAssistant {
        async fn query(
            &self,
            _prompt: &str,
            _opts: &QueryOptions,
        ) -> Result<EventStream, AssistantError> {
            let events: Vec<Result<WireEvent, AssistantError>> = vec![
                Ok(WireEvent::Text {
                    seq: 0,
                    text: "# Generated for TaskTracker Pro".into(),
                }),
                Ok(WireEvent::Result {
                    seq: 1,
                    status: "success".into(),
                }),
            ];
            Ok(Box::pin(futures::stream::iter(events)))
        }
    }

    fn config_in(dir: &Path) -> Config {
        Config {
            assistant_url: "http://localhost:0".into(),
            api_key: None,
            model: "test".into(),
            data_dir: dir.to_path_buf(),
            turn_timeout_secs: 5,
            max_turns: 3,
            prompts_file: None,
        }
    }

    fn stored_session(store_dir: &Path, with_fields: bool) -> String {
        let store = TranscriptStore::new(store_dir).unwrap();
        let mut conversation = Conversation::new(
            chrono::Utc.with_ymd_and_hms(2026, 3, 14, 9, 0, 0).unwrap(),
            SessionMode::NonInteractive,
            3,
            "Design a task tracker".into(),
        );
        conversation.push_turn(Turn {
            prompt: "Design a task tracker".into(),
            messages: vec![Message {
                sequence: 0,
                kind: MessageKind::FinalResult {
                    status: "success".into(),
                },
            }],
            status: TurnStatus::Completed,
        });
        if with_fields {
            conversation.record.project_name = Some("TaskTracker Pro".into());
            conversation.record.project_type =
                Some(crate::conversation::record::ProjectType::Web);
            conversation.record.push_answer("target users", "small teams");
        }
        let path = store.save(&conversation).unwrap();
        path.file_stem().unwrap().to_string_lossy().into_owned()
    }

    #[tokio::test]
    async fn test_generate_documents_from_stored_session() {
        let data = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let config = config_in(data.path());
        let session_id = stored_session(data.path(), true);

        let report = generate_documents_with(
            Arc::new(EchoAssistant),
            &config,
            &session_id,
            out.path(),
        )
        .await
        .unwrap();

        assert_eq!(report.written.len(), 3);
        assert!(out.path().join("PRD.md").exists());
        assert!(out.path().join("CLAUDE.md").exists());
        assert!(out.path().join("README.md").exists());
    }

    #[tokio::test]
    async fn test_generate_documents_rejects_incomplete_record() {
        let data = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let config = config_in(data.path());
        let session_id = stored_session(data.path(), false);

        let err = generate_documents_with(
            Arc::new(EchoAssistant),
            &config,
            &session_id,
            out.path(),
        )
        .await
        .unwrap_err();

        assert!(matches!(
            err,
            CommandError::Generate(GenerateError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_generate_documents_unknown_session() {
        let data = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let config = config_in(data.path());

        let err = generate_documents_with(
            Arc::new(EchoAssistant),
            &config,
            "20990101000000-nope",
            out.path(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, CommandError::UnknownSession(_)));
    }

    #[tokio::test]
    async fn test_list_sessions_reads_store() {
        let data = tempfile::tempdir().unwrap();
        let config = config_in(data.path());
        stored_session(data.path(), true);

        let sessions = list_sessions(&config).unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(
            sessions[0].project_name.as_deref(),
            Some("TaskTracker Pro")
        );
    }
}
