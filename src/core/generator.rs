//! Document generation from a finalized design record
//!
//! Three documents, three independent generation turns against the remote
//! assistant, dispatched concurrently over the same immutable record
//! snapshot. One document failing does not stop the others: the report
//! carries whatever was written plus a per-document failure entry.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;

use crate::config::prompts;
use crate::conversation::record::DesignRecord;
use crate::providers::{Assistant, AssistantError, EventStream, QueryOptions, WireEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Prd,
    TechnicalGuide,
    Readme,
}

impl DocumentKind {
    pub const ALL: [DocumentKind; 3] =
        [DocumentKind::Prd, DocumentKind::TechnicalGuide, DocumentKind::Readme];

    pub fn file_name(&self) -> &'static str {
        match self {
            DocumentKind::Prd => "PRD.md",
            DocumentKind::TechnicalGuide => "CLAUDE.md",
            DocumentKind::Readme => "README.md",
        }
    }

    /// Key under which the generated body lands in `derived_sections`
    pub fn section_key(&self) -> &'static str {
        match self {
            DocumentKind::Prd => "prd",
            DocumentKind::TechnicalGuide => "technical_guide",
            DocumentKind::Readme => "readme",
        }
    }

    fn prompt(&self, record: &DesignRecord) -> String {
        match self {
            DocumentKind::Prd => prompts::prd_document(record),
            DocumentKind::TechnicalGuide => prompts::technical_guide_document(record),
            DocumentKind::Readme => prompts::readme_document(record),
        }
    }
}

impl std::fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.file_name())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum GenerateError {
    /// The record is missing required fields; return to the session to fill
    /// them in.
    #[error("design record is not ready for generation: {0}")]
    Validation(String),

    #[error("cannot prepare output directory {path}: {source}")]
    OutputDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// One document that could not be produced, with the reason.
#[derive(Debug)]
pub struct DocumentFailure {
    pub kind: DocumentKind,
    pub reason: String,
}

/// Outcome of a generation run. Partial success is a normal outcome: check
/// `failures` before assuming all three paths are present.
#[derive(Debug)]
pub struct GenerationReport {
    pub written: Vec<(DocumentKind, PathBuf)>,
    pub failures: Vec<DocumentFailure>,
    /// The record snapshot with `derived_sections` filled in for each
    /// document that was produced. The stored transcript is never touched.
    pub record: DesignRecord,
}

impl GenerationReport {
    pub fn path_for(&self, kind: DocumentKind) -> Option<&Path> {
        self.written
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, path)| path.as_path())
    }
}

pub struct DocumentGenerator {
    assistant: Arc<dyn Assistant>,
    turn_timeout: Duration,
}

impl DocumentGenerator {
    pub fn new(assistant: Arc<dyn Assistant>, turn_timeout: Duration) -> Self {
        Self {
            assistant,
            turn_timeout,
        }
    }

    /// Produce the three documents in `out_dir` from one record snapshot.
    pub async fn generate(
        &self,
        record: &DesignRecord,
        out_dir: &Path,
    ) -> Result<GenerationReport, GenerateError> {
        if record.project_name.is_none() {
            return Err(GenerateError::Validation("project name is not set".into()));
        }
        if record.project_type.is_none() {
            return Err(GenerateError::Validation("project type is not set".into()));
        }

        std::fs::create_dir_all(out_dir).map_err(|e| GenerateError::OutputDir {
            path: out_dir.to_path_buf(),
            source: e,
        })?;

        let snapshot = Arc::new(record.clone());
        let mut report = GenerationReport {
            written: Vec::new(),
            failures: Vec::new(),
            record: record.clone(),
        };

        // The one point of true concurrency: three turns over one immutable
        // snapshot, joined after all settle.
        let mut tasks = Vec::new();
        for kind in DocumentKind::ALL {
            let assistant = Arc::clone(&self.assistant);
            let prompt = kind.prompt(&snapshot);
            let timeout = self.turn_timeout;
            tasks.push((
                kind,
                tokio::spawn(async move {
                    generate_with_retry(assistant.as_ref(), &prompt, timeout).await
                }),
            ));
        }

        for (kind, task) in tasks {
            let result = task
                .await
                .unwrap_or_else(|e| Err(AssistantError::RemoteUnavailable(e.to_string())));

            match result {
                Ok(content) => {
                    if !has_top_level_heading(&content) {
                        tracing::warn!("{} has no top-level heading", kind);
                    }
                    let path = out_dir.join(kind.file_name());
                    match write_atomic(&path, content.as_bytes()) {
                        Ok(()) => {
                            report
                                .record
                                .derived_sections
                                .insert(kind.section_key().to_string(), content);
                            report.written.push((kind, path));
                        }
                        Err(e) => report.failures.push(DocumentFailure {
                            kind,
                            reason: format!("write failed: {}", e),
                        }),
                    }
                }
                Err(e) => {
                    tracing::warn!("{} generation failed: {}", kind, e);
                    report.failures.push(DocumentFailure {
                        kind,
                        reason: e.to_string(),
                    });
                }
            }
        }

        Ok(report)
    }
}

async fn generate_with_retry(
    assistant: &dyn Assistant,
    prompt: &str,
    timeout: Duration,
) -> Result<String, AssistantError> {
    let opts = QueryOptions::default();

    match generate_once(assistant, prompt, &opts, timeout).await {
        Ok(content) => Ok(content),
        Err(e) => {
            tracing::warn!("generation turn failed ({}), retrying once", e);
            generate_once(assistant, prompt, &opts, timeout).await
        }
    }
}

async fn generate_once(
    assistant: &dyn Assistant,
    prompt: &str,
    opts: &QueryOptions,
    timeout: Duration,
) -> Result<String, AssistantError> {
    let stream = assistant.query(prompt, opts).await?;

    tokio::time::timeout(timeout, collect_text(stream))
        .await
        .map_err(|_| AssistantError::RemoteUnavailable("generation turn timed out".into()))?
}

/// Concatenate the text of one response stream, honoring the terminal-event
/// contract.
async fn collect_text(mut stream: EventStream) -> Result<String, AssistantError> {
    let mut content = String::new();
    let mut closed = false;

    while let Some(event) = stream.next().await {
        match event? {
            WireEvent::Text { text, .. } => {
                if !content.is_empty() {
                    content.push('\n');
                }
                content.push_str(&text);
            }
            WireEvent::Result { .. } => {
                closed = true;
                break;
            }
            WireEvent::Error { message } => {
                return Err(AssistantError::RemoteUnavailable(message));
            }
            // Tool traffic carries no document text
            WireEvent::ToolUse { .. } | WireEvent::ToolResult { .. } => {}
        }
    }

    if !closed {
        return Err(AssistantError::Malformed(
            "generation stream ended without a result event".into(),
        ));
    }

    Ok(content)
}

fn has_top_level_heading(content: &str) -> bool {
    content.lines().any(|line| line.trim_start().starts_with('#'))
}

/// Same temp-then-rename discipline as the transcript store.
fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::record::ProjectType;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Routes each generation prompt by document and scripts its outcome.
    struct DocAssistant {
        /// How many times the technical-guide turn should fail first
        guide_failures: AtomicU32,
        guide_queries: AtomicU32,
    }

    impl DocAssistant {
        fn new(guide_failures: u32) -> Self {
            Self {
                guide_failures: AtomicU32::new(guide_failures),
                guide_queries: AtomicU32::new(0),
            }
        }

        fn document_body(title: &str) -> Vec<WireEvent> {
            vec![
                WireEvent::Text {
                    seq: 0,
                    text: format!("# {} for TaskTracker Pro", title),
                },
                WireEvent::Text {
                    seq: 1,
                    text: "Generated content.".into(),
                },
                WireEvent::Result {
                    seq: 2,
                    status: "success".into(),
                },
            ]
        }
    }

    #[async_trait]
    impl Assistant for DocAssistant {
        async fn query(
            &self,
            prompt: &str,
            _opts: &QueryOptions,
        ) -> Result<EventStream, AssistantError> {
            let events = if prompt.contains("CLAUDE.md") {
                self.guide_queries.fetch_add(1, Ordering::SeqCst);
                let remaining = self.guide_failures.load(Ordering::SeqCst);
                if remaining > 0 {
                    self.guide_failures.store(remaining - 1, Ordering::SeqCst);
                    return Err(AssistantError::RemoteUnavailable("scripted outage".into()));
                }
                Self::document_body("Technical Guide")
            } else if prompt.contains("PRD") {
                Self::document_body("PRD")
            } else {
                Self::document_body("README")
            };

            Ok(Box::pin(futures::stream::iter(
                events.into_iter().map(Ok::<_, AssistantError>),
            )))
        }
    }

    fn ready_record() -> DesignRecord {
        let mut record = DesignRecord::default();
        record.project_name = Some("TaskTracker Pro".into());
        record.project_type = Some(ProjectType::Web);
        record.push_answer("target users", "small teams");
        record.push_answer("core feature", "task tracking");
        record
    }

    fn generator(assistant: DocAssistant) -> DocumentGenerator {
        DocumentGenerator::new(Arc::new(assistant), Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_generates_all_three_documents() {
        let dir = tempfile::tempdir().unwrap();
        let report = generator(DocAssistant::new(0))
            .generate(&ready_record(), dir.path())
            .await
            .unwrap();

        assert_eq!(report.written.len(), 3);
        assert!(report.failures.is_empty());

        for kind in DocumentKind::ALL {
            let path = report.path_for(kind).unwrap();
            assert_eq!(path.file_name().unwrap().to_str().unwrap(), kind.file_name());
            let content = std::fs::read_to_string(path).unwrap();
            assert!(content.contains("TaskTracker Pro"));
            assert_eq!(
                report.record.derived_sections.get(kind.section_key()),
                Some(&content)
            );
        }
    }

    #[tokio::test]
    async fn test_partial_failure_still_writes_other_documents() {
        let dir = tempfile::tempdir().unwrap();
        // Fails the first attempt and the retry
        let report = generator(DocAssistant::new(2))
            .generate(&ready_record(), dir.path())
            .await
            .unwrap();

        assert_eq!(report.written.len(), 2);
        assert!(report.path_for(DocumentKind::Prd).is_some());
        assert!(report.path_for(DocumentKind::Readme).is_some());
        assert!(report.path_for(DocumentKind::TechnicalGuide).is_none());

        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].kind, DocumentKind::TechnicalGuide);
        assert!(!dir.path().join("CLAUDE.md").exists());
    }

    #[tokio::test]
    async fn test_transient_failure_recovered_by_retry() {
        let dir = tempfile::tempdir().unwrap();
        let assistant = DocAssistant::new(1);
        let queries = Arc::new(assistant);
        let generator =
            DocumentGenerator::new(Arc::clone(&queries) as Arc<dyn Assistant>, Duration::from_secs(5));

        let report = generator.generate(&ready_record(), dir.path()).await.unwrap();

        assert_eq!(report.written.len(), 3);
        assert!(report.failures.is_empty());
        assert_eq!(queries.guide_queries.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_validation_requires_name_and_type() {
        let dir = tempfile::tempdir().unwrap();
        let generator = generator(DocAssistant::new(0));

        let empty = DesignRecord::default();
        let err = generator.generate(&empty, dir.path()).await.unwrap_err();
        assert!(matches!(err, GenerateError::Validation(_)));

        let mut nameless = ready_record();
        nameless.project_name = None;
        let err = generator.generate(&nameless, dir.path()).await.unwrap_err();
        assert!(matches!(err, GenerateError::Validation(_)));
    }
}
