//! Durable transcript persistence
//!
//! One JSON file per conversation, named from the session start time plus a
//! slug of the kickoff prompt. Writes go through a temp file in the same
//! directory and are renamed into place, so a transcript on disk either
//! parses or does not exist; re-saving a session overwrites its own path.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::conversation::Conversation;

/// How much of the kickoff prompt feeds the file-name slug
const SLUG_PROMPT_CHARS: usize = 40;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("transcript IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("transcript at {path} does not parse: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// One row of `list()`: enough to pick a session without parsing it twice.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSummary {
    pub path: PathBuf,
    pub started_at: DateTime<Utc>,
    pub message_count: u64,
    pub project_name: Option<String>,
}

pub struct TranscriptStore {
    dir: PathBuf,
}

/// Lowercase the prompt head, replace non-alphanumerics with `-`, collapse
/// runs. Deterministic so repeated saves land on the same path.
fn slugify(prompt: &str) -> String {
    let mut slug = String::new();
    let mut last_dash = true;

    for c in prompt.chars().take(SLUG_PROMPT_CHARS) {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
            last_dash = false;
        } else if !last_dash {
            slug.push('-');
            last_dash = true;
        }
    }

    slug.trim_end_matches('-').to_string()
}

impl TranscriptStore {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| StoreError::Io {
            path: dir.clone(),
            source: e,
        })?;
        Ok(Self { dir })
    }

    /// The deterministic path a conversation persists to.
    pub fn path_for(&self, conversation: &Conversation) -> PathBuf {
        let stamp = conversation.started_at.format("%Y%m%d%H%M%S");
        let slug = slugify(&conversation.kickoff_prompt);
        let name = if slug.is_empty() {
            format!("{}.json", stamp)
        } else {
            format!("{}-{}.json", stamp, slug)
        };
        self.dir.join(name)
    }

    /// Persist a snapshot. Atomic from the caller's perspective: the content
    /// lands under a temp name first and is renamed over the target.
    pub fn save(&self, conversation: &Conversation) -> Result<PathBuf, StoreError> {
        let path = self.path_for(conversation);
        let json = serde_json::to_vec_pretty(conversation).map_err(|e| StoreError::Corrupt {
            path: path.clone(),
            source: e,
        })?;

        let io = |e| StoreError::Io {
            path: path.clone(),
            source: e,
        };

        let mut tmp = tempfile::NamedTempFile::new_in(&self.dir).map_err(io)?;
        tmp.write_all(&json).map_err(io)?;
        tmp.persist(&path).map_err(|e| io(e.error))?;

        Ok(path)
    }

    pub fn load(&self, path: &Path) -> Result<Conversation, StoreError> {
        let content = fs::read_to_string(path).map_err(|e| StoreError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;

        serde_json::from_str(&content).map_err(|e| StoreError::Corrupt {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Resolve a session id (the file stem, as printed by `list`) to a path.
    pub fn resolve(&self, session_id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", session_id))
    }

    /// Lazy, restartable, newest-first walk of the store. Files that fail to
    /// parse are logged and skipped, never fatal to the listing.
    pub fn list(&self) -> Result<impl Iterator<Item = SessionSummary> + '_, StoreError> {
        let entries = fs::read_dir(&self.dir).map_err(|e| StoreError::Io {
            path: self.dir.clone(),
            source: e,
        })?;

        let mut paths: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.extension().map_or(false, |ext| ext == "json"))
            .collect();

        // Timestamp-prefixed names: reverse lexical order is newest-first
        paths.sort();
        paths.reverse();

        Ok(paths.into_iter().filter_map(|path| match self.load(&path) {
            Ok(conversation) => Some(SessionSummary {
                started_at: conversation.started_at,
                message_count: conversation.message_count(),
                project_name: conversation.record.project_name,
                path,
            }),
            Err(e) => {
                tracing::warn!("skipping unreadable transcript {}: {}", path.display(), e);
                None
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::{Message, MessageKind, SessionMode, Turn, TurnStatus};
    use chrono::TimeZone;

    fn conversation_at(hour: u32, kickoff: &str) -> Conversation {
        Conversation::new(
            Utc.with_ymd_and_hms(2026, 3, 14, hour, 0, 0).unwrap(),
            SessionMode::Interactive,
            5,
            kickoff.to_string(),
        )
    }

    fn text_turn(prompt: &str, sequence: u64, body: &str) -> Turn {
        Turn {
            prompt: prompt.to_string(),
            messages: vec![Message {
                sequence,
                kind: MessageKind::Text {
                    text: body.to_string(),
                },
            }],
            status: TurnStatus::Completed,
        }
    }

    #[test]
    fn test_slug_collapses_and_truncates() {
        assert_eq!(slugify("Design a CLI -- for tasks!"), "design-a-cli-for-tasks");
        assert_eq!(
            slugify("This prompt is much much longer than forty characters total"),
            "this-prompt-is-much-much-longer-than-for"
        );
        assert_eq!(slugify("!!!"), "");
    }

    #[test]
    fn test_save_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = TranscriptStore::new(dir.path()).unwrap();

        let mut conversation = conversation_at(9, "Design a task tracker");
        conversation.push_turn(text_turn("Design a task tracker", 0, "NOTED: a :: b"));
        conversation.record.push_answer("a", "b");

        let path = store.save(&conversation).unwrap();
        assert!(path
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("20260314090000-design-a-task-tracker"));

        let loaded = store.load(&path).unwrap();
        assert_eq!(loaded, conversation);
    }

    #[test]
    fn test_save_is_idempotent_byte_for_byte() {
        let dir = tempfile::tempdir().unwrap();
        let store = TranscriptStore::new(dir.path()).unwrap();
        let conversation = conversation_at(9, "Design a task tracker");

        let path = store.save(&conversation).unwrap();
        let first = fs::read(&path).unwrap();
        let path_again = store.save(&conversation).unwrap();
        let second = fs::read(&path_again).unwrap();

        assert_eq!(path, path_again);
        assert_eq!(first, second);
    }

    #[test]
    fn test_resave_overwrites_same_path() {
        let dir = tempfile::tempdir().unwrap();
        let store = TranscriptStore::new(dir.path()).unwrap();
        let mut conversation = conversation_at(9, "Design a task tracker");

        let path = store.save(&conversation).unwrap();
        conversation.push_turn(text_turn("more", 0, "NOTED: a :: b"));
        let path2 = store.save(&conversation).unwrap();

        assert_eq!(path, path2);
        let files: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(files.len(), 1);
        assert_eq!(store.load(&path).unwrap().turns.len(), 1);
    }

    #[test]
    fn test_list_newest_first_and_skips_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let store = TranscriptStore::new(dir.path()).unwrap();

        let mut early = conversation_at(8, "first session");
        early.record.project_name = Some("Early".into());
        let mut late = conversation_at(11, "second session");
        late.record.project_name = Some("Late".into());
        store.save(&early).unwrap();
        store.save(&late).unwrap();

        fs::write(dir.path().join("20260314120000-broken.json"), b"{ nope").unwrap();

        let summaries: Vec<_> = store.list().unwrap().collect();
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].project_name.as_deref(), Some("Late"));
        assert_eq!(summaries[1].project_name.as_deref(), Some("Early"));
    }

    #[test]
    fn test_distinct_sessions_never_collide() {
        let dir = tempfile::tempdir().unwrap();
        let store = TranscriptStore::new(dir.path()).unwrap();

        let a = conversation_at(9, "same prompt");
        let b = conversation_at(10, "same prompt");

        assert_ne!(store.path_for(&a), store.path_for(&b));
    }
}
