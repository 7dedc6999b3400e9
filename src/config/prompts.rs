//! Interview prompt templates and marker configuration
//!
//! The assistant is asked to structure its replies with short line markers so
//! the engine can tell questions apart from gathered facts. The exact phrases
//! are configuration, not protocol: anything the scanner does not recognize
//! is still kept as a catch-all answer, so changing markers can never lose
//! information.
//!
//! # Example Override File
//!
//! ```toml
//! [markers]
//! question = "Q>"
//! noted = "FACT>"
//! open = "MISSING>"
//! complete = "ALL SET"
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::fs;

use crate::conversation::record::DesignRecord;
use crate::conversation::SessionMode;

/// Line markers the assistant is instructed to use, and the engine scans for.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Markers {
    /// Prefix of a line asking the user a design question
    #[serde(default = "default_question")]
    pub question: String,

    /// Prefix of a line recording a gathered design fact
    #[serde(default = "default_noted")]
    pub noted: String,

    /// Prefix of a line flagging a required dimension not yet addressed
    #[serde(default = "default_open")]
    pub open: String,

    /// Prefix of a line carrying the project name
    #[serde(default = "default_project_name")]
    pub project_name: String,

    /// Prefix of a line carrying the project type
    #[serde(default = "default_project_type")]
    pub project_type: String,

    /// Token signalling the assistant considers the design covered
    #[serde(default = "default_complete")]
    pub complete: String,
}

fn default_question() -> String {
    "QUESTION:".into()
}

fn default_noted() -> String {
    "NOTED:".into()
}

fn default_open() -> String {
    "OPEN:".into()
}

fn default_project_name() -> String {
    "PROJECT-NAME:".into()
}

fn default_project_type() -> String {
    "PROJECT-TYPE:".into()
}

fn default_complete() -> String {
    "DESIGN COMPLETE".into()
}

impl Default for Markers {
    fn default() -> Self {
        Self {
            question: default_question(),
            noted: default_noted(),
            open: default_open(),
            project_name: default_project_name(),
            project_type: default_project_type(),
            complete: default_complete(),
        }
    }
}

/// The full prompt configuration: markers plus optional extra interview
/// guidance appended to the kickoff prompt.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PromptSet {
    #[serde(default)]
    pub markers: Markers,

    #[serde(default)]
    pub extra_guidance: Option<String>,
}

impl PromptSet {
    /// Load an override file, falling back to defaults for missing fields
    pub async fn load_from_file(path: &Path) -> Result<Self, PromptError> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| PromptError::Io(e.to_string()))?;

        toml::from_str(&content).map_err(|e| PromptError::Parse(e.to_string()))
    }
}

/// Errors from prompt configuration loading
#[derive(Debug, thiserror::Error)]
pub enum PromptError {
    #[error("IO error: {0}")]
    Io(String),

    #[error("Parse error: {0}")]
    Parse(String),
}

/// First prompt of a session. Fixed template parameterized by the project
/// hints and the session mode.
pub fn kickoff(
    set: &PromptSet,
    project_name: Option<&str>,
    project_type: Option<&str>,
    mode: SessionMode,
) -> String {
    let m = &set.markers;
    let mut prompt = format!(
        "{}\n\nMark each line of your reply:\n\
         - `{}` before a question you need the user to answer\n\
         - `{}` before a design fact you have confirmed, as `question :: answer`\n\
         - `{}` before any required dimension (target users, data needs, \
         non-functional constraints) you could not address yet\n\
         - `{}` / `{}` once you know the project name and type\n\
         Reply `{}` on its own line when every dimension is covered.\n",
        builtin::INTERVIEW_BRIEF,
        m.question,
        m.noted,
        m.open,
        m.project_name,
        m.project_type,
        m.complete,
    );

    match project_name {
        Some(name) => prompt.push_str(&format!("\nThe project is called \"{}\".", name)),
        None => prompt.push_str("\nStart by asking for the project name."),
    }
    match project_type {
        Some(ptype) => prompt.push_str(&format!(" It is a {} project.", ptype)),
        None => prompt.push_str(" Ask what kind of project it is (web, cli, api, mobile, desktop, library or other)."),
    }

    match mode {
        SessionMode::Interactive => {
            prompt.push_str("\nThe user is present; keep each round to one or two questions.")
        }
        SessionMode::NonInteractive => prompt.push_str(
            "\nNo user is present; fill in reasonable assumptions and note them as gathered facts.",
        ),
    }

    if let Some(ref extra) = set.extra_guidance {
        prompt.push('\n');
        prompt.push_str(extra);
    }

    prompt
}

/// Follow-up prompt derived from the latest answer and the dimensions still
/// flagged open.
pub fn follow_up(set: &PromptSet, latest_answer: Option<&str>, open_questions: &[String]) -> String {
    let mut prompt = String::from("Continue the design interview.");

    if let Some(answer) = latest_answer {
        prompt.push_str(&format!(" The most recent answer was: \"{}\".", answer));
    }

    if open_questions.is_empty() {
        prompt.push_str(" Cover anything still missing, or confirm the design is complete.");
    } else {
        prompt.push_str(" Still open:\n");
        for q in open_questions {
            prompt.push_str(&format!("- {}\n", q));
        }
    }

    prompt.push_str(&format!(
        "\nUse the same `{}`/`{}`/`{}` line markers as before.",
        set.markers.question, set.markers.noted, set.markers.open
    ));

    prompt
}

/// Clarification sub-prompt injected when the project name or type is still
/// unknown after the first round.
pub fn clarification(set: &PromptSet, missing_name: bool, missing_type: bool) -> String {
    let m = &set.markers;
    let mut wanted = Vec::new();
    if missing_name {
        wanted.push(format!("the project name (reply with a `{}` line)", m.project_name));
    }
    if missing_type {
        wanted.push(format!(
            "the project type: web, cli, api, mobile, desktop, library or other (reply with a `{}` line)",
            m.project_type
        ));
    }

    format!(
        "Before going further, establish {}. Ask the user directly if needed.",
        wanted.join(" and ")
    )
}

fn record_block(record: &DesignRecord) -> String {
    let mut block = format!(
        "Application Name: {}\nType: {}\n",
        record.project_name.as_deref().unwrap_or("Not specified"),
        record
            .project_type
            .map(|t| t.to_string())
            .unwrap_or_else(|| "Not specified".into()),
    );

    let categories = record.categorized();
    if !categories.features.is_empty() {
        block.push_str(&format!("Primary Features: {}\n", categories.features.join(", ")));
    }
    if !categories.tech_stack.is_empty() {
        block.push_str(&format!("Tech Stack: {}\n", categories.tech_stack.join(", ")));
    }
    if !categories.goals.is_empty() {
        block.push_str(&format!("Goals: {}\n", categories.goals.join(", ")));
    }
    if !categories.constraints.is_empty() {
        block.push_str(&format!("Constraints: {}\n", categories.constraints.join(", ")));
    }

    block.push_str("Design interview findings, in order:\n");
    for (question, answer) in record.latest_answers() {
        block.push_str(&format!("- {}: {}\n", question, answer));
    }

    block
}

/// Generation prompt for the product requirements document.
pub fn prd_document(record: &DesignRecord) -> String {
    format!(
        "Generate a Product Requirements Document (PRD) for the following application:\n\n{}\n{}",
        record_block(record),
        builtin::PRD_STRUCTURE
    )
}

/// Generation prompt for the contributor-facing technical guide.
pub fn technical_guide_document(record: &DesignRecord) -> String {
    format!(
        "Generate a CLAUDE.md technical guidelines document for this application:\n\n{}\n{}",
        record_block(record),
        builtin::TECHNICAL_GUIDE_STRUCTURE
    )
}

/// Generation prompt for the end-user README.
pub fn readme_document(record: &DesignRecord) -> String {
    format!(
        "Generate a README.md file for this application:\n\n{}\n{}",
        record_block(record),
        builtin::README_STRUCTURE
    )
}

/// Built-in prompt text that doesn't require files
pub mod builtin {
    /// Framing for the interview session
    pub const INTERVIEW_BRIEF: &str = "You are a software design interviewer. \
Work with the user to pin down what they want to build: the application's \
purpose, target users, core features, data needs, technology preferences and \
constraints. Be concise and concrete; one topic at a time.";

    /// Required structure for the PRD generation turn
    pub const PRD_STRUCTURE: &str = "Create a comprehensive PRD following this structure:
1. Executive Summary
2. Problem Statement
3. Goals and Objectives
4. Target Audience
5. User Stories and Requirements
6. Functional Requirements
7. Non-Functional Requirements
8. Technical Constraints
9. Timeline and Milestones

Keep it concise but comprehensive. Focus on essential requirements without over-specification.";

    /// Required structure for the technical guide generation turn
    pub const TECHNICAL_GUIDE_STRUCTURE: &str = "Create technical guidelines following this structure:
1. Project Overview
2. Development Setup
3. Common Commands
4. Architecture Principles
5. Code Quality Standards
6. Testing Approach
7. Deployment Guidelines

Focus on KISS principles, essential commands and workflows, and simple, maintainable code standards.";

    /// Required structure for the README generation turn
    pub const README_STRUCTURE: &str = "Create a clear, user-focused README with:
1. Project title and brief description
2. Features list
3. Installation instructions
4. Usage examples
5. Configuration (if needed)
6. Contributing guidelines
7. License information

Keep it simple and focused on user needs. Avoid unnecessary technical complexity.";
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::record::ProjectType;

    #[test]
    fn test_parse_override_file() {
        let toml_content = r#"
[markers]
question = "Q>"
noted = "FACT>"
"#;

        let set: PromptSet = toml::from_str(toml_content).unwrap();
        assert_eq!(set.markers.question, "Q>");
        assert_eq!(set.markers.noted, "FACT>");
        // Untouched fields keep their defaults
        assert_eq!(set.markers.open, "OPEN:");
        assert_eq!(set.markers.complete, "DESIGN COMPLETE");
    }

    #[test]
    fn test_kickoff_embeds_hints() {
        let set = PromptSet::default();
        let prompt = kickoff(&set, Some("TaskTracker Pro"), Some("web"), SessionMode::Interactive);
        assert!(prompt.contains("TaskTracker Pro"));
        assert!(prompt.contains("web"));
        assert!(prompt.contains("QUESTION:"));
    }

    #[test]
    fn test_kickoff_asks_for_missing_hints() {
        let set = PromptSet::default();
        let prompt = kickoff(&set, None, None, SessionMode::NonInteractive);
        assert!(prompt.contains("project name"));
        assert!(prompt.contains("kind of project"));
    }

    #[test]
    fn test_document_prompts_embed_record() {
        let mut record = DesignRecord::default();
        record.project_name = Some("TaskTracker Pro".into());
        record.project_type = Some(ProjectType::Web);
        record.push_answer("target users", "small teams");

        for prompt in [
            prd_document(&record),
            technical_guide_document(&record),
            readme_document(&record),
        ] {
            assert!(prompt.contains("TaskTracker Pro"));
            assert!(prompt.contains("small teams"));
        }
    }

    #[test]
    fn test_follow_up_lists_open_questions() {
        let set = PromptSet::default();
        let prompt = follow_up(
            &set,
            Some("small teams"),
            &["non-functional constraints".to_string()],
        );
        assert!(prompt.contains("small teams"));
        assert!(prompt.contains("non-functional constraints"));
    }

    #[test]
    fn test_clarification_names_missing_fields() {
        let set = PromptSet::default();
        let prompt = clarification(&set, true, true);
        assert!(prompt.contains("project name"));
        assert!(prompt.contains("project type"));
    }
}
