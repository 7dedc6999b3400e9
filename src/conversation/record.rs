//! The design record: structured facts accumulated across interview turns

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::config::prompts::Markers;

use super::Turn;

/// Question tag for assistant text that matched no marker. Kept verbatim so
/// nothing the assistant said is lost, even when it ignores the line format.
pub const CATCH_ALL_QUESTION: &str = "general notes";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectType {
    Web,
    Cli,
    Api,
    Mobile,
    Desktop,
    Library,
    Other,
}

impl fmt::Display for ProjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProjectType::Web => "web",
            ProjectType::Cli => "cli",
            ProjectType::Api => "api",
            ProjectType::Mobile => "mobile",
            ProjectType::Desktop => "desktop",
            ProjectType::Library => "library",
            ProjectType::Other => "other",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for ProjectType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "web" | "web application" => Ok(ProjectType::Web),
            "cli" | "cli tool" | "command-line" => Ok(ProjectType::Cli),
            "api" | "api service" => Ok(ProjectType::Api),
            "mobile" | "mobile app" => Ok(ProjectType::Mobile),
            "desktop" | "desktop app" => Ok(ProjectType::Desktop),
            "library" | "crate" => Ok(ProjectType::Library),
            "other" => Ok(ProjectType::Other),
            other => Err(format!("unknown project type: '{}'", other)),
        }
    }
}

/// One (question, answer) pair. Corrections append a new entry; the earlier
/// one stays for audit and [`DesignRecord::latest_answers`] picks the winner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    pub question: String,
    pub answer: String,
}

/// Facts the interview has established, split by topic keyword. Derived on
/// demand from the answers; never stored.
#[derive(Debug, Default, PartialEq)]
pub struct Categories {
    pub features: Vec<String>,
    pub goals: Vec<String>,
    pub tech_stack: Vec<String>,
    pub constraints: Vec<String>,
}

/// What the scanner saw in one turn besides answers; the engine feeds these
/// into its follow-up and termination decisions.
#[derive(Debug, Default, PartialEq)]
pub struct TurnExtract {
    /// Questions the assistant asked, in order
    pub asked: Vec<String>,
    /// Required dimensions flagged as not yet addressed
    pub open: Vec<String>,
    /// The completion token was seen
    pub complete: bool,
}

/// The structured accumulator built incrementally across turns.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DesignRecord {
    pub project_name: Option<String>,
    pub project_type: Option<ProjectType>,
    /// Append-only; insertion order defines document section order
    pub answers: Vec<Answer>,
    /// Populated only by the document generator
    pub derived_sections: BTreeMap<String, String>,
}

impl DesignRecord {
    pub fn push_answer(&mut self, question: &str, answer: &str) {
        self.answers.push(Answer {
            question: question.to_string(),
            answer: answer.to_string(),
        });
    }

    /// Scan one turn's text messages against the configured markers and merge
    /// what was gathered. `pending_question` is the question carried over from
    /// the previous turn, used to tag answers that don't name their question.
    pub fn absorb_turn(
        &mut self,
        turn: &Turn,
        markers: &Markers,
        pending_question: Option<&str>,
    ) -> TurnExtract {
        let mut extract = TurnExtract::default();

        for message in &turn.messages {
            let Some(text) = message.as_text() else {
                continue;
            };

            let mut unmatched = Vec::new();

            for line in text.lines() {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                if let Some(rest) = line.strip_prefix(markers.question.as_str()) {
                    extract.asked.push(rest.trim().to_string());
                } else if let Some(rest) = line.strip_prefix(markers.noted.as_str()) {
                    let rest = rest.trim();
                    // `question :: answer` is self-tagging; otherwise fall
                    // back to the most recent question
                    if let Some((q, a)) = rest.split_once("::") {
                        self.push_answer(q.trim(), a.trim());
                    } else {
                        let question = extract
                            .asked
                            .last()
                            .map(String::as_str)
                            .or(pending_question)
                            .unwrap_or(CATCH_ALL_QUESTION);
                        self.push_answer(question, rest);
                    }
                } else if let Some(rest) = line.strip_prefix(markers.open.as_str()) {
                    extract.open.push(rest.trim().to_string());
                } else if let Some(rest) = line.strip_prefix(markers.project_name.as_str()) {
                    self.project_name = Some(rest.trim().to_string());
                } else if let Some(rest) = line.strip_prefix(markers.project_type.as_str()) {
                    self.project_type =
                        Some(rest.parse().unwrap_or(ProjectType::Other));
                } else if line.contains(markers.complete.as_str()) {
                    extract.complete = true;
                } else {
                    unmatched.push(line);
                }
            }

            // Completeness over precision: keep whatever didn't match
            if !unmatched.is_empty() {
                self.push_answer(CATCH_ALL_QUESTION, &unmatched.join("\n"));
            }
        }

        extract
    }

    /// Last-one-wins view of the answers, in first-appearance order. This is
    /// what document generation consumes.
    pub fn latest_answers(&self) -> Vec<(&str, &str)> {
        let mut order: Vec<&str> = Vec::new();
        let mut latest: BTreeMap<&str, &str> = BTreeMap::new();

        for entry in &self.answers {
            if !latest.contains_key(entry.question.as_str()) {
                order.push(&entry.question);
            }
            latest.insert(&entry.question, &entry.answer);
        }

        order.into_iter().map(|q| (q, latest[q])).collect()
    }

    /// The minimal field set non-interactive sessions stop at.
    pub fn is_minimally_complete(&self) -> bool {
        self.project_name.is_some() && self.project_type.is_some() && !self.answers.is_empty()
    }

    /// Split comma-separated answers into topic lists by question keyword.
    pub fn categorized(&self) -> Categories {
        let mut categories = Categories::default();

        for (question, answer) in self.latest_answers() {
            let question = question.to_lowercase();
            let items = answer.split(',').map(|s| s.trim().to_string());

            if question.contains("feature") {
                categories.features.extend(items);
            } else if question.contains("goal") || question.contains("objective") {
                categories.goals.extend(items);
            } else if question.contains("tech") || question.contains("stack") {
                categories.tech_stack.extend(items);
            } else if question.contains("constraint") || question.contains("limitation") {
                categories.constraints.extend(items);
            }
        }

        categories
    }
}
