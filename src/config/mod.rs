//! Application configuration

pub mod prompts;

use std::env;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

pub use prompts::{Markers, PromptSet, builtin as prompts_builtin};

/// Default per-turn guard: how long one assistant round-trip may take
/// before the engine abandons the turn.
pub const DEFAULT_TURN_TIMEOUT_SECS: u64 = 120;

/// Default bound on counted interview turns per session.
pub const DEFAULT_MAX_TURNS: u32 = 5;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub assistant_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub data_dir: PathBuf,
    pub turn_timeout_secs: u64,
    pub max_turns: u32,
    /// Optional TOML file overriding the prompt markers
    pub prompts_file: Option<PathBuf>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            assistant_url: env::var("BLUEPRINT_ASSISTANT_URL")
                .unwrap_or_else(|_| "http://localhost:8787".into()),
            api_key: env::var("BLUEPRINT_API_KEY").ok(),
            model: env::var("BLUEPRINT_MODEL").unwrap_or_else(|_| "claude-sonnet-4".into()),
            data_dir: env::var("BLUEPRINT_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./sessions")),
            turn_timeout_secs: env::var("BLUEPRINT_TURN_TIMEOUT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_TURN_TIMEOUT_SECS),
            max_turns: env::var("BLUEPRINT_MAX_TURNS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_MAX_TURNS),
            prompts_file: env::var("BLUEPRINT_PROMPTS").ok().map(PathBuf::from),
        })
    }
}
