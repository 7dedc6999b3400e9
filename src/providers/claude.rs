//! Streaming Claude gateway provider
//!
//! Talks to a Claude Code gateway over HTTP: one POST per query, the response
//! body is newline-delimited JSON, one [`WireEvent`] per line, closed by a
//! `result` or `error` event.

use async_stream::try_stream;
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::Serialize;

use crate::config::Config;

use super::{Assistant, AssistantError, EventStream, QueryOptions, WireEvent};

pub struct ClaudeProvider {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
}

#[derive(Debug, Serialize)]
struct QueryRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    max_turns: u32,
    allowed_tools: &'a [String],
}

impl ClaudeProvider {
    pub fn new(config: &Config) -> Self {
        let client = Client::builder()
            .connect_timeout(std::time::Duration::from_secs(10))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            base_url: config.assistant_url.clone(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
        }
    }
}

fn transport_error(e: reqwest::Error) -> AssistantError {
    if e.is_decode() || e.is_body() {
        AssistantError::Malformed(e.to_string())
    } else {
        AssistantError::RemoteUnavailable(e.to_string())
    }
}

/// Parse one NDJSON line into a wire event
pub(crate) fn parse_event_line(line: &str) -> Result<WireEvent, AssistantError> {
    serde_json::from_str(line)
        .map_err(|e| AssistantError::Malformed(format!("{}: {}", e, line)))
}

#[async_trait]
impl Assistant for ClaudeProvider {
    async fn query(
        &self,
        prompt: &str,
        opts: &QueryOptions,
    ) -> Result<EventStream, AssistantError> {
        let url = format!("{}/v1/query", self.base_url);

        let request = QueryRequest {
            model: &self.model,
            prompt,
            max_turns: opts.max_turns,
            allowed_tools: &opts.allowed_tools,
        };

        let mut req_builder = self.client.post(&url).json(&request);
        if let Some(ref api_key) = self.api_key {
            req_builder = req_builder.header("Authorization", format!("Bearer {}", api_key));
        }

        let response = req_builder.send().await.map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AssistantError::RemoteUnavailable(format!(
                "HTTP {}: {}",
                status, body
            )));
        }

        let mut bytes = response.bytes_stream();

        let stream = try_stream! {
            let mut buffer = Vec::new();
            let mut terminated = false;

            'chunks: while let Some(chunk) = bytes.next().await {
                let chunk = chunk.map_err(transport_error)?;
                buffer.extend_from_slice(&chunk);

                while let Some(newline) = buffer.iter().position(|&b| b == b'\n') {
                    let line: Vec<u8> = buffer.drain(..=newline).collect();
                    let line = String::from_utf8_lossy(&line).trim().to_string();
                    if line.is_empty() {
                        continue;
                    }

                    let event = parse_event_line(&line)?;
                    let terminal = event.is_terminal();
                    yield event;
                    if terminal {
                        terminated = true;
                        break 'chunks;
                    }
                }
            }

            if !terminated {
                // The server closed the connection; a trailing unterminated
                // line may still hold the final event
                let trailing = String::from_utf8_lossy(&buffer).trim().to_string();
                if trailing.is_empty() {
                    Err(AssistantError::Malformed(
                        "stream ended without a result event".into(),
                    ))?;
                } else {
                    let event = parse_event_line(&trailing)?;
                    yield event;
                }
            }
        };

        Ok(Box::pin(stream))
    }
}
