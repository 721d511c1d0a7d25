//! AI prompt builder via an OpenAI-compatible chat completions API.
//!
//! Turns a user's goal into three starter prompts. The model is asked for a
//! bare JSON array; replies wrapped in a markdown code fence are accepted too.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

pub const DEFAULT_PROMPT_MODEL: &str = "google-ai-studio/gemini-2.5-flash";

const SYSTEM_PROMPT: &str = "You are an expert prompt engineer. Based on the user's goal, \
generate 3 distinct, high-quality, and effective prompts. The prompts should be creative, \
clear, and designed to elicit the best possible response from a large language model. \
Return the prompts as a JSON array of strings. For example: [\"prompt 1\", \"prompt 2\", \
\"prompt 3\"]. Do not include any other text or markdown formatting.";

#[derive(Debug, Error)]
pub enum PromptError {
    #[error("prompt builder is not configured (missing AI base URL or API key)")]
    NotConfigured,

    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("upstream error {status}: {body}")]
    Upstream {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("reply is not a JSON array of strings: {0}")]
    InvalidReply(String),
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: [CompletionMessage<'a>; 2],
}

#[derive(Debug, Serialize)]
struct CompletionMessage<'a> {
    role: &'static str,
    content: std::borrow::Cow<'a, str>,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: CompletionReply,
}

#[derive(Debug, Deserialize)]
struct CompletionReply {
    #[serde(default)]
    content: Option<String>,
}

pub struct PromptBuilder {
    client: reqwest::Client,
    base_url: Option<String>,
    api_key: Option<String>,
    model: String,
}

impl PromptBuilder {
    pub fn new(base_url: Option<String>, api_key: Option<String>, model: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.map(|url| url.trim_end_matches('/').to_string()),
            api_key: api_key.filter(|key| !key.is_empty()),
            model,
        }
    }

    /// Ask the model for prompts serving `goal`.
    pub async fn generate(&self, goal: &str) -> Result<Vec<String>, PromptError> {
        let (Some(base_url), Some(api_key)) = (&self.base_url, &self.api_key) else {
            return Err(PromptError::NotConfigured);
        };

        let body = CompletionRequest {
            model: &self.model,
            messages: [
                CompletionMessage {
                    role: "system",
                    content: SYSTEM_PROMPT.into(),
                },
                CompletionMessage {
                    role: "user",
                    content: format!("My goal is: \"{goal}\"").into(),
                },
            ],
        };
        let url = format!("{base_url}/chat/completions");

        // Retry once on 429 (rate limit)
        let content = match self.call(&url, api_key, &body).await {
            Err(PromptError::Upstream { status, .. })
                if status == reqwest::StatusCode::TOO_MANY_REQUESTS =>
            {
                warn!(
                    component = "prompt_builder",
                    event = "prompt_builder.rate_limited",
                    "Rate limited, retrying once"
                );
                tokio::time::sleep(Duration::from_secs(2)).await;
                self.call(&url, api_key, &body).await?
            }
            other => other?,
        };

        let prompts =
            parse_prompt_list(&content).ok_or_else(|| PromptError::InvalidReply(content.clone()))?;
        info!(
            component = "prompt_builder",
            event = "prompt_builder.generated",
            count = prompts.len(),
            "Generated prompts"
        );
        Ok(prompts)
    }

    async fn call(
        &self,
        url: &str,
        api_key: &str,
        body: &CompletionRequest<'_>,
    ) -> Result<String, PromptError> {
        let resp = self
            .client
            .post(url)
            .header("Authorization", format!("Bearer {}", api_key))
            .json(body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(PromptError::Upstream { status, body });
        }

        let completion: CompletionResponse = resp.json().await?;
        Ok(completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .unwrap_or_default()
            .trim()
            .to_string())
    }
}

/// Parse a model reply as a JSON array of strings, first as-is, then with a
/// surrounding ```json fence stripped.
pub fn parse_prompt_list(content: &str) -> Option<Vec<String>> {
    serde_json::from_str::<Vec<String>>(content)
        .ok()
        .or_else(|| serde_json::from_str::<Vec<String>>(strip_code_fence(content)).ok())
}

fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    let without_open = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    without_open
        .trim_end()
        .strip_suffix("```")
        .unwrap_or(without_open)
        .trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bare_array() {
        assert_eq!(
            parse_prompt_list(r#"["a", "b", "c"]"#),
            Some(vec!["a".to_string(), "b".to_string(), "c".to_string()])
        );
    }

    #[test]
    fn parses_fenced_array() {
        let reply = "```json\n[\"one\", \"two\"]\n```";
        assert_eq!(
            parse_prompt_list(reply),
            Some(vec!["one".to_string(), "two".to_string()])
        );
        assert_eq!(parse_prompt_list("```\n[\"x\"]```"), Some(vec!["x".to_string()]));
    }

    #[test]
    fn rejects_non_string_arrays_and_prose() {
        assert_eq!(parse_prompt_list("[1, 2]"), None);
        assert_eq!(parse_prompt_list("Here are some prompts: a, b, c"), None);
        assert_eq!(parse_prompt_list(r#"{"prompts": ["a"]}"#), None);
    }

    #[tokio::test]
    async fn unconfigured_builder_fails_fast() {
        let builder = PromptBuilder::new(None, Some("key".into()), DEFAULT_PROMPT_MODEL.into());
        assert!(matches!(
            builder.generate("learn rust").await,
            Err(PromptError::NotConfigured)
        ));

        let builder = PromptBuilder::new(
            Some("http://127.0.0.1:9".into()),
            Some(String::new()),
            DEFAULT_PROMPT_MODEL.into(),
        );
        assert!(matches!(
            builder.generate("learn rust").await,
            Err(PromptError::NotConfigured)
        ));
    }
}
