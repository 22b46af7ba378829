//! Completion client — the boundary to the external language-model service.
//!
//! Stateless calls with fixed instructional prompts and bounded output
//! lengths: a per-entry summary, a small list of reflection questions, and a
//! trend narrative across entries. No retries, no caching; failures surface
//! as `CompletionError` and the HTTP layer decides how to present them.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::CompletionSettings;

/// System prompt for per-entry summaries (second-person, 2-3 sentences).
pub const SUMMARY_PROMPT: &str = "You are a reflective assistant designed to help users make sense of journal entries. Given a raw journal entry, summarize it in a neutral, validating tone. Generate a summary of the journal entry from a second-person perspective.

The summary should be 2 - 3 sentences long and highlight key emotional states, sources of stress or tension, and any strategies or attempts at self-understanding.
";

/// System prompt for reflection questions. The model is asked for a JSON
/// array of strings, which `reflection_questions` parses.
pub const REFLECT_PROMPT: &str = "You are a CBT-focused assistant designed to help users reflect on their journal entries through a cognitive behavioral therapy lens. Given a raw journal entry, generate 3 thoughtful questions that help the author:

1. Identify and challenge automatic thoughts
2. Explore the connection between thoughts, feelings, and behaviors
3. Consider alternative perspectives or solutions

The questions should be:
- Specific to the content of the journal entry
- Open-ended and non-judgmental
- Focused on promoting self-reflection and growth
- Written in a supportive, therapeutic tone

Format the response as a JSON array of strings, each containing one question.";

/// System prompt for the cross-entry trend narrative.
pub const TRENDS_PROMPT: &str = "You are a CBT-focused assistant designed to help users reflect on their journal entries through a cognitive behavioral therapy lens. Given multiple raw journal entries, generate a 3 - 4 sentance summary of the trends across the entries. Reflect on these prompts:

- are their any recurring thought patterns? recurring topics?
- is there any growth that could be noted across the entries?

Your response should be:
- Specific to the content of the journal entries
- Open-ended and non-judgmental
- Focused on promoting self-reflection and growth
- Written in a supportive, therapeutic tone";

/// Fallback summary when the model returns an empty completion.
pub const SUMMARY_FALLBACK: &str = "Unable to generate summary.";

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

#[derive(Error, Debug)]
pub enum CompletionError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({code}): {message}")]
    Api { code: u16, message: String },

    #[error("Missing API key")]
    MissingApiKey,

    #[error("Completion was not a JSON array of questions: {0}")]
    MalformedQuestions(#[source] serde_json::Error),
}

#[derive(Debug, Clone)]
pub struct CompletionConfig {
    pub api_key: String,
    pub settings: CompletionSettings,
}

impl CompletionConfig {
    /// Key resolution: explicit value, else the `OPENAI_API_KEY` env var.
    pub fn new(api_key: Option<String>, settings: CompletionSettings) -> Self {
        let api_key = api_key
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .unwrap_or_default();
        Self { api_key, settings }
    }
}

// ============================================================================
// Chat completions wire structs (private)
// ============================================================================

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: Option<ApiErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

// ============================================================================
// CompletionClient
// ============================================================================

/// Chat-completion client for the hosted language-model API.
#[derive(Debug, Clone)]
pub struct CompletionClient {
    client: Client,
    config: CompletionConfig,
    base_url: String,
}

impl CompletionClient {
    pub fn new(config: CompletionConfig) -> Result<Self, CompletionError> {
        Self::with_base_url(config, DEFAULT_BASE_URL.to_string())
    }

    /// Create a client with a custom base URL (for testing / integration)
    pub fn with_base_url(
        config: CompletionConfig,
        base_url: String,
    ) -> Result<Self, CompletionError> {
        if config.api_key.is_empty() {
            return Err(CompletionError::MissingApiKey);
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            config,
            base_url,
        })
    }

    /// Short second-person prose summary of one entry.
    pub async fn summarize(&self, content: &str) -> Result<String, CompletionError> {
        let text = self
            .chat(
                SUMMARY_PROMPT,
                format!("Journal entry:\n\n{content}"),
                self.config.settings.summary_max_tokens,
            )
            .await?;
        match text {
            Some(summary) if !summary.is_empty() => Ok(summary),
            _ => Ok(SUMMARY_FALLBACK.to_string()),
        }
    }

    /// Small ordered list of reflection questions for one entry.
    pub async fn reflection_questions(
        &self,
        content: &str,
    ) -> Result<Vec<String>, CompletionError> {
        let text = self
            .chat(
                REFLECT_PROMPT,
                format!("Journal entry:\n\n{content}"),
                self.config.settings.reflect_max_tokens,
            )
            .await?
            .unwrap_or_else(|| "[]".to_string());
        serde_json::from_str(&text).map_err(CompletionError::MalformedQuestions)
    }

    /// Trend narrative across several entries, oldest first.
    pub async fn trend_summary(&self, entries: &[String]) -> Result<String, CompletionError> {
        let joined = entries.join("\n\n---\n\n");
        let text = self
            .chat(
                TRENDS_PROMPT,
                format!("Journal entries:\n\n{joined}"),
                self.config.settings.trends_max_tokens,
            )
            .await?;
        Ok(text.unwrap_or_default())
    }

    async fn chat(
        &self,
        system: &str,
        user: String,
        max_tokens: u32,
    ) -> Result<Option<String>, CompletionError> {
        let url = format!("{}/chat/completions", self.base_url);

        let request = ChatRequest {
            model: self.config.settings.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system.to_string(),
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
            temperature: self.config.settings.temperature,
            max_tokens,
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiErrorResponse>(&error_body)
                .ok()
                .and_then(|e| e.error)
                .map(|e| e.message)
                .unwrap_or(error_body);

            tracing::error!(code = status.as_u16(), message = %message, "Completion API error");

            return Err(CompletionError::Api {
                code: status.as_u16(),
                message,
            });
        }

        let chat_response: ChatResponse = response.json().await?;
        Ok(chat_response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content))
    }
}

// ============================================================================
// TESTS
// ============================================================================
