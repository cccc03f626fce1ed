//! LLM-backed review summarizer.
//!
//! Wraps an OpenAI-compatible chat completion endpoint (a local Ollama
//! instance by default). The summarizer is the expensive half of the
//! analysis pipeline and the reason the cache-aside layer exists.
//!
//! A summarizer fault is never a job failure: every error path produces a
//! degraded [`Summary`] carrying the failure text, and the job still
//! completes.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::analyzer::Finding;

/// At most this many findings are included in the prompt.
const MAX_PROMPT_FINDINGS: usize = 5;

/// Request timeout for the chat completion call.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Errors that can occur during summarization calls.
///
/// These never escape the summarizer as job failures; they are folded into a
/// degraded [`Summary`].
#[derive(Debug, Error)]
pub enum LlmError {
    /// No endpoint configured.
    #[error("No LLM endpoint configured")]
    NotConfigured,

    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    RequestFailed(String),

    /// The API answered with a non-success status.
    #[error("API error ({code}): {message}")]
    ApiError { code: u16, message: String },

    /// Failed to parse the API response.
    #[error("Failed to parse LLM response: {0}")]
    ParseError(String),

    /// The response carried no choices.
    #[error("LLM response contained no completion")]
    EmptyResponse,
}

/// Natural-language summary of a review.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Summary {
    /// Summary text; on degradation, a placeholder naming the failure.
    pub text: String,
    /// Model that produced (or should have produced) the summary.
    pub model: String,
    /// Whether the summarizer faulted and this text is a fallback.
    pub degraded: bool,
    /// Failure text when degraded.
    #[serde(default)]
    pub error: Option<String>,
}

impl Summary {
    /// Creates a successful summary.
    pub fn fresh(text: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            model: model.into(),
            degraded: false,
            error: None,
        }
    }

    /// Creates a degraded summary from a failure.
    pub fn degraded(model: impl Into<String>, error: impl std::fmt::Display) -> Self {
        let error = error.to_string();
        Self {
            text: format!("AI summary unavailable: {error}"),
            model: model.into(),
            degraded: true,
            error: Some(error),
        }
    }
}

/// Produces a review summary from a title and findings.
#[async_trait]
pub trait Summarize: Send + Sync {
    /// Summarizes the review. Infallible by contract: faults degrade.
    async fn summarize(&self, title: &str, findings: &[Finding]) -> Summary;
}

/// Summarizer backed by an OpenAI-compatible chat completion API.
pub struct LlmSummarizer {
    api_base: Option<String>,
    api_key: Option<String>,
    model: String,
    http_client: Client,
}

impl LlmSummarizer {
    /// Creates a summarizer. A `None` api_base means no endpoint is
    /// configured and every call degrades immediately.
    pub fn new(api_base: Option<String>, api_key: Option<String>, model: impl Into<String>) -> Self {
        Self {
            api_base,
            api_key,
            model: model.into(),
            http_client: Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()
                .unwrap_or_else(|_| Client::new()),
        }
    }

    /// Returns the configured model name.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Returns whether an endpoint is configured.
    pub fn is_configured(&self) -> bool {
        self.api_base.is_some()
    }

    async fn request_summary(&self, title: &str, findings: &[Finding]) -> Result<String, LlmError> {
        let api_base = self.api_base.as_deref().ok_or(LlmError::NotConfigured)?;
        let url = format!("{}/chat/completions", api_base.trim_end_matches('/'));

        let body = ApiRequest {
            model: self.model.clone(),
            messages: vec![
                ApiMessage {
                    role: "system".to_string(),
                    content: "You are an expert code reviewer. Provide brief, constructive feedback.".to_string(),
                },
                ApiMessage {
                    role: "user".to_string(),
                    content: build_prompt(title, findings),
                },
            ],
            temperature: 0.3,
            max_tokens: 200,
        };

        let mut request = self.http_client.post(&url).json(&body);
        if let Some(ref key) = self.api_key {
            request = request.header("Authorization", format!("Bearer {key}"));
        }

        let response = request
            .send()
            .await
            .map_err(|e| LlmError::RequestFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(LlmError::ApiError {
                code: status.as_u16(),
                message,
            });
        }

        let parsed: ApiResponse = response
            .json()
            .await
            .map_err(|e| LlmError::ParseError(e.to_string()))?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or(LlmError::EmptyResponse)
    }
}

#[async_trait]
impl Summarize for LlmSummarizer {
    async fn summarize(&self, title: &str, findings: &[Finding]) -> Summary {
        match self.request_summary(title, findings).await {
            Ok(text) => {
                info!(model = %self.model, "summary generated");
                Summary::fresh(text, &self.model)
            }
            Err(e) => {
                warn!(model = %self.model, error = %e, "summarization degraded");
                Summary::degraded(&self.model, e)
            }
        }
    }
}

/// Builds the user prompt from the title and at most
/// [`MAX_PROMPT_FINDINGS`] findings.
pub fn build_prompt(title: &str, findings: &[Finding]) -> String {
    if findings.is_empty() {
        return format!(
            "Review this Pull Request:\n\n\
             Title: {title}\n\n\
             No code issues were detected by automated checks.\n\n\
             Please provide a brief summary (2-3 sentences) of what to verify manually."
        );
    }

    let issues_text = findings
        .iter()
        .take(MAX_PROMPT_FINDINGS)
        .map(|f| {
            format!(
                "- {}: {} (line {})",
                f.severity.to_string().to_uppercase(),
                f.message,
                f.line
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "Review this Pull Request:\n\n\
         Title: {title}\n\n\
         Automated checks found these issues:\n{issues_text}\n\n\
         Please provide:\n\
         1. Overall assessment (1 sentence)\n\
         2. Most critical issue to fix\n\
         3. One suggestion for improvement\n\n\
         Keep response under 100 words."
    )
}

/// Chat completion request body (OpenAI wire format).
#[derive(Debug, Serialize)]
struct ApiRequest {
    model: String,
    messages: Vec<ApiMessage>,
    temperature: f64,
    max_tokens: u32,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    choices: Vec<ApiChoice>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiMessage,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::{FindingKind, Severity};

    fn finding(line: usize, severity: Severity, message: &str) -> Finding {
        Finding {
            kind: FindingKind::Todo,
            severity,
            message: message.to_string(),
            line,
            snippet: String::new(),
        }
    }

    #[test]
    fn test_prompt_without_findings() {
        let prompt = build_prompt("Fix bug", &[]);

        assert!(prompt.contains("Title: Fix bug"));
        assert!(prompt.contains("No code issues were detected"));
    }

    #[test]
    fn test_prompt_with_findings() {
        let findings = vec![
            finding(3, Severity::High, "Possible hardcoded password detected"),
            finding(9, Severity::Low, "Console log statement found"),
        ];
        let prompt = build_prompt("Add login", &findings);

        assert!(prompt.contains("Title: Add login"));
        assert!(prompt.contains("- HIGH: Possible hardcoded password detected (line 3)"));
        assert!(prompt.contains("- LOW: Console log statement found (line 9)"));
        assert!(prompt.contains("Overall assessment"));
    }

    #[test]
    fn test_prompt_truncates_to_five_findings() {
        let findings: Vec<Finding> = (1..=8)
            .map(|i| finding(i, Severity::Info, &format!("issue {i}")))
            .collect();
        let prompt = build_prompt("Big change", &findings);

        assert!(prompt.contains("issue 5"));
        assert!(!prompt.contains("issue 6"));
    }

    #[test]
    fn test_degraded_summary_carries_error() {
        let summary = Summary::degraded("codellama", "connection refused");

        assert!(summary.degraded);
        assert!(summary.text.contains("AI summary unavailable"));
        assert!(summary.text.contains("connection refused"));
        assert_eq!(summary.error.as_deref(), Some("connection refused"));
        assert_eq!(summary.model, "codellama");
    }

    #[test]
    fn test_fresh_summary() {
        let summary = Summary::fresh("Looks fine.", "codellama");

        assert!(!summary.degraded);
        assert!(summary.error.is_none());
        assert_eq!(summary.text, "Looks fine.");
    }

    #[tokio::test]
    async fn test_unconfigured_summarizer_degrades() {
        let summarizer = LlmSummarizer::new(None, None, "codellama");
        assert!(!summarizer.is_configured());

        let summary = summarizer.summarize("Fix bug", &[]).await;

        assert!(summary.degraded);
        assert!(summary.text.contains("AI summary unavailable"));
    }
}
