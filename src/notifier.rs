//! Slack notifications for review outcomes.
//!
//! Posts Block Kit payloads to an incoming webhook. Notifications are
//! strictly best-effort: the worker logs faults and the job's terminal
//! status is never affected. Without a webhook URL the notifier is disabled.

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use crate::job::RepoCoords;

/// Summary text is cut to this many characters in the Slack message.
const SUMMARY_PREVIEW_LEN: usize = 200;

/// Attachment colors keyed off the finding count.
const COLOR_CLEAN: &str = "#36a64f";
const COLOR_WARN: &str = "#FFA500";
const COLOR_ALERT: &str = "#FF0000";

/// Data carried by a completion notification.
#[derive(Debug, Clone)]
pub struct ReviewNotification {
    /// Pull request number.
    pub pr_number: u64,
    /// Pull request title.
    pub pr_title: String,
    /// Owning repository, when known.
    pub repo: Option<RepoCoords>,
    /// Number of findings the analysis produced.
    pub findings_count: usize,
    /// Summary text (possibly degraded).
    pub summary: String,
    /// Wall-clock processing time in seconds.
    pub processing_secs: f64,
}

/// Chat notification sink the worker consumes.
#[async_trait]
pub trait Notify: Send + Sync {
    /// Whether a destination is configured; disabled sinks are skipped.
    fn is_enabled(&self) -> bool;

    /// Announces a completed review.
    async fn review_completed(&self, notification: &ReviewNotification) -> anyhow::Result<()>;

    /// Announces a failed review.
    async fn review_failed(&self, pr_number: u64, error: &str) -> anyhow::Result<()>;
}

/// Notifier posting to a Slack incoming webhook.
pub struct SlackNotifier {
    webhook_url: Option<String>,
    client: Client,
}

impl SlackNotifier {
    /// Creates a notifier. A `None` URL means disabled.
    pub fn new(webhook_url: Option<String>) -> Self {
        if webhook_url.is_none() {
            tracing::warn!("no Slack webhook URL provided, notifications disabled");
        }
        Self {
            webhook_url,
            client: Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_else(|_| Client::new()),
        }
    }

    async fn post(&self, payload: &Value) -> anyhow::Result<()> {
        let url = self
            .webhook_url
            .as_deref()
            .context("Slack notifier not configured")?;

        self.client
            .post(url)
            .json(payload)
            .send()
            .await
            .context("Slack request failed")?
            .error_for_status()
            .context("Slack rejected notification")?;

        Ok(())
    }
}

/// Picks the attachment color and status emoji for a finding count.
fn status_style(findings_count: usize) -> (&'static str, &'static str) {
    match findings_count {
        0 => (COLOR_CLEAN, "\u{2705}"),
        1..=3 => (COLOR_WARN, "\u{26a0}\u{fe0f}"),
        _ => (COLOR_ALERT, "\u{1f534}"),
    }
}

/// Builds the completion payload (exposed for tests).
fn completion_payload(n: &ReviewNotification) -> Value {
    let (color, emoji) = status_style(n.findings_count);

    let repo_field = match &n.repo {
        Some(coords) => format!("*Repository:*\n{coords}"),
        None => "*Repository:*\nDemo PR".to_string(),
    };

    let summary_preview: String = n.summary.chars().take(SUMMARY_PREVIEW_LEN).collect();

    let mut blocks = vec![
        json!({
            "type": "header",
            "text": { "type": "plain_text", "text": format!("{emoji} Code Review Complete"), "emoji": true }
        }),
        json!({
            "type": "section",
            "fields": [
                { "type": "mrkdwn", "text": format!("*PR:*\n#{} - {}", n.pr_number, n.pr_title) },
                { "type": "mrkdwn", "text": repo_field },
            ]
        }),
        json!({
            "type": "section",
            "fields": [
                { "type": "mrkdwn", "text": format!("*Issues Found:*\n{}", n.findings_count) },
                { "type": "mrkdwn", "text": format!("*Processing Time:*\n{:.2}s", n.processing_secs) },
            ]
        }),
        json!({
            "type": "section",
            "text": { "type": "mrkdwn", "text": format!("*AI Analysis:*\n{summary_preview}...") }
        }),
    ];

    if let Some(coords) = &n.repo {
        let pr_url = format!(
            "https://github.com/{}/{}/pull/{}",
            coords.owner, coords.name, n.pr_number
        );
        blocks.push(json!({
            "type": "actions",
            "elements": [{
                "type": "button",
                "text": { "type": "plain_text", "text": "View PR on GitHub", "emoji": true },
                "url": pr_url,
                "style": "primary"
            }]
        }));
    }

    json!({
        "text": format!("Code Review Complete for PR #{}", n.pr_number),
        "attachments": [{ "color": color, "blocks": blocks }]
    })
}

/// Builds the failure payload (exposed for tests).
fn failure_payload(pr_number: u64, error: &str) -> Value {
    json!({
        "text": format!("Code Review Failed for PR #{pr_number}"),
        "attachments": [{
            "color": COLOR_ALERT,
            "text": format!("*Error:* {error}")
        }]
    })
}

#[async_trait]
impl Notify for SlackNotifier {
    fn is_enabled(&self) -> bool {
        self.webhook_url.is_some()
    }

    async fn review_completed(&self, notification: &ReviewNotification) -> anyhow::Result<()> {
        self.post(&completion_payload(notification)).await?;
        tracing::info!(pr = notification.pr_number, "Slack notification sent");
        Ok(())
    }

    async fn review_failed(&self, pr_number: u64, error: &str) -> anyhow::Result<()> {
        self.post(&failure_payload(pr_number, error)).await?;
        tracing::info!(pr = pr_number, "Slack failure notification sent");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn notification(findings_count: usize, repo: Option<RepoCoords>) -> ReviewNotification {
        ReviewNotification {
            pr_number: 42,
            pr_title: "Fix bug".to_string(),
            repo,
            findings_count,
            summary: "Looks fine overall.".to_string(),
            processing_secs: 1.25,
        }
    }

    #[test]
    fn test_status_style_thresholds() {
        assert_eq!(status_style(0).0, COLOR_CLEAN);
        assert_eq!(status_style(1).0, COLOR_WARN);
        assert_eq!(status_style(3).0, COLOR_WARN);
        assert_eq!(status_style(4).0, COLOR_ALERT);
    }

    #[test]
    fn test_completion_payload_with_repo() {
        let payload = completion_payload(&notification(
            2,
            Some(RepoCoords::new("octocat", "hello-world")),
        ));

        let text = payload["text"].as_str().unwrap();
        assert!(text.contains("PR #42"));

        let blocks = payload["attachments"][0]["blocks"].as_array().unwrap();
        // Header, two field sections, summary, and the PR link button.
        assert_eq!(blocks.len(), 5);

        let button_url = blocks[4]["elements"][0]["url"].as_str().unwrap();
        assert_eq!(button_url, "https://github.com/octocat/hello-world/pull/42");
    }

    #[test]
    fn test_completion_payload_without_repo_has_no_button() {
        let payload = completion_payload(&notification(0, None));
        let blocks = payload["attachments"][0]["blocks"].as_array().unwrap();

        assert_eq!(blocks.len(), 4);
        assert_eq!(payload["attachments"][0]["color"], COLOR_CLEAN);
        assert!(blocks[1]["fields"][1]["text"]
            .as_str()
            .unwrap()
            .contains("Demo PR"));
    }

    #[test]
    fn test_failure_payload() {
        let payload = failure_payload(7, "store unreachable");

        assert!(payload["text"].as_str().unwrap().contains("PR #7"));
        assert_eq!(payload["attachments"][0]["color"], COLOR_ALERT);
        assert!(payload["attachments"][0]["text"]
            .as_str()
            .unwrap()
            .contains("store unreachable"));
    }

    #[tokio::test]
    async fn test_disabled_notifier_errors() {
        let notifier = SlackNotifier::new(None);
        assert!(!notifier.is_enabled());

        let result = notifier.review_failed(1, "boom").await;
        assert!(result.is_err());
    }
}
