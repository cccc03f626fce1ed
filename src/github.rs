//! GitHub client for fetching changed files and posting review comments.
//!
//! Both operations are best-effort from the pipeline's perspective: a fetch
//! fault falls back to sample code and a comment fault is logged, never
//! failing the job. Without a token the client is disabled and the worker
//! skips these calls entirely.

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use crate::job::RepoCoords;

/// Per-file content cap; larger files are truncated.
const MAX_FILE_BYTES: usize = 100_000;

/// Extensions considered code and worth analyzing.
const CODE_EXTENSIONS: &[&str] = &[
    ".py", ".js", ".jsx", ".ts", ".tsx", ".java", ".cpp", ".c", ".h", ".go", ".rs", ".rb",
    ".php", ".swift", ".kt", ".cs", ".scala", ".html", ".css", ".scss", ".sql", ".sh", ".yaml",
    ".yml", ".json",
];

/// One changed file in a pull request, with its fetched content.
#[derive(Debug, Clone)]
pub struct ChangedFile {
    /// Path of the file within the repository.
    pub filename: String,
    /// File content, capped at [`MAX_FILE_BYTES`].
    pub content: String,
    /// Lines added.
    pub additions: u64,
    /// Lines deleted.
    pub deletions: u64,
}

/// Source-hosting operations the worker consumes.
#[async_trait]
pub trait CodeHost: Send + Sync {
    /// Whether credentials are configured; disabled hosts are skipped.
    fn is_enabled(&self) -> bool;

    /// Fetches the code files changed in a pull request. May return an
    /// empty list (nothing analyzable changed).
    async fn fetch_changed_files(
        &self,
        repo: &RepoCoords,
        pr_number: u64,
    ) -> anyhow::Result<Vec<ChangedFile>>;

    /// Posts a review comment on a pull request.
    async fn post_comment(
        &self,
        repo: &RepoCoords,
        pr_number: u64,
        body: &str,
    ) -> anyhow::Result<()>;
}

/// GitHub REST API client.
pub struct GitHubClient {
    client: Client,
    token: Option<String>,
    api_base: String,
}

/// Entry of the PR files listing.
#[derive(Debug, Deserialize)]
struct PrFileEntry {
    filename: String,
    #[serde(default)]
    additions: u64,
    #[serde(default)]
    deletions: u64,
    raw_url: Option<String>,
}

impl GitHubClient {
    /// Creates a client with an optional token. No token means disabled.
    pub fn new(token: Option<String>) -> Self {
        if token.is_none() {
            tracing::warn!("no GitHub token provided, GitHub features disabled");
        }
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .unwrap_or_else(|_| Client::new()),
            token,
            api_base: "https://api.github.com".to_string(),
        }
    }

    /// Overrides the API base URL (tests, GitHub Enterprise).
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let request = request
            .header("User-Agent", "reviewflow/0.1")
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", "2022-11-28");

        match &self.token {
            Some(token) => request.header("Authorization", format!("Bearer {token}")),
            None => request,
        }
    }

    async fn fetch_raw(&self, url: &str) -> anyhow::Result<String> {
        let response = self
            .authorized(self.client.get(url))
            .send()
            .await
            .context("raw content request failed")?
            .error_for_status()
            .context("raw content request rejected")?;

        let text = response.text().await.context("raw content unreadable")?;
        Ok(truncate_content(&text))
    }
}

/// Returns whether the file looks like code worth analyzing.
fn is_code_file(filename: &str) -> bool {
    CODE_EXTENSIONS.iter().any(|ext| filename.ends_with(ext))
}

/// Caps file content at [`MAX_FILE_BYTES`] on a char boundary.
fn truncate_content(text: &str) -> String {
    if text.len() <= MAX_FILE_BYTES {
        return text.to_string();
    }
    let mut end = MAX_FILE_BYTES;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    text[..end].to_string()
}

#[async_trait]
impl CodeHost for GitHubClient {
    fn is_enabled(&self) -> bool {
        self.token.is_some()
    }

    async fn fetch_changed_files(
        &self,
        repo: &RepoCoords,
        pr_number: u64,
    ) -> anyhow::Result<Vec<ChangedFile>> {
        if !self.is_enabled() {
            return Ok(Vec::new());
        }

        let url = format!(
            "{}/repos/{}/{}/pulls/{}/files",
            self.api_base, repo.owner, repo.name, pr_number
        );

        let response = self
            .authorized(self.client.get(&url))
            .send()
            .await
            .context("PR files request failed")?
            .error_for_status()
            .context("PR files request rejected")?;

        let entries: Vec<PrFileEntry> =
            response.json().await.context("PR files listing unparseable")?;

        let mut files = Vec::new();
        for entry in entries {
            if !is_code_file(&entry.filename) {
                continue;
            }
            let Some(raw_url) = entry.raw_url else {
                continue;
            };
            match self.fetch_raw(&raw_url).await {
                Ok(content) => {
                    tracing::debug!(file = %entry.filename, "fetched changed file");
                    files.push(ChangedFile {
                        filename: entry.filename,
                        content,
                        additions: entry.additions,
                        deletions: entry.deletions,
                    });
                }
                Err(e) => {
                    tracing::warn!(file = %entry.filename, error = %e, "could not fetch file");
                }
            }
        }

        Ok(files)
    }

    async fn post_comment(
        &self,
        repo: &RepoCoords,
        pr_number: u64,
        body: &str,
    ) -> anyhow::Result<()> {
        if !self.is_enabled() {
            anyhow::bail!("GitHub client not configured");
        }

        // PR comments go through the issues endpoint.
        let url = format!(
            "{}/repos/{}/{}/issues/{}/comments",
            self.api_base, repo.owner, repo.name, pr_number
        );

        self.authorized(self.client.post(&url))
            .json(&serde_json::json!({ "body": body }))
            .send()
            .await
            .context("comment request failed")?
            .error_for_status()
            .context("comment request rejected")?;

        tracing::info!(pr = pr_number, repo = %repo, "posted review comment");
        Ok(())
    }
}
