//! Job descriptor definitions for the review queue.
//!
//! A [`JobDescriptor`] is the serialized unit of work placed on the queue by
//! the producer and consumed exactly once per successful dequeue by a worker.
//! Descriptors are immutable once pushed; durable status lives in the job
//! record store, not here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Title used when the inbound event does not carry one.
pub const DEFAULT_TITLE: &str = "Unknown";

/// Action used when the inbound event does not carry one.
pub const DEFAULT_ACTION: &str = "unknown";

/// Coordinates of the repository a subject belongs to.
///
/// Carried as an optional routing hint: jobs without coordinates are still
/// analyzable (the worker falls back to a built-in sample), but comment
/// posting and changed-file fetching require them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoCoords {
    /// Repository owner (e.g. "rust-lang").
    pub owner: String,
    /// Repository name (e.g. "cargo").
    pub name: String,
}

impl RepoCoords {
    /// Creates repository coordinates from owner and name.
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
        }
    }

    /// Parses coordinates from a "owner/name" string.
    ///
    /// Returns `None` unless the input has exactly one `/` separating two
    /// non-empty segments.
    pub fn parse(full_name: &str) -> Option<Self> {
        let (owner, name) = full_name.split_once('/')?;
        if owner.is_empty() || name.is_empty() || name.contains('/') {
            return None;
        }
        Some(Self::new(owner, name))
    }
}

impl std::fmt::Display for RepoCoords {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// A unit of work describing one pull request to review.
///
/// Descriptors are JSON on the wire and must round-trip losslessly through
/// serialize/deserialize.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobDescriptor {
    /// Unique identifier for this job, assigned at submission.
    pub job_id: Uuid,
    /// Pull request number (the subject identity).
    pub pr_number: u64,
    /// Pull request title.
    pub pr_title: String,
    /// Webhook action that triggered the job (e.g. "opened").
    pub action: String,
    /// When the producer pushed this descriptor onto the queue.
    pub queued_at: DateTime<Utc>,
    /// Owning repository, when the event carried it.
    #[serde(default)]
    pub repo: Option<RepoCoords>,
}

impl JobDescriptor {
    /// Creates a new descriptor with a fresh id and the current timestamp.
    pub fn new(pr_number: u64, pr_title: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            job_id: Uuid::new_v4(),
            pr_number,
            pr_title: pr_title.into(),
            action: action.into(),
            queued_at: Utc::now(),
            repo: None,
        }
    }

    /// Sets the owning repository coordinates.
    pub fn with_repo(mut self, repo: RepoCoords) -> Self {
        self.repo = Some(repo);
        self
    }

    /// Returns how long this descriptor has been queued.
    pub fn age(&self) -> chrono::Duration {
        Utc::now() - self.queued_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_new() {
        let job = JobDescriptor::new(42, "Fix bug", "opened");

        assert!(!job.job_id.is_nil());
        assert_eq!(job.pr_number, 42);
        assert_eq!(job.pr_title, "Fix bug");
        assert_eq!(job.action, "opened");
        assert!(job.repo.is_none());
    }

    #[test]
    fn test_descriptor_ids_are_unique() {
        let a = JobDescriptor::new(1, "a", "opened");
        let b = JobDescriptor::new(1, "a", "opened");

        assert_ne!(a.job_id, b.job_id);
    }

    #[test]
    fn test_descriptor_serialization_roundtrip() {
        let job = JobDescriptor::new(7, "Add feature", "synchronize")
            .with_repo(RepoCoords::new("octocat", "hello-world"));

        let json = serde_json::to_string(&job).expect("serialization should work");
        let parsed: JobDescriptor =
            serde_json::from_str(&json).expect("deserialization should work");

        assert_eq!(parsed.job_id, job.job_id);
        assert_eq!(parsed.pr_number, job.pr_number);
        assert_eq!(parsed.pr_title, job.pr_title);
        assert_eq!(parsed.action, job.action);
        assert_eq!(parsed.queued_at, job.queued_at);
        assert_eq!(parsed.repo, job.repo);
    }

    #[test]
    fn test_descriptor_without_repo_deserializes() {
        // Descriptors pushed before routing hints existed omit the field.
        let json = r#"{
            "job_id": "4f1c2b3a-0000-4000-8000-000000000000",
            "pr_number": 3,
            "pr_title": "Old job",
            "action": "opened",
            "queued_at": "2026-01-01T00:00:00Z"
        }"#;

        let parsed: JobDescriptor = serde_json::from_str(json).expect("should parse");
        assert!(parsed.repo.is_none());
    }

    #[test]
    fn test_repo_coords_parse() {
        let coords = RepoCoords::parse("octocat/hello-world").expect("should parse");
        assert_eq!(coords.owner, "octocat");
        assert_eq!(coords.name, "hello-world");
        assert_eq!(coords.to_string(), "octocat/hello-world");

        assert!(RepoCoords::parse("no-separator").is_none());
        assert!(RepoCoords::parse("/missing-owner").is_none());
        assert!(RepoCoords::parse("missing-name/").is_none());
        assert!(RepoCoords::parse("too/many/parts").is_none());
    }
}
