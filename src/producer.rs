//! Producer: turns inbound webhook events into queued jobs.
//!
//! The producer acknowledges immediately: a successful submission means
//! "durably queued," never "processed." Processing outcomes are visible only
//! through the job record store. The producer performs no retries of its
//! own; an enqueue fault is reported straight back to the caller.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::job::{JobDescriptor, RepoCoords, DEFAULT_ACTION, DEFAULT_TITLE};
use crate::queue::{JobQueue, QueueError};

/// Errors that can occur during event submission.
#[derive(Debug, Error)]
pub enum SubmitError {
    /// The event carries no subject identity; rejected, never enqueued.
    #[error("event is missing the pull request number")]
    MissingSubject,

    /// The queue write failed.
    #[error("failed to queue job: {0}")]
    Queue(#[from] QueueError),
}

/// Inbound webhook event, in the shape GitHub delivers.
///
/// Only the fields the pipeline consumes are modeled; everything else in
/// the payload is ignored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebhookEvent {
    /// Webhook action verb (e.g. "opened").
    pub action: Option<String>,
    /// Pull request number.
    pub number: Option<u64>,
    /// Nested pull request object.
    pub pull_request: Option<PullRequestInfo>,
    /// Nested repository object.
    pub repository: Option<RepositoryInfo>,
}

/// The subset of the nested `pull_request` object we read.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PullRequestInfo {
    /// Pull request title.
    pub title: Option<String>,
}

/// The subset of the nested `repository` object we read.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RepositoryInfo {
    /// "owner/name" repository identifier.
    pub full_name: Option<String>,
}

/// Acknowledgment returned to the submitter.
#[derive(Debug, Clone, Serialize)]
pub struct SubmitReceipt {
    /// Identifier assigned to the queued job.
    pub job_id: Uuid,
    /// Subject the job will analyze.
    pub pr_number: u64,
    /// Always true on the success path: the descriptor is durably queued.
    pub accepted: bool,
}

/// Accepts events and pushes job descriptors onto the queue.
pub struct Producer<'a> {
    queue: &'a JobQueue,
}

impl<'a> Producer<'a> {
    /// Creates a producer over the given queue handle.
    pub fn new(queue: &'a JobQueue) -> Self {
        Self { queue }
    }

    /// Validates the event, stamps a job identity and enqueues it.
    ///
    /// # Errors
    ///
    /// - `SubmitError::MissingSubject` when the event has no PR number
    ///   (client error; nothing is enqueued)
    /// - `SubmitError::Queue` on transport faults (server error)
    pub async fn submit(&self, event: WebhookEvent) -> Result<SubmitReceipt, SubmitError> {
        let descriptor = build_descriptor(event)?;
        let receipt = SubmitReceipt {
            job_id: descriptor.job_id,
            pr_number: descriptor.pr_number,
            accepted: true,
        };

        self.queue.enqueue(&descriptor).await?;

        tracing::info!(
            job_id = %receipt.job_id,
            pr = receipt.pr_number,
            "job queued"
        );
        Ok(receipt)
    }
}

/// Builds a descriptor from an event, applying documented defaults.
///
/// Pure so that validation and defaulting are testable without a queue.
pub fn build_descriptor(event: WebhookEvent) -> Result<JobDescriptor, SubmitError> {
    let pr_number = event.number.ok_or(SubmitError::MissingSubject)?;

    let title = event
        .pull_request
        .and_then(|pr| pr.title)
        .unwrap_or_else(|| DEFAULT_TITLE.to_string());

    let action = event
        .action
        .unwrap_or_else(|| DEFAULT_ACTION.to_string());

    let mut descriptor = JobDescriptor::new(pr_number, title, action);

    if let Some(repo) = event
        .repository
        .and_then(|r| r.full_name)
        .as_deref()
        .and_then(RepoCoords::parse)
    {
        descriptor = descriptor.with_repo(repo);
    }

    Ok(descriptor)
}
