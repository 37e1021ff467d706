//! Queue job records and their state machine.
//!
//! A job moves through `pending -> active -> completed`, or on failure back
//! to `pending` (after a backoff) until the attempt ceiling is reached, at
//! which point it becomes `failed` for good.

use chrono::{DateTime, Duration, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Unique identifier for a job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for JobId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Type of background job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum JobType {
    /// Analyze a job posting (skills, content check)
    JobAnalysis,
    /// Moderate a single publication
    PostModeration,
    /// Recompute a user's activity score
    ActivityScoring,
    /// Deliver one notification batch to the push provider
    NotificationBatch,
}

impl JobType {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::JobAnalysis => "job-analysis",
            JobType::PostModeration => "post-moderation",
            JobType::ActivityScoring => "activity-scoring",
            JobType::NotificationBatch => "notification-batch",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "job-analysis" => Some(Self::JobAnalysis),
            "post-moderation" => Some(Self::PostModeration),
            "activity-scoring" => Some(Self::ActivityScoring),
            "notification-batch" => Some(Self::NotificationBatch),
            _ => None,
        }
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Job state in the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Waiting in the stream or the delayed set
    #[default]
    Pending,
    /// Claimed by exactly one worker
    Active,
    /// Finished successfully
    Completed,
    /// Failed permanently (retries exhausted, non-retryable error or cancelled)
    Failed,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Pending => "pending",
            JobState::Active => "active",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "active" => Some(Self::Active),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Rejected state transition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("Invalid transition from {from} to {to}")]
    InvalidTransition { from: JobState, to: JobState },

    #[error("Attempt ceiling of {0} reached")]
    AttemptsExhausted(u32),
}

/// What happened to a job after a failed attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureOutcome {
    /// Back to pending, due again at `retry_at`
    Retry { attempt: u32, retry_at: DateTime<Utc> },
    /// Failed for good; surfaced to operators
    Permanent { attempts: u32, reason: String },
}

impl FailureOutcome {
    pub fn is_permanent(&self) -> bool {
        matches!(self, FailureOutcome::Permanent { .. })
    }
}

/// Status record of a queued job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct JobRecord {
    pub id: JobId,
    pub job_type: JobType,
    pub status: JobState,
    /// Number of times the job has been claimed
    pub attempts: u32,
    /// Retry ceiling in force when the job was enqueued
    pub max_attempts: u32,
    /// When a pending retry becomes due
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheduled_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// Set once the job has failed for good
    #[serde(default)]
    pub permanent: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JobRecord {
    /// Create a pending record with zero attempts.
    pub fn new(id: JobId, job_type: JobType, max_attempts: u32) -> Self {
        let now = Utc::now();
        Self {
            id,
            job_type,
            status: JobState::Pending,
            attempts: 0,
            max_attempts: max_attempts.max(1),
            scheduled_at: None,
            last_error: None,
            permanent: false,
            created_at: now,
            updated_at: now,
        }
    }

    fn transition(&mut self, to: JobState) {
        self.status = to;
        self.updated_at = Utc::now();
    }

    fn invalid(&self, to: JobState) -> TransitionError {
        TransitionError::InvalidTransition {
            from: self.status,
            to,
        }
    }

    /// Claim the job: pending -> active, one more attempt.
    pub fn activate(&mut self) -> Result<u32, TransitionError> {
        if self.status != JobState::Pending {
            return Err(self.invalid(JobState::Active));
        }
        if self.attempts >= self.max_attempts {
            return Err(TransitionError::AttemptsExhausted(self.max_attempts));
        }
        self.attempts += 1;
        self.scheduled_at = None;
        self.transition(JobState::Active);
        Ok(self.attempts)
    }

    /// active -> completed.
    pub fn complete(&mut self) -> Result<(), TransitionError> {
        if self.status != JobState::Active {
            return Err(self.invalid(JobState::Completed));
        }
        self.last_error = None;
        self.transition(JobState::Completed);
        Ok(())
    }

    /// Record a failed attempt.
    ///
    /// Retryable failures below the ceiling go back to pending, due after
    /// `backoff`; everything else fails permanently.
    pub fn fail(
        &mut self,
        error: impl Into<String>,
        retryable: bool,
        backoff: Duration,
    ) -> Result<FailureOutcome, TransitionError> {
        if self.status != JobState::Active {
            return Err(self.invalid(JobState::Failed));
        }
        let error = error.into();
        self.last_error = Some(error.clone());

        if retryable && self.attempts < self.max_attempts {
            let retry_at = Utc::now() + backoff;
            self.scheduled_at = Some(retry_at);
            self.transition(JobState::Pending);
            return Ok(FailureOutcome::Retry {
                attempt: self.attempts,
                retry_at,
            });
        }

        self.scheduled_at = None;
        self.permanent = true;
        self.transition(JobState::Failed);
        let reason = if retryable {
            format!("retries exhausted after {} attempts: {}", self.attempts, error)
        } else {
            format!("non-retryable failure: {}", error)
        };
        Ok(FailureOutcome::Permanent {
            attempts: self.attempts,
            reason,
        })
    }
}
