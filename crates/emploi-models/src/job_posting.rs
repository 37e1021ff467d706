//! Job postings and their analysis results.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A job offer published on the board.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct JobPosting {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub company: String,
    pub active: bool,
}

/// Output of the job-analysis worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct JobPostingAnalysis {
    pub job_posting_id: i64,
    /// Skill keywords found in title and description, sorted and unique
    pub skills: Vec<String>,
    pub flagged: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub analyzed_at: DateTime<Utc>,
}
