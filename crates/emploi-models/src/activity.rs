//! User activity scoring.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::publication::UserId;

/// Kind of tracked user activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    Publication,
    Comment,
    Reaction,
    Application,
}

/// Raw activity counters for one user over a time window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ActivityCounts {
    pub publications: u32,
    pub comments: u32,
    pub reactions: u32,
    pub applications: u32,
}

impl ActivityCounts {
    /// Count one more event of `kind`.
    pub fn record(&mut self, kind: ActivityKind) {
        match kind {
            ActivityKind::Publication => self.publications += 1,
            ActivityKind::Comment => self.comments += 1,
            ActivityKind::Reaction => self.reactions += 1,
            ActivityKind::Application => self.applications += 1,
        }
    }
}

/// Computed activity score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ActivityScore {
    pub user_id: UserId,
    pub score: f64,
    pub window_days: u32,
    pub computed_at: DateTime<Utc>,
}
