//! Notification requests, batches and delivery reports.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::publication::UserId;

/// Category of a notification, used by clients for routing and icons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    /// A publication was flagged by moderation
    Moderation,
    /// Reactions, comments, connection requests
    Social,
    /// A job posting matches the user's profile
    JobAlert,
    System,
}

/// Message payload shared by every recipient of a batch.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub struct NotificationMessage {
    pub kind: NotificationKind,
    pub title: String,
    pub body: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
}

impl NotificationMessage {
    pub fn new(kind: NotificationKind, title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            kind,
            title: title.into(),
            body: body.into(),
            link: None,
        }
    }

    pub fn with_link(mut self, link: impl Into<String>) -> Self {
        self.link = Some(link.into());
        self
    }
}

/// A single notification for a single recipient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct NotificationRequest {
    pub recipient_id: UserId,
    pub message: NotificationMessage,
}

impl NotificationRequest {
    pub fn new(recipient_id: UserId, message: NotificationMessage) -> Self {
        Self {
            recipient_id,
            message,
        }
    }
}

/// Recipients sharing one message, delivered with one provider call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct NotificationBatch {
    pub batch_id: String,
    pub recipients: Vec<UserId>,
    pub message: NotificationMessage,
    pub created_at: DateTime<Utc>,
}

impl NotificationBatch {
    pub fn new(recipients: Vec<UserId>, message: NotificationMessage) -> Self {
        Self {
            batch_id: Uuid::new_v4().to_string(),
            recipients,
            message,
            created_at: Utc::now(),
        }
    }

    pub fn len(&self) -> usize {
        self.recipients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.recipients.is_empty()
    }
}

/// Provider verdict for one recipient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct RecipientOutcome {
    pub recipient_id: UserId,
    pub accepted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl RecipientOutcome {
    pub fn accepted(recipient_id: UserId) -> Self {
        Self {
            recipient_id,
            accepted: true,
            reason: None,
        }
    }

    pub fn rejected(recipient_id: UserId, reason: impl Into<String>) -> Self {
        Self {
            recipient_id,
            accepted: false,
            reason: Some(reason.into()),
        }
    }
}

/// Result of delivering one batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct DeliveryReport {
    pub batch_id: String,
    pub sent_at: DateTime<Utc>,
    pub outcomes: Vec<RecipientOutcome>,
}

impl DeliveryReport {
    pub fn accepted_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.accepted).count()
    }

    pub fn rejected_count(&self) -> usize {
        self.outcomes.len() - self.accepted_count()
    }
}
