//! Shared data models for the Emploi+ backend.
//!
//! This crate provides Serde-serializable types for:
//! - Publications, author profiles and viewer relations
//! - Feed positions used for keyset pagination
//! - Queue job records and their state machine
//! - Notification requests, batches and delivery reports
//! - Activity scores and job posting analyses produced by workers

pub mod activity;
pub mod feed;
pub mod job;
pub mod job_posting;
pub mod notification;
pub mod publication;
pub mod viewer;

// Re-export common types
pub use activity::{ActivityCounts, ActivityKind, ActivityScore};
pub use feed::{Cohort, FeedPosition};
pub use job::{FailureOutcome, JobId, JobRecord, JobState, JobType, TransitionError};
pub use job_posting::{JobPosting, JobPostingAnalysis};
pub use notification::{
    DeliveryReport, NotificationBatch, NotificationKind, NotificationMessage, NotificationRequest,
    RecipientOutcome,
};
pub use publication::{
    AccountStatus, AuthorProfile, Moderation, ModerationStatus, Publication, PublicationId,
    UserId, Visibility,
};
pub use viewer::ViewerContext;
