//! Publication and author profile models.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Numeric publication identifier.
pub type PublicationId = i64;

/// Numeric user identifier (authors and viewers share the same id space).
pub type UserId = i64;

/// Audience a publication was posted for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    /// Visible to everyone
    #[default]
    Public,
    /// Visible to confirmed connections of the author
    Connections,
    /// Visible to the author only
    Private,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Visibility::Public => "public",
            Visibility::Connections => "connections",
            Visibility::Private => "private",
        }
    }

    /// Parse the database representation.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "public" => Some(Self::Public),
            "connections" => Some(Self::Connections),
            "private" => Some(Self::Private),
            _ => None,
        }
    }
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Account status of an author.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum AccountStatus {
    #[default]
    Active,
    /// Suspended by moderation; content must never be served
    Suspended,
    /// Discreet mode: content only served to confirmed connections
    Discreet,
}

impl AccountStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountStatus::Active => "active",
            AccountStatus::Suspended => "suspended",
            AccountStatus::Discreet => "discreet",
        }
    }

    /// Parse the database representation.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "active" => Some(Self::Active),
            "suspended" => Some(Self::Suspended),
            "discreet" => Some(Self::Discreet),
            _ => None,
        }
    }
}

impl fmt::Display for AccountStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Stored moderation status of a publication.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum ModerationStatus {
    #[default]
    Approved,
    /// Flagged by a moderator or the moderation worker; still served
    Flagged,
    /// Hidden by a moderator; never served
    Hidden,
}

impl ModerationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModerationStatus::Approved => "approved",
            ModerationStatus::Flagged => "flagged",
            ModerationStatus::Hidden => "hidden",
        }
    }

    /// Parse the database representation.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "approved" => Some(Self::Approved),
            "flagged" => Some(Self::Flagged),
            "hidden" => Some(Self::Hidden),
            _ => None,
        }
    }
}

impl fmt::Display for ModerationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Subset of the author profile needed for ranking and filtering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AuthorProfile {
    pub id: UserId,
    pub account_status: AccountStatus,
    /// Certified authors earn ranking priority
    pub certified: bool,
}

impl AuthorProfile {
    pub fn new(id: UserId) -> Self {
        Self {
            id,
            account_status: AccountStatus::Active,
            certified: false,
        }
    }

    pub fn certified(mut self, certified: bool) -> Self {
        self.certified = certified;
        self
    }

    pub fn with_status(mut self, status: AccountStatus) -> Self {
        self.account_status = status;
        self
    }

    pub fn is_suspended(&self) -> bool {
        self.account_status == AccountStatus::Suspended
    }

    pub fn is_discreet(&self) -> bool {
        self.account_status == AccountStatus::Discreet
    }
}

/// A single feed post.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Publication {
    pub id: PublicationId,
    pub author: AuthorProfile,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default)]
    pub visibility: Visibility,
    #[serde(default)]
    pub hashtags: Vec<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub moderation_status: ModerationStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub moderation_reason: Option<String>,
    #[serde(default)]
    pub pinned: bool,
    /// Soft-delete flag; inactive publications are never served
    #[serde(default = "default_active", skip_serializing)]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

impl Publication {
    /// Create an active, public publication.
    pub fn new(
        id: PublicationId,
        author: AuthorProfile,
        content: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            author,
            content: content.into(),
            image_url: None,
            visibility: Visibility::Public,
            hashtags: Vec::new(),
            created_at,
            moderation_status: ModerationStatus::Approved,
            moderation_reason: None,
            pinned: false,
            active: true,
        }
    }

    pub fn with_visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = visibility;
        self
    }

    pub fn with_hashtags(mut self, hashtags: Vec<String>) -> Self {
        self.hashtags = hashtags;
        self
    }

    pub fn author_id(&self) -> UserId {
        self.author.id
    }

    /// Whether the author earns the certification boost.
    pub fn is_certified(&self) -> bool {
        self.author.certified
    }

    /// Whether storage reads may return this publication at all.
    pub fn is_servable(&self) -> bool {
        self.active && self.moderation_status != ModerationStatus::Hidden
    }
}

/// Moderation annotation attached to a served publication.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Default)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Moderation {
    /// Content passed the detector
    #[default]
    Clean,
    /// Content matched the detector or was flagged by a moderator
    Flagged { reason: String },
    /// Detector could not run; content shown unflagged
    Unchecked { reason: String },
}

impl Moderation {
    pub fn flagged(reason: impl Into<String>) -> Self {
        Self::Flagged {
            reason: reason.into(),
        }
    }

    pub fn unchecked(reason: impl Into<String>) -> Self {
        Self::Unchecked {
            reason: reason.into(),
        }
    }

    pub fn is_flagged(&self) -> bool {
        matches!(self, Moderation::Flagged { .. })
    }

    pub fn is_unchecked(&self) -> bool {
        matches!(self, Moderation::Unchecked { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enum_roundtrip_through_db_strings() {
        for v in [Visibility::Public, Visibility::Connections, Visibility::Private] {
            assert_eq!(Visibility::parse(v.as_str()), Some(v));
        }
        for s in [AccountStatus::Active, AccountStatus::Suspended, AccountStatus::Discreet] {
            assert_eq!(AccountStatus::parse(s.as_str()), Some(s));
        }
        assert_eq!(ModerationStatus::parse("HIDDEN"), Some(ModerationStatus::Hidden));
        assert_eq!(ModerationStatus::parse("unknown"), None);
    }

    #[test]
    fn test_publication_serializes_camel_case_without_active_flag() {
        let publication = Publication::new(7, AuthorProfile::new(3).certified(true), "hello", Utc::now());
        let json = serde_json::to_value(&publication).unwrap();

        assert_eq!(json["id"], 7);
        assert_eq!(json["author"]["certified"], true);
        assert_eq!(json["author"]["accountStatus"], "active");
        assert_eq!(json["moderationStatus"], "approved");
        assert!(json.get("active").is_none());
        assert!(json.get("imageUrl").is_none());
    }

    #[test]
    fn test_hidden_or_inactive_is_not_servable() {
        let mut publication = Publication::new(1, AuthorProfile::new(1), "x", Utc::now());
        assert!(publication.is_servable());

        publication.moderation_status = ModerationStatus::Hidden;
        assert!(!publication.is_servable());

        publication.moderation_status = ModerationStatus::Flagged;
        publication.active = false;
        assert!(!publication.is_servable());
    }

    #[test]
    fn test_moderation_annotation_tagging() {
        let json = serde_json::to_value(Moderation::unchecked("detector_error")).unwrap();
        assert_eq!(json["state"], "unchecked");
        assert_eq!(json["reason"], "detector_error");
    }
}
