//! Content safety filter applied to every ranked page.
//!
//! Rules run in a fixed order; the first four drop items, the last one only
//! annotates. Order of the surviving items is preserved and every applied
//! rule is logged with the publication id for audit.

use std::sync::Arc;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use emploi_models::{Moderation, ModerationStatus, Publication, ViewerContext, Visibility};

use crate::detector::ContentDetector;

/// A publication as served to a viewer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FeedItem {
    #[serde(flatten)]
    pub publication: Publication,
    #[serde(default)]
    pub moderation: Moderation,
}

impl From<Publication> for FeedItem {
    fn from(publication: Publication) -> Self {
        Self {
            publication,
            moderation: Moderation::Clean,
        }
    }
}

/// Safety rules in application order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SafetyRule {
    SuspendedAuthor,
    Blocked,
    DiscreetMode,
    Visibility,
    Profanity,
}

impl SafetyRule {
    pub fn as_str(&self) -> &'static str {
        match self {
            SafetyRule::SuspendedAuthor => "suspended_author",
            SafetyRule::Blocked => "blocked",
            SafetyRule::DiscreetMode => "discreet_mode",
            SafetyRule::Visibility => "visibility",
            SafetyRule::Profanity => "profanity",
        }
    }
}

pub struct SafetyFilter {
    detector: Arc<dyn ContentDetector>,
}

impl SafetyFilter {
    pub fn new(detector: Arc<dyn ContentDetector>) -> Self {
        Self { detector }
    }

    /// Filter and annotate `items` for `viewer`.
    pub fn apply(&self, items: Vec<FeedItem>, viewer: &ViewerContext) -> Vec<FeedItem> {
        items
            .into_iter()
            .filter_map(|item| {
                if let Some(rule) = Self::exclusion(&item.publication, viewer) {
                    info!(
                        publication_id = item.publication.id,
                        viewer_id = viewer.viewer_id,
                        rule = rule.as_str(),
                        action = "dropped",
                        "Safety rule applied"
                    );
                    return None;
                }
                Some(self.annotate(item))
            })
            .collect()
    }

    /// First dropping rule that matches, if any.
    pub fn exclusion(publication: &Publication, viewer: &ViewerContext) -> Option<SafetyRule> {
        let author = &publication.author;
        let own = viewer.is_self(author.id);

        if author.is_suspended() {
            return Some(SafetyRule::SuspendedAuthor);
        }
        if viewer.is_blocked(author.id) {
            return Some(SafetyRule::Blocked);
        }
        if author.is_discreet() && !own && !viewer.is_connection(author.id) {
            return Some(SafetyRule::DiscreetMode);
        }
        let visible = match publication.visibility {
            Visibility::Public => true,
            Visibility::Connections => own || viewer.is_connection(author.id),
            Visibility::Private => own,
        };
        if !visible {
            return Some(SafetyRule::Visibility);
        }
        None
    }

    fn annotate(&self, mut item: FeedItem) -> FeedItem {
        // Annotated items went through this step already.
        if item.moderation != Moderation::Clean {
            return item;
        }
        let publication_id = item.publication.id;
        let rule = SafetyRule::Profanity.as_str();

        if item.publication.moderation_status == ModerationStatus::Flagged {
            let reason = item
                .publication
                .moderation_reason
                .clone()
                .unwrap_or_else(|| "flagged_by_moderation".to_string());
            info!(publication_id, rule, action = "flagged", %reason, "Safety rule applied");
            item.moderation = Moderation::flagged(reason);
            return item;
        }

        match self.detector.check(&item.publication.content) {
            Ok(detection) => {
                if let Some(reason) = detection.reason() {
                    info!(publication_id, rule, action = "flagged", %reason, "Safety rule applied");
                    item.moderation = Moderation::flagged(reason);
                }
            }
            Err(e) => {
                warn!(
                    publication_id,
                    rule,
                    action = "unchecked",
                    error = %e,
                    "Content detector failed, serving unflagged"
                );
                item.moderation = Moderation::unchecked("detector_error");
            }
        }
        item
    }
}
