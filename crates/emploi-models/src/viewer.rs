//! Viewer relations used by the content safety filter.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::publication::UserId;

/// Relations between the requesting user and other accounts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewerContext {
    pub viewer_id: UserId,
    /// Accounts the viewer blocked or was blocked by
    pub blocked: HashSet<UserId>,
    /// Confirmed connections of the viewer
    pub connections: HashSet<UserId>,
}

impl ViewerContext {
    pub fn new(viewer_id: UserId) -> Self {
        Self {
            viewer_id,
            blocked: HashSet::new(),
            connections: HashSet::new(),
        }
    }

    pub fn with_blocked(mut self, blocked: impl IntoIterator<Item = UserId>) -> Self {
        self.blocked.extend(blocked);
        self
    }

    pub fn with_connections(mut self, connections: impl IntoIterator<Item = UserId>) -> Self {
        self.connections.extend(connections);
        self
    }

    pub fn is_self(&self, user_id: UserId) -> bool {
        self.viewer_id == user_id
    }

    pub fn is_blocked(&self, user_id: UserId) -> bool {
        self.blocked.contains(&user_id)
    }

    pub fn is_connection(&self, user_id: UserId) -> bool {
        self.connections.contains(&user_id)
    }
}
