//! Live notification event.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::tenant::{TenantId, TrackedEntity};

/// Emitted once when a tracked entity is observed going from offline to live.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveEvent {
    pub tenant_id: TenantId,
    pub entity: TrackedEntity,
    pub title: String,
    pub category: Option<String>,
    /// Upstream preview template, still containing `{width}`/`{height}`.
    pub thumbnail_source_url: String,
    pub avatar_url: Option<String>,
    pub observed_at: DateTime<Utc>,
}

impl LiveEvent {
    pub fn channel_url(&self) -> String {
        format!("https://twitch.tv/{}", self.entity.display_name)
    }

    pub fn description(&self) -> String {
        format!("{} is now live: {}", self.entity.display_name, self.title)
    }
}
