//! Helix response payloads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Every Helix collection endpoint wraps its items in `data`.
#[derive(Debug, Clone, Deserialize)]
pub struct DataResponse<T> {
    pub data: Vec<T>,
}

/// A Twitch user as returned by `GET /helix/users`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub login: String,
    pub display_name: String,
    #[serde(default)]
    pub profile_image_url: Option<String>,
}

/// A live stream as returned by `GET /helix/streams`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stream {
    pub id: String,
    pub user_id: String,
    pub user_login: String,
    #[serde(default)]
    pub user_name: String,
    #[serde(default)]
    pub game_name: Option<String>,
    #[serde(default, rename = "type")]
    pub stream_type: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub viewer_count: u64,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    /// Preview image URL with `{width}` and `{height}` placeholders.
    #[serde(default)]
    pub thumbnail_url: String,
}

impl Stream {
    /// Game/category name, treating Twitch's empty string as absent.
    pub fn category(&self) -> Option<&str> {
        self.game_name.as_deref().filter(|name| !name.is_empty())
    }

    pub fn is_live(&self) -> bool {
        self.stream_type.is_empty() || self.stream_type == "live"
    }
}

/// Fill the `{width}`/`{height}` placeholders of a Helix thumbnail template.
pub fn sized_thumbnail_url(template: &str, width: u32, height: u32) -> String {
    template
        .replace("{width}", &width.to_string())
        .replace("{height}", &height.to_string())
}
