//! Live notification delivery.
//!
//! The reconciler hands every [`LiveEvent`] to a [`NotificationDispatcher`]
//! exactly once. Delivery is best effort: the engine bounds it with a timeout,
//! logs failures and never retries.

mod discord;

pub use discord::{DiscordConfig, DiscordDispatcher};

use async_trait::async_trait;
use tracing::info;

use crate::Result;
use crate::domain::LiveEvent;
use crate::thumbnail::ThumbnailAsset;

#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    /// Short name of the delivery channel.
    fn channel_type(&self) -> &'static str;

    /// Whether notifications actually leave the process.
    fn is_delivering(&self) -> bool {
        true
    }

    async fn dispatch(&self, event: &LiveEvent, thumbnail: Option<&ThumbnailAsset>) -> Result<()>;
}

/// Writes notifications to the log only. Used when no bot token is set.
#[derive(Debug, Default)]
pub struct LogDispatcher;

#[async_trait]
impl NotificationDispatcher for LogDispatcher {
    fn channel_type(&self) -> &'static str {
        "log"
    }

    fn is_delivering(&self) -> bool {
        false
    }

    async fn dispatch(&self, event: &LiveEvent, thumbnail: Option<&ThumbnailAsset>) -> Result<()> {
        info!(
            tenant = %event.tenant_id,
            streamer = %event.entity.display_name,
            title = %event.title,
            category = event.category.as_deref().unwrap_or("-"),
            thumbnail = thumbnail.map(|t| t.file_name.as_str()).unwrap_or("-"),
            "[LIVE NOTIFY] {}",
            event.description()
        );
        Ok(())
    }
}
