//! Discord bot channel messages.
//!
//! Posts an embed (plus the cached preview as an attachment) to the tenant's
//! channel through the REST API. 429 responses are retried after the
//! `Retry-After` delay, a bounded number of times.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::multipart::{Form, Part};
use serde_json::{Value, json};
use tracing::{debug, warn};
use url::Url;

use super::NotificationDispatcher;
use crate::domain::LiveEvent;
use crate::thumbnail::ThumbnailAsset;
use crate::{Error, Result};

/// Maximum number of attempts for rate-limited requests.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Twitch brand purple.
const EMBED_COLOR: u32 = 0x9146FF;

#[derive(Debug, Clone)]
pub struct DiscordConfig {
    pub bot_token: String,
    /// REST base, e.g. `https://discord.com/api/v10/`.
    pub api_base: String,
    pub footer: Option<String>,
}

impl DiscordConfig {
    pub const API_BASE: &str = "https://discord.com/api/v10/";

    pub fn new(bot_token: impl Into<String>) -> Self {
        Self {
            bot_token: bot_token.into(),
            api_base: Self::API_BASE.to_string(),
            footer: None,
        }
    }
}

pub struct DiscordDispatcher {
    config: DiscordConfig,
    api_base: Url,
    client: Client,
}

impl DiscordDispatcher {
    pub fn new(config: DiscordConfig, client: Client) -> Result<Self> {
        let mut api_base = Url::parse(&config.api_base)
            .map_err(|e| Error::config(format!("invalid Discord API base: {e}")))?;
        if !api_base.path().ends_with('/') {
            let path = format!("{}/", api_base.path());
            api_base.set_path(&path);
        }
        Ok(Self {
            config,
            api_base,
            client,
        })
    }

    /// Message body for an event. `attachment` is the uploaded file name.
    fn build_payload(&self, event: &LiveEvent, attachment: Option<&str>) -> Value {
        let login = &event.entity.display_name;
        let channel_url = event.channel_url();
        let title = if event.title.trim().is_empty() {
            "No title"
        } else {
            event.title.as_str()
        };

        let mut author = json!({
            "name": format!("{login} is now live on Twitch!"),
            "url": channel_url,
        });
        if let Some(avatar) = &event.avatar_url {
            author["icon_url"] = json!(avatar);
        }

        let mut embed = json!({
            "author": author,
            "title": title,
            "url": channel_url,
            "color": EMBED_COLOR,
            "timestamp": event.observed_at.to_rfc3339(),
        });

        if let Some(footer) = &self.config.footer {
            embed["footer"] = json!({ "text": footer });
        }
        if let Some(category) = event.category.as_deref()
            && category != "Unknown"
        {
            embed["fields"] = json!([{ "name": "Game", "value": category, "inline": true }]);
        }
        if let Some(file) = attachment {
            embed["image"] = json!({ "url": format!("attachment://{file}") });
        }

        let mut payload = json!({
            "embeds": [embed],
            "components": [{
                "type": 1,
                "components": [{
                    "type": 2,
                    "style": 5,
                    "label": "Watch Stream",
                    "url": channel_url,
                }]
            }],
        });
        if let Some(file) = attachment {
            payload["attachments"] = json!([{ "id": 0, "filename": file }]);
        }
        payload
    }

    fn build_form(payload: &Value, thumbnail: Option<&ThumbnailAsset>) -> Result<Form> {
        let mut form = Form::new().text("payload_json", payload.to_string());
        if let Some(asset) = thumbnail {
            let part = Part::bytes(asset.bytes.clone())
                .file_name(asset.file_name.clone())
                .mime_str("image/jpeg")
                .map_err(|e| Error::Other(format!("invalid attachment mime: {e}")))?;
            form = form.part("files[0]", part);
        }
        Ok(form)
    }

    /// Send request with rate limit handling.
    /// Retries on 429 responses respecting the Retry-After header.
    async fn send_with_retry(
        &self,
        url: Url,
        payload: &Value,
        thumbnail: Option<&ThumbnailAsset>,
    ) -> Result<()> {
        let mut attempts = 0;

        loop {
            attempts += 1;

            let response = self
                .client
                .post(url.clone())
                .header("Authorization", format!("Bot {}", self.config.bot_token))
                .multipart(Self::build_form(payload, thumbnail)?)
                .send()
                .await
                .map_err(|e| Error::Other(format!("Discord request failed: {e}")))?;

            let status = response.status();
            if status.is_success() {
                return Ok(());
            }

            if status.as_u16() == 429 {
                let retry_after = parse_retry_after(&response);

                if attempts >= MAX_RATE_LIMIT_RETRIES {
                    warn!(
                        retry_after = ?retry_after,
                        "Discord rate limit: max retries ({MAX_RATE_LIMIT_RETRIES}) exceeded"
                    );
                    return Err(Error::Other(format!(
                        "Discord rate limit exceeded after {MAX_RATE_LIMIT_RETRIES} attempts"
                    )));
                }

                let wait = retry_after.unwrap_or(Duration::from_secs(1));
                debug!(
                    wait = ?wait,
                    attempt = attempts,
                    "Discord rate limited (429), waiting before retry"
                );
                tokio::time::sleep(wait).await;
                continue;
            }

            let body = response.text().await.unwrap_or_default();
            return Err(Error::Other(format!(
                "Discord message failed: {status} - {body}"
            )));
        }
    }
}

/// Parse the Retry-After duration from a 429 response.
fn parse_retry_after(response: &reqwest::Response) -> Option<Duration> {
    ["Retry-After", "X-RateLimit-Reset-After"]
        .iter()
        .filter_map(|name| response.headers().get(*name))
        .filter_map(|value| value.to_str().ok()?.parse::<f64>().ok())
        .find(|secs| secs.is_finite() && *secs >= 0.0)
        .map(Duration::from_secs_f64)
}

#[async_trait]
impl NotificationDispatcher for DiscordDispatcher {
    fn channel_type(&self) -> &'static str {
        "discord"
    }

    async fn dispatch(&self, event: &LiveEvent, thumbnail: Option<&ThumbnailAsset>) -> Result<()> {
        let url = self
            .api_base
            .join(&format!("channels/{}/messages", event.tenant_id))
            .map_err(|e| Error::Other(format!("invalid Discord url: {e}")))?;

        let payload = self.build_payload(event, thumbnail.map(|t| t.file_name.as_str()));
        self.send_with_retry(url, &payload, thumbnail).await?;

        debug!(
            tenant = %event.tenant_id,
            streamer = %event.entity.display_name,
            with_image = thumbnail.is_some(),
            "Discord notification sent"
        );
        Ok(())
    }
}
