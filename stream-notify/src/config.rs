//! Environment configuration.
//!
//! Values come from the process environment; `main` loads `.env` first.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::{Error, Result};

/// How the app obtains its Twitch bearer token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TwitchAuthConfig {
    /// Client-credentials grant, refreshed periodically.
    ClientCredentials { client_secret: String },
    /// A pre-issued token used as is.
    StaticToken { access_token: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub twitch_client_id: String,
    pub twitch_auth: TwitchAuthConfig,
    pub discord_bot_token: Option<String>,
    pub notify_footer: Option<String>,
    pub bind_address: String,
    pub port: u16,
    pub settings_dir: PathBuf,
    pub thumbnail_dir: PathBuf,
    pub legacy_settings_file: PathBuf,
    pub log_dir: Option<PathBuf>,
    pub poll_interval: Duration,
    pub token_refresh_interval: Duration,
    pub request_timeout: Duration,
    pub max_concurrent_checks: usize,
    pub thumbnail_width: u32,
    pub thumbnail_height: u32,
}

impl AppConfig {
    /// Read the configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read the configuration through `lookup`. Blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let twitch_client_id =
            get("TWITCH_CLIENT_ID").ok_or_else(|| Error::config("TWITCH_CLIENT_ID is required"))?;

        let twitch_auth = match (get("TWITCH_SECRET"), get("TWITCH_ACCESS_TOKEN")) {
            (Some(client_secret), _) => TwitchAuthConfig::ClientCredentials { client_secret },
            (None, Some(access_token)) => TwitchAuthConfig::StaticToken { access_token },
            (None, None) => {
                return Err(Error::config(
                    "either TWITCH_SECRET or TWITCH_ACCESS_TOKEN is required",
                ));
            }
        };

        let max_concurrent_checks: usize = parse_or(&get, "MAX_CONCURRENT_CHECKS", 8)?;
        if max_concurrent_checks == 0 {
            return Err(Error::config("MAX_CONCURRENT_CHECKS must be at least 1"));
        }
        let poll_interval_secs: u64 = parse_or(&get, "POLL_INTERVAL_SECS", 60)?;
        if poll_interval_secs == 0 {
            return Err(Error::config("POLL_INTERVAL_SECS must be at least 1"));
        }

        Ok(Self {
            twitch_client_id,
            twitch_auth,
            discord_bot_token: get("DISCORD_BOT_TOKEN"),
            notify_footer: get("NOTIFY_FOOTER"),
            bind_address: get("API_BIND_ADDRESS").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parse_or(&get, "PORT", 3000)?,
            settings_dir: get("SETTINGS_DIR").unwrap_or_else(|| "settings".into()).into(),
            thumbnail_dir: get("THUMBNAIL_DIR")
                .unwrap_or_else(|| "thumbnails".into())
                .into(),
            legacy_settings_file: get("LEGACY_SETTINGS_FILE")
                .unwrap_or_else(|| "guild-settings.json".into())
                .into(),
            log_dir: get("LOG_DIR").map(PathBuf::from),
            poll_interval: Duration::from_secs(poll_interval_secs),
            token_refresh_interval: Duration::from_secs(parse_or(
                &get,
                "TOKEN_REFRESH_INTERVAL_SECS",
                24 * 60 * 60,
            )?),
            request_timeout: Duration::from_secs(parse_or(&get, "REQUEST_TIMEOUT_SECS", 10)?),
            max_concurrent_checks,
            thumbnail_width: parse_or(&get, "THUMBNAIL_WIDTH", 1280)?,
            thumbnail_height: parse_or(&get, "THUMBNAIL_HEIGHT", 720)?,
        })
    }
}

fn parse_or<T>(get: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match get(key) {
        Some(raw) => raw
            .parse()
            .map_err(|e| Error::config(format!("{key}: invalid value '{raw}': {e}"))),
        None => Ok(default),
    }
}
