//! One-time import of the old single-file `guild-settings.json` layout.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;
use tracing::{info, warn};

use super::TenantStore;
use super::record::{StreamerEntry, TenantRecord};
use crate::Result;
use crate::domain::TenantId;
use crate::utils::fs::io_error;

#[derive(Debug, Deserialize)]
struct LegacyGuildSettings {
    #[serde(default, rename = "channelId")]
    channel_id: Option<String>,
    #[serde(default)]
    streamers: Vec<StreamerEntry>,
    #[serde(default, rename = "liveStatus")]
    live_status: BTreeMap<String, bool>,
}

/// Split a legacy guild-keyed settings file into per-channel tenant records,
/// then rename it to `<file>.backup`. Returns the number of tenants written;
/// a missing file is not an error.
pub async fn migrate_guild_settings(legacy_file: &Path, store: &dyn TenantStore) -> Result<usize> {
    let raw = match tokio::fs::read_to_string(legacy_file).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(io_error("reading", legacy_file, e)),
    };

    let guilds: BTreeMap<String, serde_json::Value> = serde_json::from_str(&raw)?;

    let mut migrated = 0;
    for (guild_id, value) in guilds {
        let settings: LegacyGuildSettings = match serde_json::from_value(value) {
            Ok(settings) => settings,
            Err(e) => {
                warn!(guild = %guild_id, error = %e, "Malformed legacy guild; skipping");
                continue;
            }
        };
        let Some(channel_id) = settings.channel_id else {
            warn!(guild = %guild_id, "Legacy guild has no notification channel; skipping");
            continue;
        };
        let tenant_id = match TenantId::parse(channel_id) {
            Ok(id) => id,
            Err(e) => {
                warn!(guild = %guild_id, error = %e, "Skipping legacy guild");
                continue;
            }
        };

        let record = TenantRecord {
            streamers: settings.streamers,
            live_status: settings.live_status,
        };
        store.save(&record.into_tenant(tenant_id)).await?;
        migrated += 1;
    }

    let mut backup = legacy_file.as_os_str().to_owned();
    backup.push(".backup");
    tokio::fs::rename(legacy_file, &backup)
        .await
        .map_err(|e| io_error("renaming", legacy_file, e))?;

    info!(tenants = migrated, "Migrated legacy guild settings");
    Ok(migrated)
}
