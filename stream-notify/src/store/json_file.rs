//! One JSON settings file per tenant.

use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use super::TenantStore;
use super::record::TenantRecord;
use crate::domain::{Tenant, TenantId};
use crate::utils::fs::{ensure_dir_all_with_op, io_error};
use crate::{Error, Result};

const RECORD_EXTENSION: &str = "json";
const CORRUPT_SUFFIX: &str = "corrupt";

/// Stores each tenant as `<dir>/<tenant_id>.json`.
///
/// Writes go to a temporary file in the same directory which is then renamed
/// over the target, so readers never observe a half-written record.
pub struct JsonFileTenantStore {
    dir: PathBuf,
}

impl JsonFileTenantStore {
    /// Open the store, creating the settings directory if needed.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        ensure_dir_all_with_op("creating settings directory", &dir).await?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, id: &TenantId) -> PathBuf {
        self.dir.join(format!("{}.{RECORD_EXTENSION}", id.as_str()))
    }

    async fn write_record(&self, path: PathBuf, record: &TenantRecord) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(record)?;
        let dir = self.dir.clone();

        tokio::task::spawn_blocking(move || -> Result<()> {
            let mut tmp = NamedTempFile::new_in(&dir)
                .map_err(|e| io_error("creating temp file in", &dir, e))?;
            tmp.write_all(&bytes)
                .map_err(|e| io_error("writing", tmp.path(), e))?;
            tmp.as_file()
                .sync_all()
                .map_err(|e| io_error("syncing", tmp.path(), e))?;
            tmp.persist(&path)
                .map_err(|e| io_error("replacing", &path, e.error))?;
            Ok(())
        })
        .await
        .map_err(|e| Error::Other(format!("settings writer task failed: {e}")))?
    }

    /// Move an unreadable record aside so it can be inspected later.
    async fn quarantine(&self, path: &Path) {
        let mut target = path.as_os_str().to_owned();
        target.push(format!(".{CORRUPT_SUFFIX}"));
        if let Err(e) = tokio::fs::rename(path, &target).await {
            warn!(path = %path.display(), error = %e, "Failed to move corrupt record aside");
        }
    }

    async fn reinitialize(&self, id: &TenantId) -> Result<Tenant> {
        let tenant = Tenant::new(id.clone());
        self.save(&tenant).await?;
        Ok(tenant)
    }
}

#[async_trait]
impl TenantStore for JsonFileTenantStore {
    async fn list_tenants(&self) -> Result<Vec<TenantId>> {
        let mut entries = tokio::fs::read_dir(&self.dir)
            .await
            .map_err(|e| io_error("reading settings directory", &self.dir, e))?;

        let mut ids = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| io_error("reading settings directory", &self.dir, e))?
        {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(RECORD_EXTENSION) {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            match TenantId::parse(stem) {
                Ok(id) => ids.push(id),
                Err(_) => debug!(path = %path.display(), "Skipping file with invalid tenant id"),
            }
        }

        ids.sort();
        Ok(ids)
    }

    async fn find(&self, id: &TenantId) -> Result<Option<Tenant>> {
        let path = self.path_for(id);

        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io_error("reading", &path, e)),
        };

        // Invalid UTF-8 surfaces as a parse error here, same as broken JSON.
        match serde_json::from_slice::<TenantRecord>(&bytes) {
            Ok(record) => Ok(Some(record.into_tenant(id.clone()))),
            Err(e) => {
                let corrupt = Error::StoreCorrupt {
                    tenant_id: id.to_string(),
                    reason: e.to_string(),
                };
                warn!(error = %corrupt, "Resetting tenant to empty settings");
                self.quarantine(&path).await;
                let tenant = self.reinitialize(id).await?;
                info!(tenant = %id, "Tenant settings reinitialized");
                Ok(Some(tenant))
            }
        }
    }

    async fn load(&self, id: &TenantId) -> Result<Tenant> {
        match self.find(id).await? {
            Some(tenant) => Ok(tenant),
            None => {
                debug!(tenant = %id, "Creating default settings");
                self.reinitialize(id).await
            }
        }
    }

    async fn save(&self, tenant: &Tenant) -> Result<()> {
        let path = self.path_for(tenant.id());
        self.write_record(path, &TenantRecord::from_tenant(tenant))
            .await
    }
}
