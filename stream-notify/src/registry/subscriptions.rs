//! Add, remove and list tracked streamers for a tenant.

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use super::TenantRegistry;
use crate::domain::{TenantId, TrackedEntity};
use crate::monitor::{StreamStatusClient, UpstreamError};
use crate::thumbnail::AssetCache;
use crate::{Error, Result};

/// A tracked streamer with its current live flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrackedStreamer {
    pub login: String,
    pub userid: String,
    pub live: bool,
}

pub struct SubscriptionService {
    registry: Arc<TenantRegistry>,
    status: Arc<dyn StreamStatusClient>,
    assets: Arc<AssetCache>,
}

fn upstream_error(e: UpstreamError) -> Error {
    match e {
        UpstreamError::CredentialUnavailable => Error::CredentialUnavailable,
        other => Error::Upstream(other),
    }
}

impl SubscriptionService {
    pub fn new(
        registry: Arc<TenantRegistry>,
        status: Arc<dyn StreamStatusClient>,
        assets: Arc<AssetCache>,
    ) -> Self {
        Self {
            registry,
            status,
            assets,
        }
    }

    /// Resolve `login` upstream and start tracking it, initially offline.
    pub async fn add(&self, tenant_id: &TenantId, login: &str) -> Result<TrackedEntity> {
        let login = login.trim().to_lowercase();
        if login.is_empty() {
            return Err(Error::validation("login must not be empty"));
        }

        let tracked = self
            .registry
            .find(tenant_id)
            .await?
            .is_some_and(|t| t.entity_by_name(&login).is_some());
        if tracked {
            return Err(Error::conflict(format!(
                "streamer {login} is already tracked in {tenant_id}"
            )));
        }

        let info = self
            .status
            .lookup_by_name(&login)
            .await
            .map_err(upstream_error)?
            .ok_or_else(|| Error::not_found("Streamer", login.clone()))?;

        let entity = TrackedEntity::new(info.stable_id, &info.login);
        let added = entity.clone();
        self.registry
            .update(tenant_id, move |t| t.add_entity(entity))
            .await?;

        info!(tenant = %tenant_id, streamer = %added.display_name, id = %added.stable_id, "Streamer added");
        Ok(added)
    }

    /// Stop tracking `login`, dropping its status key and cached thumbnails.
    pub async fn remove(&self, tenant_id: &TenantId, login: &str) -> Result<TrackedEntity> {
        let login = login.trim().to_lowercase();
        let removed = self
            .registry
            .update(tenant_id, |t| {
                t.remove_by_name(&login)
                    .ok_or_else(|| Error::not_found("Streamer", login.clone()))
            })
            .await?;

        if let Err(e) = self.assets.evict(&removed.display_name).await {
            warn!(streamer = %removed.display_name, error = %e, "Failed to evict thumbnails");
        }

        info!(tenant = %tenant_id, streamer = %removed.display_name, "Streamer removed");
        Ok(removed)
    }

    /// Tracked streamers of a tenant; empty for a tenant never seen before.
    pub async fn list(&self, tenant_id: &TenantId) -> Result<Vec<TrackedStreamer>> {
        let Some(tenant) = self.registry.find(tenant_id).await? else {
            return Ok(Vec::new());
        };
        Ok(tenant
            .entities()
            .iter()
            .map(|e| TrackedStreamer {
                login: e.display_name.clone(),
                userid: e.stable_id.clone(),
                live: tenant.is_live(&e.display_name),
            })
            .collect())
    }

    /// Turn bare legacy logins into tracked entities via lookup-by-name.
    ///
    /// Logins upstream reports as unknown are dropped; logins whose lookup
    /// failed stay parked for the next run. Returns how many were resolved.
    pub async fn resolve_legacy_logins(&self) -> Result<usize> {
        let mut resolved = 0;

        for tenant_id in self.registry.list_tenants().await? {
            let Some(tenant) = self.registry.find(&tenant_id).await? else {
                continue;
            };
            let pending = tenant.legacy_logins().to_vec();

            for login in pending {
                let lookup = match self.status.lookup_by_name(&login).await {
                    Ok(lookup) => lookup,
                    Err(e) => {
                        warn!(tenant = %tenant_id, streamer = %login, error = %e, "Legacy login lookup failed");
                        continue;
                    }
                };

                let added = self
                    .registry
                    .update(&tenant_id, |t| {
                        let Some(info) = lookup else {
                            warn!(tenant = %tenant_id, streamer = %login, "Legacy login unknown upstream; dropping");
                            t.drop_legacy_login(&login);
                            return Ok(false);
                        };
                        match t.add_entity(TrackedEntity::new(info.stable_id, &info.login)) {
                            Ok(()) => {
                                t.drop_legacy_login(&login);
                                Ok(true)
                            }
                            Err(e) => {
                                warn!(tenant = %tenant_id, streamer = %login, error = %e, "Legacy login already tracked; dropping");
                                t.drop_legacy_login(&login);
                                Ok(false)
                            }
                        }
                    })
                    .await?;

                if added {
                    resolved += 1;
                }
            }
        }

        if resolved > 0 {
            info!(resolved, "Resolved legacy streamer logins");
        }
        Ok(resolved)
    }
}
