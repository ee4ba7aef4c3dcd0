//! Rename tracking.
//!
//! Logins can change; the upstream user id cannot. An entity whose stored
//! login no longer resolves to its own id is looked up by id, and if the
//! account still exists under a new login the tenant is rekeyed to it.

use std::sync::Arc;

use tracing::{debug, info, warn};

use super::status::{EntityInfo, StreamStatusClient};
use crate::domain::{TenantId, TrackedEntity};
use crate::registry::TenantRegistry;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// Name to query status with. The last-known name when unresolved.
    pub canonical_name: String,
    pub renamed: bool,
    /// Upstream account, `None` when the identity could not be confirmed.
    pub profile: Option<EntityInfo>,
}

impl Resolution {
    fn unresolved(entity: &TrackedEntity) -> Self {
        Self {
            canonical_name: entity.display_name.clone(),
            renamed: false,
            profile: None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.profile.is_some()
    }
}

pub struct IdentityResolver {
    status: Arc<dyn StreamStatusClient>,
    registry: Arc<TenantRegistry>,
}

impl IdentityResolver {
    pub fn new(status: Arc<dyn StreamStatusClient>, registry: Arc<TenantRegistry>) -> Self {
        Self { status, registry }
    }

    /// Determine the current login of `entity`, persisting a rename if one
    /// is detected.
    pub async fn resolve(&self, tenant_id: &TenantId, entity: &TrackedEntity) -> Resolution {
        match self.status.lookup_by_name(&entity.display_name).await {
            Ok(Some(profile)) if profile.stable_id == entity.stable_id => {
                return Resolution {
                    canonical_name: entity.display_name.clone(),
                    renamed: false,
                    profile: Some(profile),
                };
            }
            Ok(Some(other)) => {
                debug!(
                    streamer = %entity.display_name,
                    id = %entity.stable_id,
                    holder = %other.stable_id,
                    "Login now belongs to another account; trying id"
                );
            }
            Ok(None) => {}
            Err(e) => {
                debug!(streamer = %entity.display_name, error = %e, "Name lookup failed; trying id");
            }
        }

        let profile = match self.status.lookup_by_id(&entity.stable_id).await {
            Ok(Some(profile)) => profile,
            Ok(None) => {
                warn!(tenant = %tenant_id, streamer = %entity.display_name, id = %entity.stable_id, "Streamer not found upstream");
                return Resolution::unresolved(entity);
            }
            Err(e) => {
                warn!(tenant = %tenant_id, streamer = %entity.display_name, error = %e, "Identity lookup failed");
                return Resolution::unresolved(entity);
            }
        };

        if profile.login == entity.display_name {
            return Resolution {
                canonical_name: profile.login.clone(),
                renamed: false,
                profile: Some(profile),
            };
        }

        let new_name = profile.login.clone();
        let stable_id = entity.stable_id.clone();
        let renamed = self
            .registry
            .update(tenant_id, |t| t.rename(&stable_id, &new_name))
            .await;

        match renamed {
            Ok(Some(old)) => {
                info!(tenant = %tenant_id, from = %old, to = %new_name, "Streamer renamed");
                Resolution {
                    canonical_name: new_name,
                    renamed: true,
                    profile: Some(profile),
                }
            }
            Ok(None) => Resolution {
                canonical_name: new_name,
                renamed: false,
                profile: Some(profile),
            },
            Err(e) => {
                warn!(tenant = %tenant_id, streamer = %entity.display_name, to = %new_name, error = %e, "Could not apply rename");
                Resolution::unresolved(entity)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use async_trait::async_trait;

    use crate::monitor::{LiveDetails, UpstreamError};
    use crate::store::MemoryTenantStore;

    /// Accounts keyed by id; `None` login lookups simulate transport failure.
    struct Accounts {
        by_id: HashMap<String, String>,
        name_lookup_fails: bool,
    }

    #[async_trait]
    impl StreamStatusClient for Accounts {
        async fn lookup_by_name(&self, name: &str) -> Result<Option<EntityInfo>, UpstreamError> {
            if self.name_lookup_fails {
                return Err(UpstreamError::Timeout(std::time::Duration::from_secs(1)));
            }
            Ok(self
                .by_id
                .iter()
                .find(|(_, login)| login.as_str() == name)
                .map(|(id, login)| info(id, login)))
        }

        async fn lookup_by_id(&self, stable_id: &str) -> Result<Option<EntityInfo>, UpstreamError> {
            Ok(self.by_id.get(stable_id).map(|login| info(stable_id, login)))
        }

        async fn get_live_stream(&self, _: &str) -> Result<Option<LiveDetails>, UpstreamError> {
            Ok(None)
        }
    }

    fn info(id: &str, login: &str) -> EntityInfo {
        EntityInfo {
            stable_id: id.to_string(),
            login: login.to_string(),
            profile_image_url: None,
        }
    }

    async fn setup(accounts: Accounts) -> (IdentityResolver, Arc<TenantRegistry>, TenantId) {
        let registry = Arc::new(TenantRegistry::new(Arc::new(MemoryTenantStore::new())));
        let tenant_id = TenantId::parse("1").unwrap();
        registry
            .update(&tenant_id, |t| t.add_entity(TrackedEntity::new("42", "alice")))
            .await
            .unwrap();
        (
            IdentityResolver::new(Arc::new(accounts), registry.clone()),
            registry,
            tenant_id,
        )
    }

    #[tokio::test]
    async fn test_unchanged_name() {
        let accounts = Accounts {
            by_id: HashMap::from([("42".to_string(), "alice".to_string())]),
            name_lookup_fails: false,
        };
        let (resolver, _, tenant_id) = setup(accounts).await;

        let resolution = resolver
            .resolve(&tenant_id, &TrackedEntity::new("42", "alice"))
            .await;
        assert_eq!(resolution.canonical_name, "alice");
        assert!(!resolution.renamed);
        assert!(resolution.is_resolved());
    }

    #[tokio::test]
    async fn test_rename_is_persisted() {
        let accounts = Accounts {
            by_id: HashMap::from([("42".to_string(), "bob".to_string())]),
            name_lookup_fails: false,
        };
        let (resolver, registry, tenant_id) = setup(accounts).await;

        let resolution = resolver
            .resolve(&tenant_id, &TrackedEntity::new("42", "alice"))
            .await;
        assert_eq!(resolution.canonical_name, "bob");
        assert!(resolution.renamed);

        let tenant = registry.read(&tenant_id).await.unwrap();
        assert_eq!(tenant.entity_by_stable_id("42").unwrap().display_name, "bob");
        assert_eq!(tenant.live_status().get("bob"), Some(&false));
        assert!(!tenant.live_status().contains_key("alice"));
    }

    #[tokio::test]
    async fn test_failed_name_lookup_falls_back_to_id() {
        let accounts = Accounts {
            by_id: HashMap::from([("42".to_string(), "alice".to_string())]),
            name_lookup_fails: true,
        };
        let (resolver, _, tenant_id) = setup(accounts).await;

        let resolution = resolver
            .resolve(&tenant_id, &TrackedEntity::new("42", "alice"))
            .await;
        assert_eq!(resolution.canonical_name, "alice");
        assert!(!resolution.renamed);
        assert!(resolution.is_resolved());
    }

    #[tokio::test]
    async fn test_vanished_account_is_left_alone() {
        let accounts = Accounts {
            by_id: HashMap::new(),
            name_lookup_fails: false,
        };
        let (resolver, registry, tenant_id) = setup(accounts).await;
        let before = registry.read(&tenant_id).await.unwrap();

        let resolution = resolver
            .resolve(&tenant_id, &TrackedEntity::new("42", "alice"))
            .await;
        assert_eq!(resolution.canonical_name, "alice");
        assert!(!resolution.is_resolved());
        assert_eq!(registry.read(&tenant_id).await.unwrap(), before);
    }

    #[tokio::test]
    async fn test_recycled_login_follows_the_id() {
        let accounts = Accounts {
            by_id: HashMap::from([
                ("42".to_string(), "bob".to_string()),
                ("99".to_string(), "alice".to_string()),
            ]),
            name_lookup_fails: false,
        };
        let (resolver, registry, tenant_id) = setup(accounts).await;

        let resolution = resolver
            .resolve(&tenant_id, &TrackedEntity::new("42", "alice"))
            .await;
        assert_eq!(resolution.canonical_name, "bob");
        assert!(resolution.renamed);
        assert_eq!(resolution.profile.unwrap().stable_id, "42");

        let tenant = registry.read(&tenant_id).await.unwrap();
        assert_eq!(tenant.entities(), [TrackedEntity::new("42", "bob")]);
    }

    #[tokio::test]
    async fn test_recycled_login_of_vanished_account_is_unresolved() {
        let accounts = Accounts {
            by_id: HashMap::from([("99".to_string(), "alice".to_string())]),
            name_lookup_fails: false,
        };
        let (resolver, registry, tenant_id) = setup(accounts).await;
        let before = registry.read(&tenant_id).await.unwrap();

        let resolution = resolver
            .resolve(&tenant_id, &TrackedEntity::new("42", "alice"))
            .await;
        assert!(!resolution.is_resolved());
        assert_eq!(registry.read(&tenant_id).await.unwrap(), before);
    }
}
