//! Tenant registry: the only way tenants are read or mutated.
//!
//! Every read-modify-write cycle on one tenant runs under that tenant's
//! async mutex, so the reconciler and the command surface never lose each
//! other's updates. Distinct tenants never contend.

mod subscriptions;

pub use subscriptions::{SubscriptionService, TrackedStreamer};

use std::collections::BTreeMap;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{trace, warn};

use crate::Result;
use crate::domain::{Tenant, TenantId};
use crate::store::TenantStore;

pub struct TenantRegistry {
    store: Arc<dyn TenantStore>,
    locks: DashMap<TenantId, Arc<Mutex<()>>>,
}

impl TenantRegistry {
    pub fn new(store: Arc<dyn TenantStore>) -> Self {
        Self {
            store,
            locks: DashMap::new(),
        }
    }

    fn lock_for(&self, id: &TenantId) -> Arc<Mutex<()>> {
        self.locks
            .entry(id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    pub async fn list_tenants(&self) -> Result<Vec<TenantId>> {
        self.store.list_tenants().await
    }

    /// Consistent snapshot of one tenant.
    pub async fn read(&self, id: &TenantId) -> Result<Tenant> {
        let lock = self.lock_for(id);
        let _guard = lock.lock().await;
        self.store.load(id).await
    }

    /// Snapshot of a tenant that already exists; never creates one.
    pub async fn find(&self, id: &TenantId) -> Result<Option<Tenant>> {
        let lock = self.lock_for(id);
        let _guard = lock.lock().await;
        self.store.find(id).await
    }

    /// Load, mutate and persist a tenant under its lock.
    ///
    /// The record is only written when `mutate` actually changed it. An error
    /// from `mutate` discards the change.
    pub async fn update<T, F>(&self, id: &TenantId, mutate: F) -> Result<T>
    where
        F: FnOnce(&mut Tenant) -> Result<T> + Send,
        T: Send,
    {
        let lock = self.lock_for(id);
        let _guard = lock.lock().await;

        let mut tenant = self.store.load(id).await?;
        let before = tenant.clone();
        let output = mutate(&mut tenant)?;
        if tenant != before {
            self.store.save(&tenant).await?;
            trace!(tenant = %id, "Tenant saved");
        }
        Ok(output)
    }

    /// Live flags of every known tenant. A tenant that cannot be loaded is
    /// left out rather than failing the whole snapshot.
    pub async fn status_snapshot(&self) -> Result<BTreeMap<TenantId, BTreeMap<String, bool>>> {
        let mut snapshot = BTreeMap::new();
        for id in self.list_tenants().await? {
            match self.find(&id).await {
                Ok(Some(tenant)) => {
                    snapshot.insert(id, tenant.live_status().clone());
                }
                Ok(None) => {}
                Err(e) => warn!(tenant = %id, error = %e, "Skipping unreadable tenant in snapshot"),
            }
        }
        Ok(snapshot)
    }
}
