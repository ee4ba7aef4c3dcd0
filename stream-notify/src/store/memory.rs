use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;

use super::TenantStore;
use crate::Result;
use crate::domain::{Tenant, TenantId};

/// Volatile [`TenantStore`], handy for tests and dry runs.
#[derive(Default)]
pub struct MemoryTenantStore {
    tenants: RwLock<BTreeMap<TenantId, Tenant>>,
    saves: AtomicUsize,
}

impl MemoryTenantStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tenants(tenants: impl IntoIterator<Item = Tenant>) -> Self {
        let store = Self::new();
        {
            let mut map = store.tenants.write();
            for tenant in tenants {
                map.insert(tenant.id().clone(), tenant);
            }
        }
        store
    }

    /// Current snapshot of a tenant without creating it.
    pub fn get(&self, id: &TenantId) -> Option<Tenant> {
        self.tenants.read().get(id).cloned()
    }

    /// Number of `save` calls so far.
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl TenantStore for MemoryTenantStore {
    async fn list_tenants(&self) -> Result<Vec<TenantId>> {
        Ok(self.tenants.read().keys().cloned().collect())
    }

    async fn find(&self, id: &TenantId) -> Result<Option<Tenant>> {
        Ok(self.get(id))
    }

    async fn load(&self, id: &TenantId) -> Result<Tenant> {
        let mut tenants = self.tenants.write();
        Ok(tenants
            .entry(id.clone())
            .or_insert_with(|| Tenant::new(id.clone()))
            .clone())
    }

    async fn save(&self, tenant: &Tenant) -> Result<()> {
        self.saves.fetch_add(1, Ordering::Relaxed);
        self.tenants
            .write()
            .insert(tenant.id().clone(), tenant.clone());
        Ok(())
    }
}
