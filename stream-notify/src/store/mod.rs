//! Tenant persistence.
//!
//! The engine only talks to [`TenantStore`]; the JSON-per-tenant layout of
//! [`JsonFileTenantStore`] is one implementation of it.

mod json_file;
mod memory;
mod migration;
mod record;

pub use json_file::JsonFileTenantStore;
pub use memory::MemoryTenantStore;
pub use migration::migrate_guild_settings;
pub use record::{StreamerEntry, TenantRecord};

use async_trait::async_trait;

use crate::Result;
use crate::domain::{Tenant, TenantId};

/// Durable per-tenant registry.
#[async_trait]
pub trait TenantStore: Send + Sync {
    /// Ids of every tenant that has a persisted record.
    async fn list_tenants(&self) -> Result<Vec<TenantId>>;

    /// Load a tenant without creating it. `None` when it has never been saved.
    async fn find(&self, id: &TenantId) -> Result<Option<Tenant>>;

    /// Load a tenant, creating an empty one if it has never been seen.
    async fn load(&self, id: &TenantId) -> Result<Tenant>;

    /// Atomically replace the tenant's persisted record.
    async fn save(&self, tenant: &Tenant) -> Result<()>;
}
