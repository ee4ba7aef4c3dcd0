//! Domain layer: tenants, tracked streamers and live events.

pub mod event;
pub mod tenant;

pub use event::LiveEvent;
pub use tenant::{Tenant, TenantId, TrackedEntity};
