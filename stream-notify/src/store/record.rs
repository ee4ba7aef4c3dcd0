//! On-disk tenant record.
//!
//! ```json
//! { "streamers": [ { "login": "nina", "userid": "42" } ],
//!   "liveStatus": { "nina": false } }
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::{Tenant, TenantId, TrackedEntity};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TenantRecord {
    #[serde(default)]
    pub streamers: Vec<StreamerEntry>,
    #[serde(default, rename = "liveStatus")]
    pub live_status: BTreeMap<String, bool>,
}

/// A streamer entry as found on disk. Older records stored bare logins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StreamerEntry {
    Tracked { login: String, userid: String },
    LoginOnly { login: String },
    Bare(String),
}

impl TenantRecord {
    /// Normalize into the domain aggregate. Entries without a user id are
    /// parked as legacy logins.
    pub fn into_tenant(self, id: TenantId) -> Tenant {
        let mut entities = Vec::new();
        let mut legacy = Vec::new();

        for entry in self.streamers {
            match entry {
                StreamerEntry::Tracked { login, userid } => {
                    entities.push(TrackedEntity::new(userid, &login));
                }
                StreamerEntry::LoginOnly { login } | StreamerEntry::Bare(login) => {
                    legacy.push(login);
                }
            }
        }

        Tenant::from_parts(id, entities, self.live_status, legacy)
    }

    pub fn from_tenant(tenant: &Tenant) -> Self {
        let streamers = tenant
            .entities()
            .iter()
            .map(|e| StreamerEntry::Tracked {
                login: e.display_name.clone(),
                userid: e.stable_id.clone(),
            })
            .chain(
                tenant
                    .legacy_logins()
                    .iter()
                    .map(|login| StreamerEntry::Bare(login.clone())),
            )
            .collect();

        Self {
            streamers,
            live_status: tenant.live_status().clone(),
        }
    }
}
