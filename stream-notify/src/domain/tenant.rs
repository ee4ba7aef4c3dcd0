//! Tenant aggregate.
//!
//! A tenant is one notification destination (a chat channel) with its own
//! list of tracked streamers and their last observed live flag. All mutation
//! goes through the methods here so the `live_status` keys always mirror the
//! current display names of the tracked entities.

use std::collections::{BTreeMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Opaque tenant identifier, also used as the settings file stem.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TenantId(String);

impl TenantId {
    pub fn parse(raw: impl Into<String>) -> Result<Self> {
        let raw = raw.into();
        let valid = !raw.is_empty()
            && raw.len() <= 64
            && raw
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(Error::validation(format!("invalid tenant id '{raw}'")));
        }
        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for TenantId {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(value)
    }
}

impl From<TenantId> for String {
    fn from(id: TenantId) -> Self {
        id.0
    }
}

/// A streamer tracked on behalf of a tenant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TrackedEntity {
    /// Upstream user id; survives renames.
    pub stable_id: String,
    /// Last known login, lowercased.
    pub display_name: String,
}

impl TrackedEntity {
    pub fn new(stable_id: impl Into<String>, display_name: &str) -> Self {
        Self {
            stable_id: stable_id.into(),
            display_name: display_name.to_lowercase(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tenant {
    id: TenantId,
    entities: Vec<TrackedEntity>,
    live_status: BTreeMap<String, bool>,
    /// Bare logins from old records that still need a stable id.
    legacy_logins: Vec<String>,
}

impl Tenant {
    /// An empty tenant.
    pub fn new(id: TenantId) -> Self {
        Self {
            id,
            entities: Vec::new(),
            live_status: BTreeMap::new(),
            legacy_logins: Vec::new(),
        }
    }

    /// Rebuild a tenant from persisted parts, repairing anything that breaks
    /// the one-key-per-entity rule.
    pub fn from_parts(
        id: TenantId,
        entities: Vec<TrackedEntity>,
        live_status: BTreeMap<String, bool>,
        legacy_logins: Vec<String>,
    ) -> Self {
        let mut seen_ids = HashSet::new();
        let mut seen_names = HashSet::new();
        let entities: Vec<TrackedEntity> = entities
            .into_iter()
            .map(|e| TrackedEntity::new(e.stable_id, &e.display_name))
            .filter(|e| !e.stable_id.is_empty() && !e.display_name.is_empty())
            .filter(|e| seen_ids.insert(e.stable_id.clone()))
            .filter(|e| seen_names.insert(e.display_name.clone()))
            .collect();

        let live_status = entities
            .iter()
            .map(|e| {
                let live = live_status.get(&e.display_name).copied().unwrap_or(false);
                (e.display_name.clone(), live)
            })
            .collect();

        let legacy_logins = legacy_logins
            .into_iter()
            .map(|l| l.trim().to_lowercase())
            .filter(|l| !l.is_empty() && seen_names.insert(l.clone()))
            .collect();

        Self {
            id,
            entities,
            live_status,
            legacy_logins,
        }
    }

    pub fn id(&self) -> &TenantId {
        &self.id
    }

    pub fn entities(&self) -> &[TrackedEntity] {
        &self.entities
    }

    pub fn live_status(&self) -> &BTreeMap<String, bool> {
        &self.live_status
    }

    pub fn legacy_logins(&self) -> &[String] {
        &self.legacy_logins
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn entity_by_stable_id(&self, stable_id: &str) -> Option<&TrackedEntity> {
        self.entities.iter().find(|e| e.stable_id == stable_id)
    }

    pub fn entity_by_name(&self, name: &str) -> Option<&TrackedEntity> {
        let name = name.to_lowercase();
        self.entities.iter().find(|e| e.display_name == name)
    }

    pub fn is_live(&self, name: &str) -> bool {
        self.live_status.get(name).copied().unwrap_or(false)
    }

    /// Start tracking an entity with an offline status.
    pub fn add_entity(&mut self, entity: TrackedEntity) -> Result<()> {
        let entity = TrackedEntity::new(entity.stable_id, &entity.display_name);
        if self.entity_by_stable_id(&entity.stable_id).is_some()
            || self.entity_by_name(&entity.display_name).is_some()
        {
            return Err(Error::conflict(format!(
                "streamer {} is already tracked in {}",
                entity.display_name, self.id
            )));
        }
        self.legacy_logins.retain(|l| *l != entity.display_name);
        self.live_status.insert(entity.display_name.clone(), false);
        self.entities.push(entity);
        Ok(())
    }

    /// Stop tracking the entity currently known as `name`.
    pub fn remove_by_name(&mut self, name: &str) -> Option<TrackedEntity> {
        let name = name.to_lowercase();
        let index = self.entities.iter().position(|e| e.display_name == name)?;
        let removed = self.entities.remove(index);
        self.live_status.remove(&removed.display_name);
        Some(removed)
    }

    /// Move an entity to a new display name, carrying its live flag over to
    /// the new key. Returns the previous name when something changed.
    pub fn rename(&mut self, stable_id: &str, new_name: &str) -> Result<Option<String>> {
        let new_name = new_name.to_lowercase();
        if let Some(holder) = self.entity_by_name(&new_name)
            && holder.stable_id != stable_id
        {
            return Err(Error::conflict(format!(
                "cannot rename {stable_id} to {new_name}: name held by {}",
                holder.stable_id
            )));
        }

        let entity = self
            .entities
            .iter_mut()
            .find(|e| e.stable_id == stable_id)
            .ok_or_else(|| Error::not_found("TrackedEntity", stable_id))?;

        if entity.display_name == new_name {
            return Ok(None);
        }

        let old_name = std::mem::replace(&mut entity.display_name, new_name.clone());
        let live = self.live_status.remove(&old_name).unwrap_or(false);
        self.live_status.insert(new_name, live);
        Ok(Some(old_name))
    }

    /// Record the observed live flag for an entity. Returns the previous flag,
    /// or `None` when the entity is no longer tracked.
    pub fn set_live(&mut self, stable_id: &str, live: bool) -> Option<bool> {
        let name = self.entity_by_stable_id(stable_id)?.display_name.clone();
        self.live_status.insert(name, live)
    }

    /// Forget a legacy login that cannot be resolved.
    pub fn drop_legacy_login(&mut self, login: &str) -> bool {
        let before = self.legacy_logins.len();
        self.legacy_logins.retain(|l| l != login);
        self.legacy_logins.len() != before
    }
}
