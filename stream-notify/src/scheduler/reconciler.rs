//! The reconciliation loop.
//!
//! Every tick walks all tenants and, for each tracked streamer:
//! resolve identity, query status, detect the transition, persist the new
//! flag under the tenant lock, and only then fetch the thumbnail and hand the
//! event to the dispatcher. Entities are processed with bounded concurrency
//! and a failure never leaves the entity it happened on.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::Utc;
use futures::{StreamExt, stream};
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::credentials::CredentialProvider;
use crate::domain::{LiveEvent, TenantId, TrackedEntity};
use crate::monitor::{IdentityResolver, StreamObservation, StreamStatusClient, detect, query_status};
use crate::notification::NotificationDispatcher;
use crate::registry::TenantRegistry;
use crate::thumbnail::AssetCache;
use crate::{Error, Result};

/// Default tick interval (60 seconds).
const DEFAULT_INTERVAL: Duration = Duration::from_secs(60);

/// Default number of entities checked concurrently.
const DEFAULT_MAX_CONCURRENT_CHECKS: usize = 8;

/// Default upper bound for one notification dispatch.
const DEFAULT_DISPATCH_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    pub interval: Duration,
    pub max_concurrent_checks: usize,
    pub dispatch_timeout: Duration,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            max_concurrent_checks: DEFAULT_MAX_CONCURRENT_CHECKS,
            dispatch_timeout: DEFAULT_DISPATCH_TIMEOUT,
        }
    }
}

/// Collaborators of the [`Reconciler`].
#[derive(Clone)]
pub struct ReconcilerDeps {
    pub registry: Arc<TenantRegistry>,
    pub status: Arc<dyn StreamStatusClient>,
    pub credentials: Arc<dyn CredentialProvider>,
    pub assets: Arc<AssetCache>,
    pub dispatcher: Arc<dyn NotificationDispatcher>,
}

/// What happened to one entity during a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityOutcome {
    /// Status unchanged.
    Steady,
    /// Went from offline to live; a notification was attempted.
    Notified,
    /// Went from live to offline.
    WentOffline,
    /// Status query failed; the stored flag was kept.
    Unknown,
    /// Identity could not be confirmed; nothing was touched.
    Unresolved,
    /// Removed from its tenant while the check was running.
    Removed,
    /// The tenant could not be updated.
    Failed,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub tenants: usize,
    pub entities: usize,
    pub notified: usize,
    pub went_offline: usize,
    pub unknown: usize,
    pub unresolved: usize,
    pub failed: usize,
    /// Another tick was still running.
    pub skipped_busy: bool,
}

impl TickReport {
    fn record(&mut self, outcome: EntityOutcome) {
        self.entities += 1;
        match outcome {
            EntityOutcome::Notified => self.notified += 1,
            EntityOutcome::WentOffline => self.went_offline += 1,
            EntityOutcome::Unknown => self.unknown += 1,
            EntityOutcome::Unresolved => self.unresolved += 1,
            EntityOutcome::Failed => self.failed += 1,
            EntityOutcome::Steady | EntityOutcome::Removed => {}
        }
    }
}

/// Resets the busy flag when a tick ends, however it ends.
struct BusyGuard<'a>(&'a AtomicBool);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct Reconciler {
    config: ReconcilerConfig,
    deps: ReconcilerDeps,
    resolver: IdentityResolver,
    busy: AtomicBool,
}

impl Reconciler {
    pub fn new(config: ReconcilerConfig, deps: ReconcilerDeps) -> Self {
        let resolver = IdentityResolver::new(deps.status.clone(), deps.registry.clone());
        Self {
            config,
            deps,
            resolver,
            busy: AtomicBool::new(false),
        }
    }

    /// Tick until cancelled. Missed ticks are skipped, never bursted.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let mut ticker = interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(
            interval_secs = self.config.interval.as_secs(),
            max_concurrent = self.config.max_concurrent_checks,
            "Reconciler started"
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    match self.tick().await {
                        Ok(report) if report.skipped_busy => {
                            debug!("Previous tick still running; skipped");
                        }
                        Ok(report) => {
                            debug!(
                                tenants = report.tenants,
                                entities = report.entities,
                                notified = report.notified,
                                went_offline = report.went_offline,
                                unknown = report.unknown,
                                failed = report.failed,
                                "Tick complete"
                            );
                        }
                        Err(Error::CredentialUnavailable) => {
                            warn!("No app access token yet; skipping tick");
                        }
                        Err(e) => warn!(error = %e, "Tick failed"),
                    }
                }
            }
        }

        info!("Reconciler stopped");
    }

    /// Run one reconciliation pass over every tenant.
    pub async fn tick(&self) -> Result<TickReport> {
        if self.busy.swap(true, Ordering::AcqRel) {
            return Ok(TickReport {
                skipped_busy: true,
                ..TickReport::default()
            });
        }
        let _guard = BusyGuard(&self.busy);

        if self.deps.credentials.current().is_none() {
            return Err(Error::CredentialUnavailable);
        }

        let mut report = TickReport::default();
        let mut work: Vec<(TenantId, TrackedEntity)> = Vec::new();

        for tenant_id in self.deps.registry.list_tenants().await? {
            let tenant = match self.deps.registry.read(&tenant_id).await {
                Ok(tenant) => tenant,
                Err(e) => {
                    warn!(tenant = %tenant_id, error = %e, "Failed to load tenant; skipping");
                    continue;
                }
            };
            if tenant.is_empty() {
                continue;
            }
            report.tenants += 1;
            work.extend(
                tenant
                    .entities()
                    .iter()
                    .map(|entity| (tenant_id.clone(), entity.clone())),
            );
        }

        let outcomes: Vec<EntityOutcome> = stream::iter(work)
            .map(|(tenant_id, entity)| async move { self.process_entity(tenant_id, entity).await })
            .buffer_unordered(self.config.max_concurrent_checks.max(1))
            .collect()
            .await;

        for outcome in outcomes {
            report.record(outcome);
        }
        Ok(report)
    }

    async fn process_entity(&self, tenant_id: TenantId, entity: TrackedEntity) -> EntityOutcome {
        let resolution = self.resolver.resolve(&tenant_id, &entity).await;
        if !resolution.is_resolved() {
            return EntityOutcome::Unresolved;
        }

        let observation = query_status(self.deps.status.as_ref(), &resolution.canonical_name).await;
        let unknown = observation == StreamObservation::Unknown;

        let stable_id = entity.stable_id.clone();
        let persisted = self
            .deps
            .registry
            .update(&tenant_id, |tenant| {
                let Some(current) = tenant.entity_by_stable_id(&stable_id).cloned() else {
                    return Ok(None);
                };
                let previous = tenant.is_live(&current.display_name);
                let transition = detect(previous, observation);
                tenant.set_live(&stable_id, transition.new_status);
                Ok(Some((current, previous, transition)))
            })
            .await;

        let (current, previous, transition) = match persisted {
            Ok(Some(state)) => state,
            Ok(None) => return EntityOutcome::Removed,
            Err(e) => {
                warn!(tenant = %tenant_id, streamer = %entity.display_name, error = %e, "Failed to persist status");
                return EntityOutcome::Failed;
            }
        };

        if let Some(details) = transition.went_live {
            let event = LiveEvent {
                tenant_id,
                entity: current,
                title: details.title,
                category: details.category,
                thumbnail_source_url: details.thumbnail_url,
                avatar_url: resolution.profile.and_then(|p| p.profile_image_url),
                observed_at: Utc::now(),
            };
            self.deliver(event).await;
            return EntityOutcome::Notified;
        }

        if unknown {
            EntityOutcome::Unknown
        } else if previous && !transition.new_status {
            debug!(tenant = %tenant_id, streamer = %current.display_name, "Streamer went offline");
            EntityOutcome::WentOffline
        } else {
            EntityOutcome::Steady
        }
    }

    /// Refresh the thumbnail and dispatch. Failures are logged and dropped.
    async fn deliver(&self, event: LiveEvent) {
        let name = &event.entity.display_name;
        let thumbnail = self
            .deps
            .assets
            .refresh(name, &event.thumbnail_source_url)
            .await;

        let dispatch = self.deps.dispatcher.dispatch(&event, thumbnail.as_ref());
        match tokio::time::timeout(self.config.dispatch_timeout, dispatch).await {
            Ok(Ok(())) => {
                info!(
                    tenant = %event.tenant_id,
                    streamer = %name,
                    channel = self.deps.dispatcher.channel_type(),
                    "Live notification sent"
                );
            }
            Ok(Err(e)) => {
                warn!(tenant = %event.tenant_id, streamer = %name, error = %e, "Live notification failed");
            }
            Err(_) => {
                warn!(
                    tenant = %event.tenant_id,
                    streamer = %name,
                    timeout = ?self.config.dispatch_timeout,
                    "Live notification timed out"
                );
            }
        }
    }
}
