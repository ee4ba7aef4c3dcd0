//! End-to-end behaviour of the reconciliation loop against an in-memory
//! upstream and a recording notifier.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::{Router, routing::get};
use parking_lot::Mutex;
use tempfile::TempDir;
use tokio::sync::Notify;

use stream_notify::credentials::{CredentialProvider, StaticCredentials};
use stream_notify::domain::{LiveEvent, Tenant, TenantId, TrackedEntity};
use stream_notify::monitor::{EntityInfo, LiveDetails, StreamStatusClient, UpstreamError};
use stream_notify::notification::NotificationDispatcher;
use stream_notify::registry::{SubscriptionService, TenantRegistry};
use stream_notify::scheduler::{Reconciler, ReconcilerConfig, ReconcilerDeps};
use stream_notify::store::{JsonFileTenantStore, MemoryTenantStore, TenantStore};
use stream_notify::thumbnail::{AssetCache, ThumbnailAsset, ThumbnailConfig};
use stream_notify::utils::http_client::build_client;
use stream_notify::{Error, Result};

/// Template that never downloads; keeps tests that ignore thumbnails offline.
const NO_THUMBNAIL: &str = "not a url {width}x{height}";

#[derive(Default)]
struct FakeTwitch {
    /// stable id -> login
    accounts: Mutex<HashMap<String, String>>,
    /// login -> title, for streams currently live
    live: Mutex<HashMap<String, String>>,
    /// logins whose status queries fail
    failing: Mutex<HashSet<String>>,
    thumbnail_template: Mutex<Option<String>>,
    /// When set, status queries park until released.
    gate: Mutex<Option<Arc<Gate>>>,
}

#[derive(Default)]
struct Gate {
    entered: Notify,
    release: Notify,
}

impl FakeTwitch {
    fn account(&self, id: &str, login: &str) {
        self.accounts.lock().insert(id.to_string(), login.to_string());
    }

    fn remove_account(&self, id: &str) {
        self.accounts.lock().remove(id);
    }

    fn go_live(&self, login: &str, title: &str) {
        self.live.lock().insert(login.to_string(), title.to_string());
    }

    fn go_offline(&self, login: &str) {
        self.live.lock().remove(login);
    }

    fn fail(&self, login: &str, failing: bool) {
        if failing {
            self.failing.lock().insert(login.to_string());
        } else {
            self.failing.lock().remove(login);
        }
    }

    fn info(id: &str, login: &str) -> EntityInfo {
        EntityInfo {
            stable_id: id.to_string(),
            login: login.to_string(),
            profile_image_url: Some(format!("https://cdn/{login}.png")),
        }
    }
}

#[async_trait]
impl StreamStatusClient for FakeTwitch {
    async fn lookup_by_name(&self, name: &str) -> std::result::Result<Option<EntityInfo>, UpstreamError> {
        Ok(self
            .accounts
            .lock()
            .iter()
            .find(|(_, login)| login.as_str() == name)
            .map(|(id, login)| Self::info(id, login)))
    }

    async fn lookup_by_id(&self, stable_id: &str) -> std::result::Result<Option<EntityInfo>, UpstreamError> {
        Ok(self
            .accounts
            .lock()
            .get(stable_id)
            .map(|login| Self::info(stable_id, login)))
    }

    async fn get_live_stream(&self, name: &str) -> std::result::Result<Option<LiveDetails>, UpstreamError> {
        let gate = self.gate.lock().clone();
        if let Some(gate) = gate {
            gate.entered.notify_one();
            gate.release.notified().await;
        }
        if self.failing.lock().contains(name) {
            return Err(UpstreamError::Timeout(Duration::from_secs(10)));
        }
        let template = self
            .thumbnail_template
            .lock()
            .clone()
            .unwrap_or_else(|| NO_THUMBNAIL.to_string());
        Ok(self.live.lock().get(name).map(|title| LiveDetails {
            title: title.clone(),
            category: Some("Just Chatting".to_string()),
            thumbnail_url: template.replace("{login}", name),
        }))
    }
}

#[derive(Default)]
struct RecordingDispatcher {
    sent: Mutex<Vec<(LiveEvent, Option<String>)>>,
    fail_for: Mutex<HashSet<TenantId>>,
}

impl RecordingDispatcher {
    fn events(&self) -> Vec<(String, String)> {
        self.sent
            .lock()
            .iter()
            .map(|(e, _)| (e.tenant_id.to_string(), e.entity.display_name.clone()))
            .collect()
    }

    fn count(&self) -> usize {
        self.sent.lock().len()
    }
}

#[async_trait]
impl NotificationDispatcher for RecordingDispatcher {
    fn channel_type(&self) -> &'static str {
        "recording"
    }

    async fn dispatch(&self, event: &LiveEvent, thumbnail: Option<&ThumbnailAsset>) -> Result<()> {
        self.sent
            .lock()
            .push((event.clone(), thumbnail.map(|t| t.file_name.clone())));
        if self.fail_for.lock().contains(&event.tenant_id) {
            return Err(Error::Other("channel gone".into()));
        }
        Ok(())
    }
}

struct Harness {
    twitch: Arc<FakeTwitch>,
    registry: Arc<TenantRegistry>,
    dispatcher: Arc<RecordingDispatcher>,
    assets: Arc<AssetCache>,
    reconciler: Reconciler,
    thumbnails: TempDir,
}

async fn harness_with(
    store: Arc<dyn TenantStore>,
    credentials: Arc<dyn CredentialProvider>,
) -> Harness {
    let thumbnails = TempDir::new().unwrap();
    let twitch = Arc::new(FakeTwitch::default());
    let registry = Arc::new(TenantRegistry::new(store));
    let dispatcher = Arc::new(RecordingDispatcher::default());
    let assets = Arc::new(
        AssetCache::open(
            thumbnails.path(),
            build_client(Duration::from_secs(5)),
            ThumbnailConfig::default(),
        )
        .await
        .unwrap(),
    );

    let reconciler = Reconciler::new(
        ReconcilerConfig {
            interval: Duration::from_secs(60),
            max_concurrent_checks: 4,
            dispatch_timeout: Duration::from_secs(5),
        },
        ReconcilerDeps {
            registry: registry.clone(),
            status: twitch.clone(),
            credentials,
            assets: assets.clone(),
            dispatcher: dispatcher.clone(),
        },
    );

    Harness {
        twitch,
        registry,
        dispatcher,
        assets,
        reconciler,
        thumbnails,
    }
}

async fn harness() -> Harness {
    harness_with(
        Arc::new(MemoryTenantStore::new()),
        Arc::new(StaticCredentials::new("cid", "token")),
    )
    .await
}

fn tenant(id: &str) -> TenantId {
    TenantId::parse(id).unwrap()
}

impl Harness {
    async fn track(&self, tenant_id: &str, stable_id: &str, login: &str) {
        self.twitch.account(stable_id, login);
        self.registry
            .update(&tenant(tenant_id), |t| {
                t.add_entity(TrackedEntity::new(stable_id, login))
            })
            .await
            .unwrap();
    }

    async fn status(&self, tenant_id: &str) -> BTreeMap<String, bool> {
        self.registry
            .read(&tenant(tenant_id))
            .await
            .unwrap()
            .live_status()
            .clone()
    }
}

#[tokio::test]
async fn test_live_session_notifies_once() {
    let h = harness().await;
    h.track("555", "42", "nina").await;

    h.twitch.go_live("nina", "speedrun");
    let report = h.reconciler.tick().await.unwrap();
    assert_eq!(report.notified, 1);
    assert_eq!(h.dispatcher.events(), vec![("555".to_string(), "nina".to_string())]);
    assert_eq!(h.status("555").await.get("nina"), Some(&true));

    let report = h.reconciler.tick().await.unwrap();
    assert_eq!(report.notified, 0);
    assert_eq!(h.dispatcher.count(), 1);

    h.twitch.go_offline("nina");
    let report = h.reconciler.tick().await.unwrap();
    assert_eq!(report.went_offline, 1);
    assert_eq!(h.dispatcher.count(), 1);
    assert_eq!(h.status("555").await.get("nina"), Some(&false));

    let (event, _) = h.dispatcher.sent.lock()[0].clone();
    assert_eq!(event.title, "speedrun");
    assert_eq!(event.category.as_deref(), Some("Just Chatting"));
    assert_eq!(event.avatar_url.as_deref(), Some("https://cdn/nina.png"));
    assert_eq!(event.entity.stable_id, "42");
}

#[tokio::test]
async fn test_failed_query_between_live_observations_is_not_a_new_session() {
    let h = harness().await;
    h.track("555", "42", "nina").await;
    h.twitch.go_live("nina", "t");

    h.reconciler.tick().await.unwrap();

    h.twitch.fail("nina", true);
    let report = h.reconciler.tick().await.unwrap();
    assert_eq!(report.unknown, 1);
    assert_eq!(h.status("555").await.get("nina"), Some(&true));

    h.twitch.fail("nina", false);
    h.reconciler.tick().await.unwrap();
    assert_eq!(h.dispatcher.count(), 1);
}

#[tokio::test]
async fn test_failed_query_never_starts_a_session() {
    let h = harness().await;
    h.track("555", "42", "nina").await;
    h.twitch.fail("nina", true);

    h.reconciler.tick().await.unwrap();
    assert_eq!(h.dispatcher.count(), 0);
    assert_eq!(h.status("555").await.get("nina"), Some(&false));
}

#[tokio::test]
async fn test_stored_live_flag_suppresses_event_after_restart() {
    let store = Arc::new(MemoryTenantStore::new());
    let mut seeded = Tenant::new(tenant("555"));
    seeded.add_entity(TrackedEntity::new("42", "nina")).unwrap();
    seeded.set_live("42", true);
    store.save(&seeded).await.unwrap();

    let h = harness_with(store, Arc::new(StaticCredentials::new("cid", "token"))).await;
    h.twitch.account("42", "nina");
    h.twitch.go_live("nina", "t");

    h.reconciler.tick().await.unwrap();
    assert_eq!(h.dispatcher.count(), 0);
}

#[tokio::test]
async fn test_rename_keeps_identity_and_status() {
    let h = harness().await;
    h.track("555", "42", "alice").await;

    h.twitch.account("42", "bob");
    h.twitch.go_live("bob", "new name");
    h.reconciler.tick().await.unwrap();

    let status = h.status("555").await;
    assert_eq!(status.len(), 1);
    assert_eq!(status.get("bob"), Some(&true));
    assert!(!status.contains_key("alice"));

    let tenant = h.registry.read(&tenant("555")).await.unwrap();
    assert_eq!(tenant.entities(), [TrackedEntity::new("42", "bob")]);

    assert_eq!(h.dispatcher.events(), vec![("555".to_string(), "bob".to_string())]);
    assert_eq!(h.dispatcher.sent.lock()[0].0.entity.stable_id, "42");
}

#[tokio::test]
async fn test_recycled_login_is_not_mistaken_for_the_tracked_account() {
    let h = harness().await;
    h.track("555", "42", "alice").await;

    h.twitch.account("42", "bob");
    h.twitch.account("99", "alice");
    h.twitch.go_live("alice", "alice stream");
    h.reconciler.tick().await.unwrap();

    assert_eq!(h.dispatcher.count(), 0);
    let tenant = h.registry.read(&tenant("555")).await.unwrap();
    assert_eq!(tenant.entities(), [TrackedEntity::new("42", "bob")]);
    assert_eq!(h.status("555").await.get("bob"), Some(&false));

    h.twitch.go_live("bob", "bob stream");
    h.reconciler.tick().await.unwrap();

    let sent = h.dispatcher.sent.lock();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0.entity, TrackedEntity::new("42", "bob"));
    assert_eq!(sent[0].0.title, "bob stream");
}

#[tokio::test]
async fn test_overlapping_tick_is_skipped() {
    let h = Arc::new(harness().await);
    h.track("555", "42", "nina").await;
    h.twitch.go_live("nina", "t");

    let gate = Arc::new(Gate::default());
    *h.twitch.gate.lock() = Some(gate.clone());

    let running = tokio::spawn({
        let h = h.clone();
        async move { h.reconciler.tick().await }
    });
    gate.entered.notified().await;

    let overlapping = h.reconciler.tick().await.unwrap();
    assert!(overlapping.skipped_busy);
    assert_eq!(overlapping.entities, 0);
    assert_eq!(h.dispatcher.count(), 0);

    *h.twitch.gate.lock() = None;
    gate.release.notify_one();
    let first = running.await.unwrap().unwrap();
    assert!(!first.skipped_busy);
    assert_eq!(first.notified, 1);

    let next = h.reconciler.tick().await.unwrap();
    assert!(!next.skipped_busy);
    assert_eq!(next.entities, 1);
    assert_eq!(h.dispatcher.count(), 1);
}

#[tokio::test]
async fn test_vanished_account_keeps_state() {
    let h = harness().await;
    h.track("555", "42", "nina").await;
    h.twitch.go_live("nina", "t");
    h.reconciler.tick().await.unwrap();

    h.twitch.remove_account("42");
    h.twitch.go_offline("nina");
    let report = h.reconciler.tick().await.unwrap();

    assert_eq!(report.unresolved, 1);
    assert_eq!(h.status("555").await.get("nina"), Some(&true));
}

#[tokio::test]
async fn test_failures_stay_with_their_entity() {
    let h = harness().await;
    h.track("1", "10", "broken").await;
    h.track("1", "11", "fine").await;
    h.track("2", "20", "other").await;
    h.track("3", "30", "muted").await;

    h.twitch.fail("broken", true);
    h.twitch.go_live("fine", "a");
    h.twitch.go_live("other", "b");
    h.twitch.go_live("muted", "c");
    h.dispatcher.fail_for.lock().insert(tenant("3"));

    let report = h.reconciler.tick().await.unwrap();
    assert_eq!(report.tenants, 3);
    assert_eq!(report.entities, 4);
    assert_eq!(report.unknown, 1);
    assert_eq!(report.notified, 3);

    let mut events = h.dispatcher.events();
    events.sort();
    assert_eq!(
        events,
        vec![
            ("1".to_string(), "fine".to_string()),
            ("2".to_string(), "other".to_string()),
            ("3".to_string(), "muted".to_string()),
        ]
    );
    // Delivery failure does not roll the status back.
    assert_eq!(h.status("3").await.get("muted"), Some(&true));

    h.reconciler.tick().await.unwrap();
    assert_eq!(h.dispatcher.count(), 3);
}

#[tokio::test]
async fn test_each_tenant_gets_its_own_event() {
    let h = harness().await;
    h.track("1", "42", "nina").await;
    h.track("2", "42", "nina").await;
    h.twitch.go_live("nina", "t");

    h.reconciler.tick().await.unwrap();

    let mut events = h.dispatcher.events();
    events.sort();
    assert_eq!(
        events,
        vec![
            ("1".to_string(), "nina".to_string()),
            ("2".to_string(), "nina".to_string()),
        ]
    );
}

#[tokio::test]
async fn test_missing_credential_skips_tick() {
    let h = harness_with(
        Arc::new(MemoryTenantStore::new()),
        Arc::new(StaticCredentials::unavailable()),
    )
    .await;
    h.track("555", "42", "nina").await;
    h.twitch.go_live("nina", "t");

    let result = h.reconciler.tick().await;
    assert!(matches!(result, Err(Error::CredentialUnavailable)));
    assert_eq!(h.dispatcher.count(), 0);
    assert_eq!(h.status("555").await.get("nina"), Some(&false));
}

#[tokio::test]
async fn test_empty_tenants_are_skipped() {
    let h = harness().await;
    h.registry.read(&tenant("empty")).await.unwrap();
    h.track("555", "42", "nina").await;

    let report = h.reconciler.tick().await.unwrap();
    assert_eq!(report.tenants, 1);
    assert_eq!(report.entities, 1);
}

async fn spawn_image_server() -> SocketAddr {
    let app = Router::new().route(
        "/previews/{file}",
        get(|| async { vec![0xFF_u8, 0xD8, 0xFF, 0xE0] }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

#[tokio::test]
async fn test_each_session_gets_a_fresh_exclusive_thumbnail() {
    let h = harness().await;
    let addr = spawn_image_server().await;
    *h.twitch.thumbnail_template.lock() =
        Some(format!("http://{addr}/previews/{{login}}-{{width}}x{{height}}.jpg"));
    h.track("555", "42", "nina").await;
    std::fs::write(h.thumbnails.path().join("nina_x_1.jpg"), b"neighbour").unwrap();

    h.twitch.go_live("nina", "first");
    h.reconciler.tick().await.unwrap();
    h.twitch.go_offline("nina");
    h.reconciler.tick().await.unwrap();
    h.twitch.go_live("nina", "second");
    h.reconciler.tick().await.unwrap();

    let files: Vec<Option<String>> = h
        .dispatcher
        .sent
        .lock()
        .iter()
        .map(|(_, file)| file.clone())
        .collect();
    assert_eq!(files.len(), 2);
    let first = files[0].clone().unwrap();
    let second = files[1].clone().unwrap();
    assert_ne!(first, second);

    let owned = h.assets.assets_of("nina").await.unwrap();
    assert_eq!(owned, vec![h.thumbnails.path().join(&second)]);
    assert!(h.thumbnails.path().join("nina_x_1.jpg").exists());
}

#[tokio::test]
async fn test_missing_thumbnail_still_notifies() {
    let h = harness().await;
    h.track("555", "42", "nina").await;
    h.twitch.go_live("nina", "t");

    h.reconciler.tick().await.unwrap();

    let sent = h.dispatcher.sent.lock();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].1.is_none());
}

#[tokio::test]
async fn test_status_survives_in_json_store() {
    let settings = TempDir::new().unwrap();
    let store = Arc::new(JsonFileTenantStore::open(settings.path()).await.unwrap());
    let h = harness_with(store, Arc::new(StaticCredentials::new("cid", "token"))).await;
    h.track("555", "42", "nina").await;
    h.twitch.go_live("nina", "t");

    h.reconciler.tick().await.unwrap();

    let raw = std::fs::read_to_string(settings.path().join("555.json")).unwrap();
    let record: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(
        record,
        serde_json::json!({
            "streamers": [ { "login": "nina", "userid": "42" } ],
            "liveStatus": { "nina": true }
        })
    );
}

#[tokio::test]
async fn test_legacy_logins_are_resolved_once() {
    let store = Arc::new(MemoryTenantStore::with_tenants([Tenant::from_parts(
        tenant("555"),
        Vec::new(),
        BTreeMap::new(),
        vec!["carol".to_string(), "ghost".to_string()],
    )]));
    let h = harness_with(store, Arc::new(StaticCredentials::new("cid", "token"))).await;
    h.twitch.account("9", "carol");

    let subscriptions =
        SubscriptionService::new(h.registry.clone(), h.twitch.clone(), h.assets.clone());
    assert_eq!(subscriptions.resolve_legacy_logins().await.unwrap(), 1);

    let tenant = h.registry.read(&tenant("555")).await.unwrap();
    assert_eq!(tenant.entities(), [TrackedEntity::new("9", "carol")]);
    assert!(tenant.legacy_logins().is_empty());
    assert_eq!(tenant.live_status().get("carol"), Some(&false));

    assert_eq!(subscriptions.resolve_legacy_logins().await.unwrap(), 0);
}
