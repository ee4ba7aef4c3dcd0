//! Upstream status queries.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};
use twitch_helix::{HelixAuth, HelixClient, HelixError, Stream, User};

use crate::credentials::CredentialProvider;

#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("no upstream credential available")]
    CredentialUnavailable,

    #[error("upstream rejected the credential")]
    Unauthorized,

    #[error("upstream call timed out after {0:?}")]
    Timeout(Duration),

    #[error(transparent)]
    Helix(#[from] HelixError),
}

/// Upstream view of a user account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityInfo {
    pub stable_id: String,
    /// Lowercased login.
    pub login: String,
    pub profile_image_url: Option<String>,
}

impl From<User> for EntityInfo {
    fn from(user: User) -> Self {
        Self {
            stable_id: user.id,
            login: user.login.to_lowercase(),
            profile_image_url: user.profile_image_url.filter(|url| !url.is_empty()),
        }
    }
}

/// Metadata of a live broadcast.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveDetails {
    pub title: String,
    pub category: Option<String>,
    /// Preview template containing `{width}` and `{height}`.
    pub thumbnail_url: String,
}

impl From<Stream> for LiveDetails {
    fn from(stream: Stream) -> Self {
        Self {
            category: stream.category().map(str::to_string),
            title: stream.title,
            thumbnail_url: stream.thumbnail_url,
        }
    }
}

/// Result of one status query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamObservation {
    Live(LiveDetails),
    Offline,
    /// The query failed; nothing can be concluded.
    Unknown,
}

#[async_trait]
pub trait StreamStatusClient: Send + Sync {
    async fn lookup_by_name(&self, name: &str) -> Result<Option<EntityInfo>, UpstreamError>;

    async fn lookup_by_id(&self, stable_id: &str) -> Result<Option<EntityInfo>, UpstreamError>;

    /// The live broadcast for `name`, or `None` when offline.
    async fn get_live_stream(&self, name: &str) -> Result<Option<LiveDetails>, UpstreamError>;
}

/// Query the live status of `name`, folding every failure into
/// [`StreamObservation::Unknown`].
pub async fn query_status(client: &dyn StreamStatusClient, name: &str) -> StreamObservation {
    match client.get_live_stream(name).await {
        Ok(Some(details)) => StreamObservation::Live(details),
        Ok(None) => StreamObservation::Offline,
        Err(e) => {
            warn!(streamer = %name, error = %e, "Status query failed");
            StreamObservation::Unknown
        }
    }
}

/// [`StreamStatusClient`] backed by the Helix API.
pub struct HelixStatusClient {
    helix: HelixClient,
    credentials: Arc<dyn CredentialProvider>,
    timeout: Duration,
}

impl HelixStatusClient {
    pub fn new(
        helix: HelixClient,
        credentials: Arc<dyn CredentialProvider>,
        timeout: Duration,
    ) -> Self {
        Self {
            helix,
            credentials,
            timeout,
        }
    }

    fn auth(&self) -> Result<HelixAuth, UpstreamError> {
        self.credentials
            .current()
            .ok_or(UpstreamError::CredentialUnavailable)
    }

    /// Bound `call` by the request timeout and report rejected tokens.
    async fn guarded<T>(
        &self,
        call: impl Future<Output = Result<T, HelixError>> + Send,
    ) -> Result<T, UpstreamError> {
        match tokio::time::timeout(self.timeout, call).await {
            Err(_) => Err(UpstreamError::Timeout(self.timeout)),
            Ok(Err(e)) if e.is_unauthorized() => {
                debug!(error = %e, "Helix rejected the access token");
                self.credentials.invalidate();
                Err(UpstreamError::Unauthorized)
            }
            Ok(Err(e)) if e.is_timeout() => Err(UpstreamError::Timeout(self.timeout)),
            Ok(result) => result.map_err(UpstreamError::from),
        }
    }
}

#[async_trait]
impl StreamStatusClient for HelixStatusClient {
    async fn lookup_by_name(&self, name: &str) -> Result<Option<EntityInfo>, UpstreamError> {
        let auth = self.auth()?;
        let user = self.guarded(self.helix.get_user_by_login(&auth, name)).await?;
        Ok(user.map(EntityInfo::from))
    }

    async fn lookup_by_id(&self, stable_id: &str) -> Result<Option<EntityInfo>, UpstreamError> {
        let auth = self.auth()?;
        let user = self.guarded(self.helix.get_user_by_id(&auth, stable_id)).await?;
        Ok(user.map(EntityInfo::from))
    }

    async fn get_live_stream(&self, name: &str) -> Result<Option<LiveDetails>, UpstreamError> {
        let auth = self.auth()?;
        let stream = self
            .guarded(self.helix.get_stream_by_login(&auth, name))
            .await?;
        Ok(stream.map(LiveDetails::from))
    }
}
