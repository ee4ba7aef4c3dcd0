//! App access token refresher.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::{Notify, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use twitch_helix::{HelixAuth, HelixError, TokenClient};

use super::CredentialProvider;

/// Minimum spacing between two token fetches triggered by `invalidate`.
pub const MIN_REFRESH_SPACING: Duration = Duration::from_secs(30);

/// Upper bound for the delay between retries after failed fetches.
pub const MAX_RETRY_BACKOFF: Duration = Duration::from_secs(300);

/// Holds the current app access token and refreshes it in the background.
pub struct TokenManager {
    client_id: String,
    client_secret: String,
    token_client: TokenClient,
    refresh_interval: Duration,
    min_spacing: Duration,
    token: RwLock<Option<HelixAuth>>,
    last_fetch: RwLock<Option<Instant>>,
    wake: Notify,
    ready_tx: watch::Sender<bool>,
}

impl TokenManager {
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        token_client: TokenClient,
        refresh_interval: Duration,
    ) -> Self {
        let (ready_tx, _) = watch::channel(false);
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            token_client,
            refresh_interval,
            min_spacing: MIN_REFRESH_SPACING,
            token: RwLock::new(None),
            last_fetch: RwLock::new(None),
            wake: Notify::new(),
            ready_tx,
        }
    }

    /// Override the invalidate spacing (tests use a short one).
    pub fn with_min_spacing(mut self, min_spacing: Duration) -> Self {
        self.min_spacing = min_spacing;
        self
    }

    /// Fetch a fresh token now and store it.
    pub async fn refresh_now(&self) -> Result<(), HelixError> {
        *self.last_fetch.write() = Some(Instant::now());
        let token = self
            .token_client
            .client_credentials(&self.client_id, &self.client_secret)
            .await?;

        *self.token.write() = Some(HelixAuth::new(&self.client_id, token.access_token));
        self.ready_tx.send_replace(true);
        info!(expires_in = token.expires_in, "App access token refreshed");
        Ok(())
    }

    /// Resolves once a token has been obtained at least once.
    pub async fn wait_until_ready(&self) {
        let mut rx = self.ready_tx.subscribe();
        // The sender lives in `self`, so this only errors if `self` is gone.
        let _ = rx.wait_for(|ready| *ready).await;
    }

    /// Refresh loop: fetch immediately, then on every interval or invalidation
    /// until cancelled. Failed fetches are retried with a growing backoff.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let mut failures: u32 = 0;
        loop {
            let next = match self.refresh_now().await {
                Ok(()) => {
                    failures = 0;
                    self.refresh_interval
                }
                Err(e) => {
                    failures = failures.saturating_add(1);
                    let backoff = self.retry_backoff(failures);
                    warn!(
                        error = %e,
                        failures,
                        retry_in_ms = backoff.as_millis() as u64,
                        "Failed to obtain app access token"
                    );
                    backoff
                }
            };

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(next) => {}
                _ = self.wake.notified() => {
                    let wait = self.spacing_remaining();
                    if !wait.is_zero() {
                        debug!(wait_ms = wait.as_millis() as u64, "Delaying token refresh");
                        tokio::select! {
                            _ = cancel.cancelled() => break,
                            _ = tokio::time::sleep(wait) => {}
                        }
                    }
                }
            }
        }
        debug!("Token refresher stopped");
    }

    /// Delay before the next attempt after `failures` consecutive failures:
    /// doubles from the refresh spacing, capped.
    fn retry_backoff(&self, failures: u32) -> Duration {
        let exponent = failures.saturating_sub(1).min(16);
        self.min_spacing
            .saturating_mul(1 << exponent)
            .min(MAX_RETRY_BACKOFF)
            .min(self.refresh_interval)
    }

    fn spacing_remaining(&self) -> Duration {
        match *self.last_fetch.read() {
            Some(at) => self.min_spacing.saturating_sub(at.elapsed()),
            None => Duration::ZERO,
        }
    }
}

impl CredentialProvider for TokenManager {
    fn current(&self) -> Option<HelixAuth> {
        self.token.read().clone()
    }

    fn invalidate(&self) {
        if self.token.write().take().is_some() {
            warn!("App access token rejected; scheduling refresh");
        }
        // Stores a single permit, so a burst of invalidations wakes the loop once.
        self.wake.notify_one();
    }
}
