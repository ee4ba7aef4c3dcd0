//! Upstream bearer credentials.
//!
//! - [`CredentialProvider`]: what the status client asks for on every call
//! - [`TokenManager`]: client-credentials grant with periodic and on-demand refresh
//! - [`StaticCredentials`]: a fixed, pre-issued token

mod token;

pub use token::TokenManager;

use parking_lot::Mutex;
use twitch_helix::HelixAuth;

/// Source of the application id + bearer token attached to Helix calls.
pub trait CredentialProvider: Send + Sync {
    /// The current credentials, or `None` while no valid token is held.
    fn current(&self) -> Option<HelixAuth>;

    /// Report the current token as rejected. Implementations coalesce and
    /// rate limit the resulting refresh.
    fn invalidate(&self);
}

/// Credentials that never change. `invalidate` only counts calls.
pub struct StaticCredentials {
    auth: Option<HelixAuth>,
    invalidations: Mutex<usize>,
}

impl StaticCredentials {
    pub fn new(client_id: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            auth: Some(HelixAuth::new(client_id, access_token)),
            invalidations: Mutex::new(0),
        }
    }

    /// A provider that never has a token.
    pub fn unavailable() -> Self {
        Self {
            auth: None,
            invalidations: Mutex::new(0),
        }
    }

    pub fn invalidations(&self) -> usize {
        *self.invalidations.lock()
    }
}

impl CredentialProvider for StaticCredentials {
    fn current(&self) -> Option<HelixAuth> {
        self.auth.clone()
    }

    fn invalidate(&self) {
        *self.invalidations.lock() += 1;
    }
}
