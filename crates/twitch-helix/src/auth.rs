//! App access tokens via the OAuth client-credentials grant.

use reqwest::Client;
use serde::Deserialize;
use tracing::debug;
use url::Url;

use crate::error::HelixError;

/// Response of `POST https://id.twitch.tv/oauth2/token`.
#[derive(Debug, Clone, Deserialize)]
pub struct AppAccessToken {
    pub access_token: String,
    /// Lifetime in seconds.
    #[serde(default)]
    pub expires_in: u64,
    #[serde(default)]
    pub token_type: String,
}

pub struct TokenClient {
    http: Client,
    token_url: Url,
}

impl TokenClient {
    pub const TOKEN_URL: &str = "https://id.twitch.tv/oauth2/token";

    pub fn new(http: Client) -> Self {
        Self {
            http,
            token_url: Url::parse(Self::TOKEN_URL).expect("static token url"),
        }
    }

    pub fn with_token_url(http: Client, token_url: &str) -> Result<Self, HelixError> {
        Ok(Self {
            http,
            token_url: Url::parse(token_url)?,
        })
    }

    pub async fn client_credentials(
        &self,
        client_id: &str,
        client_secret: &str,
    ) -> Result<AppAccessToken, HelixError> {
        let response = self
            .http
            .post(self.token_url.clone())
            .form(&[
                ("client_id", client_id),
                ("client_secret", client_secret),
                ("grant_type", "client_credentials"),
            ])
            .send()
            .await?;

        let status = response.status();
        if status.as_u16() == 400 || status.as_u16() == 401 || status.as_u16() == 403 {
            let body = response.text().await.unwrap_or_default();
            return Err(HelixError::Unauthorized(body));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(HelixError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let token: AppAccessToken = response.json().await?;
        debug!(expires_in = token.expires_in, "obtained app access token");
        Ok(token)
    }
}
