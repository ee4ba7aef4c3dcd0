//! Helix REST client.

use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, trace};
use url::Url;

use crate::error::HelixError;
use crate::models::{DataResponse, Stream, User};

/// Application id and bearer token attached to every Helix request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HelixAuth {
    pub client_id: String,
    pub access_token: String,
}

impl HelixAuth {
    pub fn new(client_id: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            access_token: access_token.into(),
        }
    }
}

pub struct HelixClient {
    http: Client,
    api_base: Url,
}

impl HelixClient {
    pub const API_BASE: &str = "https://api.twitch.tv/helix/";

    pub fn new(http: Client) -> Self {
        Self {
            http,
            api_base: Url::parse(Self::API_BASE).expect("static Helix base url"),
        }
    }

    /// Point the client at a different Helix-compatible host.
    pub fn with_base_url(http: Client, base: &str) -> Result<Self, HelixError> {
        let mut api_base = Url::parse(base)?;
        if !api_base.path().ends_with('/') {
            let path = format!("{}/", api_base.path());
            api_base.set_path(&path);
        }
        Ok(Self { http, api_base })
    }

    pub async fn get_user_by_login(
        &self,
        auth: &HelixAuth,
        login: &str,
    ) -> Result<Option<User>, HelixError> {
        let users: Vec<User> = self.get_data(auth, "users", &[("login", login)]).await?;
        Ok(users.into_iter().next())
    }

    pub async fn get_user_by_id(
        &self,
        auth: &HelixAuth,
        id: &str,
    ) -> Result<Option<User>, HelixError> {
        let users: Vec<User> = self.get_data(auth, "users", &[("id", id)]).await?;
        Ok(users.into_iter().next())
    }

    /// Returns the live stream for `login`, or `None` when the channel is offline.
    pub async fn get_stream_by_login(
        &self,
        auth: &HelixAuth,
        login: &str,
    ) -> Result<Option<Stream>, HelixError> {
        let streams: Vec<Stream> = self
            .get_data(auth, "streams", &[("user_login", login)])
            .await?;
        Ok(streams.into_iter().find(Stream::is_live))
    }

    async fn get_data<T: DeserializeOwned>(
        &self,
        auth: &HelixAuth,
        endpoint: &str,
        query: &[(&str, &str)],
    ) -> Result<Vec<T>, HelixError> {
        let url = self.api_base.join(endpoint)?;
        debug!(endpoint, ?query, "helix request");

        let response = self
            .http
            .get(url)
            .query(query)
            .header("Client-Id", &auth.client_id)
            .bearer_auth(&auth.access_token)
            .send()
            .await?;

        let status = response.status();
        match status {
            StatusCode::UNAUTHORIZED => {
                let body = response.text().await.unwrap_or_default();
                return Err(HelixError::Unauthorized(body));
            }
            StatusCode::TOO_MANY_REQUESTS => {
                let reset_at = response
                    .headers()
                    .get("Ratelimit-Reset")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse::<i64>().ok());
                return Err(HelixError::RateLimited { reset_at });
            }
            s if !s.is_success() => {
                let body = response.text().await.unwrap_or_default();
                return Err(HelixError::Status {
                    status: s.as_u16(),
                    body,
                });
            }
            _ => {}
        }

        let body = response.text().await?;
        trace!(endpoint, body = %body, "helix response");
        let parsed: DataResponse<T> = serde_json::from_str(&body)?;
        Ok(parsed.data)
    }
}
