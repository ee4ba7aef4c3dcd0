use thiserror::Error;

#[derive(Debug, Error)]
pub enum HelixError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid url: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("rate limited (reset at {reset_at:?})")]
    RateLimited { reset_at: Option<i64> },
    #[error("unexpected status {status}: {body}")]
    Status { status: u16, body: String },
}

impl HelixError {
    /// The bearer token was rejected and must be re-issued.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized(_))
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Http(e) if e.is_timeout())
    }
}
