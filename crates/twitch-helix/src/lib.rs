//! Minimal bindings for the parts of the Twitch Helix API used to watch streamers.
//!
//! - [`TokenClient`] acquires app access tokens (client-credentials grant)
//! - [`HelixClient`] looks users up by login or id and queries live streams

pub mod auth;
pub mod client;
pub mod error;
pub mod models;

pub use auth::{AppAccessToken, TokenClient};
pub use client::{HelixAuth, HelixClient};
pub use error::HelixError;
pub use models::{Stream, User};
