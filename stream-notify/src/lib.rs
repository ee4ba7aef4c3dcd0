//! stream-notify library crate.
//!
//! Watches Twitch streamers on behalf of many chat channels and posts one
//! notification per channel each time a streamer goes live.

pub mod api;
pub mod config;
pub mod credentials;
pub mod domain;
pub mod error;
pub mod logging;
pub mod monitor;
pub mod notification;
pub mod registry;
pub mod scheduler;
pub mod services;
pub mod store;
pub mod thumbnail;
pub mod utils;

pub use error::{Error, Result};
