//! Liveness monitoring.
//!
//! - [`StreamStatusClient`]: upstream lookups, with [`HelixStatusClient`] as the Twitch adapter
//! - [`IdentityResolver`]: follows renames through the stable user id
//! - [`detect`]: the offline to live transition rule

mod detector;
mod identity;
mod status;

pub use detector::{Transition, detect};
pub use identity::{IdentityResolver, Resolution};
pub use status::{
    EntityInfo, HelixStatusClient, LiveDetails, StreamObservation, StreamStatusClient,
    UpstreamError, query_status,
};
