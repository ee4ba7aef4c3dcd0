//! Periodic reconciliation of every tenant's tracked streamers.

mod reconciler;

pub use reconciler::{EntityOutcome, Reconciler, ReconcilerConfig, ReconcilerDeps, TickReport};
