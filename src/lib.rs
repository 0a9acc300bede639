//! Movie metadata reconciliation: enrich CSV movie records from the ČSFD catalog.

pub mod catalog;
pub mod logging;
pub mod models;
pub mod normalize;
pub mod progress;
pub mod projection;
pub mod reconcile;
pub mod safety;
pub mod scoring;
pub mod settings;
pub mod throttle;
