//! Gateway REST surface
//!
//! [`client::ApiClient`] wraps every HTTP endpoint the gateway exposes;
//! [`snapshot`] layers the concurrent per-field dashboard fetch on top.

pub mod client;
pub mod snapshot;

pub use client::ApiClient;
pub use snapshot::{load_field_snapshot, FieldSnapshot};
