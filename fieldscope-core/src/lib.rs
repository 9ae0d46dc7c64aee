//! # fieldscope-core
//!
//! Core library for fieldscope - a terminal client for field telemetry.
//!
//! This library provides:
//! - Domain types for fields, sensors, readings, rules and alerts
//! - An authenticated REST client for the fieldscope gateway
//! - A realtime websocket channel with reconnect supervision
//! - Bounded telemetry aggregation with derived chart series
//! - Session, configuration and logging infrastructure
//!
//! ## Architecture
//!
//! Data flows through three layers:
//! - **Session:** persisted token and field scope, observable via a watch channel
//! - **Transport:** REST snapshots plus a supervised websocket event stream
//! - **Aggregation:** per-series history buffers folded into chart series
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use fieldscope_core::{ApiClient, Config, SessionStore};
//!
//! # async fn run() -> fieldscope_core::Result<()> {
//! // Load configuration and the persisted session
//! let config = Config::load()?;
//! let session = Arc::new(SessionStore::open(Config::session_path())?);
//!
//! // Talk to the gateway
//! let client = ApiClient::new(&config.gateway, session)?;
//! let fields = client.fields().await?;
//! # let _ = fields;
//! # Ok(())
//! # }
//! ```

// Re-export commonly used items at the crate root
pub use api::{load_field_snapshot, ApiClient, FieldSnapshot};
pub use config::Config;
pub use error::{Error, Result};
pub use realtime::{subscribe, RealtimeEvent, RealtimeHandle};
pub use session::{SessionState, SessionStore};
pub use telemetry::TelemetryAggregator;
pub use types::*;

// Public modules
pub mod api;
pub mod config;
pub mod error;
pub mod geo;
pub mod logging;
pub mod realtime;
pub mod session;
pub mod telemetry;
pub mod types;
