//! # wipi-client: Rust client for the wipi controller management API
//!
//! A wipi service exposes the controllers of a device (relay boards, sensors,
//! the machine itself) over a small JSON-over-HTTP API. This crate lets you:
//!
//! - discover the API contract and the available controllers
//! - read and write controller state
//! - schedule, list, and cancel deferred state changes
//! - stream "downstream" query results node by node as they arrive
//!
//! ## Quick Start
//!
//! ```no_run
//! use serde_json::json;
//! use wipi_client::prelude::*;
//!
//! #[tokio::main]
//! async fn main() {
//!     let client = WipiClient::from_url("http://10.20.30.40/wipi/api");
//!
//!     // Every non-streaming call yields exactly one (status, body) result,
//!     // network failures included.
//!     let result = client.set_state("relays", &json!({"relay1": "closed"})).await;
//!     if !result.is_success() {
//!         eprintln!("{}: {:?}", result.status, result.error_message());
//!     }
//!
//!     // Downstream results arrive incrementally, then one completion signal.
//!     let query = Query::new().with("interval", 0.1).with("duration", 2);
//!     client
//!         .downstream("imu", &query)
//!         .await
//!         .for_each_node(
//!             |node| println!("{}", node.as_value()),
//!             |end| println!("done: {}", end),
//!         )
//!         .await;
//! }
//! ```
//!
//! ## Feature flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `http`  | yes     | `reqwest`-backed [`client::HttpTransport`] |
//! | `full`  | no      | Enable all features |
//!
//! Without `http`, the client works over any [`client::Transport`]
//! implementation.
//!
//! ## Architecture
//!
//! - [`client::WipiClient`]: one method per API operation
//! - [`client::Request`]: builds endpoint URLs and JSON bodies
//! - [`client::normalize`]: turns every exchange outcome into a [`types::CallResult`]
//! - [`client::NodeStream`]: runs a streaming query, yields [`types::StreamNode`]s,
//!   ends with exactly one [`client::StreamEnd`]
//! - [`client::NodeExtractor`]: incremental JSON scanner behind `NodeStream`
//! - [`builders::ClientBuilder`] / [`builders::ScheduleBuilder`]: configuration
//!   and deferred schedules
//! - [`error::WipiError`]: error type with best-effort HTTP status mapping

pub mod builders;
pub mod client;
pub mod error;
pub mod types;

/// Prelude module that re-exports commonly used types.
///
/// ```
/// use wipi_client::prelude::*;
///
/// let states = StateMap::new().with("system", serde_json::json!({"power": "on"}));
/// assert_eq!(states.len(), 1);
/// ```
pub mod prelude {
    pub use crate::builders::{ClientBuilder, ScheduleBuilder};
    #[cfg(feature = "http")]
    pub use crate::client::HttpTransport;
    pub use crate::client::{NodeSelector, NodeStream, StreamEnd, Transport, WipiClient};
    pub use crate::error::{WipiError, WipiResult};
    pub use crate::types::{CallResult, ControllerName, Query, Schedule, StateMap, StreamNode};
}

pub use builders::{ClientBuilder, ScheduleBuilder};
pub use client::WipiClient;
pub use error::{WipiError, WipiResult};
pub use types::*;
