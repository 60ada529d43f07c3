//! Controller API client.
//!
//! - [`WipiClient`]: one method per API operation, bound to a base URL
//! - [`Request`] / [`Operation`]: endpoint paths and serialized payloads
//! - [`normalize`]: folds every exchange outcome into a
//!   [`CallResult`](crate::types::CallResult)
//! - [`NodeStream`] / [`NodeExtractor`]: incremental downstream results
//! - [`Transport`] / [`HttpTransport`]: pluggable transport layer
//!
//! # Quick Start
//!
//! ```no_run
//! use wipi_client::client::WipiClient;
//! use wipi_client::types::Query;
//!
//! # async fn example() {
//! let client = WipiClient::from_url("http://10.20.30.40/wipi/api");
//!
//! let result = client.get_state("system").await;
//! println!("{} {}", result.status, result.body);
//!
//! let query = Query::new().with("interval", 0.1).with("duration", 2);
//! let mut stream = client.downstream("imu", &query).await;
//! while let Some(node) = stream.next().await {
//!     println!("{}", node.as_value());
//! }
//! # }
//! ```

mod extract;
mod normalizer;
mod request;
mod stream;
mod transport;
mod wipi_client;

pub use extract::{NodeExtractor, NodeSelector};
pub use normalizer::{normalize, RawResponse};
pub use request::{Endpoint, Method, Operation, Request};
pub use stream::{NodeStream, StreamEnd};
#[cfg(feature = "http")]
pub use transport::HttpTransport;
pub use transport::{ChunkStream, Transport, TransportConfig};
pub use wipi_client::{WipiClient, DEFAULT_STREAM_BUFFER};
