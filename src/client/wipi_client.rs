//! High-level client for the controller management API.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, instrument};

use crate::error::WipiResult;
use crate::types::{CallResult, ControllerName, Query, Schedule, StateMap};

use super::extract::NodeSelector;
use super::normalizer::normalize;
use super::request::{Operation, Request};
use super::stream::NodeStream;
use super::transport::Transport;

/// Default capacity of the per-stream node channel.
pub const DEFAULT_STREAM_BUFFER: usize = 64;

/// Client for a controller management service.
///
/// Holds only the transport and the base URL (plus stream settings), all
/// fixed at construction. Every operation is independent: there is no
/// session, no cache, and no ordering between calls, so the client can be
/// cloned freely and used from concurrent tasks.
///
/// Non-streaming operations return a [`CallResult`] and never fail: network
/// errors and error statuses alike come back as `(status, body)`. The
/// deferred-scheduling submissions and cancellation return only the status.
/// Downstream queries return a [`NodeStream`].
///
/// # Example
///
/// ```no_run
/// use serde_json::json;
/// use wipi_client::client::WipiClient;
///
/// # async fn example() {
/// let client = WipiClient::from_url("http://10.20.30.40/wipi/api");
///
/// let result = client.set_state("relays", &json!({"relay1": "closed"})).await;
/// if result.status != 200 {
///     eprintln!("failed: {:?}", result.error_message());
/// }
/// # }
/// ```
#[derive(Clone)]
pub struct WipiClient {
    transport: Arc<dyn Transport>,
    base_url: String,
    selector: NodeSelector,
    stream_buffer: usize,
}

impl fmt::Debug for WipiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WipiClient")
            .field("base_url", &self.base_url)
            .field("selector", &self.selector)
            .field("stream_buffer", &self.stream_buffer)
            .finish_non_exhaustive()
    }
}

impl WipiClient {
    /// Create a client from a transport and the service's base URL.
    pub fn new(transport: impl Transport + 'static, base_url: impl Into<String>) -> Self {
        Self::with_transport(Arc::new(transport), base_url)
    }

    /// Create a client from a shared transport.
    pub fn with_transport(transport: Arc<dyn Transport>, base_url: impl Into<String>) -> Self {
        Self {
            transport,
            base_url: base_url.into(),
            selector: NodeSelector::default(),
            stream_buffer: DEFAULT_STREAM_BUFFER,
        }
    }

    /// Create a client using the default [`HttpTransport`](super::HttpTransport).
    #[cfg(feature = "http")]
    pub fn from_url(base_url: impl Into<String>) -> Self {
        Self::new(super::HttpTransport::new(), base_url)
    }

    /// Set which parts of a downstream response are delivered as nodes.
    pub fn with_node_selector(mut self, selector: NodeSelector) -> Self {
        self.selector = selector;
        self
    }

    /// Set how many nodes may be buffered ahead of a slow consumer.
    pub fn with_stream_buffer(mut self, buffer: usize) -> Self {
        self.stream_buffer = buffer.max(1);
        self
    }

    /// The base URL every path is appended to.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// The node selector used by downstream queries.
    pub fn node_selector(&self) -> &NodeSelector {
        &self.selector
    }

    // ──────────────────────────────────────────────────
    // Discovery
    // ──────────────────────────────────────────────────

    /// API contract description (`GET /`).
    pub async fn contract(&self) -> CallResult {
        self.call::<()>(Operation::Contract, None, None).await
    }

    /// Controller name to controller type mapping (`GET /controllers`).
    pub async fn controllers(&self) -> CallResult {
        self.call::<()>(Operation::Controllers, None, None).await
    }

    // ──────────────────────────────────────────────────
    // State
    // ──────────────────────────────────────────────────

    /// States of all controllers (`GET /get_state`).
    pub async fn get_states(&self) -> CallResult {
        self.call::<()>(Operation::GetStates, None, None).await
    }

    /// State of one controller (`GET /get_state/{name}`).
    pub async fn get_state(&self, name: impl Into<ControllerName>) -> CallResult {
        let name = name.into();
        self.call::<()>(Operation::GetState, Some(&name), None).await
    }

    /// Set states of several controllers (`POST /set_state`).
    pub async fn set_states(&self, states: &StateMap) -> CallResult {
        self.call(Operation::SetStates, None, Some(states)).await
    }

    /// Set state of one controller (`POST /set_state/{name}`).
    pub async fn set_state(&self, name: impl Into<ControllerName>, state: &Value) -> CallResult {
        let name = name.into();
        self.call(Operation::SetState, Some(&name), Some(state)).await
    }

    // ──────────────────────────────────────────────────
    // Deferred state changes
    // ──────────────────────────────────────────────────

    /// Schedule deferred state changes (`POST /set_state_deferred`).
    ///
    /// Returns only the status code.
    pub async fn schedule_states(&self, schedule: &Schedule) -> u16 {
        self.call(Operation::ScheduleStates, None, Some(schedule))
            .await
            .status_only()
    }

    /// Schedule a deferred state change of one controller
    /// (`POST /set_state_deferred/{name}`).
    ///
    /// Returns only the status code.
    pub async fn schedule_state(
        &self,
        name: impl Into<ControllerName>,
        schedule: &Schedule,
    ) -> u16 {
        let name = name.into();
        self.call(Operation::ScheduleState, Some(&name), Some(schedule))
            .await
            .status_only()
    }

    /// All scheduled state changes (`GET /list_deferred`).
    pub async fn list_deferred(&self) -> CallResult {
        self.call::<()>(Operation::ListDeferred, None, None).await
    }

    /// Scheduled state changes of one controller (`GET /list_deferred/{name}`).
    pub async fn list_deferred_for(&self, name: impl Into<ControllerName>) -> CallResult {
        let name = name.into();
        self.call::<()>(Operation::ListDeferredFor, Some(&name), None)
            .await
    }

    /// Cancel all scheduled state changes (`GET /cancel_deferred`).
    ///
    /// Returns only the status code. Each call reaches the service.
    pub async fn cancel_deferred(&self) -> u16 {
        self.call::<()>(Operation::CancelDeferred, None, None)
            .await
            .status_only()
    }

    // ──────────────────────────────────────────────────
    // Downstream
    // ──────────────────────────────────────────────────

    /// Stream query results across controllers (`POST /downstream`).
    ///
    /// The exchange runs on the current tokio runtime. Without one, the
    /// returned stream is already ended with [`StreamEnd::Interrupted`].
    ///
    /// [`StreamEnd::Interrupted`]: super::StreamEnd::Interrupted
    pub async fn downstreams(&self, query: &Query) -> NodeStream {
        self.stream(Request::new(
            &self.base_url,
            Operation::Downstreams,
            None,
            Some(query),
        ))
    }

    /// Stream query results from one controller (`POST /downstream/{name}`).
    ///
    /// Same runtime requirement as [`downstreams()`](Self::downstreams).
    pub async fn downstream(&self, name: impl Into<ControllerName>, query: &Query) -> NodeStream {
        let name = name.into();
        self.stream(Request::new(
            &self.base_url,
            Operation::Downstream,
            Some(&name),
            Some(query),
        ))
    }

    /// Close the underlying transport.
    pub async fn close(&self) -> WipiResult<()> {
        self.transport.close().await
    }

    // ──────────────────────────────────────────────────
    // Internal helpers
    // ──────────────────────────────────────────────────

    #[instrument(
        level = "debug",
        skip(self, name, payload),
        fields(controller = name.map(ControllerName::as_str))
    )]
    async fn call<P: Serialize + ?Sized>(
        &self,
        operation: Operation,
        name: Option<&ControllerName>,
        payload: Option<&P>,
    ) -> CallResult {
        let request = match Request::new(&self.base_url, operation, name, payload) {
            Ok(request) => request,
            Err(e) => return normalize(Err(e)),
        };

        let result = normalize(self.transport.exchange(&request).await);
        debug!(
            request_id = %request.request_id,
            status = result.status,
            "{} finished",
            operation
        );
        result
    }

    fn stream(&self, request: WipiResult<Request>) -> NodeStream {
        match request {
            Ok(request) => NodeStream::open(
                Arc::clone(&self.transport),
                request,
                self.selector.clone(),
                self.stream_buffer,
            ),
            Err(e) => NodeStream::failed(e),
        }
    }
}
