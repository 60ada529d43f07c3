//! Request construction: endpoint paths and serialized payloads.
//!
//! Pure and stateless. Nothing here touches the network.

use std::fmt;

use serde::Serialize;

use crate::error::{WipiError, WipiResult};
use crate::types::ControllerName;

/// HTTP method used by an [`Operation`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    /// `GET`
    Get,
    /// `POST`
    Post,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Method::Get => write!(f, "GET"),
            Method::Post => write!(f, "POST"),
        }
    }
}

/// Every operation exposed by the controller management API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// `GET /`: API contract description.
    Contract,
    /// `GET /controllers`: controller name to type mapping.
    Controllers,
    /// `GET /get_state`: states of all controllers.
    GetStates,
    /// `GET /get_state/{name}`: state of one controller.
    GetState,
    /// `POST /set_state`: set states of several controllers.
    SetStates,
    /// `POST /set_state/{name}`: set state of one controller.
    SetState,
    /// `POST /set_state_deferred`: schedule deferred state changes.
    ScheduleStates,
    /// `POST /set_state_deferred/{name}`: schedule a deferred change of one controller.
    ScheduleState,
    /// `GET /list_deferred`: all scheduled changes.
    ListDeferred,
    /// `GET /list_deferred/{name}`: scheduled changes of one controller.
    ListDeferredFor,
    /// `GET /cancel_deferred`: cancel all scheduled changes.
    CancelDeferred,
    /// `POST /downstream`: streaming query across controllers.
    Downstreams,
    /// `POST /downstream/{name}`: streaming query of one controller.
    Downstream,
}

impl Operation {
    /// All operations, in API table order.
    pub const ALL: [Operation; 13] = [
        Operation::Contract,
        Operation::Controllers,
        Operation::GetStates,
        Operation::GetState,
        Operation::SetStates,
        Operation::SetState,
        Operation::ScheduleStates,
        Operation::ScheduleState,
        Operation::ListDeferred,
        Operation::ListDeferredFor,
        Operation::CancelDeferred,
        Operation::Downstreams,
        Operation::Downstream,
    ];

    /// HTTP method of the operation.
    pub fn method(self) -> Method {
        match self {
            Operation::Contract
            | Operation::Controllers
            | Operation::GetStates
            | Operation::GetState
            | Operation::ListDeferred
            | Operation::ListDeferredFor
            | Operation::CancelDeferred => Method::Get,
            Operation::SetStates
            | Operation::SetState
            | Operation::ScheduleStates
            | Operation::ScheduleState
            | Operation::Downstreams
            | Operation::Downstream => Method::Post,
        }
    }

    /// Path relative to the base URL, without the controller name.
    pub fn path(self) -> &'static str {
        match self {
            Operation::Contract => "/",
            Operation::Controllers => "/controllers",
            Operation::GetStates | Operation::GetState => "/get_state",
            Operation::SetStates | Operation::SetState => "/set_state",
            Operation::ScheduleStates | Operation::ScheduleState => "/set_state_deferred",
            Operation::ListDeferred | Operation::ListDeferredFor => "/list_deferred",
            Operation::CancelDeferred => "/cancel_deferred",
            Operation::Downstreams | Operation::Downstream => "/downstream",
        }
    }

    /// Whether the path is suffixed with `/{name}`.
    pub fn takes_name(self) -> bool {
        matches!(
            self,
            Operation::GetState
                | Operation::SetState
                | Operation::ScheduleState
                | Operation::ListDeferredFor
                | Operation::Downstream
        )
    }

    /// Whether the operation sends a JSON body.
    pub fn takes_payload(self) -> bool {
        self.method() == Method::Post
    }

    /// Whether the response is consumed as a stream of nodes.
    pub fn is_streaming(self) -> bool {
        matches!(self, Operation::Downstreams | Operation::Downstream)
    }

    /// Whether callers only get the status code back.
    pub fn is_status_only(self) -> bool {
        matches!(
            self,
            Operation::ScheduleStates | Operation::ScheduleState | Operation::CancelDeferred
        )
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Operation::Contract => "contract",
            Operation::Controllers => "controllers",
            Operation::GetStates => "get_states",
            Operation::GetState => "get_state",
            Operation::SetStates => "set_states",
            Operation::SetState => "set_state",
            Operation::ScheduleStates => "schedule_states",
            Operation::ScheduleState => "schedule_state",
            Operation::ListDeferred => "list_deferred",
            Operation::ListDeferredFor => "list_deferred_for",
            Operation::CancelDeferred => "cancel_deferred",
            Operation::Downstreams => "downstreams",
            Operation::Downstream => "downstream",
        };
        write!(f, "{}", s)
    }
}

/// A base URL paired with a path suffix.
///
/// Resolved by plain concatenation. The base URL is not validated, a
/// malformed one fails in the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    base_url: String,
    path: String,
}

impl Endpoint {
    /// Pair a base URL with a path suffix.
    pub fn new(base_url: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            path: path.into(),
        }
    }

    /// Endpoint of `operation`, with `name` appended for per-controller operations.
    pub fn for_operation(
        base_url: &str,
        operation: Operation,
        name: Option<&ControllerName>,
    ) -> WipiResult<Self> {
        let path = match (operation.takes_name(), name) {
            (true, Some(name)) => format!("{}/{}", operation.path(), name.as_str()),
            (true, None) => {
                return Err(WipiError::invalid_request(format!(
                    "operation '{operation}' requires a controller name"
                )))
            }
            (false, _) => operation.path().to_string(),
        };
        Ok(Self::new(base_url, path))
    }

    /// The base URL as given.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// The path suffix.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Full request target (`base_url + path`).
    pub fn resolve(&self) -> String {
        format!("{}{}", self.base_url, self.path)
    }
}

/// A fully built request, ready for a [`Transport`](super::Transport).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// Operation this request performs.
    pub operation: Operation,
    /// HTTP method.
    pub method: Method,
    /// Resolved endpoint.
    pub endpoint: Endpoint,
    /// Serialized JSON body, for operations that send one.
    pub body: Option<Vec<u8>>,
    /// Random identifier sent as `X-Request-Id` and recorded in logs.
    pub request_id: String,
}

impl Request {
    /// Build the request for `operation`.
    ///
    /// Fails with [`WipiError::InvalidRequest`] if a required controller name
    /// or payload is missing, and with [`WipiError::InvalidJson`] if the
    /// payload cannot be serialized.
    pub fn new<P: Serialize + ?Sized>(
        base_url: &str,
        operation: Operation,
        name: Option<&ControllerName>,
        payload: Option<&P>,
    ) -> WipiResult<Self> {
        let endpoint = Endpoint::for_operation(base_url, operation, name)?;

        let body = match (operation.takes_payload(), payload) {
            (true, Some(payload)) => Some(serde_json::to_vec(payload).map_err(|e| {
                WipiError::InvalidJson(format!("failed to serialize request payload: {e}"))
            })?),
            (true, None) => {
                return Err(WipiError::invalid_request(format!(
                    "operation '{operation}' requires a payload"
                )))
            }
            (false, _) => None,
        };

        Ok(Self {
            operation,
            method: operation.method(),
            endpoint,
            body,
            request_id: uuid::Uuid::new_v4().to_string(),
        })
    }

    /// Build a request for an operation that carries no payload.
    pub fn without_payload(
        base_url: &str,
        operation: Operation,
        name: Option<&ControllerName>,
    ) -> WipiResult<Self> {
        Self::new::<()>(base_url, operation, name, None)
    }

    /// Full request target.
    pub fn url(&self) -> String {
        self.endpoint.resolve()
    }

    /// Body as UTF-8 text, if any.
    pub fn body_text(&self) -> Option<&str> {
        self.body.as_deref().and_then(|b| std::str::from_utf8(b).ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    const BASE: &str = "http://10.20.30.40/wipi/api";

    #[test]
    fn set_one_state_path_and_body() {
        let name = ControllerName::from("lamp1");
        let state = json!({"on": true});
        let request = Request::new(BASE, Operation::SetState, Some(&name), Some(&state)).unwrap();

        assert_eq!(request.endpoint.path(), "/set_state/lamp1");
        assert_eq!(request.url(), format!("{BASE}/set_state/lamp1"));
        assert_eq!(request.method, Method::Post);
        let body: Value = serde_json::from_slice(request.body.as_ref().unwrap()).unwrap();
        assert_eq!(body, json!({"on": true}));
    }

    #[test]
    fn contract_path_is_root() {
        let request = Request::without_payload(BASE, Operation::Contract, None).unwrap();
        assert_eq!(request.url(), format!("{BASE}/"));
        assert!(request.body.is_none());
    }

    #[test]
    fn get_ignores_payload() {
        let request =
            Request::new(BASE, Operation::GetStates, None, Some(&json!({"x": 1}))).unwrap();
        assert!(request.body.is_none());
        assert_eq!(request.method, Method::Get);
    }

    #[test]
    fn missing_name_is_rejected() {
        let err = Request::without_payload(BASE, Operation::GetState, None).unwrap_err();
        assert!(matches!(err, WipiError::InvalidRequest(_)));
    }

    #[test]
    fn missing_payload_is_rejected() {
        let err = Request::without_payload(BASE, Operation::SetStates, None).unwrap_err();
        assert!(matches!(err, WipiError::InvalidRequest(_)));
    }

    #[test]
    fn name_is_appended_verbatim() {
        let name = ControllerName::from("Relay Board");
        let request = Request::without_payload(BASE, Operation::GetState, Some(&name)).unwrap();
        assert_eq!(request.endpoint.path(), "/get_state/Relay Board");
    }

    #[test]
    fn base_url_is_concatenated_literally() {
        let endpoint = Endpoint::new("http://host/api/", "/controllers");
        assert_eq!(endpoint.resolve(), "http://host/api//controllers");
    }

    #[test]
    fn operation_table() {
        let table: Vec<(Operation, Method, &str, bool)> = Operation::ALL
            .iter()
            .map(|op| (*op, op.method(), op.path(), op.takes_name()))
            .collect();
        assert_eq!(table.len(), 13);
        assert!(table.contains(&(Operation::CancelDeferred, Method::Get, "/cancel_deferred", false)));
        assert!(table.contains(&(
            Operation::ScheduleState,
            Method::Post,
            "/set_state_deferred",
            true
        )));
        assert!(table.contains(&(Operation::Downstream, Method::Post, "/downstream", true)));

        let streaming: Vec<_> = Operation::ALL.iter().filter(|op| op.is_streaming()).collect();
        assert_eq!(streaming.len(), 2);
        let status_only: Vec<_> = Operation::ALL
            .iter()
            .filter(|op| op.is_status_only())
            .collect();
        assert_eq!(status_only.len(), 3);
    }

    #[test]
    fn request_ids_are_unique() {
        let a = Request::without_payload(BASE, Operation::CancelDeferred, None).unwrap();
        let b = Request::without_payload(BASE, Operation::CancelDeferred, None).unwrap();
        assert_ne!(a.request_id, b.request_id);
    }
}
