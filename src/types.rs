//! Data model of the controller management API.
//!
//! Payloads exchanged with the service ([`StateMap`], [`Schedule`], [`Query`])
//! and the values it streams back ([`StreamNode`]) are opaque JSON to this
//! crate: they are serialized and deserialized, never interpreted.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::{WipiError, WipiResult};

// ============================================================================
// Identifiers
// ============================================================================

/// Name addressing a single controller on the service.
///
/// Compared by exact string match. No case folding, trimming, or escaping is
/// applied, the name is appended to request paths verbatim.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ControllerName(String);

impl ControllerName {
    /// Create a controller name.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ControllerName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ControllerName {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

impl From<String> for ControllerName {
    fn from(name: String) -> Self {
        Self(name)
    }
}

impl From<&ControllerName> for ControllerName {
    fn from(name: &ControllerName) -> Self {
        name.clone()
    }
}

impl AsRef<str> for ControllerName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// ============================================================================
// Payloads
// ============================================================================

/// Mapping from controller name to that controller's (opaque) state.
///
/// Used as the payload of `set_state`. Serializes as a plain JSON object.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StateMap(BTreeMap<ControllerName, Value>);

impl StateMap {
    /// Create an empty state map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) the state for one controller (builder-style).
    pub fn with(mut self, name: impl Into<ControllerName>, state: Value) -> Self {
        self.insert(name, state);
        self
    }

    /// Add (or replace) the state for one controller.
    pub fn insert(&mut self, name: impl Into<ControllerName>, state: Value) -> Option<Value> {
        self.0.insert(name.into(), state)
    }

    /// State of one controller, if present.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(&ControllerName::from(name))
    }

    /// Number of controllers in the map.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if the map holds no controllers.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over `(name, state)` pairs in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&ControllerName, &Value)> {
        self.0.iter()
    }
}

impl FromIterator<(ControllerName, Value)> for StateMap {
    fn from_iter<I: IntoIterator<Item = (ControllerName, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Opaque description of when and how a deferred state change happens.
///
/// Passed to the service unmodified. See
/// [`ScheduleBuilder`](crate::builders::ScheduleBuilder) for a helper that
/// produces the service's usual shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Schedule(Value);

impl Schedule {
    /// Wrap an arbitrary JSON value.
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    /// The wrapped JSON value.
    pub fn as_value(&self) -> &Value {
        &self.0
    }

    /// Unwrap into the JSON value.
    pub fn into_value(self) -> Value {
        self.0
    }
}

impl From<Value> for Schedule {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

/// Opaque parameters of a downstream query.
///
/// Built either from an arbitrary JSON value or field by field:
///
/// ```
/// use wipi_client::types::Query;
///
/// let query = Query::new()
///     .with("interval", 0.5)
///     .with("duration", 10)
///     .with("gyro_data", false);
/// assert_eq!(query.as_value()["interval"], 0.5);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Query(Value);

impl Query {
    /// An empty query object (`{}`).
    pub fn new() -> Self {
        Self(Value::Object(Map::new()))
    }

    /// Set one query parameter (builder-style).
    ///
    /// If the query currently wraps a non-object value, it is replaced by an
    /// object holding only this parameter.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        if !self.0.is_object() {
            self.0 = Value::Object(Map::new());
        }
        if let Value::Object(map) = &mut self.0 {
            map.insert(key.into(), value.into());
        }
        self
    }

    /// The wrapped JSON value.
    pub fn as_value(&self) -> &Value {
        &self.0
    }

    /// Unwrap into the JSON value.
    pub fn into_value(self) -> Value {
        self.0
    }
}

impl Default for Query {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Value> for Query {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

// ============================================================================
// Results
// ============================================================================

/// One complete value extracted from a streaming downstream response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StreamNode(Value);

impl StreamNode {
    /// Wrap a JSON value.
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    /// The node's JSON value.
    pub fn as_value(&self) -> &Value {
        &self.0
    }

    /// Unwrap into the JSON value.
    pub fn into_value(self) -> Value {
        self.0
    }

    /// Decode the node into a typed value.
    pub fn json<T: DeserializeOwned>(&self) -> WipiResult<T> {
        serde_json::from_value(self.0.clone())
            .map_err(|e| WipiError::InvalidJson(format!("failed to decode stream node: {e}")))
    }
}

impl From<Value> for StreamNode {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

/// Outcome of a non-streaming call: the HTTP status and the response body.
///
/// Every non-streaming operation yields exactly one `CallResult`, whether the
/// exchange succeeded, the service reported an error, or the transport
/// failed. In the last case `status` is a best-effort code and `body` is
/// `{"error": "<message>"}`.
#[derive(Debug, Clone, PartialEq)]
pub struct CallResult {
    /// HTTP status code (100..=599).
    pub status: u16,
    /// Parsed response body, or the normalized error body.
    pub body: Value,
}

impl CallResult {
    /// Create a call result.
    pub fn new(status: u16, body: Value) -> Self {
        Self { status, body }
    }

    /// Returns `true` for 2xx statuses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Narrow the result to its status code, discarding the body.
    pub fn status_only(self) -> u16 {
        self.status
    }

    /// The `error` message of an error body, if the body has one.
    pub fn error_message(&self) -> Option<&str> {
        self.body.get("error").and_then(Value::as_str)
    }

    /// Decode the body into a typed value.
    pub fn json<T: DeserializeOwned>(&self) -> WipiResult<T> {
        serde_json::from_value(self.body.clone())
            .map_err(|e| WipiError::InvalidJson(format!("failed to decode response body: {e}")))
    }

    /// Split into `(status, body)`.
    pub fn into_parts(self) -> (u16, Value) {
        (self.status, self.body)
    }
}
