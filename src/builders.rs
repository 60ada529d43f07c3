//! Builder patterns for client configuration and deferred schedules.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{json, Map, Value};

use crate::client::{NodeSelector, Transport, TransportConfig, WipiClient, DEFAULT_STREAM_BUFFER};
use crate::types::Schedule;

/// Builder for [`WipiClient`] with transport and streaming options.
///
/// # Example
///
/// ```no_run
/// use std::time::Duration;
/// use wipi_client::builders::ClientBuilder;
/// use wipi_client::client::NodeSelector;
///
/// let client = ClientBuilder::new("http://10.20.30.40/wipi/api")
///     .with_timeout(Duration::from_secs(5))
///     .with_node_selector(NodeSelector::Field("data".into()))
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct ClientBuilder {
    base_url: String,
    config: TransportConfig,
    selector: NodeSelector,
    stream_buffer: usize,
}

impl ClientBuilder {
    /// Create a new client builder for the given base URL.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            config: TransportConfig::default(),
            selector: NodeSelector::default(),
            stream_buffer: DEFAULT_STREAM_BUFFER,
        }
    }

    /// Set the timeout of one-shot exchanges.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Set the connection timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Add a custom HTTP header sent with every request.
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.headers.insert(key.into(), value.into());
        self
    }

    /// Set which parts of a downstream response are delivered as nodes.
    pub fn with_node_selector(mut self, selector: NodeSelector) -> Self {
        self.selector = selector;
        self
    }

    /// Set the per-stream node buffer.
    pub fn with_stream_buffer(mut self, buffer: usize) -> Self {
        self.stream_buffer = buffer;
        self
    }

    /// The transport configuration collected so far.
    pub fn transport_config(&self) -> &TransportConfig {
        &self.config
    }

    /// Build a client over the HTTP transport.
    #[cfg(feature = "http")]
    pub fn build(self) -> WipiClient {
        let transport = crate::client::HttpTransport::with_config(self.config.clone());
        self.build_with_transport(transport)
    }

    /// Build a client over a custom transport.
    ///
    /// Transport options (timeouts, headers) are the caller's responsibility
    /// in that case.
    pub fn build_with_transport(self, transport: impl Transport + 'static) -> WipiClient {
        WipiClient::new(transport, self.base_url)
            .with_node_selector(self.selector)
            .with_stream_buffer(self.stream_buffer)
    }
}

/// Builder for a deferred-change [`Schedule`].
///
/// A schedule lists one or more execution times. `repeat` appends further
/// times spaced by an interval after the last one; `repeat_forever` makes the
/// service keep going at a fixed interval after the listed times run out.
///
/// Produces `{"at": ["<RFC 3339>", ..], "repeat_forever": <seconds>, "state": <value>}`,
/// omitting absent fields.
///
/// # Example
///
/// ```
/// use chrono::{Duration, TimeZone, Utc};
/// use serde_json::json;
/// use wipi_client::builders::ScheduleBuilder;
///
/// let start = Utc.with_ymd_and_hms(2026, 10, 16, 18, 0, 0).unwrap();
/// let schedule = ScheduleBuilder::at(start)
///     .repeat(2, Duration::seconds(5))
///     .with_state(json!({"relay1": "closed"}))
///     .build();
///
/// assert_eq!(
///     schedule.as_value()["at"],
///     json!(["2026-10-16T18:00:00Z", "2026-10-16T18:00:05Z", "2026-10-16T18:00:10Z"])
/// );
/// ```
#[derive(Debug, Clone)]
pub struct ScheduleBuilder {
    at: Vec<DateTime<Utc>>,
    repeat_forever: Option<chrono::Duration>,
    state: Option<Value>,
    extra: HashMap<String, Value>,
}

impl ScheduleBuilder {
    /// A schedule executing now.
    pub fn now() -> Self {
        Self::at(Utc::now())
    }

    /// A schedule executing at `time`.
    pub fn at(time: DateTime<Utc>) -> Self {
        Self {
            at: vec![time],
            repeat_forever: None,
            state: None,
            extra: HashMap::new(),
        }
    }

    /// Add another execution time.
    pub fn and_at(mut self, time: DateTime<Utc>) -> Self {
        self.at.push(time);
        self
    }

    /// Append `times` executions, `interval` apart, after the last one.
    ///
    /// Times past the largest representable date are not added.
    ///
    /// Calls accumulate: `.repeat(2, 5s).repeat(1, 10s)` from `t` gives
    /// `t, t+5s, t+10s, t+20s`.
    pub fn repeat(mut self, times: u32, interval: chrono::Duration) -> Self {
        for _ in 0..times {
            let Some(next) = self
                .at
                .last()
                .and_then(|last| last.checked_add_signed(interval))
            else {
                break;
            };
            self.at.push(next);
        }
        self
    }

    /// Keep executing every `interval` after the listed times.
    pub fn repeat_forever(mut self, interval: chrono::Duration) -> Self {
        self.repeat_forever = Some(interval);
        self
    }

    /// State to apply at each execution.
    pub fn with_state(mut self, state: Value) -> Self {
        self.state = Some(state);
        self
    }

    /// Any additional field the service understands.
    pub fn with_field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    /// Build the opaque schedule payload.
    pub fn build(self) -> Schedule {
        let mut object = Map::new();
        for (key, value) in self.extra {
            object.insert(key, value);
        }

        let at: Vec<String> = self
            .at
            .iter()
            .map(|t| t.to_rfc3339_opts(SecondsFormat::AutoSi, true))
            .collect();
        object.insert("at".to_string(), json!(at));

        if let Some(interval) = self.repeat_forever {
            let seconds = interval.num_milliseconds() as f64 / 1000.0;
            object.insert("repeat_forever".to_string(), json!(seconds));
        }
        if let Some(state) = self.state {
            object.insert("state".to_string(), state);
        }

        Schedule::new(Value::Object(object))
    }
}
