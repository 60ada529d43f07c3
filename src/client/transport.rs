//! Transport layer for talking to the controller service.
//!
//! Provides the [`Transport`] trait, which the rest of the client is written
//! against, and [`HttpTransport`], the `reqwest` implementation used by
//! default.

use std::collections::HashMap;
use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::Stream;

use crate::error::WipiResult;

use super::normalizer::RawResponse;
use super::request::Request;

/// Body of a streaming exchange, chunk by chunk, in arrival order.
pub type ChunkStream = Pin<Box<dyn Stream<Item = WipiResult<Bytes>> + Send>>;

/// Transport abstraction for the controller API.
///
/// Implementations perform the HTTP exchanges. Anything above this trait
/// (request building, normalization, node extraction) is transport
/// independent, which is what lets tests substitute a scripted transport.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Perform a one-shot exchange.
    ///
    /// Any HTTP response, whatever its status, is `Ok`. `Err` means no
    /// response was obtained (connection failure, timeout, unreadable body).
    async fn exchange(&self, request: &Request) -> WipiResult<RawResponse>;

    /// Open a streaming exchange and return the response body as chunks.
    ///
    /// A non-2xx status is reported as
    /// [`WipiError::Http`](crate::error::WipiError::Http). Chunks must be
    /// yielded in arrival order; the stream ending is the end of the body.
    async fn stream_exchange(&self, request: &Request) -> WipiResult<ChunkStream>;

    /// Close the transport and release any held resources.
    ///
    /// The default implementation is a no-op.
    async fn close(&self) -> WipiResult<()> {
        Ok(())
    }
}

/// Configuration for [`HttpTransport`].
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Total time allowed for a one-shot exchange. Defaults to 60 seconds.
    ///
    /// Not applied to streaming exchanges, which last as long as the service
    /// keeps sending.
    pub timeout: Duration,
    /// Time allowed to establish a connection. Defaults to 10 seconds.
    pub connect_timeout: Duration,
    /// Additional HTTP headers to include on every request.
    pub headers: HashMap<String, String>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            connect_timeout: Duration::from_secs(10),
            headers: HashMap::new(),
        }
    }
}

#[cfg(feature = "http")]
pub use self::http::HttpTransport;

#[cfg(feature = "http")]
mod http {
    use async_trait::async_trait;
    use futures::StreamExt;
    use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, CONTENT_TYPE};
    use tracing::{debug, warn};

    use super::{ChunkStream, Transport, TransportConfig};
    use crate::client::normalizer::RawResponse;
    use crate::client::request::{Method, Request};
    use crate::error::{WipiError, WipiResult};

    /// HTTP transport using `reqwest`.
    ///
    /// Requests carry `Accept: application/json` and an `X-Request-Id`
    /// header; POST bodies are sent as `application/json`.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use wipi_client::client::{HttpTransport, WipiClient};
    ///
    /// let client = WipiClient::new(HttpTransport::new(), "http://10.20.30.40/wipi/api");
    /// ```
    #[derive(Debug, Clone)]
    pub struct HttpTransport {
        client: reqwest::Client,
        config: TransportConfig,
    }

    impl HttpTransport {
        /// Create a transport with default configuration (60s timeout, no extra headers).
        pub fn new() -> Self {
            Self::with_config(TransportConfig::default())
        }

        /// Create a transport with custom configuration.
        pub fn with_config(config: TransportConfig) -> Self {
            let mut default_headers = HeaderMap::new();
            for (key, value) in &config.headers {
                match (
                    HeaderName::from_bytes(key.as_bytes()),
                    HeaderValue::from_str(value),
                ) {
                    (Ok(name), Ok(val)) => {
                        default_headers.insert(name, val);
                    }
                    _ => warn!("ignoring invalid header '{}'", key),
                }
            }

            let client = reqwest::Client::builder()
                .connect_timeout(config.connect_timeout)
                .default_headers(default_headers)
                .build()
                .unwrap_or_else(|_| reqwest::Client::new());

            Self { client, config }
        }

        /// Create a transport around an existing `reqwest::Client`.
        ///
        /// Useful to share a connection pool or configure TLS externally.
        pub fn with_client(client: reqwest::Client) -> Self {
            Self {
                client,
                config: TransportConfig::default(),
            }
        }

        /// The configuration this transport was built with.
        pub fn config(&self) -> &TransportConfig {
            &self.config
        }

        fn request_builder(&self, request: &Request) -> reqwest::RequestBuilder {
            let url = request.url();
            let builder = match request.method {
                Method::Get => self.client.get(url),
                Method::Post => self.client.post(url),
            }
            .header(ACCEPT, "application/json")
            .header("X-Request-Id", request.request_id.as_str());

            match &request.body {
                Some(body) => builder
                    .header(CONTENT_TYPE, "application/json")
                    .body(body.clone()),
                None => builder,
            }
        }
    }

    impl Default for HttpTransport {
        fn default() -> Self {
            Self::new()
        }
    }

    fn send_error(e: reqwest::Error, what: &str) -> WipiError {
        if e.is_timeout() {
            WipiError::Timeout(format!("{what} timed out: {e}"))
        } else if e.is_connect() {
            WipiError::Transport(format!("{what} connection failed: {e}"))
        } else {
            WipiError::Transport(format!("{what} HTTP request failed: {e}"))
        }
    }

    #[async_trait]
    impl Transport for HttpTransport {
        async fn exchange(&self, request: &Request) -> WipiResult<RawResponse> {
            debug!(
                request_id = %request.request_id,
                "{} {}",
                request.method,
                request.url()
            );

            let response = self
                .request_builder(request)
                .timeout(self.config.timeout)
                .send()
                .await
                .map_err(|e| send_error(e, "request"))?;

            let status = response.status().as_u16();
            let content_type = response
                .headers()
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);

            let body = response.bytes().await.map_err(|e| {
                if e.is_timeout() {
                    WipiError::Timeout(format!("reading response body timed out: {e}"))
                } else {
                    WipiError::Transport(format!("failed to read response body: {e}"))
                }
            })?;

            Ok(RawResponse::new(status, content_type, body))
        }

        async fn stream_exchange(&self, request: &Request) -> WipiResult<ChunkStream> {
            debug!(
                request_id = %request.request_id,
                "{} {} (streaming)",
                request.method,
                request.url()
            );

            let response = self
                .request_builder(request)
                .send()
                .await
                .map_err(|e| send_error(e, "stream"))?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(WipiError::Http {
                    status: status.as_u16(),
                    body,
                });
            }

            let chunks = response.bytes_stream().map(|chunk| {
                chunk.map_err(|e| WipiError::Transport(format!("error reading response stream: {e}")))
            });
            Ok(Box::pin(chunks))
        }
    }
}
