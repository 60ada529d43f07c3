//! Streaming downstream queries.
//!
//! A [`NodeStream`] drives one streaming exchange in a background task:
//! response chunks go through a [`NodeExtractor`], and every extracted node is
//! pushed through a channel in the order the transport delivered it. After
//! the last node, exactly one [`StreamEnd`] is produced. Nothing is delivered
//! after it.
//!
//! The lifecycle is `streaming -> done`. There is no separate error state: a
//! failure simply ends the stream early, and [`StreamEnd::Interrupted`] says
//! why.

use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::stream::{Stream, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::WipiError;
use crate::types::StreamNode;

use super::extract::{NodeExtractor, NodeSelector};
use super::request::Request;
use super::transport::Transport;

/// How a streaming query ended.
///
/// Either variant is the single completion signal of the stream. No node is
/// delivered after it.
#[derive(Debug, Clone)]
pub enum StreamEnd {
    /// The response body ended cleanly.
    Complete,
    /// The stream was cut short: the exchange could not be opened, the
    /// connection dropped, the body was not valid JSON, or the consumer
    /// cancelled.
    Interrupted(WipiError),
}

impl StreamEnd {
    /// Returns `true` if the stream ended cleanly.
    pub fn is_complete(&self) -> bool {
        matches!(self, StreamEnd::Complete)
    }

    /// The error that interrupted the stream, if any.
    pub fn error(&self) -> Option<&WipiError> {
        match self {
            StreamEnd::Complete => None,
            StreamEnd::Interrupted(err) => Some(err),
        }
    }

    /// Best-effort HTTP status of the exchange: 200 for a clean end.
    pub fn status(&self) -> u16 {
        match self {
            StreamEnd::Complete => 200,
            StreamEnd::Interrupted(err) => err.status_hint(),
        }
    }
}

impl fmt::Display for StreamEnd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamEnd::Complete => write!(f, "complete"),
            StreamEnd::Interrupted(err) => write!(f, "interrupted: {}", err),
        }
    }
}

enum StreamEvent {
    Node(StreamNode),
    End(StreamEnd),
}

/// Incremental results of one downstream query.
///
/// Consume it pull-style with [`next()`](Self::next), as a
/// [`futures::Stream`], or with the callback pair of
/// [`for_each_node()`](Self::for_each_node). Dropping the stream, or calling
/// [`cancel()`](Self::cancel), aborts the underlying exchange.
///
/// # Example
///
/// ```no_run
/// # async fn example(client: wipi_client::client::WipiClient) {
/// use wipi_client::types::Query;
///
/// let mut stream = client.downstream("imu", &Query::new().with("duration", 5)).await;
/// while let Some(node) = stream.next().await {
///     println!("{}", node.as_value());
/// }
/// println!("ended: {}", stream.end().unwrap());
/// # }
/// ```
pub struct NodeStream {
    receiver: mpsc::Receiver<StreamEvent>,
    /// Background exchange, aborted on cancel or drop.
    task: Option<tokio::task::JoinHandle<()>>,
    end: Option<StreamEnd>,
    request_id: String,
}

impl fmt::Debug for NodeStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeStream")
            .field("request_id", &self.request_id)
            .field("end", &self.end)
            .finish_non_exhaustive()
    }
}

impl NodeStream {
    /// Start the streaming exchange for `request` in a background task.
    ///
    /// Outside a tokio runtime the stream ends at once, without nodes.
    pub(crate) fn open(
        transport: Arc<dyn Transport>,
        request: Request,
        selector: NodeSelector,
        buffer: usize,
    ) -> Self {
        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(e) => {
                warn!(request_id = %request.request_id, "downstream needs a tokio runtime: {}", e);
                let mut stream = Self::failed(WipiError::Other(format!(
                    "no tokio runtime to run the downstream query: {e}"
                )));
                stream.request_id = request.request_id;
                return stream;
            }
        };

        let (tx, rx) = mpsc::channel(buffer.max(1));
        let request_id = request.request_id.clone();

        let task = runtime.spawn(async move {
            let end = run_exchange(transport.as_ref(), &request, selector, &tx).await;
            // Receiver may have been dropped.
            let _ = tx.send(StreamEvent::End(end)).await;
        });

        Self {
            receiver: rx,
            task: Some(task),
            end: None,
            request_id,
        }
    }

    /// A stream that ends immediately, without nodes.
    pub(crate) fn failed(err: WipiError) -> Self {
        let (_, rx) = mpsc::channel(1);
        Self {
            receiver: rx,
            task: None,
            end: Some(StreamEnd::Interrupted(err)),
            request_id: String::new(),
        }
    }

    /// Identifier of the underlying request (sent as `X-Request-Id`).
    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    /// Get the next node.
    ///
    /// Returns `None` once the stream has ended; [`end()`](Self::end) then
    /// tells how.
    pub async fn next(&mut self) -> Option<StreamNode> {
        if self.end.is_some() {
            return None;
        }
        let event = self.receiver.recv().await;
        self.accept(event)
    }

    /// How the stream ended, or `None` while nodes may still arrive.
    pub fn end(&self) -> Option<&StreamEnd> {
        self.end.as_ref()
    }

    /// Returns `true` once the completion signal has been received.
    pub fn is_done(&self) -> bool {
        self.end.is_some()
    }

    /// Stop the exchange. No further nodes are delivered.
    ///
    /// If the stream had not ended yet, it ends as
    /// `Interrupted(WipiError::cancelled())`.
    pub fn cancel(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        self.receiver.close();
        if self.end.is_none() {
            debug!(request_id = %self.request_id, "downstream cancelled by consumer");
            self.end = Some(StreamEnd::Interrupted(WipiError::cancelled()));
        }
    }

    /// Drain the remaining nodes and return how the stream ended.
    pub async fn finish(mut self) -> StreamEnd {
        while self.next().await.is_some() {}
        self.take_end()
    }

    /// Collect every remaining node, then the completion signal.
    pub async fn collect_nodes(mut self) -> (Vec<StreamNode>, StreamEnd) {
        let mut nodes = Vec::new();
        while let Some(node) = self.next().await {
            nodes.push(node);
        }
        let end = self.take_end();
        (nodes, end)
    }

    /// Deliver each node to `on_node`, in order, then call `on_complete`
    /// exactly once.
    ///
    /// `on_node` is never called after `on_complete`.
    pub async fn for_each_node<F, C>(mut self, mut on_node: F, on_complete: C)
    where
        F: FnMut(StreamNode),
        C: FnOnce(StreamEnd),
    {
        while let Some(node) = self.next().await {
            on_node(node);
        }
        on_complete(self.take_end());
    }

    fn accept(&mut self, event: Option<StreamEvent>) -> Option<StreamNode> {
        match event {
            Some(StreamEvent::Node(node)) => Some(node),
            Some(StreamEvent::End(end)) => {
                self.end = Some(end);
                None
            }
            None => {
                // The task went away without an end event (aborted or panicked).
                self.end = Some(StreamEnd::Interrupted(WipiError::Other(
                    "stream task terminated without completion".to_string(),
                )));
                None
            }
        }
    }

    fn take_end(&mut self) -> StreamEnd {
        self.end.take().unwrap_or_else(|| {
            StreamEnd::Interrupted(WipiError::Other("stream not finished".to_string()))
        })
    }
}

impl Stream for NodeStream {
    type Item = StreamNode;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.end.is_some() {
            return Poll::Ready(None);
        }
        match this.receiver.poll_recv(cx) {
            Poll::Ready(event) => Poll::Ready(this.accept(event)),
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for NodeStream {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Run one streaming exchange, forwarding nodes to `tx`.
async fn run_exchange(
    transport: &dyn Transport,
    request: &Request,
    selector: NodeSelector,
    tx: &mpsc::Sender<StreamEvent>,
) -> StreamEnd {
    debug!(request_id = %request.request_id, url = %request.url(), "opening downstream");

    let mut chunks = match transport.stream_exchange(request).await {
        Ok(chunks) => chunks,
        Err(e) => {
            warn!(request_id = %request.request_id, "downstream failed to open: {}", e);
            return StreamEnd::Interrupted(e);
        }
    };

    let mut extractor = NodeExtractor::new(selector);
    let mut nodes = Vec::new();

    while let Some(chunk) = chunks.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(e) => return interrupted(request, &extractor, e),
        };

        let fed = extractor.feed(&chunk, &mut nodes);
        if !deliver(tx, &mut nodes).await {
            return StreamEnd::Interrupted(WipiError::cancelled());
        }
        if let Err(e) = fed {
            return interrupted(request, &extractor, e);
        }
    }

    let finished = extractor.finish(&mut nodes);
    if !deliver(tx, &mut nodes).await {
        return StreamEnd::Interrupted(WipiError::cancelled());
    }
    if let Err(e) = finished {
        return interrupted(request, &extractor, e);
    }

    debug!(
        request_id = %request.request_id,
        nodes = extractor.emitted(),
        "downstream complete"
    );
    StreamEnd::Complete
}

/// Send pending nodes in order. Returns `false` if the consumer is gone.
async fn deliver(tx: &mpsc::Sender<StreamEvent>, nodes: &mut Vec<StreamNode>) -> bool {
    for node in nodes.drain(..) {
        if tx.send(StreamEvent::Node(node)).await.is_err() {
            return false;
        }
    }
    true
}

fn interrupted(request: &Request, extractor: &NodeExtractor, err: WipiError) -> StreamEnd {
    warn!(
        request_id = %request.request_id,
        nodes = extractor.emitted(),
        "downstream interrupted: {}",
        err
    );
    StreamEnd::Interrupted(err)
}
