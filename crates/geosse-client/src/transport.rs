//! Event-stream transport seam and its HTTP implementation.
//!
//! [`EventTransport`] opens connections; each [`EventSource`] yields
//! [`TransportSignal`]s and exposes a [`ReadyState`]. The HTTP source
//! behaves like a browser `EventSource`:
//!
//! - a non-200 status or a content type other than `text/event-stream`
//!   is fatal: the state becomes `closed` and an error is signalled
//! - a network failure or the end of the response body is not: the state
//!   becomes `connecting`, an error is signalled, and the source retries
//!   after the reconnection time (3 s unless the stream sent `retry:`),
//!   sending `Last-Event-ID` if the stream set an id
//!
//! Network reads run on a spawned tokio task that forwards signals over
//! an unbounded channel, so `open` fails outside a tokio runtime.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use futures::StreamExt;
use geosse_types::{ReadyState, SseEvent};
use reqwest::header::{ACCEPT, CACHE_CONTROL, CONTENT_TYPE, HeaderValue};
use reqwest::{StatusCode, Url};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::TransportError;
use crate::sse::SseParser;

/// Reconnection time used until the stream sends `retry:`.
pub const DEFAULT_RETRY: Duration = Duration::from_millis(3000);

/// Header carrying the id of the last event seen on a resumed stream.
const LAST_EVENT_ID: &str = "Last-Event-ID";

/// MIME type a stream response must declare.
const EVENT_STREAM_MIME: &str = "text/event-stream";

/// A lifecycle signal from an event source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportSignal {
    /// The connection was established.
    Open,
    /// A complete event arrived.
    Event(SseEvent),
    /// The connection failed; inspect the ready state to see whether the
    /// source will retry on its own.
    Error,
}

/// One open event-stream connection.
pub trait EventSource: Send {
    /// Wait for the next signal. `None` once the source is closed or has
    /// stopped for good.
    fn next_signal(&mut self) -> impl Future<Output = Option<TransportSignal>> + Send;

    /// Current ready state.
    fn ready_state(&self) -> ReadyState;

    /// Close the connection. No further signals are delivered.
    fn close(&mut self);

    /// The URL this source connects to.
    fn url(&self) -> &str;
}

/// Something that can open event-stream connections.
pub trait EventTransport {
    /// The connection type produced by [`EventTransport::open`].
    type Source: EventSource;

    /// Start connecting to `url`.
    ///
    /// Returns as soon as the connection attempt is under way; the outcome
    /// is reported through the source's signals.
    fn open(&self, url: &str) -> Result<Self::Source, TransportError>;
}

/// HTTP transport built on `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    default_retry: Duration,
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpTransport {
    /// Create a transport with a fresh `reqwest` client.
    pub fn new() -> Self {
        Self::with_client(reqwest::Client::new())
    }

    /// Create a transport around an existing client.
    pub const fn with_client(client: reqwest::Client) -> Self {
        Self {
            client,
            default_retry: DEFAULT_RETRY,
        }
    }

    /// Override the reconnection time used before the stream sends `retry:`.
    #[must_use]
    pub const fn with_default_retry(mut self, retry: Duration) -> Self {
        self.default_retry = retry;
        self
    }
}

impl EventTransport for HttpTransport {
    type Source = HttpEventSource;

    fn open(&self, url: &str) -> Result<Self::Source, TransportError> {
        let parsed = Url::parse(url).map_err(|e| TransportError::InvalidUrl {
            url: url.to_owned(),
            message: e.to_string(),
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(TransportError::InvalidUrl {
                url: url.to_owned(),
                message: format!("unsupported scheme {}", parsed.scheme()),
            });
        }

        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| TransportError::Connection(format!("no tokio runtime: {e}")))?;

        let state = Arc::new(AtomicU8::new(ReadyState::Connecting.as_u8()));
        let (tx, rx) = mpsc::unbounded_channel();
        let task = runtime.spawn(drive_stream(
            self.client.clone(),
            parsed,
            Arc::clone(&state),
            tx,
            self.default_retry,
        ));

        debug!(url = url, "event source opened");
        Ok(HttpEventSource {
            url: url.to_owned(),
            state,
            signals: rx,
            task,
            closed: false,
        })
    }
}

/// An event-stream connection over HTTP.
#[derive(Debug)]
pub struct HttpEventSource {
    url: String,
    state: Arc<AtomicU8>,
    signals: mpsc::UnboundedReceiver<TransportSignal>,
    task: JoinHandle<()>,
    closed: bool,
}

impl EventSource for HttpEventSource {
    async fn next_signal(&mut self) -> Option<TransportSignal> {
        if self.closed {
            return None;
        }
        self.signals.recv().await
    }

    fn ready_state(&self) -> ReadyState {
        if self.closed {
            return ReadyState::Closed;
        }
        ReadyState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.state.store(ReadyState::Closed.as_u8(), Ordering::Release);
        self.task.abort();
        self.signals.close();
        debug!(url = self.url, "event source closed");
    }

    fn url(&self) -> &str {
        &self.url
    }
}

impl Drop for HttpEventSource {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Whether a `Content-Type` header value names an event stream.
fn is_event_stream(content_type: Option<&HeaderValue>) -> bool {
    content_type
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .is_some_and(|essence| essence.trim().eq_ignore_ascii_case(EVENT_STREAM_MIME))
}

fn set_state(state: &AtomicU8, value: ReadyState) {
    state.store(value.as_u8(), Ordering::Release);
}

/// Connection loop of one [`HttpEventSource`].
///
/// Returns when the connection fails fatally or the receiving side is
/// gone.
async fn drive_stream(
    client: reqwest::Client,
    url: Url,
    state: Arc<AtomicU8>,
    tx: mpsc::UnboundedSender<TransportSignal>,
    mut retry: Duration,
) {
    let mut last_event_id: Option<String> = None;

    loop {
        let mut request = client
            .get(url.clone())
            .header(ACCEPT, EVENT_STREAM_MIME)
            .header(CACHE_CONTROL, "no-cache");
        if let Some(id) = last_event_id.as_deref().filter(|id| !id.is_empty()) {
            request = request.header(LAST_EVENT_ID, id);
        }

        match request.send().await {
            Ok(response) => {
                let status = response.status();
                if status != StatusCode::OK
                    || !is_event_stream(response.headers().get(CONTENT_TYPE))
                {
                    warn!(
                        url = %url,
                        status = %status,
                        "event stream refused, closing"
                    );
                    set_state(&state, ReadyState::Closed);
                    let _ = tx.send(TransportSignal::Error);
                    return;
                }

                set_state(&state, ReadyState::Open);
                info!(url = %url, "event stream open");
                if tx.send(TransportSignal::Open).is_err() {
                    return;
                }

                let mut parser = SseParser::new().with_last_event_id(last_event_id.take());
                let mut body = response.bytes_stream();
                while let Some(chunk) = body.next().await {
                    match chunk {
                        Ok(bytes) => {
                            for event in parser.feed(&bytes) {
                                if tx.send(TransportSignal::Event(event)).is_err() {
                                    return;
                                }
                            }
                        }
                        Err(e) => {
                            warn!(url = %url, error = %e, "event stream read failed");
                            break;
                        }
                    }
                }

                last_event_id = parser.last_event_id().map(ToOwned::to_owned);
                if let Some(requested) = parser.retry() {
                    retry = requested;
                }
                debug!(url = %url, "event stream ended");
            }
            Err(e) => {
                warn!(url = %url, error = %e, "event stream request failed");
            }
        }

        set_state(&state, ReadyState::Connecting);
        if tx.send(TransportSignal::Error).is_err() {
            return;
        }
        debug!(url = %url, retry_ms = retry.as_millis(), "re-establishing event stream");
        tokio::time::sleep(retry).await;
        if tx.is_closed() {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_type_check() {
        let plain = HeaderValue::from_static("text/event-stream");
        let with_charset = HeaderValue::from_static("Text/Event-Stream; charset=utf-8");
        let json = HeaderValue::from_static("application/json");
        assert!(is_event_stream(Some(&plain)));
        assert!(is_event_stream(Some(&with_charset)));
        assert!(!is_event_stream(Some(&json)));
        assert!(!is_event_stream(None));
    }

    #[test]
    fn open_requires_a_runtime() {
        let transport = HttpTransport::new();
        assert!(matches!(
            transport.open("http://127.0.0.1:9/events"),
            Err(TransportError::Connection(_))
        ));
    }

    #[tokio::test]
    async fn rejects_invalid_urls() {
        let transport = HttpTransport::new();
        assert!(matches!(
            transport.open("not a url"),
            Err(TransportError::InvalidUrl { .. })
        ));
        assert!(matches!(
            transport.open("ftp://example.com/events"),
            Err(TransportError::InvalidUrl { .. })
        ));
    }

    #[tokio::test]
    async fn closed_source_yields_nothing() {
        let transport = HttpTransport::new();
        let source = transport.open("http://127.0.0.1:9/events");
        assert!(source.is_ok());
        if let Ok(mut source) = source {
            assert_eq!(source.url(), "http://127.0.0.1:9/events");
            source.close();
            assert_eq!(source.ready_state(), ReadyState::Closed);
            assert_eq!(source.next_signal().await, None);
        }
    }
}
