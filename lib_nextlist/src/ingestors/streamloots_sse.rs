//! # Streamloots Alert Stream Ingestor
//!
//! Long-lived HTTP client for the Streamloots `media-stream` alert feed.
//! Location: lib_nextlist/src/ingestors/streamloots_sse.rs
//!
//! The feed is a line-oriented event stream. Each data line carries a 6-character
//! framing prefix (`data: `) followed by a JSON alert; marker-only lines (`:`) are
//! heartbeats sent at least every 30 seconds.
//!
//! ## Session lifecycle:
//! 1. Open a streaming GET and wait for the response headers (bounded by the
//!    read-idle timeout).
//! 2. Read lines one at a time, each read bounded by the read-idle timeout.
//!    The first line read marks the session healthy and resets the attempt
//!    counter.
//! 3. Hand every framed payload to the [`LineHandler`] and await it before
//!    reading the next line, so alerts are handled in arrival order. Handler
//!    errors are logged with the raw payload and never end the session.
//! 4. Any transport failure ends the session; the retry loop sleeps
//!    `retry_wait` and reconnects until `max_attempts` consecutive attempts
//!    have failed.

use std::io;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::TryStreamExt;
use reqwest::header::ACCEPT;
use thiserror::Error;
use tokio::io::AsyncBufReadExt;
use tokio_util::io::StreamReader;

/// Base URL of the Streamloots alert widgets.
pub const STREAMLOOTS_ALERTS_URL: &str = "https://widgets.streamloots.com/alerts/";
/// Length of the framing marker in front of every data line.
const FRAME_PREFIX_CHARS: usize = 6;
/// Payload of a heartbeat line once the prefix is gone.
const KEEP_ALIVE: &str = ":";

/// Receives framed payloads from the connector, one at a time.
#[async_trait]
pub trait LineHandler: Send {
    /// Handles one framed payload. Errors are logged by the connector together
    /// with the payload and the session continues.
    async fn handle_line(&mut self, payload: &str) -> anyhow::Result<()>;
}

/// Connection settings for the alert stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectorConfig {
    /// Full `media-stream` URL.
    pub endpoint: String,
    /// Consecutive failed attempts before giving up.
    pub max_attempts: u32,
    /// Pause between a failed session and the next attempt.
    pub retry_wait: Duration,
    /// Longest silence tolerated on an open stream.
    pub read_timeout: Duration,
}

impl ConnectorConfig {
    /// Settings for one channel under `base_url` (normally [`STREAMLOOTS_ALERTS_URL`]),
    /// with 3 attempts, a 10s retry wait and a 60s read-idle timeout.
    pub fn for_channel(base_url: &str, channel_id: &str) -> Self {
        let base = base_url.trim_end_matches('/');
        Self {
            endpoint: format!("{base}/{channel_id}/media-stream"),
            max_attempts: 3,
            retry_wait: Duration::from_secs(10),
            read_timeout: Duration::from_secs(60),
        }
    }
}

/// Retry bookkeeping, owned by the connector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionState {
    pub attempts: u32,
    pub max_attempts: u32,
    pub retry_wait_seconds: u64,
}

/// Why a session ended.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Failed to connect to {endpoint}: {source}")]
    Connect {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Feed responded with HTTP {0}")]
    Status(reqwest::StatusCode),

    #[error("No data from the feed for {}s", .0.as_secs_f32())]
    ReadTimeout(Duration),

    #[error("Socket timed out: {0}")]
    SocketTimeout(#[source] io::Error),

    #[error("Feed read error: {0}")]
    Read(#[source] io::Error),

    #[error("Feed stream closed by remote host")]
    Closed,
}

impl SessionError {
    /// Read-idle and socket timeouts, as opposed to hard connection failures.
    pub fn is_timeout(&self) -> bool {
        match self {
            SessionError::ReadTimeout(_) | SessionError::SocketTimeout(_) => true,
            SessionError::Connect { source, .. } => source.is_timeout(),
            _ => false,
        }
    }
}

/// Summary of a retry campaign, returned once the connector gives up.
#[derive(Debug, Default)]
pub struct RetryReport {
    /// Connection attempts made.
    pub sessions: u32,
    /// Retry waits slept through.
    pub retry_sleeps: u32,
    /// Sessions ended by a timeout.
    pub timeouts: u32,
    /// Framed payloads handed to the handler.
    pub payloads: u64,
    /// Payloads the handler failed on.
    pub handler_errors: u64,
    /// The error that ended the final session.
    pub last_error: Option<SessionError>,
}

/// Strips the framing prefix from a raw line.
///
/// Returns `None` for empty lines and heartbeats. Lines of 6 characters or
/// fewer are passed through unchanged.
pub fn frame_payload(line: &str) -> Option<&str> {
    if line.is_empty() {
        return None;
    }
    let payload = match line.char_indices().nth(FRAME_PREFIX_CHARS) {
        Some((start, _)) => &line[start..],
        None => line,
    };
    if payload.trim() == KEEP_ALIVE {
        return None;
    }
    Some(payload)
}

/// Resilient client for one Streamloots alert stream.
pub struct StreamlootsConnector {
    config: ConnectorConfig,
    client: reqwest::Client,
    state: ConnectionState,
}

impl StreamlootsConnector {
    /// Creates a connector with its own HTTP client.
    pub fn new(config: ConnectorConfig) -> reqwest::Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.read_timeout)
            .build()?;
        Ok(Self::with_client(config, client))
    }

    /// Creates a connector around an existing HTTP client.
    pub fn with_client(config: ConnectorConfig, client: reqwest::Client) -> Self {
        let state = ConnectionState {
            attempts: 0,
            max_attempts: config.max_attempts,
            retry_wait_seconds: config.retry_wait.as_secs(),
        };
        Self { config, client, state }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Runs sessions until `max_attempts` consecutive attempts have failed.
    ///
    /// Never returns early on success: a healthy session resets the counter,
    /// so this only returns once the feed stays unreachable.
    pub async fn run_with_retry<H: LineHandler>(&mut self, handler: &mut H) -> RetryReport {
        self.state.attempts = 0;
        let mut report = RetryReport::default();

        loop {
            self.state.attempts += 1;
            report.sessions += 1;
            log::info!(
                "Connecting to Streamloots feed: {} (attempt {}/{})",
                self.config.endpoint,
                self.state.attempts,
                self.state.max_attempts
            );

            let err = self.run_session(handler, &mut report).await;
            if err.is_timeout() {
                report.timeouts += 1;
                log::warn!("Streamloots feed timed out: {err}. Reconnecting...");
            } else {
                log::error!("Streamloots feed session ended: {err}");
            }
            report.last_error = Some(err);

            if self.state.attempts >= self.state.max_attempts {
                break;
            }

            log::info!("Retrying Streamloots connection in {}s...", self.state.retry_wait_seconds);
            tokio::time::sleep(self.config.retry_wait).await;
            report.retry_sleeps += 1;
        }

        log::error!(
            "Failed to establish Streamloots connection after {} attempts.",
            self.state.attempts
        );
        report
    }

    /// One connect-and-read cycle. Always ends in an error; a feed that
    /// stays healthy keeps this running indefinitely.
    async fn run_session<H: LineHandler>(&mut self, handler: &mut H, report: &mut RetryReport) -> SessionError {
        let request = self
            .client
            .get(&self.config.endpoint)
            .header(ACCEPT, "text/event-stream")
            .send();
        let response = match tokio::time::timeout(self.config.read_timeout, request).await {
            Err(_) => return SessionError::ReadTimeout(self.config.read_timeout),
            Ok(Err(source)) => {
                return SessionError::Connect {
                    endpoint: self.config.endpoint.clone(),
                    source,
                }
            }
            Ok(Ok(response)) => response,
        };
        if !response.status().is_success() {
            return SessionError::Status(response.status());
        }
        log::info!("Connected to Streamloots feed.");

        let body = Box::pin(response.bytes_stream().map_err(io::Error::other));
        let mut lines = StreamReader::new(body).split(b'\n');
        let mut healthy = false;

        loop {
            let raw = match tokio::time::timeout(self.config.read_timeout, lines.next_segment()).await {
                Err(_) => return SessionError::ReadTimeout(self.config.read_timeout),
                Ok(Err(e)) => return classify_read_error(e),
                Ok(Ok(None)) => return SessionError::Closed,
                Ok(Ok(Some(raw))) => raw,
            };

            if !healthy {
                healthy = true;
                self.state.attempts = 0;
                log::debug!("Streamloots feed is live, retry budget restored.");
            }

            let line = match std::str::from_utf8(&raw) {
                Ok(line) => line.trim_end_matches('\r'),
                Err(e) => {
                    report.handler_errors += 1;
                    log::error!(
                        "Error {e} decoding streamloots message: {}",
                        String::from_utf8_lossy(&raw)
                    );
                    continue;
                }
            };
            let Some(payload) = frame_payload(line) else {
                continue;
            };

            report.payloads += 1;
            log::debug!("{payload}");
            if let Err(e) = handler.handle_line(payload).await {
                report.handler_errors += 1;
                log::error!("Error {e:#} parsing streamloots message: {payload}");
            }
        }
    }
}

fn classify_read_error(e: io::Error) -> SessionError {
    let reqwest_timeout = e
        .get_ref()
        .and_then(|inner| inner.downcast_ref::<reqwest::Error>())
        .is_some_and(reqwest::Error::is_timeout);
    if e.kind() == io::ErrorKind::TimedOut || reqwest_timeout {
        SessionError::SocketTimeout(e)
    } else {
        SessionError::Read(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    #[derive(Default)]
    struct Recorder {
        payloads: Vec<String>,
    }

    #[async_trait]
    impl LineHandler for Recorder {
        async fn handle_line(&mut self, payload: &str) -> anyhow::Result<()> {
            self.payloads.push(payload.to_string());
            if payload == "bad" {
                anyhow::bail!("malformed payload");
            }
            Ok(())
        }
    }

    async fn read_request(socket: &mut TcpStream) {
        let mut request = Vec::new();
        let mut buf = [0u8; 1024];
        while !request.windows(4).any(|w| w == b"\r\n\r\n") {
            match socket.read(&mut buf).await {
                Ok(0) | Err(_) => return,
                Ok(n) => request.extend_from_slice(&buf[..n]),
            }
        }
    }

    /// Serves exactly one connection, then stops listening so later attempts are refused.
    async fn serve_once(status: &'static str, body: &'static str, hold_open: bool) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            drop(listener);
            read_request(&mut socket).await;
            let head = format!("HTTP/1.1 {status}\r\ncontent-type: text/event-stream\r\nconnection: close\r\n\r\n");
            socket.write_all(head.as_bytes()).await.unwrap();
            socket.write_all(body.as_bytes()).await.unwrap();
            socket.flush().await.unwrap();
            if hold_open {
                tokio::time::sleep(Duration::from_secs(30)).await;
            }
        });
        addr
    }

    fn connector(addr: SocketAddr, max_attempts: u32) -> StreamlootsConnector {
        let config = ConnectorConfig {
            endpoint: format!("http://{addr}/alerts/channel/media-stream"),
            max_attempts,
            retry_wait: Duration::from_millis(10),
            read_timeout: Duration::from_millis(300),
        };
        let client = reqwest::Client::builder().no_proxy().build().unwrap();
        StreamlootsConnector::with_client(config, client)
    }

    #[test]
    fn frames_data_lines() {
        assert_eq!(frame_payload(r#"data: {"a":1}"#), Some(r#"{"a":1}"#));
        assert_eq!(frame_payload("data: :"), None);
        assert_eq!(frame_payload("data:  : "), None);
        assert_eq!(frame_payload(":"), None);
        assert_eq!(frame_payload(""), None);
        assert_eq!(frame_payload("short"), Some("short"));
        assert_eq!(frame_payload("123456"), Some("123456"));
        assert_eq!(frame_payload("1234567"), Some("7"));
        assert_eq!(frame_payload("dätä: é"), Some("é"));
    }

    #[test]
    fn endpoint_for_channel() {
        let config = ConnectorConfig::for_channel(STREAMLOOTS_ALERTS_URL, "abc123");
        assert_eq!(config.endpoint, "https://widgets.streamloots.com/alerts/abc123/media-stream");
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.read_timeout, Duration::from_secs(60));
    }

    #[tokio::test]
    async fn handler_errors_do_not_end_the_session() {
        let body = "data: {\"a\":1}\n\ndata: :\r\ndata: bad\ndata: {\"b\":2}\n";
        let addr = serve_once("200 OK", body, false).await;
        let mut connector = connector(addr, 1);
        let mut recorder = Recorder::default();

        let report = connector.run_with_retry(&mut recorder).await;

        assert_eq!(recorder.payloads, vec![r#"{"a":1}"#, "bad", r#"{"b":2}"#]);
        assert_eq!(report.payloads, 3);
        assert_eq!(report.handler_errors, 1);
        // Closed stream after a healthy session, then one refused reconnect.
        assert_eq!(report.sessions, 2);
        assert_eq!(report.retry_sleeps, 1);
        assert!(matches!(report.last_error, Some(SessionError::Connect { .. })));
    }

    #[tokio::test]
    async fn silent_session_times_out_and_retries_once() {
        let addr = serve_once("200 OK", "data: :\n", true).await;
        let mut connector = connector(addr, 1);
        let mut recorder = Recorder::default();

        let report = connector.run_with_retry(&mut recorder).await;

        assert!(recorder.payloads.is_empty());
        assert_eq!(report.timeouts, 1);
        assert_eq!(report.sessions, 2);
        assert_eq!(report.retry_sleeps, 1);
        assert_eq!(connector.state().attempts, 1);
    }

    #[tokio::test]
    async fn silent_after_headers_does_not_restore_attempts() {
        let addr = serve_once("200 OK", "", true).await;
        let mut connector = connector(addr, 2);
        let mut recorder = Recorder::default();

        let report = connector.run_with_retry(&mut recorder).await;

        assert_eq!(report.timeouts, 1);
        assert_eq!(report.sessions, 2);
        assert_eq!(connector.state().attempts, connector.state().max_attempts);
    }

    #[test]
    fn socket_timeouts_are_told_apart_from_read_errors() {
        let err = classify_read_error(io::Error::new(io::ErrorKind::TimedOut, "socket timed out"));
        assert!(matches!(err, SessionError::SocketTimeout(_)));
        assert!(err.is_timeout());

        let err = classify_read_error(io::Error::new(io::ErrorKind::ConnectionReset, "reset by peer"));
        assert!(matches!(err, SessionError::Read(_)));
        assert!(!err.is_timeout());
    }

    #[tokio::test]
    async fn unreachable_feed_exhausts_attempts() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let mut connector = connector(addr, 3);
        let mut recorder = Recorder::default();

        let report = connector.run_with_retry(&mut recorder).await;

        assert_eq!(report.sessions, 3);
        assert_eq!(report.retry_sleeps, 2);
        assert_eq!(connector.state().attempts, 3);
        assert!(matches!(report.last_error, Some(SessionError::Connect { .. })));
    }

    #[tokio::test]
    async fn error_status_ends_the_session() {
        let addr = serve_once("503 Service Unavailable", "", false).await;
        let mut connector = connector(addr, 1);
        let mut recorder = Recorder::default();

        let report = connector.run_with_retry(&mut recorder).await;

        assert_eq!(report.sessions, 1);
        assert_eq!(report.retry_sleeps, 0);
        assert!(matches!(
            report.last_error,
            Some(SessionError::Status(status)) if status.as_u16() == 503
        ));
    }
}
