// Error types for pagedriver

use std::time::Duration;

use thiserror::Error;

use crate::protocol::PageId;

/// Result type alias for pagedriver operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur when driving a browser over the DevTools protocol
#[derive(Debug, Error)]
pub enum Error {
    /// Endpoint discovery or WebSocket handshake failed
    ///
    /// The browser must be running with `--remote-debugging-port` and the
    /// port must be reachable. Details: {0}
    #[error("Failed to connect to debugging endpoint: {0}")]
    ConnectionFailed(String),

    /// A call was made before `connect` completed or after `disconnect`
    #[error("Not connected to a debugging endpoint")]
    NotConnected,

    /// The connection closed while a call was in flight
    #[error("Connection closed while awaiting response")]
    ConnectionClosed,

    /// Transport-level error (WebSocket framing, socket I/O)
    #[error("Transport error: {0}")]
    Transport(String),

    /// The browser answered a command with its `error` field
    #[error("CDP error {code}: {message}")]
    Cdp { code: i64, message: String },

    /// A response or event payload did not have the expected shape
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Logical page id not resolvable, even after one registry refresh
    #[error("Unknown page {0}; the tab may have been closed. Call list_pages to refresh")]
    UnknownPage(PageId),

    /// Navigation was rejected by the browser (e.g. net::ERR_NAME_NOT_RESOLVED)
    #[error("Navigation failed: {0}")]
    Navigation(String),

    /// Every interaction strategy for an element failed
    #[error("Interaction with '{selector}' failed: {detail}")]
    InteractionFailed { selector: String, detail: String },

    /// No matching download completed before the deadline
    #[error("Download did not complete within {elapsed:?}")]
    DownloadTimeout { elapsed: Duration },

    /// The browser reported the download as canceled
    #[error("Download was canceled")]
    DownloadCanceled,

    /// Timeout waiting for an operation
    ///
    /// Names the operation and how long it was given. Navigation-readiness
    /// waits do not raise this; see `Browser::wait_for_load`.
    #[error("Timed out after {elapsed:?} waiting for {operation}")]
    Timeout { operation: String, elapsed: Duration },

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
