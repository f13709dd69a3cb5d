//! pagedriver: page-oriented browser automation over the Chrome DevTools
//! Protocol.
//!
//! Connects to a running Chromium-family browser's remote-debugging endpoint,
//! multiplexes command/response traffic and asynchronous events over one
//! WebSocket, and exposes logical pages with navigation, observation, input,
//! and download operations on top of the raw protocol.
//!
//! The browser must be started with a debugging port:
//!
//! ```sh
//! chromium --remote-debugging-port=9222
//! ```
//!
//! # Example
//!
//! ```ignore
//! use pagedriver::{Browser, ConnectOptions, WaitCondition};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let browser = Browser::connect(ConnectOptions::default()).await?;
//!
//!     let pages = browser.list_pages().await?;
//!     let page = pages[0].id;
//!
//!     browser.goto(page, "https://example.com").await?;
//!     browser
//!         .wait_for(page, WaitCondition::text("Example Domain"), Duration::from_secs(5))
//!         .await?;
//!
//!     println!("{}", browser.snapshot(page).await?);
//!
//!     browser.click(page, "a", Default::default()).await?;
//!     let png = browser.screenshot(page, Default::default()).await?;
//!     std::fs::write("page.png", png)?;
//!
//!     browser.disconnect().await;
//!     Ok(())
//! }
//! ```
//!
//! # Layering
//!
//! - [`cdp`] owns the connection: endpoint discovery, the WebSocket, request
//!   id correlation, and event fan-out. It knows method names and opaque
//!   session ids, nothing about pages.
//! - [`protocol`] owns pages: the logical-page registry reconciled against
//!   the live tab list, lazy session attachment, and every automation
//!   primitive.

// Internal modules (exposed for integration tests)
#[doc(hidden)]
pub mod cdp;

pub mod api;
mod error;
pub mod protocol;

/// Default port browsers expose with `--remote-debugging-port`.
pub const DEFAULT_DEBUGGING_PORT: u16 = 9222;

// Re-export error types
pub use error::{Error, Result};

// Re-export connection options
pub use api::ConnectOptions;

// Re-export the transport client for embedders that speak raw protocol
pub use cdp::{CdpConnection, EventSubscription};

// Re-export the orchestrator API
pub use protocol::{
    Browser, BrowserVersion, ClickOptions, Download, EvalResult, MouseButton, PageId, PageInfo,
    ScreenshotFormat, ScreenshotOptions, WaitCondition, WindowBounds, WindowInfo,
};
