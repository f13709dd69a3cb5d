//! Page/session orchestrator over one debugging connection.
//!
//! Maintains the mapping between caller-visible logical pages and the live,
//! churn-prone set of browser targets, and caches protocol sessions per
//! target. Navigation, observation, input, and download operations live in
//! sibling modules as further `impl Browser` blocks.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex as ParkingLotMutex;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::task::JoinHandle;

use crate::api::ConnectOptions;
use crate::cdp::CdpConnection;
use crate::error::{Error, Result};
use crate::protocol::registry::{PageRegistry, is_internal_url};
use crate::protocol::{PageId, PageInfo, TargetInfo};

/// Host window placement and state, as reported by the browser.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WindowBounds {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub left: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<i64>,
    /// "normal", "minimized", "maximized", or "fullscreen".
    #[serde(rename = "windowState", skip_serializing_if = "Option::is_none")]
    pub window_state: Option<String>,
}

/// A host browser window. Always read live, never cached.
#[derive(Debug, Clone)]
pub struct WindowInfo {
    pub window_id: i64,
    pub bounds: WindowBounds,
}

impl WindowInfo {
    /// Whether the window is currently visible on screen.
    pub fn visible(&self) -> bool {
        self.bounds.window_state.as_deref() != Some("minimized")
    }
}

/// Product and protocol strings from `Browser.getVersion`.
#[derive(Debug, Clone, Deserialize)]
pub struct BrowserVersion {
    #[serde(rename = "protocolVersion")]
    pub protocol_version: String,
    pub product: String,
    #[serde(default)]
    pub revision: String,
    #[serde(rename = "userAgent", default)]
    pub user_agent: String,
}

/// Page-oriented automation client for one browser instance.
///
/// Owns the debugging connection exclusively. Logical page handles returned
/// by [`list_pages`] stay valid until the underlying tab closes; sessions
/// are attached lazily and cached per target.
///
/// [`list_pages`]: Browser::list_pages
pub struct Browser {
    pub(crate) conn: Arc<CdpConnection>,
    pub(crate) options: ConnectOptions,
    registry: Arc<ParkingLotMutex<PageRegistry>>,
    sessions: Arc<ParkingLotMutex<HashMap<String, String>>>,
    detach_watcher: JoinHandle<()>,
}

impl std::fmt::Debug for Browser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Browser")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl Browser {
    /// Discover the debugging endpoint and connect to it.
    pub async fn connect(options: ConnectOptions) -> Result<Self> {
        let conn = CdpConnection::connect(&options.host, options.port).await?;
        Ok(Self::from_connection(conn, options))
    }

    /// Connect to an explicit WebSocket debugger URL with default options.
    pub async fn connect_url(ws_url: &str) -> Result<Self> {
        Self::connect_url_with(ws_url, ConnectOptions::default()).await
    }

    /// Connect to an explicit WebSocket debugger URL.
    pub async fn connect_url_with(ws_url: &str, options: ConnectOptions) -> Result<Self> {
        let conn = CdpConnection::connect_url(ws_url).await?;
        Ok(Self::from_connection(conn, options))
    }

    fn from_connection(conn: CdpConnection, options: ConnectOptions) -> Self {
        let conn = Arc::new(conn);
        let sessions: Arc<ParkingLotMutex<HashMap<String, String>>> =
            Arc::new(ParkingLotMutex::new(HashMap::new()));

        let detach_watcher = Self::spawn_detach_watcher(&conn, Arc::clone(&sessions));

        Self {
            conn,
            options,
            registry: Arc::new(ParkingLotMutex::new(PageRegistry::default())),
            sessions,
            detach_watcher,
        }
    }

    /// Evict a session from the cache the moment the browser reports its
    /// target detached, regardless of which operation triggered the detach.
    fn spawn_detach_watcher(
        conn: &Arc<CdpConnection>,
        sessions: Arc<ParkingLotMutex<HashMap<String, String>>>,
    ) -> JoinHandle<()> {
        let mut sub = conn.subscribe("Target.detachedFromTarget");
        tokio::spawn(async move {
            while let Some(params) = sub.recv().await {
                let Some(detached) = params.get("sessionId").and_then(Value::as_str) else {
                    continue;
                };
                let mut sessions = sessions.lock();
                let before = sessions.len();
                sessions.retain(|_, session| session != detached);
                if sessions.len() != before {
                    tracing::debug!(session = detached, "session detached, evicted from cache");
                }
            }
        })
    }

    /// Access the underlying protocol connection.
    pub fn connection(&self) -> &Arc<CdpConnection> {
        &self.conn
    }

    /// Tear down the connection, rejecting all in-flight calls.
    pub async fn disconnect(&self) {
        self.detach_watcher.abort();
        self.conn.disconnect().await;
    }

    // -----------------------------------------------------------------------
    // Registry & resolution
    // -----------------------------------------------------------------------

    /// Enumerate live tabs and reconcile the logical-page registry.
    ///
    /// Internal browser UI surfaces (chrome://, devtools://, extensions) are
    /// filtered out. Pages whose target disappeared are purged; newly
    /// observed targets get fresh ids. This is the only method that performs
    /// a full reconciliation — everything else consults the cache and falls
    /// back to one refresh on a miss.
    pub async fn list_pages(&self) -> Result<Vec<PageInfo>> {
        let resp = self.conn.send("Target.getTargets", json!({})).await?;
        let infos: Vec<TargetInfo> =
            serde_json::from_value(resp.get("targetInfos").cloned().unwrap_or(json!([])))?;

        let content: Vec<TargetInfo> = infos
            .into_iter()
            .filter(|t| t.kind == "page" && !is_internal_url(&t.url))
            .collect();

        Ok(self.registry.lock().reconcile(&content))
    }

    /// Cached metadata for one page, refreshing once on a miss.
    pub async fn page_info(&self, page: PageId) -> Result<PageInfo> {
        if let Some(info) = self.registry.lock().get(page) {
            return Ok(info);
        }
        self.list_pages().await?;
        self.registry.lock().get(page).ok_or(Error::UnknownPage(page))
    }

    /// Resolve a logical page to its live target and an attached session.
    pub async fn resolve_page(&self, page: PageId) -> Result<(PageInfo, String)> {
        let info = self.page_info(page).await?;
        let session = self.attach_to_page(&info.target_id).await?;
        Ok((info, session))
    }

    /// Attach to a target, enabling the domains every operation relies on.
    ///
    /// At most one session is created per target. All four enables must
    /// succeed before the session is cached; partial enablement is not a
    /// valid state and caches nothing.
    pub async fn attach_to_page(&self, target_id: &str) -> Result<String> {
        if let Some(session) = self.sessions.lock().get(target_id).cloned() {
            return Ok(session);
        }

        let resp = self
            .conn
            .send(
                "Target.attachToTarget",
                json!({"targetId": target_id, "flatten": true}),
            )
            .await?;
        let session = resp
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                Error::Protocol("Target.attachToTarget returned no sessionId".to_string())
            })?
            .to_string();

        tokio::try_join!(
            self.enable_domain(&session, "Page"),
            self.enable_domain(&session, "DOM"),
            self.enable_domain(&session, "Runtime"),
            self.enable_domain(&session, "Accessibility"),
        )?;

        self.sessions
            .lock()
            .insert(target_id.to_string(), session.clone());
        tracing::debug!(target = target_id, session = %session, "attached to target");
        Ok(session)
    }

    async fn enable_domain(&self, session: &str, domain: &str) -> Result<()> {
        self.conn
            .send_on(&format!("{domain}.enable"), json!({}), Some(session))
            .await?;
        Ok(())
    }

    /// Open a new tab and return its logical page.
    pub async fn new_page(&self, url: &str) -> Result<PageInfo> {
        let resp = self
            .conn
            .send("Target.createTarget", json!({"url": url}))
            .await?;
        let target_id = resp
            .get("targetId")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                Error::Protocol("Target.createTarget returned no targetId".to_string())
            })?
            .to_string();

        self.list_pages().await?;
        self.registry
            .lock()
            .find_by_target(&target_id)
            .ok_or_else(|| {
                Error::Protocol(format!("created target {target_id} absent from tab list"))
            })
    }

    /// Close the underlying tab and drop the logical page.
    pub async fn close_page(&self, page: PageId) -> Result<()> {
        let info = self.page_info(page).await?;
        self.conn
            .send("Target.closeTarget", json!({"targetId": info.target_id}))
            .await?;
        self.sessions.lock().remove(&info.target_id);
        self.registry.lock().remove(page);
        Ok(())
    }

    /// Bring the page's tab to the front.
    pub async fn activate_page(&self, page: PageId) -> Result<()> {
        let info = self.page_info(page).await?;
        self.conn
            .send("Target.activateTarget", json!({"targetId": info.target_id}))
            .await?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Windows
    // -----------------------------------------------------------------------

    /// The host window containing a page. Read live on every call.
    pub async fn window_for_page(&self, page: PageId) -> Result<WindowInfo> {
        let info = self.page_info(page).await?;
        let resp = self
            .conn
            .send(
                "Browser.getWindowForTarget",
                json!({"targetId": info.target_id}),
            )
            .await?;

        let window_id = resp
            .get("windowId")
            .and_then(Value::as_i64)
            .ok_or_else(|| {
                Error::Protocol("Browser.getWindowForTarget returned no windowId".to_string())
            })?;
        let bounds = match resp.get("bounds") {
            Some(b) => serde_json::from_value(b.clone())?,
            None => WindowBounds::default(),
        };

        Ok(WindowInfo { window_id, bounds })
    }

    /// Move, resize, or change the state of a host window.
    pub async fn set_window_bounds(&self, window_id: i64, bounds: WindowBounds) -> Result<()> {
        self.conn
            .send(
                "Browser.setWindowBounds",
                json!({"windowId": window_id, "bounds": serde_json::to_value(bounds)?}),
            )
            .await?;
        Ok(())
    }

    /// Product and protocol version strings.
    pub async fn version(&self) -> Result<BrowserVersion> {
        let resp = self.conn.send("Browser.getVersion", json!({})).await?;
        Ok(serde_json::from_value(resp)?)
    }
}

impl Drop for Browser {
    fn drop(&mut self) {
        self.detach_watcher.abort();
    }
}
