//! Navigation calls and client-side wait semantics.
//!
//! The protocol does not reliably push "navigation complete" in every case,
//! so readiness is polled. `wait_for_load` is best-effort: its deadline
//! elapsing is silent. `wait_for` reports a boolean and never raises on
//! timeout. Callers that need a hard guarantee pair the two.

use std::time::Duration;

use serde_json::{Value, json};
use tokio::time::Instant;

use crate::error::{Error, Result};
use crate::protocol::observation::EvalResult;
use crate::protocol::{Browser, PageId};

/// What [`Browser::wait_for`] polls for. At least one of the two fields
/// should be set; an empty condition trivially never matches.
#[derive(Debug, Clone, Default)]
pub struct WaitCondition {
    /// Substring to look for in the page's visible text.
    pub text: Option<String>,
    /// CSS selector that must match at least one element.
    pub selector: Option<String>,
}

impl WaitCondition {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Default::default()
        }
    }

    pub fn selector(selector: impl Into<String>) -> Self {
        Self {
            selector: Some(selector.into()),
            ..Default::default()
        }
    }
}

impl Browser {
    /// Navigate a page to a URL and wait for document readiness.
    pub async fn goto(&self, page: PageId, url: &str) -> Result<()> {
        let (_, session) = self.resolve_page(page).await?;

        let resp = self
            .conn
            .send_on("Page.navigate", json!({"url": url}), Some(&session))
            .await?;
        if let Some(error_text) = resp.get("errorText").and_then(Value::as_str) {
            if !error_text.is_empty() {
                return Err(Error::Navigation(error_text.to_string()));
            }
        }

        self.wait_for_load_on(&session, self.options.load_timeout)
            .await
    }

    /// Reload the page and wait for document readiness.
    pub async fn reload(&self, page: PageId) -> Result<()> {
        let (_, session) = self.resolve_page(page).await?;
        self.conn
            .send_on("Page.reload", json!({}), Some(&session))
            .await?;
        self.wait_for_load_on(&session, self.options.load_timeout)
            .await
    }

    /// Go back one entry in the page's history.
    ///
    /// Returns `false` without navigating when already at the oldest entry.
    pub async fn go_back(&self, page: PageId) -> Result<bool> {
        self.history_step(page, -1).await
    }

    /// Go forward one entry in the page's history.
    ///
    /// Returns `false` without navigating when already at the newest entry.
    pub async fn go_forward(&self, page: PageId) -> Result<bool> {
        self.history_step(page, 1).await
    }

    async fn history_step(&self, page: PageId, delta: i64) -> Result<bool> {
        let (_, session) = self.resolve_page(page).await?;

        let resp = self
            .conn
            .send_on("Page.getNavigationHistory", json!({}), Some(&session))
            .await?;
        let current = resp
            .get("currentIndex")
            .and_then(Value::as_i64)
            .ok_or_else(|| {
                Error::Protocol("Page.getNavigationHistory returned no currentIndex".to_string())
            })?;
        let entries = resp
            .get("entries")
            .and_then(Value::as_array)
            .ok_or_else(|| {
                Error::Protocol("Page.getNavigationHistory returned no entries".to_string())
            })?;

        let target = current + delta;
        if target < 0 || target as usize >= entries.len() {
            return Ok(false);
        }

        let entry_id = entries[target as usize]
            .get("id")
            .and_then(Value::as_i64)
            .ok_or_else(|| Error::Protocol("history entry has no id".to_string()))?;

        self.conn
            .send_on(
                "Page.navigateToHistoryEntry",
                json!({"entryId": entry_id}),
                Some(&session),
            )
            .await?;

        self.wait_for_load_on(&session, self.options.load_timeout)
            .await?;
        Ok(true)
    }

    /// Wait until the page's document reports readiness, or the deadline
    /// elapses.
    pub async fn wait_for_load(&self, page: PageId) -> Result<()> {
        let (_, session) = self.resolve_page(page).await?;
        self.wait_for_load_on(&session, self.options.load_timeout)
            .await
    }

    /// Poll `document.readyState` until "complete" or the deadline.
    ///
    /// The first poll is delayed slightly so the navigation has a chance to
    /// begin. Protocol-level evaluation failures during the navigation
    /// teardown window mean "not ready yet" and are swallowed; transport
    /// failures still propagate. Deadline expiry returns `Ok(())` —
    /// completion is best-effort, and callers wanting a guarantee follow up
    /// with [`Browser::wait_for`].
    pub(crate) async fn wait_for_load_on(&self, session: &str, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        tokio::time::sleep(self.options.load_poll_initial_delay).await;

        loop {
            match self.eval_on(session, "document.readyState").await {
                Ok(EvalResult::Value(v)) if v.as_str() == Some("complete") => return Ok(()),
                Ok(_) => {}
                // The evaluation context is torn down mid-navigation; a CDP
                // error here is expected transient noise, nothing else is.
                Err(Error::Cdp { code, message }) => {
                    tracing::trace!(code, %message, "readiness poll failed mid-navigation");
                }
                Err(e) => return Err(e),
            }

            if Instant::now() >= deadline {
                tracing::debug!(?timeout, "readiness deadline elapsed, continuing");
                return Ok(());
            }
            tokio::time::sleep(self.options.load_poll_interval).await;
        }
    }

    /// Poll until text or a selector appears in the page.
    ///
    /// Returns `true` on the first match and `false` once `timeout` elapses.
    /// An empty condition logs a warning and reports `false` immediately.
    pub async fn wait_for(
        &self,
        page: PageId,
        condition: WaitCondition,
        timeout: Duration,
    ) -> Result<bool> {
        if condition.text.is_none() && condition.selector.is_none() {
            tracing::warn!("wait_for called with neither text nor selector");
            return Ok(false);
        }

        let (_, session) = self.resolve_page(page).await?;
        let deadline = Instant::now() + timeout;

        loop {
            if let Some(text) = &condition.text {
                let script = format!(
                    "!!document.body && document.body.innerText.includes({})",
                    serde_json::to_string(text)?
                );
                if self.probe(&session, &script).await? {
                    return Ok(true);
                }
            }
            if let Some(selector) = &condition.selector {
                let script = format!(
                    "document.querySelector({}) !== null",
                    serde_json::to_string(selector)?
                );
                if self.probe(&session, &script).await? {
                    return Ok(true);
                }
            }

            if Instant::now() >= deadline {
                return Ok(false);
            }
            tokio::time::sleep(self.options.wait_for_poll_interval).await;
        }
    }

    /// Evaluate a boolean probe, treating script exceptions and transient
    /// protocol failures as "no match".
    pub(crate) async fn probe(&self, session: &str, script: &str) -> Result<bool> {
        match self.eval_on(session, script).await {
            Ok(EvalResult::Value(v)) => Ok(v.as_bool().unwrap_or(false)),
            Ok(EvalResult::Exception(msg)) => {
                tracing::trace!(%msg, "probe threw");
                Ok(false)
            }
            Err(Error::Cdp { code, message }) => {
                tracing::trace!(code, %message, "probe failed at protocol level");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wait_condition_constructors() {
        let text = WaitCondition::text("Welcome");
        assert_eq!(text.text.as_deref(), Some("Welcome"));
        assert!(text.selector.is_none());

        let selector = WaitCondition::selector("#main");
        assert_eq!(selector.selector.as_deref(), Some("#main"));
        assert!(selector.text.is_none());
    }

    #[test]
    fn test_text_probe_script_escapes_quotes() {
        // The probe embeds caller text as a JSON string literal.
        let text = r#"say "hi" </script>"#;
        let escaped = serde_json::to_string(text).unwrap();
        let script = format!(
            "!!document.body && document.body.innerText.includes({escaped})"
        );
        assert!(script.contains(r#"\"hi\""#));
        assert!(!script.contains(r#"includes(say"#));
    }
}
