//! Synthetic input: clicks, typing, dragging, and dialog handling.
//!
//! Pointer-event dispatch is the primary strategy because it is faithful to
//! real user interaction (hover and focus side effects fire). Elements with
//! nonstandard hit-testing can defeat it, so every pointer path has a
//! script-level fallback that still performs the action.

use serde_json::{Value, json};

use crate::error::{Error, Result};
use crate::protocol::observation::EvalResult;
use crate::protocol::{Browser, PageId};

/// Mouse button for click dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MouseButton {
    #[default]
    Left,
    Right,
    Middle,
}

impl MouseButton {
    fn as_str(self) -> &'static str {
        match self {
            MouseButton::Left => "left",
            MouseButton::Right => "right",
            MouseButton::Middle => "middle",
        }
    }
}

/// Options for [`Browser::click`].
#[derive(Debug, Clone)]
pub struct ClickOptions {
    pub button: MouseButton,
    pub click_count: u32,
}

impl Default for ClickOptions {
    fn default() -> Self {
        Self {
            button: MouseButton::Left,
            click_count: 1,
        }
    }
}

/// Compute the center point of a content quad (8 coordinate values).
pub(crate) fn center_of_quad(quad: &[f64]) -> Option<(f64, f64)> {
    if quad.len() < 8 {
        return None;
    }
    let xs: Vec<f64> = quad.iter().step_by(2).copied().collect();
    let ys: Vec<f64> = quad.iter().skip(1).step_by(2).copied().collect();
    let min_x = xs.iter().cloned().fold(f64::INFINITY, f64::min);
    let max_x = xs.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let min_y = ys.iter().cloned().fold(f64::INFINITY, f64::min);
    let max_y = ys.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    if max_x <= min_x || max_y <= min_y {
        return None;
    }
    Some(((min_x + max_x) / 2.0, (min_y + max_y) / 2.0))
}

impl Browser {
    /// Find a single element matching a CSS selector.
    ///
    /// Returns `Ok(None)` when nothing matches (the protocol reports node
    /// id 0 for a miss).
    pub(crate) async fn query_selector(
        &self,
        session: &str,
        selector: &str,
    ) -> Result<Option<i64>> {
        let root = self
            .conn
            .send_on("DOM.getDocument", json!({"depth": 0}), Some(session))
            .await?;
        let root_id = root
            .get("root")
            .and_then(|r| r.get("nodeId"))
            .and_then(Value::as_i64)
            .ok_or_else(|| {
                Error::Protocol("DOM.getDocument returned no root nodeId".to_string())
            })?;

        let resp = self
            .conn
            .send_on(
                "DOM.querySelector",
                json!({"nodeId": root_id, "selector": selector}),
                Some(session),
            )
            .await?;
        let node_id = resp.get("nodeId").and_then(Value::as_i64).unwrap_or(0);
        Ok((node_id != 0).then_some(node_id))
    }

    /// Scroll an element into view and resolve its center point in CSS
    /// pixels.
    async fn element_center(&self, session: &str, selector: &str) -> Result<(f64, f64)> {
        let node_id = self
            .query_selector(session, selector)
            .await?
            .ok_or_else(|| Error::InteractionFailed {
                selector: selector.to_string(),
                detail: "no element matches selector".to_string(),
            })?;

        if let Err(e) = self
            .conn
            .send_on(
                "DOM.scrollIntoViewIfNeeded",
                json!({"nodeId": node_id}),
                Some(session),
            )
            .await
        {
            tracing::debug!(selector, error = %e, "scrollIntoViewIfNeeded failed");
        }

        let resp = self
            .conn
            .send_on("DOM.getBoxModel", json!({"nodeId": node_id}), Some(session))
            .await?;
        let content = resp
            .get("model")
            .and_then(|m| m.get("content"))
            .and_then(Value::as_array)
            .ok_or_else(|| {
                Error::Protocol("DOM.getBoxModel returned no content quad".to_string())
            })?;
        let quad: Vec<f64> = content.iter().filter_map(Value::as_f64).collect();

        center_of_quad(&quad).ok_or_else(|| Error::InteractionFailed {
            selector: selector.to_string(),
            detail: "element has a degenerate content quad".to_string(),
        })
    }

    // -----------------------------------------------------------------------
    // Click
    // -----------------------------------------------------------------------

    /// Click an element.
    ///
    /// Scrolls the element into view, resolves its center, and dispatches a
    /// synthetic pointer click there. If center resolution or dispatch fails
    /// for any reason short of a dead connection, falls back to exactly one
    /// script-level `.click()` on the element.
    pub async fn click(&self, page: PageId, selector: &str, options: ClickOptions) -> Result<()> {
        let (_, session) = self.resolve_page(page).await?;
        match self.pointer_click(&session, selector, &options).await {
            Ok(()) => Ok(()),
            Err(e @ (Error::NotConnected | Error::ConnectionClosed)) => Err(e),
            Err(e) => {
                tracing::warn!(selector, error = %e, "pointer click failed, using script click");
                self.script_click(&session, selector).await
            }
        }
    }

    async fn pointer_click(
        &self,
        session: &str,
        selector: &str,
        options: &ClickOptions,
    ) -> Result<()> {
        let (x, y) = self.element_center(session, selector).await?;
        self.dispatch_click_at(session, x, y, options).await
    }

    async fn dispatch_click_at(
        &self,
        session: &str,
        x: f64,
        y: f64,
        options: &ClickOptions,
    ) -> Result<()> {
        for kind in ["mousePressed", "mouseReleased"] {
            self.conn
                .send_on(
                    "Input.dispatchMouseEvent",
                    json!({
                        "type": kind,
                        "x": x,
                        "y": y,
                        "button": options.button.as_str(),
                        "clickCount": options.click_count,
                    }),
                    Some(session),
                )
                .await?;
        }
        Ok(())
    }

    async fn script_click(&self, session: &str, selector: &str) -> Result<()> {
        let script = format!(
            "(() => {{ const el = document.querySelector({}); if (!el) return false; \
             el.click(); return true; }})()",
            serde_json::to_string(selector)?
        );
        match self.eval_on(session, &script).await? {
            EvalResult::Value(v) if v.as_bool() == Some(true) => Ok(()),
            EvalResult::Value(_) => Err(Error::InteractionFailed {
                selector: selector.to_string(),
                detail: "no element matches selector".to_string(),
            }),
            EvalResult::Exception(msg) => Err(Error::InteractionFailed {
                selector: selector.to_string(),
                detail: format!("script click threw: {msg}"),
            }),
        }
    }

    // -----------------------------------------------------------------------
    // Typing
    // -----------------------------------------------------------------------

    /// Fill an element with text.
    ///
    /// Focus is established via `DOM.focus`, falling back to a synthetic
    /// click; if both fail the fill proceeds anyway with a warning rather
    /// than failing outright. With `clear`, the current value is emptied
    /// first. Text lands as synthetic per-character key events.
    pub async fn fill(&self, page: PageId, selector: &str, text: &str, clear: bool) -> Result<()> {
        let (_, session) = self.resolve_page(page).await?;

        self.establish_focus(&session, selector).await;
        if clear {
            self.clear_field(&session, selector).await?;
        }
        self.type_text_on(&session, text).await
    }

    async fn establish_focus(&self, session: &str, selector: &str) {
        let Err(first) = self.focus_element(session, selector).await else {
            return;
        };
        tracing::debug!(selector, error = %first, "focus failed, clicking to focus");

        let options = ClickOptions::default();
        if let Err(second) = self.pointer_click(session, selector, &options).await {
            tracing::warn!(
                selector,
                error = %second,
                "could not establish focus, typing without it"
            );
        }
    }

    async fn focus_element(&self, session: &str, selector: &str) -> Result<()> {
        let node_id = self
            .query_selector(session, selector)
            .await?
            .ok_or_else(|| Error::InteractionFailed {
                selector: selector.to_string(),
                detail: "no element matches selector".to_string(),
            })?;
        self.conn
            .send_on("DOM.focus", json!({"nodeId": node_id}), Some(session))
            .await?;
        Ok(())
    }

    async fn clear_field(&self, session: &str, selector: &str) -> Result<()> {
        let script = format!(
            "(() => {{ const el = document.querySelector({}); if (!el) return false; \
             if ('value' in el) {{ el.value = ''; \
             el.dispatchEvent(new Event('input', {{bubbles: true}})); }} \
             else {{ el.textContent = ''; }} return true; }})()",
            serde_json::to_string(selector)?
        );
        match self.eval_on(session, &script).await? {
            EvalResult::Value(v) if v.as_bool() == Some(true) => {}
            other => {
                tracing::warn!(selector, ?other, "could not clear field before fill");
            }
        }
        Ok(())
    }

    pub(crate) async fn type_text_on(&self, session: &str, text: &str) -> Result<()> {
        for ch in text.chars() {
            let ch_str = ch.to_string();
            for kind in ["keyDown", "keyUp"] {
                self.conn
                    .send_on(
                        "Input.dispatchKeyEvent",
                        json!({
                            "type": kind,
                            "text": ch_str,
                            "unmodifiedText": ch_str,
                            "key": ch_str,
                        }),
                        Some(session),
                    )
                    .await?;
            }
        }
        Ok(())
    }

    /// Press a named control key (Enter, Tab, Escape, arrows, …).
    ///
    /// A single ordinary character is typed as text instead.
    pub async fn press_key(&self, page: PageId, key: &str) -> Result<()> {
        let (_, session) = self.resolve_page(page).await?;

        match key_descriptor(key) {
            Some((code, vk, text)) => {
                let down_type = if text.is_some() { "keyDown" } else { "rawKeyDown" };
                let mut down = json!({
                    "type": down_type,
                    "key": key,
                    "code": code,
                    "windowsVirtualKeyCode": vk,
                    "nativeVirtualKeyCode": vk,
                });
                if let Some(text) = text {
                    down["text"] = json!(text);
                    down["unmodifiedText"] = json!(text);
                }
                self.conn
                    .send_on("Input.dispatchKeyEvent", down, Some(&session))
                    .await?;
                self.conn
                    .send_on(
                        "Input.dispatchKeyEvent",
                        json!({
                            "type": "keyUp",
                            "key": key,
                            "code": code,
                            "windowsVirtualKeyCode": vk,
                            "nativeVirtualKeyCode": vk,
                        }),
                        Some(&session),
                    )
                    .await?;
                Ok(())
            }
            None if key.chars().count() == 1 => self.type_text_on(&session, key).await,
            None => Err(Error::Protocol(format!("unsupported key '{key}'"))),
        }
    }

    // -----------------------------------------------------------------------
    // Pointer gestures
    // -----------------------------------------------------------------------

    /// Move the pointer over an element's center.
    pub async fn hover(&self, page: PageId, selector: &str) -> Result<()> {
        let (_, session) = self.resolve_page(page).await?;
        let (x, y) = self.element_center(&session, selector).await?;
        self.conn
            .send_on(
                "Input.dispatchMouseEvent",
                json!({"type": "mouseMoved", "x": x, "y": y}),
                Some(&session),
            )
            .await?;
        Ok(())
    }

    /// Drag from one element's center to another's.
    pub async fn drag(&self, page: PageId, from: &str, to: &str) -> Result<()> {
        const MOVE_STEPS: u32 = 5;

        let (_, session) = self.resolve_page(page).await?;
        let (fx, fy) = self.element_center(&session, from).await?;
        let (tx, ty) = self.element_center(&session, to).await?;

        self.conn
            .send_on(
                "Input.dispatchMouseEvent",
                json!({"type": "mousePressed", "x": fx, "y": fy, "button": "left", "clickCount": 1}),
                Some(&session),
            )
            .await?;

        for step in 1..=MOVE_STEPS {
            let t = f64::from(step) / f64::from(MOVE_STEPS);
            let x = fx + (tx - fx) * t;
            let y = fy + (ty - fy) * t;
            self.conn
                .send_on(
                    "Input.dispatchMouseEvent",
                    json!({"type": "mouseMoved", "x": x, "y": y, "button": "left"}),
                    Some(&session),
                )
                .await?;
        }

        self.conn
            .send_on(
                "Input.dispatchMouseEvent",
                json!({"type": "mouseReleased", "x": tx, "y": ty, "button": "left", "clickCount": 1}),
                Some(&session),
            )
            .await?;
        Ok(())
    }

    /// Dispatch a wheel scroll, anchored at an element's center or the
    /// viewport center.
    pub async fn scroll(
        &self,
        page: PageId,
        selector: Option<&str>,
        delta_x: f64,
        delta_y: f64,
    ) -> Result<()> {
        let (_, session) = self.resolve_page(page).await?;

        let (x, y) = match selector {
            Some(selector) => self.element_center(&session, selector).await?,
            None => self.viewport_center(&session).await?,
        };

        self.conn
            .send_on(
                "Input.dispatchMouseEvent",
                json!({
                    "type": "mouseWheel",
                    "x": x,
                    "y": y,
                    "deltaX": delta_x,
                    "deltaY": delta_y,
                }),
                Some(&session),
            )
            .await?;
        Ok(())
    }

    async fn viewport_center(&self, session: &str) -> Result<(f64, f64)> {
        match self
            .eval_on(session, "[window.innerWidth / 2, window.innerHeight / 2]")
            .await?
        {
            EvalResult::Value(Value::Array(coords)) if coords.len() == 2 => {
                let x = coords[0].as_f64().unwrap_or(0.0);
                let y = coords[1].as_f64().unwrap_or(0.0);
                Ok((x, y))
            }
            other => Err(Error::Protocol(format!(
                "viewport dimensions query returned {other:?}"
            ))),
        }
    }

    // -----------------------------------------------------------------------
    // Form state
    // -----------------------------------------------------------------------

    /// Select an option of a `<select>` by value or label.
    pub async fn select_option(&self, page: PageId, selector: &str, value: &str) -> Result<()> {
        let (_, session) = self.resolve_page(page).await?;
        let script = format!(
            "(() => {{ const el = document.querySelector({sel}); if (!el) return 'missing'; \
             const opt = Array.from(el.options || []).find(o => o.value === {val} || o.label === {val}); \
             if (!opt) return 'no-option'; el.value = opt.value; \
             el.dispatchEvent(new Event('input', {{bubbles: true}})); \
             el.dispatchEvent(new Event('change', {{bubbles: true}})); return 'ok'; }})()",
            sel = serde_json::to_string(selector)?,
            val = serde_json::to_string(value)?,
        );

        match self.eval_on(&session, &script).await? {
            EvalResult::Value(v) if v.as_str() == Some("ok") => Ok(()),
            EvalResult::Value(v) => Err(Error::InteractionFailed {
                selector: selector.to_string(),
                detail: match v.as_str() {
                    Some("missing") => "no element matches selector".to_string(),
                    Some("no-option") => format!("no option with value or label '{value}'"),
                    _ => format!("select script returned {v}"),
                },
            }),
            EvalResult::Exception(msg) => Err(Error::InteractionFailed {
                selector: selector.to_string(),
                detail: format!("select script threw: {msg}"),
            }),
        }
    }

    /// Ensure a checkbox or radio is checked.
    pub async fn check(&self, page: PageId, selector: &str) -> Result<()> {
        self.set_checked(page, selector, true).await
    }

    /// Ensure a checkbox is unchecked.
    pub async fn uncheck(&self, page: PageId, selector: &str) -> Result<()> {
        self.set_checked(page, selector, false).await
    }

    /// Read current checked state and click only when it needs to change.
    pub async fn set_checked(&self, page: PageId, selector: &str, desired: bool) -> Result<()> {
        let (_, session) = self.resolve_page(page).await?;
        let script = format!(
            "(() => {{ const el = document.querySelector({}); \
             return el ? !!el.checked : null; }})()",
            serde_json::to_string(selector)?
        );

        let current = match self.eval_on(&session, &script).await? {
            EvalResult::Value(Value::Bool(b)) => b,
            EvalResult::Value(Value::Null) => {
                return Err(Error::InteractionFailed {
                    selector: selector.to_string(),
                    detail: "no element matches selector".to_string(),
                });
            }
            EvalResult::Value(v) => {
                return Err(Error::Protocol(format!(
                    "checked-state probe returned {v}"
                )));
            }
            EvalResult::Exception(msg) => {
                return Err(Error::InteractionFailed {
                    selector: selector.to_string(),
                    detail: format!("checked-state probe threw: {msg}"),
                });
            }
        };

        if current == desired {
            return Ok(());
        }
        self.click(page, selector, ClickOptions::default()).await
    }

    // -----------------------------------------------------------------------
    // Dialogs
    // -----------------------------------------------------------------------

    /// Respond to a pending native dialog (alert, confirm, prompt).
    ///
    /// The page is blocked until the dialog is handled, so call this
    /// promptly after observing `Page.javascriptDialogOpening`.
    pub async fn handle_dialog(
        &self,
        page: PageId,
        accept: bool,
        prompt_text: Option<&str>,
    ) -> Result<()> {
        let (_, session) = self.resolve_page(page).await?;
        let mut params = json!({"accept": accept});
        if let Some(text) = prompt_text {
            params["promptText"] = json!(text);
        }
        self.conn
            .send_on("Page.handleJavaScriptDialog", params, Some(&session))
            .await?;
        Ok(())
    }
}

fn key_descriptor(key: &str) -> Option<(&'static str, i64, Option<&'static str>)> {
    match key {
        "Enter" => Some(("Enter", 13, Some("\r"))),
        "Tab" => Some(("Tab", 9, None)),
        "Escape" => Some(("Escape", 27, None)),
        "Backspace" => Some(("Backspace", 8, None)),
        "Delete" => Some(("Delete", 46, None)),
        "ArrowLeft" => Some(("ArrowLeft", 37, None)),
        "ArrowUp" => Some(("ArrowUp", 38, None)),
        "ArrowRight" => Some(("ArrowRight", 39, None)),
        "ArrowDown" => Some(("ArrowDown", 40, None)),
        "Home" => Some(("Home", 36, None)),
        "End" => Some(("End", 35, None)),
        "PageUp" => Some(("PageUp", 33, None)),
        "PageDown" => Some(("PageDown", 34, None)),
        _ => None,
    }
}
