//! Accessibility-tree snapshots rendered as interactive-element listings.

use serde::Deserialize;
use serde_json::{Value, json};

use crate::error::Result;
use crate::protocol::observation::EvalResult;
use crate::protocol::{Browser, PageId};

/// Roles worth surfacing to an automation caller.
const INTERACTIVE_ROLES: &[&str] = &[
    "button",
    "link",
    "textbox",
    "searchbox",
    "checkbox",
    "radio",
    "combobox",
    "listbox",
    "option",
    "menuitem",
    "menuitemcheckbox",
    "menuitemradio",
    "tab",
    "switch",
    "slider",
    "spinbutton",
];

/// Boolean states appended to a rendered line when set.
const SURFACED_STATES: &[&str] = &[
    "disabled", "focused", "checked", "expanded", "required", "selected", "pressed",
];

/// One node of `Accessibility.getFullAXTree`.
#[derive(Debug, Clone, Deserialize)]
pub struct AxNode {
    #[serde(rename = "nodeId")]
    pub node_id: String,
    #[serde(default)]
    pub ignored: bool,
    #[serde(default)]
    pub role: Option<AxValue>,
    #[serde(default)]
    pub name: Option<AxValue>,
    #[serde(default)]
    pub value: Option<AxValue>,
    #[serde(default)]
    pub properties: Vec<AxProperty>,
    #[serde(rename = "backendDOMNodeId", default)]
    pub backend_dom_node_id: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AxValue {
    #[serde(default)]
    pub value: Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AxProperty {
    pub name: String,
    #[serde(default)]
    pub value: Option<AxValue>,
}

impl AxNode {
    fn role(&self) -> Option<&str> {
        self.role.as_ref().and_then(|r| r.value.as_str())
    }

    fn name(&self) -> Option<&str> {
        self.name.as_ref().and_then(|n| n.value.as_str())
    }

    fn value_text(&self) -> Option<String> {
        let value = &self.value.as_ref()?.value;
        match value {
            Value::Null => None,
            Value::String(s) if s.is_empty() => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    fn states(&self) -> Vec<String> {
        let mut states = Vec::new();
        for property in &self.properties {
            if !SURFACED_STATES.contains(&property.name.as_str()) {
                continue;
            }
            let Some(value) = property.value.as_ref().map(|v| &v.value) else {
                continue;
            };
            match value {
                Value::Bool(true) => states.push(property.name.clone()),
                Value::String(s) if s != "false" => {
                    states.push(format!("{}={s}", property.name));
                }
                _ => {}
            }
        }
        states
    }
}

/// Render the flat node list as a line-oriented interactive-element listing.
pub(crate) fn render_ax_tree(nodes: &[AxNode]) -> String {
    let mut lines = vec!["Interactive elements:".to_string()];
    let mut index = 0usize;

    for node in nodes {
        if node.ignored {
            continue;
        }
        let Some(role) = node.role() else { continue };
        if !INTERACTIVE_ROLES.contains(&role) {
            continue;
        }

        index += 1;
        let mut line = format!("[{index}] {role}");
        if let Some(name) = node.name() {
            if !name.is_empty() {
                line.push_str(&format!(" \"{name}\""));
            }
        }
        if let Some(value) = node.value_text() {
            line.push_str(&format!(" value=\"{value}\""));
        }
        let states = node.states();
        if !states.is_empty() {
            line.push_str(&format!(" ({})", states.join(", ")));
        }
        lines.push(line);
    }

    if index == 0 {
        lines.push("(none)".to_string());
    }
    lines.join("\n")
}

const CLICKABLE_PROBE_SCRIPT: &str = r#"(() => {
  const out = [];
  const seen = new Set();
  const interactiveTags = new Set(['A', 'BUTTON', 'INPUT', 'SELECT', 'TEXTAREA', 'OPTION', 'LABEL']);
  for (const el of document.querySelectorAll('*')) {
    if (out.length >= 50) break;
    if (interactiveTags.has(el.tagName)) continue;
    if (el.getAttribute('role')) continue;
    const style = getComputedStyle(el);
    const clickable = style.cursor === 'pointer' || el.onclick != null || el.hasAttribute('onclick');
    if (!clickable) continue;
    const rect = el.getBoundingClientRect();
    if (rect.width === 0 || rect.height === 0) continue;
    const text = (el.innerText || '').trim().slice(0, 80);
    const key = el.tagName + '|' + text;
    if (seen.has(key)) continue;
    seen.add(key);
    let sel = el.tagName.toLowerCase();
    if (el.id) sel += '#' + el.id;
    else if (el.classList.length) sel += '.' + Array.from(el.classList).slice(0, 2).join('.');
    out.push({selector: sel, text});
  }
  return out;
})()"#;

impl Browser {
    /// Accessibility snapshot of a page as an interactive-element listing.
    pub async fn snapshot(&self, page: PageId) -> Result<String> {
        let (_, session) = self.resolve_page(page).await?;
        self.ax_snapshot(&session).await
    }

    async fn ax_snapshot(&self, session: &str) -> Result<String> {
        let resp = self
            .conn
            .send_on("Accessibility.getFullAXTree", json!({}), Some(session))
            .await?;
        let nodes: Vec<AxNode> =
            serde_json::from_value(resp.get("nodes").cloned().unwrap_or(json!([])))?;
        Ok(render_ax_tree(&nodes))
    }

    /// Snapshot plus a probe for elements that look clickable by visual or
    /// cursor cues but carry no semantic role.
    ///
    /// The secondary probe degrades silently: when it fails the base
    /// snapshot is returned unchanged and the failure is only logged.
    pub async fn enhanced_snapshot(&self, page: PageId) -> Result<String> {
        let (_, session) = self.resolve_page(page).await?;
        let mut snapshot = self.ax_snapshot(&session).await?;

        match self.eval_on(&session, CLICKABLE_PROBE_SCRIPT).await {
            Ok(EvalResult::Value(Value::Array(hits))) if !hits.is_empty() => {
                snapshot.push_str("\n\nClickable by visual cues:");
                for hit in &hits {
                    let selector = hit.get("selector").and_then(Value::as_str).unwrap_or("?");
                    let text = hit.get("text").and_then(Value::as_str).unwrap_or("");
                    if text.is_empty() {
                        snapshot.push_str(&format!("\n- {selector}"));
                    } else {
                        snapshot.push_str(&format!("\n- {selector} \"{text}\""));
                    }
                }
            }
            Ok(EvalResult::Value(_)) => {}
            Ok(EvalResult::Exception(msg)) => {
                tracing::warn!(%msg, "clickable-element probe threw, keeping base snapshot");
            }
            Err(e) => {
                tracing::warn!(error = %e, "clickable-element probe failed, keeping base snapshot");
            }
        }

        Ok(snapshot)
    }
}
