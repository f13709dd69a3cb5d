//! Page observation: script evaluation, content extraction, and capture.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as B64;
use serde_json::{Value, json};

use crate::error::{Error, Result};
use crate::protocol::{Browser, PageId};

/// Outcome of a script evaluation.
///
/// A thrown exception is data, not a failure: callers inspect it without
/// exception handling, and only transport/protocol problems surface as `Err`.
#[derive(Debug, Clone, PartialEq)]
pub enum EvalResult {
    /// The script returned a value (possibly `null`).
    Value(Value),
    /// The script threw; carries the exception description.
    Exception(String),
}

impl EvalResult {
    pub fn value(&self) -> Option<&Value> {
        match self {
            EvalResult::Value(v) => Some(v),
            EvalResult::Exception(_) => None,
        }
    }

    pub fn exception(&self) -> Option<&str> {
        match self {
            EvalResult::Value(_) => None,
            EvalResult::Exception(msg) => Some(msg),
        }
    }
}

/// Output format for [`Browser::screenshot`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScreenshotFormat {
    #[default]
    Png,
    Jpeg,
}

impl ScreenshotFormat {
    fn as_str(self) -> &'static str {
        match self {
            ScreenshotFormat::Png => "png",
            ScreenshotFormat::Jpeg => "jpeg",
        }
    }
}

/// Options for [`Browser::screenshot`].
#[derive(Debug, Clone, Default)]
pub struct ScreenshotOptions {
    pub format: ScreenshotFormat,
    /// JPEG quality 0-100; ignored for PNG.
    pub quality: Option<u32>,
    /// Capture the full scrollable page rather than the viewport.
    pub full_page: bool,
}

const MARKDOWN_SCRIPT: &str = r##"(() => {
  const out = [];
  const blocks = document.body
    ? document.body.querySelectorAll('h1,h2,h3,h4,h5,h6,p,li,pre,blockquote')
    : [];
  for (const el of blocks) {
    if (el.closest('script,style,noscript,template')) continue;
    const text = (el.innerText || '').trim();
    if (!text) continue;
    const tag = el.tagName.toLowerCase();
    if (tag[0] === 'h' && tag.length === 2) out.push('#'.repeat(+tag[1]) + ' ' + text);
    else if (tag === 'li') out.push('- ' + text);
    else if (tag === 'pre') out.push('```\n' + text + '\n```');
    else if (tag === 'blockquote') out.push('> ' + text);
    else out.push(text);
  }
  const links = [];
  for (const a of document.querySelectorAll('a[href]')) {
    const text = (a.innerText || '').trim();
    if (text && links.length < 200) links.push('[' + text + '](' + a.href + ')');
  }
  if (links.length) out.push('Links:\n' + links.join('\n'));
  return out.join('\n\n');
})()"##;

impl Browser {
    /// Evaluate a JavaScript expression in the page context.
    ///
    /// A thrown exception comes back as [`EvalResult::Exception`] rather than
    /// an `Err`, so callers can inspect script failures as ordinary data.
    pub async fn evaluate(&self, page: PageId, expression: &str) -> Result<EvalResult> {
        let (_, session) = self.resolve_page(page).await?;
        self.eval_on(&session, expression).await
    }

    pub(crate) async fn eval_on(&self, session: &str, expression: &str) -> Result<EvalResult> {
        let resp = self
            .conn
            .send_on(
                "Runtime.evaluate",
                json!({
                    "expression": expression,
                    "returnByValue": true,
                    "awaitPromise": true,
                }),
                Some(session),
            )
            .await?;

        if let Some(details) = resp.get("exceptionDetails") {
            let message = details
                .get("exception")
                .and_then(|e| e.get("description"))
                .and_then(Value::as_str)
                .or_else(|| details.get("text").and_then(Value::as_str))
                .unwrap_or("unknown exception")
                .to_string();
            return Ok(EvalResult::Exception(message));
        }

        Ok(EvalResult::Value(
            resp.get("result")
                .and_then(|r| r.get("value"))
                .cloned()
                .unwrap_or(Value::Null),
        ))
    }

    /// Evaluate an expression that must produce a string.
    pub(crate) async fn eval_string(
        &self,
        session: &str,
        expression: &str,
        what: &str,
    ) -> Result<String> {
        match self.eval_on(session, expression).await? {
            EvalResult::Value(v) => v
                .as_str()
                .map(str::to_string)
                .ok_or_else(|| Error::Protocol(format!("{what} did not return a string"))),
            EvalResult::Exception(msg) => {
                Err(Error::Protocol(format!("{what} threw: {msg}")))
            }
        }
    }

    /// Full HTML of the page.
    pub async fn content(&self, page: PageId) -> Result<String> {
        let (_, session) = self.resolve_page(page).await?;
        self.eval_string(
            &session,
            "document.documentElement.outerHTML",
            "outerHTML evaluation",
        )
        .await
    }

    /// Page content reduced to a markdown-flavored text rendering.
    pub async fn content_as_markdown(&self, page: PageId) -> Result<String> {
        let (_, session) = self.resolve_page(page).await?;
        self.eval_string(&session, MARKDOWN_SCRIPT, "markdown extraction")
            .await
    }

    /// Capture a screenshot, returning the raw image bytes.
    pub async fn screenshot(&self, page: PageId, options: ScreenshotOptions) -> Result<Vec<u8>> {
        let (_, session) = self.resolve_page(page).await?;

        let mut params = json!({
            "format": options.format.as_str(),
            "captureBeyondViewport": options.full_page,
        });
        if let (ScreenshotFormat::Jpeg, Some(quality)) = (options.format, options.quality) {
            params["quality"] = json!(quality.min(100));
        }

        let resp = self
            .conn
            .send_on("Page.captureScreenshot", params, Some(&session))
            .await?;
        decode_capture_data(&resp, "Page.captureScreenshot")
    }

    /// Print the page to PDF, returning the document bytes.
    pub async fn print_to_pdf(&self, page: PageId) -> Result<Vec<u8>> {
        let (_, session) = self.resolve_page(page).await?;
        let resp = self
            .conn
            .send_on("Page.printToPDF", json!({}), Some(&session))
            .await?;
        decode_capture_data(&resp, "Page.printToPDF")
    }
}

fn decode_capture_data(resp: &Value, method: &str) -> Result<Vec<u8>> {
    let data = resp
        .get("data")
        .and_then(Value::as_str)
        .ok_or_else(|| Error::Protocol(format!("{method} returned no data field")))?;
    B64.decode(data)
        .map_err(|e| Error::Protocol(format!("{method} data is not valid base64: {e}")))
}
