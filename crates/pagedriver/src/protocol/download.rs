// Copyright 2026 Paul Adamson
// Licensed under the Apache License, Version 2.0
//
// Download handling
//
// Downloads are observed through Browser.downloadWillBegin and
// Browser.downloadProgress events rather than polled.

use std::path::{Path, PathBuf};

use serde_json::{Value, json};
use tokio::time::Instant;

use crate::cdp::EventSubscription;
use crate::error::{Error, Result};
use crate::protocol::input::ClickOptions;
use crate::protocol::{Browser, PageId};

/// A completed download.
///
/// With the auto-naming policy the file on disk is named by the download's
/// id; `suggested_filename` carries the server-suggested name from the
/// begin event.
#[derive(Debug, Clone)]
pub struct Download {
    /// Where the browser wrote the file.
    pub path: PathBuf,
    /// URL the download was served from.
    pub url: String,
    /// Server-suggested filename (Content-Disposition or download attribute).
    pub suggested_filename: String,
}

impl Browser {
    /// Click an element that triggers a download and wait for the download
    /// to complete.
    ///
    /// Configures the browser to auto-name downloads into `download_path`,
    /// subscribes to the begin/progress events, then clicks. Resolves when
    /// a progress event reports the matching download completed; fails on
    /// cancellation or when the download deadline elapses. The download
    /// policy is reset and both subscriptions are dropped on every exit
    /// path.
    pub async fn download_via_click(
        &self,
        page: PageId,
        selector: &str,
        download_path: &Path,
    ) -> Result<Download> {
        let (info, _session) = self.resolve_page(page).await?;

        let dir = download_path
            .to_str()
            .ok_or_else(|| Error::Protocol("download path is not valid UTF-8".to_string()))?;

        let mut behavior = json!({
            "behavior": "allowAndName",
            "downloadPath": dir,
            "eventsEnabled": true,
        });
        if let Some(context) = &info.browser_context_id {
            behavior["browserContextId"] = json!(context);
        }
        self.conn.send("Browser.setDownloadBehavior", behavior).await?;

        // Subscribe before clicking so the begin event cannot be missed.
        let mut begin = self.conn.subscribe("Browser.downloadWillBegin");
        let mut progress = self.conn.subscribe("Browser.downloadProgress");

        if let Err(e) = self.click(page, selector, ClickOptions::default()).await {
            self.finish_download(begin, progress).await;
            return Err(e);
        }

        let started = Instant::now();
        let deadline = started + self.options.download_timeout;

        // First the begin event names the download we are waiting for.
        let (guid, url, suggested_filename) = loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                self.finish_download(begin, progress).await;
                return Err(Error::DownloadTimeout {
                    elapsed: started.elapsed(),
                });
            }

            let outcome = tokio::time::timeout(remaining, begin.recv()).await;
            match outcome {
                Ok(Some(params)) => {
                    let Some(guid) = params.get("guid").and_then(Value::as_str) else {
                        continue;
                    };
                    let url = params
                        .get("url")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string();
                    let suggested = params
                        .get("suggestedFilename")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string();
                    break (guid.to_string(), url, suggested);
                }
                Ok(None) => {
                    self.finish_download(begin, progress).await;
                    return Err(Error::ConnectionClosed);
                }
                Err(_) => {
                    self.finish_download(begin, progress).await;
                    return Err(Error::DownloadTimeout {
                        elapsed: started.elapsed(),
                    });
                }
            }
        };

        tracing::debug!(%guid, %url, "download began");

        // Then progress events for that id until a terminal state.
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                self.finish_download(begin, progress).await;
                return Err(Error::DownloadTimeout {
                    elapsed: started.elapsed(),
                });
            }

            let outcome = tokio::time::timeout(remaining, progress.recv()).await;
            match outcome {
                Ok(Some(params)) => {
                    if params.get("guid").and_then(Value::as_str) != Some(guid.as_str()) {
                        continue;
                    }
                    match params.get("state").and_then(Value::as_str) {
                        Some("completed") => {
                            self.finish_download(begin, progress).await;
                            return Ok(Download {
                                path: download_path.join(&guid),
                                url,
                                suggested_filename,
                            });
                        }
                        Some("canceled") => {
                            self.finish_download(begin, progress).await;
                            return Err(Error::DownloadCanceled);
                        }
                        _ => {}
                    }
                }
                Ok(None) => {
                    self.finish_download(begin, progress).await;
                    return Err(Error::ConnectionClosed);
                }
                Err(_) => {
                    self.finish_download(begin, progress).await;
                    return Err(Error::DownloadTimeout {
                        elapsed: started.elapsed(),
                    });
                }
            }
        }
    }

    /// Cleanup shared by every exit path: drop both subscriptions and reset
    /// the download policy to default. Consuming the subscriptions makes a
    /// second invocation per attempt impossible.
    async fn finish_download(&self, begin: EventSubscription, progress: EventSubscription) {
        drop(begin);
        drop(progress);
        if let Err(e) = self
            .conn
            .send("Browser.setDownloadBehavior", json!({"behavior": "default"}))
            .await
        {
            tracing::warn!(error = %e, "failed to reset download behavior");
        }
    }
}
