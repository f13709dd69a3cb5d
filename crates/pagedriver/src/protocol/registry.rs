//! Logical-page registry and reconciliation against the live target list.
//!
//! A [`PageId`] is the caller-facing stable handle for a browser target. Its
//! target identifier never changes for its lifetime; title, URL, and the
//! other metadata are refreshed from the live tab list on every
//! reconciliation. Ids are assigned monotonically and never reused.

use std::collections::HashMap;
use std::fmt;

use serde::Deserialize;

/// Caller-visible handle for a logical page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PageId(pub u32);

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "page #{}", self.0)
    }
}

/// One target entry from `Target.getTargets`.
#[derive(Debug, Clone, Deserialize)]
pub struct TargetInfo {
    #[serde(rename = "targetId")]
    pub target_id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub attached: bool,
    #[serde(rename = "browserContextId", default)]
    pub browser_context_id: Option<String>,
}

/// Snapshot of one logical page's current metadata.
#[derive(Debug, Clone)]
pub struct PageInfo {
    pub id: PageId,
    /// Stable for the page's lifetime.
    pub target_id: String,
    pub title: String,
    pub url: String,
    pub attached: bool,
    pub browser_context_id: Option<String>,
    /// Position in the most recent live enumeration.
    pub index: usize,
}

#[derive(Debug, Clone)]
struct PageEntry {
    target_id: String,
    title: String,
    url: String,
    attached: bool,
    browser_context_id: Option<String>,
    index: usize,
}

/// Owned registry of logical pages, keyed by [`PageId`].
///
/// Owned by the orchestrator instance, never process-wide. Mutated only by
/// [`reconcile`] and explicit insert/remove; concurrent readers get cloned
/// snapshots.
///
/// [`reconcile`]: PageRegistry::reconcile
#[derive(Debug, Default)]
pub(crate) struct PageRegistry {
    pages: HashMap<u32, PageEntry>,
    next_id: u32,
}

impl PageRegistry {
    /// Reconcile the registry against a fresh live enumeration.
    ///
    /// Pages whose target is no longer observed are purged; targets not yet
    /// tracked get a fresh id strictly greater than every id ever issued.
    /// Metadata of retained pages is refreshed. Returns the surviving pages
    /// sorted by id ascending.
    pub(crate) fn reconcile(&mut self, targets: &[TargetInfo]) -> Vec<PageInfo> {
        let live: HashMap<&str, (usize, &TargetInfo)> = targets
            .iter()
            .enumerate()
            .map(|(index, t)| (t.target_id.as_str(), (index, t)))
            .collect();

        self.pages.retain(|id, entry| {
            let keep = live.contains_key(entry.target_id.as_str());
            if !keep {
                tracing::debug!(page = id, target = %entry.target_id, "target gone, dropping page");
            }
            keep
        });

        for entry in self.pages.values_mut() {
            let (index, target) = live[entry.target_id.as_str()];
            entry.title = target.title.clone();
            entry.url = target.url.clone();
            entry.attached = target.attached;
            entry.browser_context_id = target.browser_context_id.clone();
            entry.index = index;
        }

        let tracked: std::collections::HashSet<String> = self
            .pages
            .values()
            .map(|e| e.target_id.clone())
            .collect();

        for (index, target) in targets
            .iter()
            .enumerate()
            .filter(|(_, t)| !tracked.contains(&t.target_id))
        {
            let id = self.next_id;
            self.next_id += 1;
            tracing::debug!(page = id, target = %target.target_id, "tracking new target");
            self.pages.insert(
                id,
                PageEntry {
                    target_id: target.target_id.clone(),
                    title: target.title.clone(),
                    url: target.url.clone(),
                    attached: target.attached,
                    browser_context_id: target.browser_context_id.clone(),
                    index,
                },
            );
        }

        self.snapshot()
    }

    /// All tracked pages, sorted by id ascending.
    pub(crate) fn snapshot(&self) -> Vec<PageInfo> {
        let mut pages: Vec<PageInfo> = self
            .pages
            .iter()
            .map(|(id, entry)| Self::info(*id, entry))
            .collect();
        pages.sort_by_key(|p| p.id);
        pages
    }

    pub(crate) fn get(&self, id: PageId) -> Option<PageInfo> {
        self.pages.get(&id.0).map(|entry| Self::info(id.0, entry))
    }

    pub(crate) fn find_by_target(&self, target_id: &str) -> Option<PageInfo> {
        self.pages
            .iter()
            .find(|(_, entry)| entry.target_id == target_id)
            .map(|(id, entry)| Self::info(*id, entry))
    }

    pub(crate) fn remove(&mut self, id: PageId) -> Option<PageInfo> {
        self.pages.remove(&id.0).map(|entry| Self::info(id.0, &entry))
    }

    fn info(id: u32, entry: &PageEntry) -> PageInfo {
        PageInfo {
            id: PageId(id),
            target_id: entry.target_id.clone(),
            title: entry.title.clone(),
            url: entry.url.clone(),
            attached: entry.attached,
            browser_context_id: entry.browser_context_id.clone(),
            index: entry.index,
        }
    }
}

/// Whether a target URL belongs to internal browser UI rather than content.
pub(crate) fn is_internal_url(url: &str) -> bool {
    const INTERNAL_SCHEMES: &[&str] = &[
        "chrome://",
        "chrome-extension://",
        "chrome-untrusted://",
        "devtools://",
        "edge://",
    ];
    INTERNAL_SCHEMES.iter().any(|s| url.starts_with(s))
}
