//! Adapter registry keeping track of attached pages, plus the per-tab gates
//! that serialize work against a single page.

use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::ids::PageId;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TargetContext {
    pub target_id: String,
    pub cdp_session: Option<String>,
    pub recent_url: Option<String>,
}

/// Concurrent registry for pages and their CDP sessions.
#[derive(Default)]
pub struct Registry {
    pages: DashMap<PageId, TargetContext>,
    targets: DashMap<String, PageId>,
    sessions: DashMap<String, PageId>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a page target, returning the existing id if it is already known.
    pub fn insert_target(&self, target_id: &str, url: Option<String>) -> PageId {
        if let Some(existing) = self.targets.get(target_id) {
            return *existing.value();
        }
        let page = PageId::new();
        self.targets.insert(target_id.to_string(), page);
        self.pages.insert(
            page,
            TargetContext {
                target_id: target_id.to_string(),
                cdp_session: None,
                recent_url: url.filter(|u| !u.is_empty()),
            },
        );
        page
    }

    pub fn attach_session(&self, target_id: &str, session: String) -> Option<PageId> {
        let page = *self.targets.get(target_id)?.value();
        if let Some(mut entry) = self.pages.get_mut(&page) {
            entry.cdp_session = Some(session.clone());
        }
        self.sessions.insert(session, page);
        Some(page)
    }

    pub fn detach_session(&self, session: &str) {
        if let Some((_, page)) = self.sessions.remove(session) {
            if let Some(mut entry) = self.pages.get_mut(&page) {
                if entry.cdp_session.as_deref() == Some(session) {
                    entry.cdp_session = None;
                }
            }
        }
    }

    pub fn remove_target(&self, target_id: &str) -> Option<PageId> {
        let (_, page) = self.targets.remove(target_id)?;
        self.pages.remove(&page);
        self.sessions.retain(|_, owner| *owner != page);
        Some(page)
    }

    pub fn page_for_target(&self, target_id: &str) -> Option<PageId> {
        self.targets.get(target_id).map(|entry| *entry.value())
    }

    pub fn get(&self, page: &PageId) -> Option<TargetContext> {
        self.pages.get(page).map(|entry| entry.value().clone())
    }

    pub fn iter(&self) -> Vec<(PageId, TargetContext)> {
        self.pages
            .iter()
            .map(|kv| (*kv.key(), kv.value().clone()))
            .collect()
    }

    pub fn set_recent_url(&self, page: &PageId, url: String) {
        if let Some(mut entry) = self.pages.get_mut(page) {
            entry.recent_url = Some(url);
        }
    }

    pub fn get_cdp_session(&self, page: &PageId) -> Option<String> {
        self.pages
            .get(page)
            .and_then(|entry| entry.cdp_session.clone())
    }

    pub fn clear(&self) {
        self.pages.clear();
        self.targets.clear();
        self.sessions.clear();
    }
}

/// One async mutex per page. Holding the guard gives the caller the page's
/// single logical thread of control; different pages never contend.
#[derive(Default)]
pub struct TabGates {
    gates: DashMap<PageId, Arc<Mutex<()>>>,
}

impl TabGates {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn gate(&self, page: PageId) -> Arc<Mutex<()>> {
        self.gates
            .entry(page)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    pub async fn acquire(&self, page: PageId) -> OwnedMutexGuard<()> {
        self.gate(page).lock_owned().await
    }

    pub fn forget(&self, page: &PageId) {
        self.gates.remove(page);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn sessions_follow_targets() {
        let registry = Registry::new();
        let page = registry.insert_target("T1", Some("about:blank".into()));
        assert_eq!(registry.insert_target("T1", None), page);
        assert_eq!(registry.attach_session("T1", "S1".into()), Some(page));
        assert_eq!(registry.get_cdp_session(&page).as_deref(), Some("S1"));

        registry.detach_session("S1");
        assert!(registry.get_cdp_session(&page).is_none());

        assert_eq!(registry.remove_target("T1"), Some(page));
        assert!(registry.get(&page).is_none());
    }

    #[tokio::test]
    async fn same_page_is_serialized() {
        let gates = Arc::new(TabGates::new());
        let page = PageId::new();
        let held = gates.acquire(page).await;

        let contender = {
            let gates = Arc::clone(&gates);
            tokio::spawn(async move {
                let _guard = gates.acquire(page).await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        let other = gates.acquire(PageId::new()).await;
        drop(other);

        drop(held);
        tokio::time::timeout(Duration::from_secs(1), contender)
            .await
            .expect("contender acquires after release")
            .expect("task completes");
    }
}
