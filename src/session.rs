//! Page sessions: one tab, its gate, and the snapshot/act pair that runs
//! under it.

use std::sync::Arc;
use std::time::Duration;

use action_primitives::{
    ActionConfig, ActionError, ActionRequest, ActionResolver, ActionResult, DefaultActionResolver,
    Dispatched, ExecCtx,
};
use cdp_adapter::{Cdp, CdpAdapter, CdpConfig, PageId, TabGates};
use perceiver_structural::{
    InteractableNode, PerceiverError, Snapshot, SnapshotConfig, StructuralPerceiver,
    StructuralPerceiverImpl,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::AppConfig;
use crate::errors::SessionError;

/// Snapshot and act on one page.
///
/// Both operations hold the page's gate for their whole duration, so work on
/// one tab is strictly sequential while separate tabs run concurrently.
pub struct PageSession {
    page: PageId,
    gates: Arc<TabGates>,
    perceiver: StructuralPerceiverImpl,
    resolver: DefaultActionResolver,
    snapshot_cfg: SnapshotConfig,
    action_timeout: Duration,
}

impl PageSession {
    pub fn new(
        cdp: Arc<dyn Cdp>,
        page: PageId,
        gates: Arc<TabGates>,
        snapshot_cfg: SnapshotConfig,
        action_cfg: ActionConfig,
    ) -> Self {
        let action_timeout = action_cfg.action_timeout();
        Self {
            page,
            gates,
            perceiver: StructuralPerceiverImpl::new(Arc::clone(&cdp)),
            resolver: DefaultActionResolver::with_cdp(cdp, action_cfg),
            snapshot_cfg,
            action_timeout,
        }
    }

    pub fn page(&self) -> PageId {
        self.page
    }

    pub fn snapshot_config(&self) -> &SnapshotConfig {
        &self.snapshot_cfg
    }

    pub fn action_config(&self) -> &ActionConfig {
        self.resolver.config()
    }

    pub async fn build_snapshot(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Snapshot, PerceiverError> {
        let _gate = self.gates.acquire(self.page).await;
        self.perceiver
            .build_snapshot(self.page, &self.snapshot_cfg, cancel)
            .await
    }

    /// Resolve and dispatch one request against `snapshot`.
    pub async fn execute(
        &self,
        snapshot: &Snapshot,
        request: ActionRequest,
        cancel: &CancellationToken,
    ) -> ActionResult {
        if snapshot.page() != self.page {
            warn!(
                page = %self.page,
                snapshot_page = %snapshot.page(),
                "executing against a snapshot taken on another page"
            );
        }
        let _gate = self.gates.acquire(self.page).await;
        let ctx = ExecCtx::new(self.action_timeout, cancel.child_token());
        self.resolver.resolve(snapshot, request, &ctx).await
    }

    /// Bring the first element showing `text` into view.
    pub async fn scroll_to_text(
        &self,
        text: &str,
        cancel: &CancellationToken,
    ) -> Result<Dispatched, ActionError> {
        let _gate = self.gates.acquire(self.page).await;
        let ctx = ExecCtx::new(self.action_timeout, cancel.child_token());
        self.resolver.scroll_to_text(self.page, text, &ctx).await
    }

    /// Outline the element `index` names in `snapshot`.
    pub async fn highlight(
        &self,
        snapshot: &Snapshot,
        index: usize,
        cancel: &CancellationToken,
    ) -> Result<InteractableNode, ActionError> {
        let _gate = self.gates.acquire(self.page).await;
        let ctx = ExecCtx::new(self.action_timeout, cancel.child_token());
        self.resolver.highlight(snapshot, index, &ctx).await
    }

    pub async fn clear_highlights(&self, cancel: &CancellationToken) -> Result<usize, ActionError> {
        let _gate = self.gates.acquire(self.page).await;
        let ctx = ExecCtx::new(self.action_timeout, cancel.child_token());
        self.resolver.clear_highlights(self.page, &ctx).await
    }

    /// Drop per-page state held by the resolver and the gate table.
    pub fn close(&self) {
        self.resolver.forget_page(self.page);
        self.gates.forget(&self.page);
        debug!(page = %self.page, "page session closed");
    }
}

/// A started adapter plus the gate table shared by its sessions.
pub struct Browser {
    adapter: Arc<CdpAdapter>,
    gates: Arc<TabGates>,
}

impl Browser {
    pub async fn launch(cfg: CdpConfig) -> Result<Self, SessionError> {
        let adapter = CdpAdapter::new(cfg)
            .map(Arc::new)
            .map_err(|err| SessionError::BrowserUnavailable(err.to_string()))?;
        Arc::clone(&adapter).start().await?;
        info!(attached = adapter.cfg.websocket_url.is_some(), "browser ready");
        Ok(Self {
            adapter,
            gates: Arc::new(TabGates::new()),
        })
    }

    pub fn adapter(&self) -> &Arc<CdpAdapter> {
        &self.adapter
    }

    /// Open a tab, load `url`, and wrap it in a session.
    pub async fn open(&self, url: &str, cfg: &AppConfig) -> Result<PageSession, SessionError> {
        let parsed = Url::parse(url).map_err(|err| SessionError::InvalidUrl {
            url: url.to_string(),
            reason: err.to_string(),
        })?;

        let page = self.adapter.create_page("about:blank").await?;
        {
            let _gate = self.gates.acquire(page).await;
            let deadline = Duration::from_millis(self.adapter.cfg.default_deadline_ms);
            self.adapter.navigate(page, parsed.as_str(), deadline).await?;
        }
        info!(%page, url = %parsed, "page loaded");

        let cdp: Arc<dyn Cdp> = self.adapter.clone();
        Ok(PageSession::new(
            cdp,
            page,
            Arc::clone(&self.gates),
            cfg.snapshot.clone(),
            cfg.action.clone(),
        ))
    }

    pub async fn shutdown(&self) {
        self.adapter.shutdown().await;
    }
}
