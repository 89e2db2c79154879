//! Index-addressed action resolution.
//!
//! [`DefaultActionResolver::resolve`] turns an `(index, action)` decision into
//! exactly one input command, in this order:
//!
//! 1. index lookup in the snapshot
//! 2. narrowed liveness re-check of the element
//! 3. payload validation against the action and the element
//! 4. cancellation check
//! 5. repeat guard
//! 6. dispatch, bounded by the context deadline
//!
//! The first failing step ends the action; nothing is retried and no new
//! snapshot is taken.
//!
//! Two helpers sit beside `resolve`: [`DefaultActionResolver::scroll_to_text`]
//! for text the agent can see in a screenshot but not in the index, and the
//! highlight pair for showing a human which element an index means.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use cdp_adapter::{keys, AdapterError, AdapterErrorKind, Cdp, NodeRef, PageId};
use chrono::Utc;
use dashmap::DashMap;
use perceiver_structural::{
    InteractableNode, Snapshot, StructuralPerceiver, StructuralPerceiverImpl,
};
use tokio::time::timeout;
use tracing::{info, warn};

use crate::errors::ActionError;
use crate::guard::{Fingerprint, GuardDecision, RepeatGuard};
use crate::metrics;
use crate::primitives::{ActionPrimitives, DefaultActionPrimitives};
use crate::types::{
    ActionConfig, ActionKind, ActionPayload, ActionRequest, ActionResult, Dispatched, ExecCtx,
    DEFAULT_SCROLL_DY,
};

/// Input types that take free text.
const TEXT_INPUT_TYPES: &[&str] = &[
    "text",
    "email",
    "password",
    "search",
    "tel",
    "url",
    "number",
    "date",
    "datetime-local",
    "month",
    "time",
    "week",
];

#[async_trait]
pub trait ActionResolver: Send + Sync {
    /// Resolve and execute one request against `snapshot`. Never panics and
    /// never returns early: every failure is reported in the result.
    async fn resolve(
        &self,
        snapshot: &Snapshot,
        request: ActionRequest,
        ctx: &ExecCtx,
    ) -> ActionResult;
}

/// A validated request, ready to dispatch.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    Click,
    Type { text: String, submit: bool },
    Select { option: String },
    Scroll { dx: f64, dy: f64 },
    Read,
    PressKey { key: String },
}

impl Operation {
    /// Normalised payload used for repeat detection.
    fn payload(&self) -> Option<ActionPayload> {
        match self {
            Operation::Click | Operation::Read => None,
            Operation::Type { text, .. } => Some(ActionPayload::Text(text.clone())),
            Operation::Select { option } => Some(ActionPayload::Option(option.clone())),
            Operation::Scroll { dx, dy } => Some(ActionPayload::Offset { dx: *dx, dy: *dy }),
            Operation::PressKey { key } => Some(ActionPayload::Key(key.clone())),
        }
    }
}

pub struct DefaultActionResolver {
    perceiver: Arc<dyn StructuralPerceiver>,
    primitives: Arc<dyn ActionPrimitives>,
    cfg: ActionConfig,
    guards: DashMap<PageId, RepeatGuard>,
    highlights: DashMap<PageId, Vec<NodeRef>>,
}

impl DefaultActionResolver {
    pub fn new(
        perceiver: Arc<dyn StructuralPerceiver>,
        primitives: Arc<dyn ActionPrimitives>,
        cfg: ActionConfig,
    ) -> Self {
        Self {
            perceiver,
            primitives,
            cfg,
            guards: DashMap::new(),
            highlights: DashMap::new(),
        }
    }

    /// Resolver wired to the default perceiver and primitives over `cdp`.
    pub fn with_cdp(cdp: Arc<dyn Cdp>, cfg: ActionConfig) -> Self {
        Self::new(
            Arc::new(StructuralPerceiverImpl::new(cdp.clone())),
            Arc::new(DefaultActionPrimitives::new(cdp)),
            cfg,
        )
    }

    pub fn config(&self) -> &ActionConfig {
        &self.cfg
    }

    /// Drop the repeat history and highlight list of a closed page.
    pub fn forget_page(&self, page: PageId) {
        self.guards.remove(&page);
        self.highlights.remove(&page);
    }

    /// Scroll the first element showing `text` into view. Page-level: no
    /// index, no liveness re-check and no repeat guard.
    pub async fn scroll_to_text(
        &self,
        page: PageId,
        text: &str,
        ctx: &ExecCtx,
    ) -> Result<Dispatched, ActionError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ActionError::InvalidPayload(
                "scroll_to_text requires non-empty text".into(),
            ));
        }
        if ctx.is_cancelled() {
            return Err(ActionError::Cancelled);
        }
        let budget = ctx.remaining_time();
        let outcome = timeout(budget, self.primitives.scroll_to_text(ctx, page, text))
            .await
            .unwrap_or_else(|_| Err(deadline_exceeded(budget)));
        if let Err(err) = &outcome {
            warn!(action_id = %ctx.action_id, %page, error = %err, "Scroll to text failed");
        }
        outcome
    }

    /// Outline the element at `index` and return its entry. Outlines stay
    /// until [`Self::clear_highlights`] or the element leaves the page.
    pub async fn highlight(
        &self,
        snapshot: &Snapshot,
        index: usize,
        ctx: &ExecCtx,
    ) -> Result<InteractableNode, ActionError> {
        let page = snapshot.page();
        let target = snapshot.get(index).ok_or(ActionError::IndexNotFound {
            index,
            len: snapshot.len(),
        })?;
        if ctx.is_cancelled() {
            return Err(ActionError::Cancelled);
        }
        let budget = ctx.remaining_time();
        timeout(budget, self.primitives.highlight(ctx, page, target.node_ref, true))
            .await
            .unwrap_or_else(|_| Err(deadline_exceeded(budget)))
            .map_err(|err| match err.adapter_error() {
                Some(cause) if cause.is_detached() => ActionError::StaleElement {
                    index,
                    reason: "element left the page".into(),
                },
                _ => err,
            })?;

        let mut marked = self.highlights.entry(page).or_default();
        if !marked.contains(&target.node_ref) {
            marked.push(target.node_ref);
        }
        Ok(target.clone())
    }

    /// Restore every element outlined on `page` and return how many were
    /// restored. Elements that left the page count as cleared; the first
    /// other failure is returned after every element has been tried.
    pub async fn clear_highlights(&self, page: PageId, ctx: &ExecCtx) -> Result<usize, ActionError> {
        let marked = self
            .highlights
            .remove(&page)
            .map(|(_, nodes)| nodes)
            .unwrap_or_default();
        let mut first_error = None;
        let mut cleared = 0;
        for node in marked {
            match self.primitives.highlight(ctx, page, node, false).await {
                Ok(()) => cleared += 1,
                Err(err) if err.adapter_error().map_or(false, AdapterError::is_detached) => {
                    cleared += 1
                }
                Err(err) => {
                    warn!(%page, %node, error = %err, "Failed to clear highlight");
                    first_error.get_or_insert(err);
                }
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(cleared),
        }
    }

    async fn run(
        &self,
        snapshot: &Snapshot,
        request: &ActionRequest,
        ctx: &ExecCtx,
        warning: &mut Option<String>,
    ) -> Result<Dispatched, ActionError> {
        let page = snapshot.page();
        let target = snapshot
            .get(request.index)
            .ok_or(ActionError::IndexNotFound {
                index: request.index,
                len: snapshot.len(),
            })?;

        let verdict = self
            .perceiver
            .recheck(page, target.node_ref, snapshot.config())
            .await;
        if verdict.timed_out() {
            return Err(ActionError::ClassifierTimeout {
                index: request.index,
            });
        }
        if !verdict.interactable {
            return Err(ActionError::StaleElement {
                index: request.index,
                reason: verdict.reason,
            });
        }

        let operation = validate(request, target)?;

        if ctx.is_cancelled() {
            return Err(ActionError::Cancelled);
        }

        let fingerprint = Fingerprint {
            kind: request.kind,
            locator: target.locator.clone(),
            payload: operation.payload(),
        };
        let decision = self
            .guards
            .entry(page)
            .or_insert_with(|| RepeatGuard::new(self.cfg.repeat_guard.clone()))
            .check(&fingerprint);
        match decision {
            GuardDecision::Allow => {}
            GuardDecision::Warn { count } => {
                *warning = Some(format!(
                    "'{fingerprint}' issued {count} times in a row; one more repeat will be refused"
                ));
            }
            GuardDecision::Block { count } => {
                return Err(ActionError::RepeatedAction {
                    count,
                    fingerprint: fingerprint.to_string(),
                });
            }
        }

        let budget = ctx.remaining_time();
        timeout(budget, self.dispatch(ctx, page, target, operation))
            .await
            .unwrap_or_else(|_| Err(deadline_exceeded(budget)))
    }

    async fn dispatch(
        &self,
        ctx: &ExecCtx,
        page: PageId,
        target: &InteractableNode,
        operation: Operation,
    ) -> Result<Dispatched, ActionError> {
        let primitives = self.primitives.as_ref();
        match operation {
            Operation::Click => primitives.click(ctx, page, target).await,
            Operation::Type { text, submit } => {
                primitives.type_text(ctx, page, target, &text, submit).await
            }
            Operation::Select { option } => primitives.select(ctx, page, target, &option).await,
            Operation::Scroll { dx, dy } => primitives.scroll(ctx, page, target, dx, dy).await,
            Operation::Read => primitives.read(ctx, page, target).await,
            Operation::PressKey { key } => primitives.press_key(ctx, page, target, &key).await,
        }
    }
}

#[async_trait]
impl ActionResolver for DefaultActionResolver {
    async fn resolve(
        &self,
        snapshot: &Snapshot,
        request: ActionRequest,
        ctx: &ExecCtx,
    ) -> ActionResult {
        let started_at = Utc::now();
        let start_instant = Instant::now();
        let mut warning = None;

        let outcome = self.run(snapshot, &request, ctx, &mut warning).await;
        let latency = start_instant.elapsed();
        let latency_ms = latency.as_millis() as u64;

        let (success, error, message, value) = match outcome {
            Ok(done) => (true, None, done.message, done.value),
            Err(err) => {
                warn!(
                    action_id = %ctx.action_id,
                    index = request.index,
                    kind = %request.kind,
                    error = %err,
                    "Action failed"
                );
                (false, Some(err.kind()), err.to_string(), None)
            }
        };
        if let Some(text) = &warning {
            warn!(action_id = %ctx.action_id, warning = %text, "Repeated action");
        }
        metrics::record_action(error, warning.is_some(), latency);
        info!(
            action_id = %ctx.action_id,
            snapshot_id = %snapshot.id(),
            index = request.index,
            kind = %request.kind,
            success,
            latency_ms,
            "Action resolved"
        );

        ActionResult {
            action_id: ctx.action_id.clone(),
            index: request.index,
            kind: request.kind,
            success,
            error,
            message,
            value,
            warning,
            started_at,
            finished_at: Utc::now(),
            latency_ms,
        }
    }
}

fn deadline_exceeded(budget: Duration) -> ActionError {
    ActionError::dispatch(
        AdapterError::new(AdapterErrorKind::Timeout)
            .with_hint(format!("no response within {}ms", budget.as_millis())),
    )
}

/// Check the payload against the action kind and the target element.
pub fn validate(
    request: &ActionRequest,
    target: &InteractableNode,
) -> Result<Operation, ActionError> {
    let describe = || format!("[{}] <{}>", target.index, target.tag);
    match request.kind {
        ActionKind::Click => Ok(Operation::Click),
        ActionKind::Read => Ok(Operation::Read),
        ActionKind::Type => {
            let Some(ActionPayload::Text(text)) = &request.payload else {
                return Err(ActionError::InvalidPayload(
                    "type requires a text payload".into(),
                ));
            };
            if !accepts_text(target) {
                return Err(ActionError::InvalidPayload(format!(
                    "{} does not accept text",
                    describe()
                )));
            }
            Ok(Operation::Type {
                text: text.clone(),
                submit: request.submit,
            })
        }
        ActionKind::Select => {
            let option = match &request.payload {
                Some(ActionPayload::Option(option)) | Some(ActionPayload::Text(option)) => {
                    option.clone()
                }
                _ => {
                    return Err(ActionError::InvalidPayload(
                        "select requires an option payload".into(),
                    ))
                }
            };
            if !is_selectable(target) {
                return Err(ActionError::InvalidPayload(format!(
                    "{} is not a dropdown or listbox",
                    describe()
                )));
            }
            Ok(Operation::Select { option })
        }
        ActionKind::Scroll => match &request.payload {
            None => Ok(Operation::Scroll {
                dx: 0.0,
                dy: DEFAULT_SCROLL_DY,
            }),
            Some(ActionPayload::Offset { dx, dy }) if dx.is_finite() && dy.is_finite() => {
                Ok(Operation::Scroll { dx: *dx, dy: *dy })
            }
            Some(_) => Err(ActionError::InvalidPayload(
                "scroll takes a finite offset or no payload".into(),
            )),
        },
        ActionKind::PressKey => match &request.payload {
            Some(ActionPayload::Key(key)) if keys::is_supported(key) => {
                Ok(Operation::PressKey { key: key.clone() })
            }
            Some(ActionPayload::Key(key)) => Err(ActionError::InvalidPayload(format!(
                "unsupported key '{key}'"
            ))),
            _ => Err(ActionError::InvalidPayload(
                "press_key requires a key payload".into(),
            )),
        },
    }
}

fn accepts_text(target: &InteractableNode) -> bool {
    let editable = target
        .attr("contenteditable")
        .map(|v| !v.trim().eq_ignore_ascii_case("false"))
        .unwrap_or(false);
    let by_role = matches!(
        target.role.as_deref(),
        Some("textbox" | "searchbox" | "combobox")
    );
    let by_tag = match target.tag.as_str() {
        "textarea" => true,
        "input" => {
            let kind = target
                .attr("type")
                .map(|t| t.trim().to_ascii_lowercase())
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| "text".into());
            TEXT_INPUT_TYPES.contains(&kind.as_str())
        }
        _ => false,
    };
    by_tag || editable || by_role
}

fn is_selectable(target: &InteractableNode) -> bool {
    target.tag == "select" || matches!(target.role.as_deref(), Some("listbox" | "combobox"))
}
