//! Scroll primitive

use std::time::Instant;

use cdp_adapter::PageId;
use perceiver_structural::InteractableNode;
use tracing::info;

use crate::{
    errors::ActionError,
    primitives::DefaultActionPrimitives,
    types::{Dispatched, ExecCtx},
};

/// Scroll by `(dx, dy)` CSS pixels: the element itself when it overflows,
/// otherwise the window that owns it.
pub async fn execute_scroll(
    primitives: &DefaultActionPrimitives,
    ctx: &ExecCtx,
    page: PageId,
    target: &InteractableNode,
    dx: f64,
    dy: f64,
) -> Result<Dispatched, ActionError> {
    let start_instant = Instant::now();
    info!(
        action_id = %ctx.action_id,
        index = target.index,
        dx = dx,
        dy = dy,
        "Executing scroll primitive"
    );

    let scrolled = primitives
        .cdp()
        .scroll_by(page, target.node_ref, dx, dy)
        .await
        .map_err(ActionError::dispatch)?;

    let latency_ms = start_instant.elapsed().as_millis() as u64;
    info!(
        action_id = %ctx.action_id,
        latency_ms = latency_ms,
        scrolled = %scrolled,
        "Scroll completed successfully"
    );
    Ok(Dispatched::new(format!(
        "scrolled {scrolled} by ({dx}, {dy}) from [{}]",
        target.index
    )))
}
