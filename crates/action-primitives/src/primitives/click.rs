//! Click primitive

use std::time::Instant;

use cdp_adapter::PageId;
use perceiver_structural::InteractableNode;
use tracing::{debug, info};

use crate::{
    errors::ActionError,
    primitives::DefaultActionPrimitives,
    types::{Dispatched, ExecCtx},
};

/// Scroll the node into view, then press and release the left button at the
/// center of its first content quad.
pub async fn execute_click(
    primitives: &DefaultActionPrimitives,
    ctx: &ExecCtx,
    page: PageId,
    target: &InteractableNode,
) -> Result<Dispatched, ActionError> {
    let start_instant = Instant::now();
    info!(
        action_id = %ctx.action_id,
        index = target.index,
        locator = %target.locator,
        "Executing click primitive"
    );

    debug!(node = %target.node_ref, "Dispatching mouse press/release");
    primitives
        .cdp()
        .click(page, target.node_ref)
        .await
        .map_err(ActionError::dispatch)?;

    let latency_ms = start_instant.elapsed().as_millis() as u64;
    info!(
        action_id = %ctx.action_id,
        latency_ms = latency_ms,
        "Click completed successfully"
    );
    Ok(Dispatched::new(format!("clicked [{}] {}", target.index, target.label)))
}
