//! Press-key primitive

use std::time::Instant;

use cdp_adapter::PageId;
use perceiver_structural::InteractableNode;
use tracing::info;

use crate::{
    errors::ActionError,
    primitives::DefaultActionPrimitives,
    types::{Dispatched, ExecCtx},
};

pub async fn execute_press_key(
    primitives: &DefaultActionPrimitives,
    ctx: &ExecCtx,
    page: PageId,
    target: &InteractableNode,
    key: &str,
) -> Result<Dispatched, ActionError> {
    let start_instant = Instant::now();
    info!(
        action_id = %ctx.action_id,
        index = target.index,
        key = key,
        "Executing press_key primitive"
    );

    primitives
        .cdp()
        .press_key(page, target.node_ref, key)
        .await
        .map_err(ActionError::dispatch)?;

    let latency_ms = start_instant.elapsed().as_millis() as u64;
    info!(
        action_id = %ctx.action_id,
        latency_ms = latency_ms,
        "Press key completed successfully"
    );
    Ok(Dispatched::new(format!("pressed {key} on [{}]", target.index)))
}
