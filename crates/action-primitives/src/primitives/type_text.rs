//! Type text primitive - Type text into input fields

use std::time::Instant;

use cdp_adapter::PageId;
use perceiver_structural::InteractableNode;
use tracing::{debug, info};

use crate::{
    errors::ActionError,
    primitives::DefaultActionPrimitives,
    types::{Dispatched, ExecCtx},
};

/// Replace the field's content with `text` in one `Input.insertText`
/// command, then press Enter when `submit` is set.
pub async fn execute_type_text(
    primitives: &DefaultActionPrimitives,
    ctx: &ExecCtx,
    page: PageId,
    target: &InteractableNode,
    text: &str,
    submit: bool,
) -> Result<Dispatched, ActionError> {
    let start_instant = Instant::now();
    info!(
        action_id = %ctx.action_id,
        index = target.index,
        locator = %target.locator,
        text_length = text.chars().count(),
        submit = submit,
        "Executing type_text primitive"
    );

    primitives
        .cdp()
        .type_text(page, target.node_ref, text)
        .await
        .map_err(ActionError::dispatch)?;

    if submit {
        debug!("Submitting (pressing Enter)");
        primitives
            .cdp()
            .press_key(page, target.node_ref, "Enter")
            .await
            .map_err(ActionError::dispatch)?;
    }

    let latency_ms = start_instant.elapsed().as_millis() as u64;
    info!(
        action_id = %ctx.action_id,
        latency_ms = latency_ms,
        "Type text completed successfully"
    );
    let mut message = format!("typed {:?} into [{}]", text, target.index);
    if submit {
        message.push_str(" and submitted");
    }
    Ok(Dispatched::new(message))
}
