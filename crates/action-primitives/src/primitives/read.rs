//! Read primitive - extract the current value of an element

use std::time::Instant;

use cdp_adapter::PageId;
use perceiver_structural::InteractableNode;
use tracing::info;

use crate::{
    errors::ActionError,
    primitives::DefaultActionPrimitives,
    types::{Dispatched, ExecCtx, ExtractedValue},
};

/// Form controls report their live value, `select` its selection and option
/// list, everything else its inner text.
pub async fn execute_read(
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
        "Executing read primitive"
    );

    let cdp = primitives.cdp();
    let value = match target.tag.as_str() {
        "select" => {
            let state = cdp
                .form_state(page, target.node_ref)
                .await
                .map_err(ActionError::dispatch)?;
            ExtractedValue::Options {
                selected: state.selected,
                options: state.options,
            }
        }
        "input" | "textarea" => {
            let state = cdp
                .form_state(page, target.node_ref)
                .await
                .map_err(ActionError::dispatch)?;
            ExtractedValue::Text {
                text: state.value.unwrap_or_default(),
            }
        }
        _ => ExtractedValue::Text {
            text: cdp
                .inner_text(page, target.node_ref)
                .await
                .map_err(ActionError::dispatch)?,
        },
    };

    let latency_ms = start_instant.elapsed().as_millis() as u64;
    info!(
        action_id = %ctx.action_id,
        latency_ms = latency_ms,
        "Read completed successfully"
    );
    Ok(Dispatched::new(format!("read [{}]", target.index)).with_value(value))
}
