//! Select primitive - choose an option in a dropdown/listbox

use std::time::Instant;

use cdp_adapter::{AdapterErrorKind, PageId};
use perceiver_structural::InteractableNode;
use tracing::{info, warn};

use crate::{
    errors::ActionError,
    primitives::DefaultActionPrimitives,
    types::{Dispatched, ExecCtx, ExtractedValue},
};

/// Pick the option whose value or visible text matches `option`. The page
/// sees `input` and `change` events as if the user had chosen it.
pub async fn execute_select(
    primitives: &DefaultActionPrimitives,
    ctx: &ExecCtx,
    page: PageId,
    target: &InteractableNode,
    option: &str,
) -> Result<Dispatched, ActionError> {
    let start_instant = Instant::now();
    info!(
        action_id = %ctx.action_id,
        index = target.index,
        locator = %target.locator,
        option = option,
        "Executing select primitive"
    );

    let selected = primitives
        .cdp()
        .select_option(page, target.node_ref, option)
        .await
        .map_err(|err| {
            if err.kind == AdapterErrorKind::OptionNotFound {
                warn!(action_id = %ctx.action_id, data = ?err.data, "Option not present");
            }
            ActionError::dispatch(err)
        })?;

    let latency_ms = start_instant.elapsed().as_millis() as u64;
    info!(
        action_id = %ctx.action_id,
        latency_ms = latency_ms,
        selected = %selected,
        "Select completed successfully"
    );
    Ok(
        Dispatched::new(format!("selected {:?} in [{}]", selected, target.index))
            .with_value(ExtractedValue::Text { text: selected }),
    )
}
