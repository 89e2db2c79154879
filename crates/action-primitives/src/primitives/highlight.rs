//! Highlight primitive

use cdp_adapter::{NodeRef, PageId};
use tracing::debug;

use crate::{errors::ActionError, primitives::DefaultActionPrimitives, types::ExecCtx};

pub async fn execute_highlight(
    primitives: &DefaultActionPrimitives,
    ctx: &ExecCtx,
    page: PageId,
    node: NodeRef,
    on: bool,
) -> Result<(), ActionError> {
    debug!(action_id = %ctx.action_id, %node, on, "Toggling highlight");
    primitives
        .cdp()
        .set_highlight(page, node, on)
        .await
        .map_err(ActionError::dispatch)
}
