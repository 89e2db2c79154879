//! Scroll-to-text primitive

use std::time::Instant;

use cdp_adapter::{AdapterError, AdapterErrorKind, PageId};
use tracing::info;

use crate::{
    errors::ActionError,
    primitives::DefaultActionPrimitives,
    types::{Dispatched, ExecCtx},
};

/// Bring the first element showing `text` into the middle of the viewport.
/// Searches the main document only; frame contents are not visited.
pub async fn execute_scroll_to_text(
    primitives: &DefaultActionPrimitives,
    ctx: &ExecCtx,
    page: PageId,
    text: &str,
) -> Result<Dispatched, ActionError> {
    let start_instant = Instant::now();
    info!(
        action_id = %ctx.action_id,
        text = %text,
        "Executing scroll-to-text primitive"
    );

    let cdp = primitives.cdp();
    let document = cdp.document(page).await.map_err(ActionError::dispatch)?;
    let found = cdp
        .scroll_to_text(page, document.node, text)
        .await
        .map_err(ActionError::dispatch)?;
    if !found {
        return Err(ActionError::dispatch(
            AdapterError::new(AdapterErrorKind::NotInteractable)
                .with_hint(format!("no element shows the text {text:?}")),
        ));
    }

    let latency_ms = start_instant.elapsed().as_millis() as u64;
    info!(
        action_id = %ctx.action_id,
        latency_ms = latency_ms,
        "Scroll-to-text completed successfully"
    );
    Ok(Dispatched::new(format!("scrolled to {text:?}")))
}
