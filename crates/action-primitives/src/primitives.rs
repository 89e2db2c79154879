//! Action primitives implementation
//!
//! Six element primitives, each one a single input command against a node
//! that the resolver has already re-verified:
//! 1. click - scroll into view, press and release at the box center
//! 2. type_text - focus, clear, insert text, optional Enter
//! 3. select - pick an option by value or visible text
//! 4. scroll - scroll the element if it scrolls, else its window
//! 5. read - value, selected option or inner text
//! 6. press_key - focus and send one key
//!
//! Two page helpers sit beside them: scroll_to_text, which needs no index,
//! and highlight, which outlines or restores a node.

mod click;
mod highlight;
mod press_key;
mod read;
mod scroll;
mod scroll_to_text;
mod select;
mod type_text;

pub use click::*;
pub use highlight::*;
pub use press_key::*;
pub use read::*;
pub use scroll::*;
pub use scroll_to_text::*;
pub use select::*;
pub use type_text::*;

use std::sync::Arc;

use async_trait::async_trait;
use cdp_adapter::{Cdp, NodeRef, PageId};
use perceiver_structural::InteractableNode;

use crate::{
    errors::ActionError,
    types::{Dispatched, ExecCtx},
};

/// Action primitives trait
///
/// Primitives do not re-check liveness or validate payloads; the resolver
/// does both before calling in. Adapter failures come back as
/// [`ActionError::DispatchFailed`].
#[async_trait]
pub trait ActionPrimitives: Send + Sync {
    async fn click(
        &self,
        ctx: &ExecCtx,
        page: PageId,
        target: &InteractableNode,
    ) -> Result<Dispatched, ActionError>;

    async fn type_text(
        &self,
        ctx: &ExecCtx,
        page: PageId,
        target: &InteractableNode,
        text: &str,
        submit: bool,
    ) -> Result<Dispatched, ActionError>;

    async fn select(
        &self,
        ctx: &ExecCtx,
        page: PageId,
        target: &InteractableNode,
        option: &str,
    ) -> Result<Dispatched, ActionError>;

    async fn scroll(
        &self,
        ctx: &ExecCtx,
        page: PageId,
        target: &InteractableNode,
        dx: f64,
        dy: f64,
    ) -> Result<Dispatched, ActionError>;

    async fn read(
        &self,
        ctx: &ExecCtx,
        page: PageId,
        target: &InteractableNode,
    ) -> Result<Dispatched, ActionError>;

    async fn press_key(
        &self,
        ctx: &ExecCtx,
        page: PageId,
        target: &InteractableNode,
        key: &str,
    ) -> Result<Dispatched, ActionError>;

    async fn scroll_to_text(
        &self,
        ctx: &ExecCtx,
        page: PageId,
        text: &str,
    ) -> Result<Dispatched, ActionError>;

    async fn highlight(
        &self,
        ctx: &ExecCtx,
        page: PageId,
        node: NodeRef,
        on: bool,
    ) -> Result<(), ActionError>;
}

/// Default implementation of action primitives
pub struct DefaultActionPrimitives {
    cdp: Arc<dyn Cdp>,
}

impl DefaultActionPrimitives {
    pub fn new(cdp: Arc<dyn Cdp>) -> Self {
        Self { cdp }
    }

    pub fn cdp(&self) -> &dyn Cdp {
        self.cdp.as_ref()
    }
}

#[async_trait]
impl ActionPrimitives for DefaultActionPrimitives {
    async fn click(
        &self,
        ctx: &ExecCtx,
        page: PageId,
        target: &InteractableNode,
    ) -> Result<Dispatched, ActionError> {
        click::execute_click(self, ctx, page, target).await
    }

    async fn type_text(
        &self,
        ctx: &ExecCtx,
        page: PageId,
        target: &InteractableNode,
        text: &str,
        submit: bool,
    ) -> Result<Dispatched, ActionError> {
        type_text::execute_type_text(self, ctx, page, target, text, submit).await
    }

    async fn select(
        &self,
        ctx: &ExecCtx,
        page: PageId,
        target: &InteractableNode,
        option: &str,
    ) -> Result<Dispatched, ActionError> {
        select::execute_select(self, ctx, page, target, option).await
    }

    async fn scroll(
        &self,
        ctx: &ExecCtx,
        page: PageId,
        target: &InteractableNode,
        dx: f64,
        dy: f64,
    ) -> Result<Dispatched, ActionError> {
        scroll::execute_scroll(self, ctx, page, target, dx, dy).await
    }

    async fn read(
        &self,
        ctx: &ExecCtx,
        page: PageId,
        target: &InteractableNode,
    ) -> Result<Dispatched, ActionError> {
        read::execute_read(self, ctx, page, target).await
    }

    async fn press_key(
        &self,
        ctx: &ExecCtx,
        page: PageId,
        target: &InteractableNode,
        key: &str,
    ) -> Result<Dispatched, ActionError> {
        press_key::execute_press_key(self, ctx, page, target, key).await
    }

    async fn scroll_to_text(
        &self,
        ctx: &ExecCtx,
        page: PageId,
        text: &str,
    ) -> Result<Dispatched, ActionError> {
        scroll_to_text::execute_scroll_to_text(self, ctx, page, text).await
    }

    async fn highlight(
        &self,
        ctx: &ExecCtx,
        page: PageId,
        node: NodeRef,
        on: bool,
    ) -> Result<(), ActionError> {
        highlight::execute_highlight(self, ctx, page, node, on).await
    }
}
