use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio::{select, spawn};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::CdpConfig;
use crate::dom::{BoxRect, DomNode, DomNodeKind, FormState, NodeRef, StyleFacts};
use crate::error::{AdapterError, AdapterErrorKind};
use crate::ids::PageId;
use crate::keys;
use crate::metrics;
use crate::registry::Registry;
use crate::scripts;
use crate::transport::{CdpTransport, ChromeTransport, CommandTarget, TransportEvent};
use crate::resolve_chrome_path;

/// Browser surface consumed by the perceiver and the action primitives.
///
/// Every method takes a [`NodeRef`] that may have died since it was obtained;
/// implementations report that as [`AdapterErrorKind::NodeDetached`].
#[async_trait]
pub trait Cdp: Send + Sync {
    /// Root document of the page's main frame.
    async fn document(&self, page: PageId) -> Result<DomNode, AdapterError>;

    /// Describe a node one level deep: attributes, element children, author
    /// shadow roots and, for frame owners, the hosted document.
    async fn describe_node(&self, page: PageId, node: NodeRef) -> Result<DomNode, AdapterError>;

    /// First element matching `selector` below `scope`.
    async fn query_selector(
        &self,
        page: PageId,
        scope: NodeRef,
        selector: &str,
    ) -> Result<Option<NodeRef>, AdapterError>;

    /// Rendered text, whitespace-collapsed.
    async fn inner_text(&self, page: PageId, node: NodeRef) -> Result<String, AdapterError>;

    /// Layout box relative to the owning frame's viewport; `None` when the
    /// element has no layout object.
    async fn bounding_box(
        &self,
        page: PageId,
        node: NodeRef,
    ) -> Result<Option<BoxRect>, AdapterError>;

    async fn computed_style(&self, page: PageId, node: NodeRef)
        -> Result<StyleFacts, AdapterError>;

    async fn form_state(&self, page: PageId, node: NodeRef) -> Result<FormState, AdapterError>;

    /// Whether a hit test at (`x`, `y`) lands on the node, one of its
    /// descendants, or a label bound to it.
    async fn is_topmost_at(
        &self,
        page: PageId,
        node: NodeRef,
        x: f64,
        y: f64,
    ) -> Result<bool, AdapterError>;

    async fn has_click_listener(&self, page: PageId, node: NodeRef) -> Result<bool, AdapterError>;

    /// `false` for nodes that left the document, including ones the browser
    /// no longer knows about.
    async fn is_connected(&self, page: PageId, node: NodeRef) -> Result<bool, AdapterError>;

    async fn click(&self, page: PageId, node: NodeRef) -> Result<(), AdapterError>;

    /// Focus the element, clear it and insert `text` as a single input command.
    async fn type_text(&self, page: PageId, node: NodeRef, text: &str) -> Result<(), AdapterError>;

    /// Select by option value or visible text; returns the new value.
    async fn select_option(
        &self,
        page: PageId,
        node: NodeRef,
        option: &str,
    ) -> Result<String, AdapterError>;

    /// Scroll the element when it scrolls itself, otherwise its window.
    /// Returns which of the two moved (`"element"` or `"window"`).
    async fn scroll_by(
        &self,
        page: PageId,
        node: NodeRef,
        dx: f64,
        dy: f64,
    ) -> Result<String, AdapterError>;

    async fn press_key(&self, page: PageId, node: NodeRef, key: &str) -> Result<(), AdapterError>;

    /// Scroll the first element below `scope` whose own text equals `text`
    /// (falling back to the first one containing it) into the middle of the
    /// viewport. `false` when nothing matches.
    async fn scroll_to_text(
        &self,
        page: PageId,
        scope: NodeRef,
        text: &str,
    ) -> Result<bool, AdapterError>;

    /// Outline the element, or restore its own inline style when `on` is
    /// false. Toggling is idempotent.
    async fn set_highlight(&self, page: PageId, node: NodeRef, on: bool)
        -> Result<(), AdapterError>;
}

pub struct CdpAdapter {
    pub cfg: CdpConfig,
    pub registry: Arc<Registry>,
    shutdown: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    transport: Arc<dyn CdpTransport>,
}

impl CdpAdapter {
    /// Adapter over a real Chrome. Fails when neither `websocket_url` nor a
    /// Chrome executable is available.
    pub fn new(mut cfg: CdpConfig) -> Result<Self, AdapterError> {
        if cfg.websocket_url.is_none() {
            let Some(path) = resolve_chrome_path(&cfg) else {
                return Err(AdapterError::new(AdapterErrorKind::CdpIo).with_hint(
                    "no Chrome executable found; set PAGEPILOT_CHROME or browser.websocket_url",
                ));
            };
            cfg.executable = path;
        }
        let transport = Arc::new(ChromeTransport::new(cfg.clone()));
        Ok(Self::with_transport(cfg, transport))
    }

    pub fn with_transport(cfg: CdpConfig, transport: Arc<dyn CdpTransport>) -> Self {
        Self {
            cfg,
            registry: Arc::new(Registry::new()),
            shutdown: CancellationToken::new(),
            tasks: Mutex::new(Vec::new()),
            transport,
        }
    }

    pub fn registry(&self) -> Arc<Registry> {
        Arc::clone(&self.registry)
    }

    pub async fn start(self: Arc<Self>) -> Result<(), AdapterError> {
        {
            let guard = self.tasks.lock().await;
            if !guard.is_empty() {
                return Ok(());
            }
        }

        self.transport.start().await?;
        let loop_task = spawn(Self::event_loop(Arc::clone(&self)));
        self.tasks.lock().await.push(loop_task);
        info!(target: "cdp-adapter", "event loop started");
        Ok(())
    }

    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let mut handles = self.tasks.lock().await;
        while let Some(handle) = handles.pop() {
            let _ = handle.await;
        }
        self.registry.clear();
    }

    /// Open a new tab and wait until its flattened session is attached.
    pub async fn create_page(&self, url: &str) -> Result<PageId, AdapterError> {
        let response = self
            .send_command("Target.createTarget", json!({ "url": url }))
            .await?;
        let target_id = response
            .get("targetId")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                AdapterError::new(AdapterErrorKind::Internal)
                    .with_hint("createTarget missing targetId")
            })?
            .to_string();

        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            if let Some(page) = self.registry.page_for_target(&target_id) {
                if self.registry.get_cdp_session(&page).is_some() {
                    return Ok(page);
                }
            }
            if Instant::now() >= deadline {
                return Err(AdapterError::new(AdapterErrorKind::Timeout)
                    .with_hint(format!("timed out waiting for target {target_id} to attach")));
            }
            sleep(Duration::from_millis(50)).await;
        }
    }

    /// Navigate and wait for `document.readyState` to leave `loading`.
    pub async fn navigate(
        &self,
        page: PageId,
        url: &str,
        deadline: Duration,
    ) -> Result<(), AdapterError> {
        let started = Instant::now();
        let response = self
            .send_page_command(page, "Page.navigate", json!({ "url": url }))
            .await?;
        if let Some(error_text) = response.get("errorText").and_then(Value::as_str) {
            return Err(AdapterError::new(AdapterErrorKind::CdpIo)
                .with_hint(format!("navigation to {url} failed: {error_text}")));
        }
        self.registry.set_recent_url(&page, url.to_string());
        self.wait_for_dom_ready(page, started + deadline).await
    }

    async fn wait_for_dom_ready(&self, page: PageId, deadline: Instant) -> Result<(), AdapterError> {
        loop {
            if Instant::now() >= deadline {
                return Err(AdapterError::new(AdapterErrorKind::Timeout)
                    .with_hint("document did not become ready before the deadline"));
            }

            let response = self
                .send_page_command(
                    page,
                    "Runtime.evaluate",
                    json!({
                        "expression": "document.readyState",
                        "returnByValue": true,
                    }),
                )
                .await?;

            let ready = response
                .get("result")
                .and_then(|v| v.get("value"))
                .and_then(Value::as_str)
                .map(|state| matches!(state, "interactive" | "complete"))
                .unwrap_or(false);
            if ready {
                return Ok(());
            }

            sleep(Duration::from_millis(100)).await;
        }
    }

    async fn event_loop(self: Arc<Self>) {
        debug!(target: "cdp-adapter", "event loop entered");
        const MIN_BACKOFF: Duration = Duration::from_millis(100);
        const MAX_BACKOFF: Duration = Duration::from_secs(5);
        let mut backoff = MIN_BACKOFF;

        loop {
            select! {
                _ = self.shutdown.cancelled() => break,
                event = self.transport.next_event() => {
                    match event {
                        Some(ev) => {
                            backoff = MIN_BACKOFF;
                            if let Err(err) = self.process_event(ev) {
                                warn!(target: "cdp-adapter", ?err, "cdp event handling error");
                            }
                        }
                        None => {
                            if self.shutdown.is_cancelled() {
                                break;
                            }
                            if !self.registry.iter().is_empty() {
                                warn!(target: "cdp-adapter", "cdp transport restarted; active pages were reset");
                            }
                            self.registry.clear();
                            if let Err(err) = self.transport.start().await {
                                warn!(target: "cdp-adapter", ?err, "transport restart failed");
                            }
                            sleep(backoff).await;
                            backoff = (backoff + MIN_BACKOFF).min(MAX_BACKOFF);
                        }
                    }
                }
            }
        }
        debug!(target: "cdp-adapter", "event loop exiting");
    }

    fn process_event(&self, event: TransportEvent) -> Result<(), AdapterError> {
        metrics::record_event();
        match event.method.as_str() {
            "Target.targetCreated" | "Target.targetInfoChanged" => {
                let payload: TargetInfoEnvelope = decode(event.params)?;
                let info = payload.target_info;
                if info.target_type != "page" {
                    return Ok(());
                }
                let known = self.registry.page_for_target(&info.target_id);
                match known {
                    Some(page) => {
                        if let Some(url) = info.url.filter(|u| !u.is_empty()) {
                            self.registry.set_recent_url(&page, url);
                        }
                    }
                    None => {
                        let page = self.registry.insert_target(&info.target_id, info.url);
                        debug!(target: "cdp-adapter", %page, target_id = %info.target_id, "page target registered");
                    }
                }
            }
            "Target.attachedToTarget" => {
                let payload: AttachedToTargetParams = decode(event.params)?;
                if payload.target_info.target_type != "page" {
                    return Ok(());
                }
                self.registry
                    .insert_target(&payload.target_info.target_id, payload.target_info.url);
                self.registry
                    .attach_session(&payload.target_info.target_id, payload.session_id);
            }
            "Target.detachedFromTarget" => {
                let payload: DetachedFromTargetParams = decode(event.params)?;
                self.registry.detach_session(&payload.session_id);
            }
            "Target.targetDestroyed" => {
                let payload: TargetDestroyedParams = decode(event.params)?;
                if let Some(page) = self.registry.remove_target(&payload.target_id) {
                    debug!(target: "cdp-adapter", %page, "page target destroyed");
                }
            }
            _ => {
                debug!(target: "cdp-adapter", method = %event.method, "unhandled cdp event");
            }
        }
        Ok(())
    }

    async fn send_command(&self, method: &str, params: Value) -> Result<Value, AdapterError> {
        self.dispatch(CommandTarget::Browser, method, params).await
    }

    async fn send_page_command(
        &self,
        page: PageId,
        method: &str,
        params: Value,
    ) -> Result<Value, AdapterError> {
        let session = self.registry.get_cdp_session(&page).ok_or_else(|| {
            AdapterError::new(AdapterErrorKind::TargetNotFound)
                .with_hint(format!("missing cdp session for page {page}"))
        })?;
        self.dispatch(CommandTarget::Session(session), method, params)
            .await
    }

    async fn dispatch(
        &self,
        target: CommandTarget,
        method: &str,
        params: Value,
    ) -> Result<Value, AdapterError> {
        let start = Instant::now();
        metrics::record_command(method);
        match self.transport.send_command(target, method, params).await {
            Ok(value) => {
                metrics::record_command_success(method, start.elapsed());
                Ok(value)
            }
            Err(err) => {
                metrics::record_command_failure(method, err.kind);
                Err(err)
            }
        }
    }

    async fn resolve_object(&self, page: PageId, node: NodeRef) -> Result<String, AdapterError> {
        let response = self
            .send_page_command(page, "DOM.resolveNode", json!({ "backendNodeId": node.0 }))
            .await
            .map_err(|err| match err.kind {
                AdapterErrorKind::CdpIo | AdapterErrorKind::Internal => {
                    AdapterError::new(AdapterErrorKind::NodeDetached)
                        .with_hint(format!("{node} could not be resolved: {err}"))
                }
                _ => err,
            })?;
        response
            .pointer("/object/objectId")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| {
                AdapterError::new(AdapterErrorKind::NodeDetached)
                    .with_hint(format!("{node} has no remote object"))
            })
    }

    async fn release_object(&self, page: PageId, object_id: String) {
        if let Err(err) = self
            .send_page_command(page, "Runtime.releaseObject", json!({ "objectId": object_id }))
            .await
        {
            debug!(target: "cdp-adapter", ?err, "releaseObject failed");
        }
    }

    /// Run `declaration` with `this` bound to the node and return its value.
    async fn call_function(
        &self,
        page: PageId,
        node: NodeRef,
        declaration: &str,
        args: &[Value],
    ) -> Result<Value, AdapterError> {
        let object_id = self.resolve_object(page, node).await?;
        let arguments: Vec<Value> = args.iter().map(|value| json!({ "value": value })).collect();
        let response = self
            .send_page_command(
                page,
                "Runtime.callFunctionOn",
                json!({
                    "functionDeclaration": declaration,
                    "objectId": object_id.clone(),
                    "arguments": arguments,
                    "returnByValue": true,
                    "awaitPromise": true,
                }),
            )
            .await;
        self.release_object(page, object_id).await;
        let response = response?;

        if let Some(details) = response.get("exceptionDetails") {
            let message = details
                .pointer("/exception/description")
                .or_else(|| details.get("text"))
                .and_then(Value::as_str)
                .unwrap_or("script exception");
            return Err(AdapterError::new(AdapterErrorKind::Internal)
                .with_hint(format!("script on {node} threw: {message}")));
        }
        Ok(response
            .pointer("/result/value")
            .cloned()
            .unwrap_or(Value::Null))
    }

    async fn call_typed<T>(
        &self,
        page: PageId,
        node: NodeRef,
        declaration: &str,
        args: &[Value],
    ) -> Result<T, AdapterError>
    where
        T: for<'de> Deserialize<'de>,
    {
        let value = self.call_function(page, node, declaration, args).await?;
        serde_json::from_value(value).map_err(|err| {
            AdapterError::new(AdapterErrorKind::Internal)
                .with_hint(format!("unexpected script result for {node}: {err}"))
        })
    }

    async fn focus(&self, page: PageId, node: NodeRef, clear: bool) -> Result<(), AdapterError> {
        let focused: bool = self
            .call_typed(page, node, scripts::FOCUS_FN, &[json!(clear)])
            .await?;
        if !focused {
            return Err(AdapterError::new(AdapterErrorKind::NotInteractable)
                .with_hint(format!("{node} did not take focus")));
        }
        Ok(())
    }

    async fn mouse_event(&self, page: PageId, kind: &str, x: f64, y: f64) -> Result<(), AdapterError> {
        self.send_page_command(
            page,
            "Input.dispatchMouseEvent",
            json!({
                "type": kind,
                "x": x,
                "y": y,
                "button": "left",
                "buttons": 1,
                "clickCount": 1,
                "pointerType": "mouse",
            }),
        )
        .await
        .map(|_| ())
    }
}

#[async_trait]
impl Cdp for CdpAdapter {
    async fn document(&self, page: PageId) -> Result<DomNode, AdapterError> {
        let response = self
            .send_page_command(page, "DOM.getDocument", json!({ "depth": 0 }))
            .await?;
        let root = response
            .pointer("/root/backendNodeId")
            .and_then(Value::as_u64)
            .ok_or_else(|| {
                AdapterError::new(AdapterErrorKind::Internal)
                    .with_hint("DOM.getDocument returned no root")
            })?;
        self.describe_node(page, NodeRef(root)).await
    }

    async fn describe_node(&self, page: PageId, node: NodeRef) -> Result<DomNode, AdapterError> {
        let response = self
            .send_page_command(
                page,
                "DOM.describeNode",
                json!({ "backendNodeId": node.0, "depth": 1, "pierce": true }),
            )
            .await?;
        let raw: RawNode = response
            .get("node")
            .cloned()
            .map(decode)
            .transpose()?
            .ok_or_else(|| {
                AdapterError::new(AdapterErrorKind::NodeDetached)
                    .with_hint(format!("{node} was not described"))
            })?;
        raw.into_dom_node()
    }

    async fn query_selector(
        &self,
        page: PageId,
        scope: NodeRef,
        selector: &str,
    ) -> Result<Option<NodeRef>, AdapterError> {
        let object_id = self.resolve_object(page, scope).await?;
        let response = self
            .send_page_command(
                page,
                "Runtime.callFunctionOn",
                json!({
                    "functionDeclaration": scripts::QUERY_FN,
                    "objectId": object_id.clone(),
                    "arguments": [{ "value": selector }],
                    "returnByValue": false,
                }),
            )
            .await;
        self.release_object(page, object_id).await;
        let response = response?;

        let Some(found) = response
            .pointer("/result/objectId")
            .and_then(Value::as_str)
            .map(str::to_string)
        else {
            return Ok(None);
        };
        let described = self
            .send_page_command(page, "DOM.describeNode", json!({ "objectId": found.clone() }))
            .await;
        self.release_object(page, found).await;
        Ok(described?
            .pointer("/node/backendNodeId")
            .and_then(Value::as_u64)
            .map(NodeRef))
    }

    async fn inner_text(&self, page: PageId, node: NodeRef) -> Result<String, AdapterError> {
        let text: Option<String> = self.call_typed(page, node, scripts::TEXT_FN, &[]).await?;
        Ok(text.unwrap_or_default())
    }

    async fn bounding_box(
        &self,
        page: PageId,
        node: NodeRef,
    ) -> Result<Option<BoxRect>, AdapterError> {
        self.call_typed(page, node, scripts::BOX_FN, &[]).await
    }

    async fn computed_style(
        &self,
        page: PageId,
        node: NodeRef,
    ) -> Result<StyleFacts, AdapterError> {
        self.call_typed(page, node, scripts::STYLE_FN, &[]).await
    }

    async fn form_state(&self, page: PageId, node: NodeRef) -> Result<FormState, AdapterError> {
        self.call_typed(page, node, scripts::FORM_STATE_FN, &[]).await
    }

    async fn is_topmost_at(
        &self,
        page: PageId,
        node: NodeRef,
        x: f64,
        y: f64,
    ) -> Result<bool, AdapterError> {
        self.call_typed(page, node, scripts::HIT_TEST_FN, &[json!(x), json!(y)])
            .await
    }

    async fn has_click_listener(&self, page: PageId, node: NodeRef) -> Result<bool, AdapterError> {
        let object_id = self.resolve_object(page, node).await?;
        let response = self
            .send_page_command(
                page,
                "DOMDebugger.getEventListeners",
                json!({ "objectId": object_id.clone(), "depth": 0 }),
            )
            .await;
        self.release_object(page, object_id).await;
        let listeners = response?
            .get("listeners")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        Ok(listeners.iter().any(|listener| {
            matches!(
                listener.get("type").and_then(Value::as_str),
                Some("click" | "mousedown" | "mouseup" | "pointerdown" | "pointerup")
            )
        }))
    }

    async fn is_connected(&self, page: PageId, node: NodeRef) -> Result<bool, AdapterError> {
        match self.call_typed(page, node, scripts::CONNECTED_FN, &[]).await {
            Ok(connected) => Ok(connected),
            Err(err) if err.is_detached() => Ok(false),
            Err(err) => Err(err),
        }
    }

    async fn click(&self, page: PageId, node: NodeRef) -> Result<(), AdapterError> {
        self.call_function(page, node, scripts::SCROLL_INTO_VIEW_FN, &[])
            .await?;
        let quads = self
            .send_page_command(page, "DOM.getContentQuads", json!({ "backendNodeId": node.0 }))
            .await?;
        let quad: Vec<f64> = quads
            .get("quads")
            .and_then(Value::as_array)
            .and_then(|all| all.first())
            .cloned()
            .map(decode)
            .transpose()?
            .unwrap_or_default();
        let (x, y) = BoxRect::quad_center(&quad).ok_or_else(|| {
            AdapterError::new(AdapterErrorKind::NotInteractable)
                .with_hint(format!("{node} has no content quads"))
        })?;

        self.mouse_event(page, "mousePressed", x, y).await?;
        self.mouse_event(page, "mouseReleased", x, y).await
    }

    async fn type_text(&self, page: PageId, node: NodeRef, text: &str) -> Result<(), AdapterError> {
        self.focus(page, node, true).await?;
        self.send_page_command(page, "Input.insertText", json!({ "text": text }))
            .await
            .map(|_| ())
    }

    async fn select_option(
        &self,
        page: PageId,
        node: NodeRef,
        option: &str,
    ) -> Result<String, AdapterError> {
        let outcome: SelectOutcome = self
            .call_typed(page, node, scripts::SELECT_FN, &[json!(option)])
            .await?;
        match outcome.status.as_str() {
            "selected" => Ok(outcome.value.unwrap_or_default()),
            _ => Err(AdapterError::new(AdapterErrorKind::OptionNotFound)
                .with_hint(format!("no option matching '{option}'"))
                .with_data(json!({ "available": outcome.available }))),
        }
    }

    async fn scroll_by(
        &self,
        page: PageId,
        node: NodeRef,
        dx: f64,
        dy: f64,
    ) -> Result<String, AdapterError> {
        self.call_typed(page, node, scripts::SCROLL_FN, &[json!(dx), json!(dy)])
            .await
    }

    async fn press_key(&self, page: PageId, node: NodeRef, key: &str) -> Result<(), AdapterError> {
        let def = keys::lookup(key).ok_or_else(|| {
            AdapterError::new(AdapterErrorKind::Internal)
                .with_hint(format!("unsupported key '{key}'"))
        })?;
        self.focus(page, node, false).await?;

        let mut down = json!({
            "type": if def.text.is_some() { "keyDown" } else { "rawKeyDown" },
            "key": def.key,
            "code": def.code,
            "windowsVirtualKeyCode": def.key_code,
            "nativeVirtualKeyCode": def.key_code,
        });
        if let Some(text) = def.text {
            down["text"] = json!(text);
        }
        self.send_page_command(page, "Input.dispatchKeyEvent", down)
            .await?;
        self.send_page_command(
            page,
            "Input.dispatchKeyEvent",
            json!({
                "type": "keyUp",
                "key": def.key,
                "code": def.code,
                "windowsVirtualKeyCode": def.key_code,
                "nativeVirtualKeyCode": def.key_code,
            }),
        )
        .await
        .map(|_| ())
    }

    async fn scroll_to_text(
        &self,
        page: PageId,
        scope: NodeRef,
        text: &str,
    ) -> Result<bool, AdapterError> {
        self.call_typed(page, scope, scripts::FIND_TEXT_FN, &[json!(text)])
            .await
    }

    async fn set_highlight(
        &self,
        page: PageId,
        node: NodeRef,
        on: bool,
    ) -> Result<(), AdapterError> {
        let styled: bool = self
            .call_typed(page, node, scripts::HIGHLIGHT_FN, &[json!(on)])
            .await?;
        if !styled {
            return Err(AdapterError::new(AdapterErrorKind::NotInteractable)
                .with_hint(format!("{node} takes no inline style")));
        }
        Ok(())
    }
}

fn decode<T: for<'de> Deserialize<'de>>(value: Value) -> Result<T, AdapterError> {
    serde_json::from_value(value)
        .map_err(|err| AdapterError::new(AdapterErrorKind::Internal).with_hint(err.to_string()))
}

#[derive(Debug, Deserialize)]
struct SelectOutcome {
    status: String,
    #[serde(default)]
    value: Option<String>,
    #[serde(default)]
    available: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawNode {
    backend_node_id: u64,
    node_type: u32,
    #[serde(default)]
    node_name: String,
    #[serde(default)]
    local_name: String,
    #[serde(default)]
    attributes: Vec<String>,
    #[serde(default)]
    children: Vec<RawNode>,
    #[serde(default)]
    shadow_roots: Vec<RawNode>,
    #[serde(default)]
    shadow_root_type: Option<String>,
    #[serde(default)]
    content_document: Option<Box<RawNode>>,
    #[serde(default, rename = "documentURL")]
    document_url: Option<String>,
}

impl RawNode {
    fn into_dom_node(self) -> Result<DomNode, AdapterError> {
        let node = NodeRef(self.backend_node_id);
        let (kind, tag) = match self.node_type {
            9 => (DomNodeKind::Document, "#document".to_string()),
            11 => (DomNodeKind::ShadowRoot, "#shadow-root".to_string()),
            1 => {
                let name = if self.local_name.is_empty() {
                    &self.node_name
                } else {
                    &self.local_name
                };
                (DomNodeKind::Element, name.to_ascii_lowercase())
            }
            other => {
                return Err(AdapterError::new(AdapterErrorKind::Internal)
                    .with_hint(format!("{node} has unsupported node type {other}")))
            }
        };

        let attributes = self
            .attributes
            .chunks(2)
            .filter_map(|pair| match pair {
                [name, value] => Some((name.to_ascii_lowercase(), value.clone())),
                _ => None,
            })
            .collect();

        let mut children: Vec<NodeRef> = self
            .shadow_roots
            .iter()
            .filter(|root| root.shadow_root_type.as_deref() != Some("user-agent"))
            .map(|root| NodeRef(root.backend_node_id))
            .collect();
        children.extend(
            self.children
                .iter()
                .filter(|child| child.node_type == 1)
                .map(|child| NodeRef(child.backend_node_id)),
        );

        let content_document = self
            .content_document
            .as_ref()
            .map(|doc| NodeRef(doc.backend_node_id));
        let document_url = self
            .document_url
            .or_else(|| self.content_document.and_then(|doc| doc.document_url));

        Ok(DomNode {
            node,
            kind,
            tag,
            attributes,
            children,
            content_document,
            document_url,
        })
    }
}

#[derive(Debug, Deserialize)]
struct TargetInfoEnvelope {
    #[serde(rename = "targetInfo")]
    target_info: TargetInfoPayload,
}

#[derive(Debug, Deserialize)]
struct TargetDestroyedParams {
    #[serde(rename = "targetId")]
    target_id: String,
}

#[derive(Debug, Deserialize)]
struct AttachedToTargetParams {
    #[serde(rename = "sessionId")]
    session_id: String,
    #[serde(rename = "targetInfo")]
    target_info: TargetInfoPayload,
}

#[derive(Debug, Deserialize)]
struct DetachedFromTargetParams {
    #[serde(rename = "sessionId")]
    session_id: String,
}

#[derive(Debug, Deserialize)]
struct TargetInfoPayload {
    #[serde(rename = "targetId")]
    target_id: String,
    #[serde(rename = "type")]
    target_type: String,
    url: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{HashMap, VecDeque};
    use std::sync::atomic::{AtomicBool, Ordering};
    use tokio::sync::mpsc;
    use tokio::time::timeout;

    struct MockTransport {
        started: AtomicBool,
        rx: Mutex<mpsc::Receiver<TransportEvent>>,
        commands: Mutex<Vec<(String, Value)>>,
        responses: Mutex<HashMap<String, VecDeque<Result<Value, AdapterError>>>>,
    }

    impl MockTransport {
        fn new_pair() -> (Arc<Self>, mpsc::Sender<TransportEvent>) {
            let (tx, rx) = mpsc::channel(16);
            (
                Arc::new(Self {
                    started: AtomicBool::new(false),
                    rx: Mutex::new(rx),
                    commands: Mutex::new(Vec::new()),
                    responses: Mutex::new(HashMap::new()),
                }),
                tx,
            )
        }

        async fn commands(&self) -> Vec<(String, Value)> {
            self.commands.lock().await.clone()
        }

        async fn respond(&self, method: &str, value: Result<Value, AdapterError>) {
            self.responses
                .lock()
                .await
                .entry(method.to_string())
                .or_default()
                .push_back(value);
        }
    }

    #[async_trait]
    impl CdpTransport for MockTransport {
        async fn start(&self) -> Result<(), AdapterError> {
            self.started.store(true, Ordering::SeqCst);
            Ok(())
        }

        async fn next_event(&self) -> Option<TransportEvent> {
            let mut guard = self.rx.lock().await;
            guard.recv().await
        }

        async fn send_command(
            &self,
            _target: CommandTarget,
            method: &str,
            params: Value,
        ) -> Result<Value, AdapterError> {
            self.commands
                .lock()
                .await
                .push((method.to_string(), params));
            self.responses
                .lock()
                .await
                .get_mut(method)
                .and_then(VecDeque::pop_front)
                .unwrap_or(Ok(Value::Null))
        }
    }

    fn attached_adapter(transport: Arc<MockTransport>) -> (CdpAdapter, PageId) {
        let adapter = CdpAdapter::with_transport(CdpConfig::default(), transport);
        let page = adapter.registry.insert_target("T1", Some("https://shop.test/".into()));
        adapter.registry.attach_session("T1", "S1".into());
        (adapter, page)
    }

    fn resolved(object_id: &str) -> Result<Value, AdapterError> {
        Ok(json!({ "object": { "objectId": object_id } }))
    }

    #[tokio::test]
    async fn event_loop_tracks_attached_pages() {
        let (transport, tx) = MockTransport::new_pair();
        let adapter = Arc::new(CdpAdapter::with_transport(
            CdpConfig::default(),
            transport.clone() as Arc<dyn CdpTransport>,
        ));
        Arc::clone(&adapter).start().await.expect("start adapter");
        assert!(transport.started.load(Ordering::SeqCst));

        let info = json!({ "targetId": "T9", "type": "page", "url": "about:blank" });
        tx.send(TransportEvent {
            method: "Target.targetCreated".into(),
            params: json!({ "targetInfo": info.clone() }),
            session_id: None,
        })
        .await
        .unwrap();
        tx.send(TransportEvent {
            method: "Target.attachedToTarget".into(),
            params: json!({ "sessionId": "S9", "targetInfo": info }),
            session_id: None,
        })
        .await
        .unwrap();

        let page = timeout(Duration::from_secs(1), async {
            loop {
                if let Some(page) = adapter.registry.page_for_target("T9") {
                    if adapter.registry.get_cdp_session(&page).is_some() {
                        return page;
                    }
                }
                sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("page attached");

        tx.send(TransportEvent {
            method: "Target.targetDestroyed".into(),
            params: json!({ "targetId": "T9" }),
            session_id: None,
        })
        .await
        .unwrap();
        timeout(Duration::from_secs(1), async {
            while adapter.registry.get(&page).is_some() {
                sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("page removed");

        adapter.shutdown().await;
    }

    #[tokio::test]
    async fn describes_elements_with_shadow_roots_and_frames() {
        let (transport, _tx) = MockTransport::new_pair();
        let (adapter, page) = attached_adapter(transport.clone());
        transport
            .respond(
                "DOM.describeNode",
                Ok(json!({
                    "node": {
                        "backendNodeId": 10,
                        "nodeType": 1,
                        "nodeName": "IFRAME",
                        "localName": "iframe",
                        "attributes": ["src", "/inner.html", "ID", "f"],
                        "children": [
                            { "backendNodeId": 11, "nodeType": 3, "nodeName": "#text" },
                            { "backendNodeId": 12, "nodeType": 1, "localName": "span" }
                        ],
                        "shadowRoots": [
                            { "backendNodeId": 13, "nodeType": 11, "shadowRootType": "user-agent" },
                            { "backendNodeId": 14, "nodeType": 11, "shadowRootType": "open" }
                        ],
                        "contentDocument": {
                            "backendNodeId": 20,
                            "nodeType": 9,
                            "documentURL": "https://shop.test/inner.html"
                        }
                    }
                })),
            )
            .await;

        let node = adapter.describe_node(page, NodeRef(10)).await.unwrap();
        assert!(node.is_frame_owner());
        assert_eq!(node.attr("id"), Some("f"));
        assert_eq!(node.children, vec![NodeRef(14), NodeRef(12)]);
        assert_eq!(node.content_document, Some(NodeRef(20)));
        assert_eq!(node.document_url.as_deref(), Some("https://shop.test/inner.html"));

        let commands = transport.commands().await;
        assert_eq!(commands[0].1["pierce"], true);
    }

    #[tokio::test]
    async fn click_presses_at_quad_center() {
        let (transport, _tx) = MockTransport::new_pair();
        let (adapter, page) = attached_adapter(transport.clone());
        transport.respond("DOM.resolveNode", resolved("obj-1")).await;
        transport
            .respond(
                "DOM.getContentQuads",
                Ok(json!({ "quads": [[10.0, 10.0, 30.0, 10.0, 30.0, 20.0, 10.0, 20.0]] })),
            )
            .await;

        adapter.click(page, NodeRef(5)).await.expect("click");

        let mouse: Vec<Value> = transport
            .commands()
            .await
            .into_iter()
            .filter(|(method, _)| method == "Input.dispatchMouseEvent")
            .map(|(_, params)| params)
            .collect();
        assert_eq!(mouse.len(), 2);
        assert_eq!(mouse[0]["type"], "mousePressed");
        assert_eq!(mouse[1]["type"], "mouseReleased");
        assert_eq!(mouse[0]["x"], 20.0);
        assert_eq!(mouse[0]["y"], 15.0);
    }

    #[tokio::test]
    async fn vanished_nodes_read_as_disconnected() {
        let (transport, _tx) = MockTransport::new_pair();
        let (adapter, page) = attached_adapter(transport.clone());
        transport
            .respond(
                "DOM.resolveNode",
                Err(AdapterError::new(AdapterErrorKind::NodeDetached)
                    .with_hint("No node with given id found")),
            )
            .await;

        assert!(!adapter.is_connected(page, NodeRef(99)).await.unwrap());

        let err = adapter.bounding_box(page, NodeRef(99)).await.unwrap_err();
        assert_eq!(err.kind, AdapterErrorKind::NodeDetached);
    }

    #[tokio::test]
    async fn missing_option_reports_choices() {
        let (transport, _tx) = MockTransport::new_pair();
        let (adapter, page) = attached_adapter(transport.clone());
        transport.respond("DOM.resolveNode", resolved("obj-2")).await;
        transport
            .respond(
                "Runtime.callFunctionOn",
                Ok(json!({ "result": { "type": "object", "value": {
                    "status": "option-missing",
                    "available": ["Red", "Green"]
                } } })),
            )
            .await;

        let err = adapter
            .select_option(page, NodeRef(3), "Blue")
            .await
            .unwrap_err();
        assert_eq!(err.kind, AdapterErrorKind::OptionNotFound);
        assert_eq!(err.data.unwrap()["available"][1], "Green");
    }

    #[tokio::test]
    async fn script_exceptions_surface_as_errors() {
        let (transport, _tx) = MockTransport::new_pair();
        let (adapter, page) = attached_adapter(transport.clone());
        transport.respond("DOM.resolveNode", resolved("obj-3")).await;
        transport
            .respond(
                "Runtime.callFunctionOn",
                Ok(json!({
                    "result": { "type": "object" },
                    "exceptionDetails": { "text": "Uncaught", "exception": { "description": "TypeError: boom" } }
                })),
            )
            .await;

        let err = adapter.inner_text(page, NodeRef(4)).await.unwrap_err();
        assert_eq!(err.kind, AdapterErrorKind::Internal);
        assert!(err.to_string().contains("TypeError: boom"));
        assert!(transport
            .commands()
            .await
            .iter()
            .any(|(method, _)| method == "Runtime.releaseObject"));
    }

    #[tokio::test]
    async fn commands_without_session_fail_fast() {
        let (transport, _tx) = MockTransport::new_pair();
        let adapter = CdpAdapter::with_transport(CdpConfig::default(), transport.clone());
        let err = adapter.document(PageId::new()).await.unwrap_err();
        assert_eq!(err.kind, AdapterErrorKind::TargetNotFound);
        assert!(transport.commands().await.is_empty());
    }

    #[tokio::test]
    async fn press_key_sends_down_and_up() {
        let (transport, _tx) = MockTransport::new_pair();
        let (adapter, page) = attached_adapter(transport.clone());
        transport.respond("DOM.resolveNode", resolved("obj-4")).await;
        transport
            .respond("Runtime.callFunctionOn", Ok(json!({ "result": { "value": true } })))
            .await;

        adapter.press_key(page, NodeRef(8), "enter").await.unwrap();

        let keys: Vec<Value> = transport
            .commands()
            .await
            .into_iter()
            .filter(|(method, _)| method == "Input.dispatchKeyEvent")
            .map(|(_, params)| params)
            .collect();
        assert_eq!(keys.len(), 2);
        assert_eq!(keys[0]["type"], "keyDown");
        assert_eq!(keys[0]["text"], "\r");
        assert_eq!(keys[1]["type"], "keyUp");
        assert_eq!(keys[1]["windowsVirtualKeyCode"], 13);
    }

    #[tokio::test]
    async fn text_search_runs_against_the_scope() {
        let (transport, _tx) = MockTransport::new_pair();
        let (adapter, page) = attached_adapter(transport.clone());
        transport.respond("DOM.resolveNode", resolved("doc-1")).await;
        transport
            .respond("Runtime.callFunctionOn", Ok(json!({ "result": { "value": false } })))
            .await;

        let found = adapter
            .scroll_to_text(page, NodeRef(1), "Shipping")
            .await
            .unwrap();
        assert!(!found);

        let commands = transport.commands().await;
        let call = commands
            .iter()
            .find(|(method, _)| method == "Runtime.callFunctionOn")
            .map(|(_, params)| params)
            .expect("script call");
        assert_eq!(call["objectId"], "doc-1");
        assert_eq!(call["arguments"][0]["value"], "Shipping");
    }

    #[tokio::test]
    async fn unstyled_nodes_refuse_highlight() {
        let (transport, _tx) = MockTransport::new_pair();
        let (adapter, page) = attached_adapter(transport.clone());
        transport.respond("DOM.resolveNode", resolved("obj-5")).await;
        transport
            .respond("Runtime.callFunctionOn", Ok(json!({ "result": { "value": false } })))
            .await;
        transport.respond("DOM.resolveNode", resolved("obj-6")).await;
        transport
            .respond("Runtime.callFunctionOn", Ok(json!({ "result": { "value": true } })))
            .await;

        let err = adapter.set_highlight(page, NodeRef(6), true).await.unwrap_err();
        assert_eq!(err.kind, AdapterErrorKind::NotInteractable);
        adapter.set_highlight(page, NodeRef(7), false).await.unwrap();
    }
}
