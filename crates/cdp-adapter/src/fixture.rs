//! In-memory page implementing [`Cdp`].
//!
//! Downstream crates build a page tree with [`FixturePage::append`], run the
//! perceiver and resolver against it, then mutate it (remove nodes, restyle,
//! inject dispatch failures) to exercise stale-reference paths without a
//! browser.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;

use crate::adapter::Cdp;
use crate::dom::{BoxRect, DomNode, DomNodeKind, FormState, NodeRef, StyleFacts};
use crate::error::{AdapterError, AdapterErrorKind};
use crate::ids::PageId;
use crate::keys;

const ROW_HEIGHT: f64 = 30.0;
const ROW_GAP: f64 = 10.0;

/// Element blueprint for [`FixturePage::append`].
#[derive(Clone, Debug)]
pub struct ElementSpec {
    tag: String,
    attributes: BTreeMap<String, String>,
    text: String,
    rect: Option<Option<BoxRect>>,
    style: StyleFacts,
    covered: bool,
    listener: bool,
    delay: Option<Duration>,
    value: Option<String>,
    disabled: bool,
    options: Vec<String>,
}

impl ElementSpec {
    pub fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_ascii_lowercase(),
            attributes: BTreeMap::new(),
            text: String::new(),
            rect: None,
            style: StyleFacts::default(),
            covered: false,
            listener: false,
            delay: None,
            value: None,
            disabled: false,
            options: Vec::new(),
        }
    }

    pub fn attr(mut self, name: &str, value: &str) -> Self {
        self.attributes
            .insert(name.to_ascii_lowercase(), value.to_string());
        self
    }

    /// Own text, excluding descendants.
    pub fn text(mut self, text: &str) -> Self {
        self.text = text.to_string();
        self
    }

    pub fn rect(mut self, x: f64, y: f64, width: f64, height: f64) -> Self {
        self.rect = Some(Some(BoxRect::new(x, y, width, height)));
        self
    }

    /// No layout object at all (`display: contents`, detached renderers).
    pub fn no_box(mut self) -> Self {
        self.rect = Some(None);
        self
    }

    pub fn style(mut self, style: StyleFacts) -> Self {
        self.style = style;
        self
    }

    pub fn hidden(self) -> Self {
        self.style(StyleFacts::hidden())
    }

    /// Another element wins the hit test at this element's center.
    pub fn covered(mut self) -> Self {
        self.covered = true;
        self
    }

    pub fn listener(mut self) -> Self {
        self.listener = true;
        self
    }

    /// Layout queries for this element take `delay` to answer.
    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn value(mut self, value: &str) -> Self {
        self.value = Some(value.to_string());
        self
    }

    /// Disabled through live state only, without a `disabled` attribute.
    pub fn disabled(mut self) -> Self {
        self.disabled = true;
        self
    }

    pub fn options(mut self, options: &[&str]) -> Self {
        self.options = options.iter().map(|o| o.to_string()).collect();
        self
    }
}

/// Input delivered to the fixture, in dispatch order.
#[derive(Clone, Debug, PartialEq)]
pub enum FixtureEvent {
    Click(NodeRef),
    Type(NodeRef, String),
    Select(NodeRef, String),
    Scroll(NodeRef, f64, f64),
    Key(NodeRef, String),
    /// Text search landed on this element and scrolled it into view.
    ScrollToText(NodeRef),
}

#[derive(Clone, Copy, Debug)]
pub struct FrameHandle {
    pub iframe: NodeRef,
    pub document: NodeRef,
    pub body: NodeRef,
}

#[derive(Clone, Debug)]
struct FixtureNode {
    kind: DomNodeKind,
    tag: String,
    attributes: BTreeMap<String, String>,
    text: String,
    parent: Option<NodeRef>,
    children: Vec<NodeRef>,
    rect: Option<BoxRect>,
    style: StyleFacts,
    covered: bool,
    listener: bool,
    delay: Option<Duration>,
    input_delay: Option<Duration>,
    highlighted: bool,
    value: Option<String>,
    disabled: bool,
    options: Vec<String>,
    selected: Option<String>,
    content_document: Option<NodeRef>,
    document_url: Option<String>,
}

impl FixtureNode {
    fn structural(kind: DomNodeKind, tag: &str, parent: Option<NodeRef>) -> Self {
        Self {
            kind,
            tag: tag.to_string(),
            attributes: BTreeMap::new(),
            text: String::new(),
            parent,
            children: Vec::new(),
            rect: Some(BoxRect::new(0.0, 0.0, 1280.0, 720.0)),
            style: StyleFacts::default(),
            covered: false,
            listener: false,
            delay: None,
            input_delay: None,
            highlighted: false,
            value: None,
            disabled: false,
            options: Vec::new(),
            selected: None,
            content_document: None,
            document_url: None,
        }
    }
}

#[derive(Default)]
struct FixtureState {
    nodes: HashMap<NodeRef, FixtureNode>,
    next_id: u64,
    cursor: f64,
    events: Vec<FixtureEvent>,
    failures: HashMap<NodeRef, AdapterErrorKind>,
}

impl FixtureState {
    fn allocate(&mut self) -> NodeRef {
        self.next_id += 1;
        NodeRef(self.next_id)
    }

    fn insert(&mut self, node: FixtureNode) -> NodeRef {
        let id = self.allocate();
        if let Some(parent) = node.parent {
            if let Some(owner) = self.nodes.get_mut(&parent) {
                owner.children.push(id);
            }
        }
        self.nodes.insert(id, node);
        id
    }

    /// document > html > body
    fn new_document(&mut self, parent: Option<NodeRef>, url: &str) -> (NodeRef, NodeRef) {
        let mut doc = FixtureNode::structural(DomNodeKind::Document, "#document", None);
        doc.document_url = Some(url.to_string());
        let document = self.insert(doc);
        if let Some(owner) = parent.and_then(|p| self.nodes.get_mut(&p)) {
            owner.content_document = Some(document);
            owner.document_url = Some(url.to_string());
        }
        let html = self.insert(FixtureNode::structural(
            DomNodeKind::Element,
            "html",
            Some(document),
        ));
        let body = self.insert(FixtureNode::structural(
            DomNodeKind::Element,
            "body",
            Some(html),
        ));
        (document, body)
    }

    fn node(&self, node: NodeRef) -> Result<&FixtureNode, AdapterError> {
        self.nodes.get(&node).ok_or_else(|| detached(node))
    }

    fn node_mut(&mut self, node: NodeRef) -> Result<&mut FixtureNode, AdapterError> {
        self.nodes.get_mut(&node).ok_or_else(|| detached(node))
    }

    fn take_failure(&mut self, node: NodeRef) -> Result<(), AdapterError> {
        match self.failures.remove(&node) {
            Some(kind) => Err(AdapterError::new(kind).with_hint(format!("injected failure on {node}"))),
            None => Ok(()),
        }
    }

    fn collect_text(&self, node: NodeRef, out: &mut Vec<String>) {
        if let Some(entry) = self.nodes.get(&node) {
            if !entry.text.trim().is_empty() {
                out.push(entry.text.clone());
            }
            for child in &entry.children {
                self.collect_text(*child, out);
            }
        }
    }

    fn descendants(&self, node: NodeRef, out: &mut Vec<NodeRef>) {
        if let Some(entry) = self.nodes.get(&node) {
            for child in &entry.children {
                out.push(*child);
                self.descendants(*child, out);
            }
        }
    }
}

fn detached(node: NodeRef) -> AdapterError {
    AdapterError::new(AdapterErrorKind::NodeDetached).with_hint(format!("{node} is not in the page"))
}

fn is_text_entry(node: &FixtureNode) -> bool {
    let editable = node
        .attributes
        .get("contenteditable")
        .map(|v| !v.eq_ignore_ascii_case("false"))
        .unwrap_or(false);
    node.tag == "textarea" || node.tag == "input" || editable
}

/// `tag`, `#id`, `.class`, `tag#id`, `tag.class`, `[name=value]`.
fn matches_selector(node: &FixtureNode, selector: &str) -> bool {
    let selector = selector.trim();
    if let Some(inner) = selector.strip_prefix('[').and_then(|s| s.strip_suffix(']')) {
        return match inner.split_once('=') {
            Some((name, value)) => {
                node.attributes.get(name.trim()).map(String::as_str)
                    == Some(value.trim().trim_matches(|c| c == '"' || c == '\''))
            }
            None => node.attributes.contains_key(inner.trim()),
        };
    }
    let (tag, rest) = match selector.find(['#', '.']) {
        Some(pos) => selector.split_at(pos),
        None => (selector, ""),
    };
    if !tag.is_empty() && !tag.eq_ignore_ascii_case(&node.tag) {
        return false;
    }
    if let Some(id) = rest.strip_prefix('#') {
        return node.attributes.get("id").map(String::as_str) == Some(id);
    }
    if let Some(class) = rest.strip_prefix('.') {
        return node
            .attributes
            .get("class")
            .map(|classes| classes.split_whitespace().any(|c| c == class))
            .unwrap_or(false);
    }
    node.kind == DomNodeKind::Element
}

pub struct FixturePage {
    url: String,
    document: NodeRef,
    body: NodeRef,
    state: Mutex<FixtureState>,
}

impl FixturePage {
    pub fn new(url: &str) -> Self {
        let mut state = FixtureState::default();
        let (document, body) = state.new_document(None, url);
        Self {
            url: url.to_string(),
            document,
            body,
            state: Mutex::new(state),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn document_node(&self) -> NodeRef {
        self.document
    }

    pub fn body(&self) -> NodeRef {
        self.body
    }

    /// Append an element under `parent`. Elements without an explicit rect
    /// are laid out in a single column, one row per element.
    pub fn append(&self, parent: NodeRef, spec: ElementSpec) -> NodeRef {
        let mut state = self.state.lock();
        let rect = match spec.rect {
            Some(rect) => rect,
            None => {
                let rect = BoxRect::new(8.0, state.cursor + ROW_GAP, 200.0, ROW_HEIGHT);
                state.cursor += ROW_HEIGHT + ROW_GAP;
                Some(rect)
            }
        };
        let selected = spec.options.first().cloned();
        let node = FixtureNode {
            kind: DomNodeKind::Element,
            tag: spec.tag,
            attributes: spec.attributes,
            text: spec.text,
            parent: Some(parent),
            children: Vec::new(),
            rect,
            style: spec.style,
            covered: spec.covered,
            listener: spec.listener,
            delay: spec.delay,
            input_delay: None,
            highlighted: false,
            value: spec.value,
            disabled: spec.disabled,
            options: spec.options,
            selected,
            content_document: None,
            document_url: None,
        };
        state.insert(node)
    }

    /// Append an `<iframe>` hosting a fresh document at `url`.
    pub fn append_frame(&self, parent: NodeRef, url: &str) -> FrameHandle {
        let iframe = self.append(
            parent,
            ElementSpec::new("iframe")
                .attr("src", url)
                .rect(0.0, 0.0, 600.0, 400.0),
        );
        let mut state = self.state.lock();
        let (document, body) = state.new_document(Some(iframe), url);
        FrameHandle {
            iframe,
            document,
            body,
        }
    }

    /// Detach `node` and its subtree; later references to any of them fail.
    pub fn remove(&self, node: NodeRef) {
        let mut state = self.state.lock();
        let mut doomed = vec![node];
        state.descendants(node, &mut doomed);
        if let Some(parent) = state.nodes.get(&node).and_then(|n| n.parent) {
            if let Some(owner) = state.nodes.get_mut(&parent) {
                owner.children.retain(|child| *child != node);
            }
        }
        for id in doomed {
            if let Some(removed) = state.nodes.remove(&id) {
                if let Some(doc) = removed.content_document {
                    let mut nested = vec![doc];
                    state.descendants(doc, &mut nested);
                    for inner in nested {
                        state.nodes.remove(&inner);
                    }
                }
            }
        }
    }

    pub fn set_style(&self, node: NodeRef, style: StyleFacts) {
        if let Some(entry) = self.state.lock().nodes.get_mut(&node) {
            entry.style = style;
        }
    }

    pub fn set_attr(&self, node: NodeRef, name: &str, value: &str) {
        if let Some(entry) = self.state.lock().nodes.get_mut(&node) {
            entry
                .attributes
                .insert(name.to_ascii_lowercase(), value.to_string());
        }
    }

    pub fn set_text(&self, node: NodeRef, text: &str) {
        if let Some(entry) = self.state.lock().nodes.get_mut(&node) {
            entry.text = text.to_string();
        }
    }

    pub fn set_covered(&self, node: NodeRef, covered: bool) {
        if let Some(entry) = self.state.lock().nodes.get_mut(&node) {
            entry.covered = covered;
        }
    }

    pub fn set_delay(&self, node: NodeRef, delay: Option<Duration>) {
        if let Some(entry) = self.state.lock().nodes.get_mut(&node) {
            entry.delay = delay;
        }
    }

    /// Input commands aimed at `node` take `delay` before they land.
    pub fn set_input_delay(&self, node: NodeRef, delay: Option<Duration>) {
        if let Some(entry) = self.state.lock().nodes.get_mut(&node) {
            entry.input_delay = delay;
        }
    }

    pub fn value_of(&self, node: NodeRef) -> Option<String> {
        self.state
            .lock()
            .nodes
            .get(&node)
            .and_then(|entry| entry.value.clone())
    }

    pub fn selected_of(&self, node: NodeRef) -> Option<String> {
        self.state
            .lock()
            .nodes
            .get(&node)
            .and_then(|entry| entry.selected.clone())
    }

    /// Make the next input dispatched to `node` fail with `kind`.
    pub fn fail_dispatch(&self, node: NodeRef, kind: AdapterErrorKind) {
        self.state.lock().failures.insert(node, kind);
    }

    pub fn dispatched(&self) -> Vec<FixtureEvent> {
        self.state.lock().events.clone()
    }

    /// Currently outlined elements, in id order.
    pub fn highlighted(&self) -> Vec<NodeRef> {
        let state = self.state.lock();
        let mut marked: Vec<NodeRef> = state
            .nodes
            .iter()
            .filter(|(_, entry)| entry.highlighted)
            .map(|(id, _)| *id)
            .collect();
        marked.sort_by_key(|id| id.0);
        marked
    }

    fn read<T>(
        &self,
        node: NodeRef,
        f: impl FnOnce(&FixtureNode) -> T,
    ) -> Result<T, AdapterError> {
        let state = self.state.lock();
        state.node(node).map(f)
    }

    async fn wait_layout(&self, node: NodeRef) -> Result<(), AdapterError> {
        let delay = self.read(node, |entry| entry.delay)?;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(())
    }

    async fn wait_input(&self, node: NodeRef) -> Result<(), AdapterError> {
        let delay = self.read(node, |entry| entry.input_delay)?;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(())
    }
}

#[async_trait]
impl Cdp for FixturePage {
    async fn document(&self, page: PageId) -> Result<DomNode, AdapterError> {
        self.describe_node(page, self.document).await
    }

    async fn describe_node(&self, _page: PageId, node: NodeRef) -> Result<DomNode, AdapterError> {
        self.read(node, |entry| DomNode {
            node,
            kind: entry.kind,
            tag: entry.tag.clone(),
            attributes: entry.attributes.clone(),
            children: entry.children.clone(),
            content_document: entry.content_document,
            document_url: entry.document_url.clone(),
        })
    }

    async fn query_selector(
        &self,
        _page: PageId,
        scope: NodeRef,
        selector: &str,
    ) -> Result<Option<NodeRef>, AdapterError> {
        let state = self.state.lock();
        state.node(scope)?;
        let mut candidates = Vec::new();
        state.descendants(scope, &mut candidates);
        Ok(candidates.into_iter().find(|id| {
            state
                .nodes
                .get(id)
                .map(|entry| entry.kind == DomNodeKind::Element && matches_selector(entry, selector))
                .unwrap_or(false)
        }))
    }

    async fn inner_text(&self, _page: PageId, node: NodeRef) -> Result<String, AdapterError> {
        let state = self.state.lock();
        state.node(node)?;
        let mut parts = Vec::new();
        state.collect_text(node, &mut parts);
        Ok(parts
            .join(" ")
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" "))
    }

    async fn bounding_box(
        &self,
        _page: PageId,
        node: NodeRef,
    ) -> Result<Option<BoxRect>, AdapterError> {
        self.wait_layout(node).await?;
        self.read(node, |entry| entry.rect)
    }

    async fn computed_style(
        &self,
        _page: PageId,
        node: NodeRef,
    ) -> Result<StyleFacts, AdapterError> {
        self.read(node, |entry| entry.style.clone())
    }

    async fn form_state(&self, _page: PageId, node: NodeRef) -> Result<FormState, AdapterError> {
        self.read(node, |entry| FormState {
            disabled: entry.disabled || entry.attributes.contains_key("disabled"),
            readonly: entry.attributes.contains_key("readonly"),
            value: entry.value.clone(),
            selected: entry.selected.clone(),
            options: entry.options.clone(),
            content_editable: entry
                .attributes
                .get("contenteditable")
                .map(|v| !v.eq_ignore_ascii_case("false"))
                .unwrap_or(false),
        })
    }

    async fn is_topmost_at(
        &self,
        _page: PageId,
        node: NodeRef,
        _x: f64,
        _y: f64,
    ) -> Result<bool, AdapterError> {
        self.wait_layout(node).await?;
        self.read(node, |entry| !entry.covered)
    }

    async fn has_click_listener(&self, _page: PageId, node: NodeRef) -> Result<bool, AdapterError> {
        self.read(node, |entry| entry.listener)
    }

    async fn is_connected(&self, _page: PageId, node: NodeRef) -> Result<bool, AdapterError> {
        Ok(self.state.lock().nodes.contains_key(&node))
    }

    async fn click(&self, _page: PageId, node: NodeRef) -> Result<(), AdapterError> {
        self.wait_input(node).await?;
        let mut state = self.state.lock();
        state.take_failure(node)?;
        let entry = state.node(node)?;
        if entry.rect.map(|r| r.is_empty()).unwrap_or(true) {
            return Err(AdapterError::new(AdapterErrorKind::NotInteractable)
                .with_hint(format!("{node} has no content quads")));
        }
        state.events.push(FixtureEvent::Click(node));
        Ok(())
    }

    async fn type_text(&self, _page: PageId, node: NodeRef, text: &str) -> Result<(), AdapterError> {
        self.wait_input(node).await?;
        let mut state = self.state.lock();
        state.take_failure(node)?;
        let entry = state.node_mut(node)?;
        if !is_text_entry(entry) {
            return Err(AdapterError::new(AdapterErrorKind::NotInteractable)
                .with_hint(format!("{node} did not take focus")));
        }
        if entry.tag == "input" || entry.tag == "textarea" {
            entry.value = Some(text.to_string());
        } else {
            entry.text = text.to_string();
        }
        state.events.push(FixtureEvent::Type(node, text.to_string()));
        Ok(())
    }

    async fn select_option(
        &self,
        _page: PageId,
        node: NodeRef,
        option: &str,
    ) -> Result<String, AdapterError> {
        self.wait_input(node).await?;
        let mut state = self.state.lock();
        state.take_failure(node)?;
        let entry = state.node_mut(node)?;
        let wanted = option.trim();
        let Some(found) = entry.options.iter().find(|o| o.as_str() == wanted).cloned() else {
            return Err(AdapterError::new(AdapterErrorKind::OptionNotFound)
                .with_hint(format!("no option matching '{option}'"))
                .with_data(json!({ "available": entry.options })));
        };
        entry.selected = Some(found.clone());
        entry.value = Some(found.clone());
        state.events.push(FixtureEvent::Select(node, found.clone()));
        Ok(found)
    }

    async fn scroll_by(
        &self,
        _page: PageId,
        node: NodeRef,
        dx: f64,
        dy: f64,
    ) -> Result<String, AdapterError> {
        self.wait_input(node).await?;
        let mut state = self.state.lock();
        state.take_failure(node)?;
        let scrolls_itself = state.node(node)?.attributes.contains_key("data-scrollable");
        state.events.push(FixtureEvent::Scroll(node, dx, dy));
        Ok(if scrolls_itself { "element" } else { "window" }.to_string())
    }

    async fn press_key(&self, _page: PageId, node: NodeRef, key: &str) -> Result<(), AdapterError> {
        let def = keys::lookup(key).ok_or_else(|| {
            AdapterError::new(AdapterErrorKind::Internal)
                .with_hint(format!("unsupported key '{key}'"))
        })?;
        self.wait_input(node).await?;
        let mut state = self.state.lock();
        state.take_failure(node)?;
        state.node(node)?;
        state.events.push(FixtureEvent::Key(node, def.key.to_string()));
        Ok(())
    }

    async fn scroll_to_text(
        &self,
        _page: PageId,
        scope: NodeRef,
        text: &str,
    ) -> Result<bool, AdapterError> {
        let wanted = text.split_whitespace().collect::<Vec<_>>().join(" ");
        let mut state = self.state.lock();
        state.node(scope)?;
        if wanted.is_empty() {
            return Ok(false);
        }
        let mut candidates = Vec::new();
        state.descendants(scope, &mut candidates);
        let own_text = |id: &NodeRef| {
            state
                .nodes
                .get(id)
                .filter(|entry| entry.kind == DomNodeKind::Element)
                .map(|entry| entry.text.split_whitespace().collect::<Vec<_>>().join(" "))
                .unwrap_or_default()
        };
        let hit = candidates
            .iter()
            .find(|id| own_text(*id) == wanted)
            .or_else(|| candidates.iter().find(|id| own_text(*id).contains(&wanted)))
            .copied();
        match hit {
            Some(node) => {
                state.events.push(FixtureEvent::ScrollToText(node));
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn set_highlight(
        &self,
        _page: PageId,
        node: NodeRef,
        on: bool,
    ) -> Result<(), AdapterError> {
        self.state.lock().node_mut(node)?.highlighted = on;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn removed_subtrees_are_detached() {
        let page = FixturePage::new("https://shop.test/");
        let form = page.append(page.body(), ElementSpec::new("form"));
        let input = page.append(form, ElementSpec::new("input").attr("name", "q"));
        let pid = PageId::new();

        assert!(page.is_connected(pid, input).await.unwrap());
        page.remove(form);
        assert!(!page.is_connected(pid, input).await.unwrap());
        let err = page.bounding_box(pid, input).await.unwrap_err();
        assert!(err.is_detached());

        let body = page.describe_node(pid, page.body()).await.unwrap();
        assert!(body.children.is_empty());
    }

    #[tokio::test]
    async fn selectors_and_text() {
        let page = FixturePage::new("https://shop.test/");
        let nav = page.append(page.body(), ElementSpec::new("nav").attr("class", "top main"));
        let link = page.append(nav, ElementSpec::new("a").attr("id", "home").text("  Home\n"));
        page.append(nav, ElementSpec::new("a").text("About"));
        let pid = PageId::new();
        let doc = page.document_node();

        assert_eq!(page.query_selector(pid, doc, "#home").await.unwrap(), Some(link));
        assert_eq!(page.query_selector(pid, doc, "nav.main").await.unwrap(), Some(nav));
        assert_eq!(page.query_selector(pid, doc, "a").await.unwrap(), Some(link));
        assert_eq!(page.query_selector(pid, doc, "[id=missing]").await.unwrap(), None);
        assert_eq!(page.inner_text(pid, nav).await.unwrap(), "Home About");
    }

    #[tokio::test]
    async fn injected_failures_fire_once() {
        let page = FixturePage::new("https://shop.test/");
        let button = page.append(page.body(), ElementSpec::new("button").text("Go"));
        let pid = PageId::new();
        page.fail_dispatch(button, AdapterErrorKind::Timeout);

        let err = page.click(pid, button).await.unwrap_err();
        assert_eq!(err.kind, AdapterErrorKind::Timeout);
        page.click(pid, button).await.unwrap();
        assert_eq!(page.dispatched(), vec![FixtureEvent::Click(button)]);
    }

    #[tokio::test]
    async fn frames_host_their_own_document() {
        let page = FixturePage::new("https://shop.test/");
        let frame = page.append_frame(page.body(), "https://ads.test/banner");
        let pid = PageId::new();

        let owner = page.describe_node(pid, frame.iframe).await.unwrap();
        assert_eq!(owner.content_document, Some(frame.document));
        assert_eq!(owner.document_url.as_deref(), Some("https://ads.test/banner"));

        let doc = page.describe_node(pid, frame.document).await.unwrap();
        assert_eq!(doc.kind, DomNodeKind::Document);
        assert_eq!(doc.children.len(), 1);
    }

    #[tokio::test]
    async fn text_search_prefers_exact_own_text() {
        let page = FixturePage::new("https://shop.test/");
        let intro = page.append(page.body(), ElementSpec::new("p").text("Free shipping over $50"));
        let heading = page.append(page.body(), ElementSpec::new("h2").text(" Free  shipping "));
        let pid = PageId::new();
        let doc = page.document_node();

        assert!(page.scroll_to_text(pid, doc, "Free shipping").await.unwrap());
        assert!(page.scroll_to_text(pid, doc, "over $50").await.unwrap());
        assert!(!page.scroll_to_text(pid, doc, "Returns").await.unwrap());
        assert_eq!(
            page.dispatched(),
            vec![FixtureEvent::ScrollToText(heading), FixtureEvent::ScrollToText(intro)]
        );
    }

    #[tokio::test]
    async fn highlights_toggle_and_detach() {
        let page = FixturePage::new("https://shop.test/");
        let a = page.append(page.body(), ElementSpec::new("button").text("A"));
        let b = page.append(page.body(), ElementSpec::new("button").text("B"));
        let pid = PageId::new();

        page.set_highlight(pid, b, true).await.unwrap();
        page.set_highlight(pid, a, true).await.unwrap();
        page.set_highlight(pid, a, true).await.unwrap();
        assert_eq!(page.highlighted(), vec![a, b]);

        page.set_highlight(pid, a, false).await.unwrap();
        assert_eq!(page.highlighted(), vec![b]);

        page.remove(b);
        assert!(page.set_highlight(pid, b, false).await.unwrap_err().is_detached());
    }
}
