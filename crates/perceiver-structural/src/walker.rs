//! Depth-first walk of the live document into an arena of [`Node`]s.

use std::collections::BTreeMap;

use async_recursion::async_recursion;
use cdp_adapter::util::same_origin;
use cdp_adapter::{Cdp, DomNode, DomNodeKind, NodeRef, PageId};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::errors::PerceiverError;
use crate::indexer::truncate_chars;
use crate::judges;
use crate::model::{Check, FrameKey, Node, NodeId, NodeKind, OpaqueReason, Verdict, WalkStats};
use crate::policy::SnapshotConfig;

/// Attributes kept on every node for labelling and locators.
const KEPT_ATTRIBUTES: &[&str] = &[
    "id",
    "name",
    "aria-label",
    "placeholder",
    "type",
    "value",
    "title",
    "alt",
    "href",
    "role",
    "contenteditable",
];

/// Elements that never render and are not worth a probe.
const SKIPPED_TAGS: &[&str] = &[
    "head", "script", "style", "noscript", "template", "meta", "link", "title", "base",
];

#[derive(Debug, Default)]
pub struct WalkOutput {
    pub url: String,
    pub roots: Vec<NodeId>,
    pub nodes: Vec<Node>,
    pub stats: WalkStats,
}

/// Walk the page's document (or the `root_selector` subtree) in document
/// order, classifying every element on the way.
pub async fn walk(
    cdp: &dyn Cdp,
    page: PageId,
    cfg: &SnapshotConfig,
    cancel: &CancellationToken,
) -> Result<WalkOutput, PerceiverError> {
    if cancel.is_cancelled() {
        return Err(PerceiverError::Cancelled);
    }
    let document = cdp
        .document(page)
        .await
        .map_err(PerceiverError::DocumentUnavailable)?;
    let url = document.document_url.clone().unwrap_or_default();
    let top = FrameKey::top(url.clone());

    let mut walker = Walker {
        cdp,
        page,
        cfg,
        cancel,
        nodes: Vec::new(),
        roots: Vec::new(),
        stats: WalkStats::default(),
        frame_ordinal: 0,
    };

    match cfg.root_selector.as_deref() {
        Some(selector) => {
            let scoped = cdp
                .query_selector(page, document.node, selector)
                .await
                .map_err(PerceiverError::DocumentUnavailable)?;
            match scoped {
                Some(root) => walker.visit(root, None, &top).await?,
                None => debug!(selector, "root selector matched nothing"),
            }
        }
        None => walker.visit_children(&document, None, &top).await?,
    }

    Ok(WalkOutput {
        url,
        roots: walker.roots,
        nodes: walker.nodes,
        stats: walker.stats,
    })
}

struct Walker<'a> {
    cdp: &'a dyn Cdp,
    page: PageId,
    cfg: &'a SnapshotConfig,
    cancel: &'a CancellationToken,
    nodes: Vec<Node>,
    roots: Vec<NodeId>,
    stats: WalkStats,
    frame_ordinal: u32,
}

impl<'a> Walker<'a> {
    #[async_recursion]
    async fn visit(
        &mut self,
        node: NodeRef,
        parent: Option<NodeId>,
        frame: &FrameKey,
    ) -> Result<(), PerceiverError> {
        if self.cancel.is_cancelled() {
            return Err(PerceiverError::Cancelled);
        }

        let dom = match self.cdp.describe_node(self.page, node).await {
            Ok(dom) => dom,
            Err(err) if err.is_detached() => {
                self.stats.detached += 1;
                return Ok(());
            }
            Err(err) => {
                warn!(?err, %node, "describe failed; skipping subtree");
                self.stats.probe_errors += 1;
                return Ok(());
            }
        };

        match dom.kind {
            // shadow roots and nested documents are transparent
            DomNodeKind::Document | DomNodeKind::ShadowRoot => {
                self.visit_children(&dom, parent, frame).await
            }
            DomNodeKind::Element => self.visit_element(dom, parent, frame).await,
        }
    }

    async fn visit_children(
        &mut self,
        dom: &DomNode,
        parent: Option<NodeId>,
        frame: &FrameKey,
    ) -> Result<(), PerceiverError> {
        for child in &dom.children {
            self.visit(*child, parent, frame).await?;
        }
        Ok(())
    }

    async fn visit_element(
        &mut self,
        dom: DomNode,
        parent: Option<NodeId>,
        frame: &FrameKey,
    ) -> Result<(), PerceiverError> {
        if SKIPPED_TAGS.contains(&dom.tag.as_str()) {
            return Ok(());
        }
        if let Some(max) = self.cfg.max_nodes {
            if self.stats.visited >= max {
                self.stats.over_budget += 1;
                return Ok(());
            }
        }
        self.stats.visited += 1;

        if dom.is_frame_owner() {
            return self.visit_frame(dom, parent, frame).await;
        }

        let probe = judges::classify(self.cdp, self.page, &dom, self.cfg).await;
        match probe.verdict.failed {
            Some(Check::Connected) => {
                self.stats.detached += 1;
                return Ok(());
            }
            Some(Check::Timeout) => self.stats.timed_out += 1,
            Some(Check::Probe) => self.stats.probe_errors += 1,
            _ => {}
        }
        debug!(
            node = %dom.node,
            tag = %dom.tag,
            interactable = probe.verdict.interactable,
            reason = %probe.verdict.reason,
            "classified"
        );

        let text = if probe.verdict.interactable {
            self.visible_text(dom.node).await
        } else {
            String::new()
        };

        let id = self.push(Node {
            id: 0,
            parent,
            children: Vec::new(),
            node_ref: dom.node,
            kind: NodeKind::Element,
            tag: dom.tag.clone(),
            role: judges::role_of(&dom.tag, &dom.attributes),
            text,
            attributes: kept_attributes(&dom.attributes),
            has_box: probe.rect.map(|r| !r.is_empty()).unwrap_or(false),
            rect: probe.rect,
            enabled: probe.enabled,
            frame: frame.clone(),
            verdict: probe.verdict,
        });

        self.visit_children(&dom, Some(id), frame).await
    }

    async fn visit_frame(
        &mut self,
        dom: DomNode,
        parent: Option<NodeId>,
        frame: &FrameKey,
    ) -> Result<(), PerceiverError> {
        let url = dom
            .document_url
            .clone()
            .or_else(|| dom.attr("src").map(str::to_string))
            .unwrap_or_default();
        let ordinal = self.frame_ordinal;
        self.frame_ordinal += 1;

        let opaque = if frame.depth() >= self.cfg.frame_depth_limit {
            Some(OpaqueReason::DepthLimit)
        } else if dom.content_document.is_none() || !same_origin(&frame.origin, &url) {
            Some(OpaqueReason::CrossOrigin)
        } else {
            None
        };

        let mut node = Node {
            id: 0,
            parent,
            children: Vec::new(),
            node_ref: dom.node,
            kind: NodeKind::Element,
            tag: dom.tag.clone(),
            role: None,
            text: String::new(),
            attributes: kept_attributes(&dom.attributes),
            has_box: false,
            rect: None,
            enabled: true,
            frame: frame.clone(),
            verdict: Verdict::fail(Check::Role, "frame_owner"),
        };

        match (opaque, dom.content_document) {
            (None, Some(document)) => {
                node.kind = NodeKind::Frame { url: url.clone() };
                let id = self.push(node);
                let child = frame.child(ordinal, url);
                self.visit(document, Some(id), &child).await
            }
            (reason, _) => {
                let reason = reason.unwrap_or(OpaqueReason::CrossOrigin);
                debug!(%url, ?reason, parent_frame = %frame, "frame left opaque");
                self.stats.opaque_frames += 1;
                node.kind = NodeKind::OpaqueFrame { reason, url };
                node.verdict = Verdict::fail(Check::Role, "opaque_frame");
                self.push(node);
                Ok(())
            }
        }
    }

    async fn visible_text(&mut self, node: NodeRef) -> String {
        match timeout(self.cfg.node_timeout(), self.cdp.inner_text(self.page, node)).await {
            Ok(Ok(text)) => {
                let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
                truncate_chars(&collapsed, self.cfg.text_max_chars)
            }
            Ok(Err(err)) => {
                debug!(?err, %node, "inner text unavailable");
                String::new()
            }
            Err(_) => {
                debug!(%node, "inner text timed out");
                String::new()
            }
        }
    }

    fn push(&mut self, mut node: Node) -> NodeId {
        let id = self.nodes.len();
        node.id = id;
        match node.parent {
            Some(parent) => {
                if let Some(owner) = self.nodes.get_mut(parent) {
                    owner.children.push(id);
                }
            }
            None => self.roots.push(id),
        }
        self.nodes.push(node);
        id
    }
}

fn kept_attributes(attrs: &BTreeMap<String, String>) -> BTreeMap<String, String> {
    attrs
        .iter()
        .filter(|(name, _)| KEPT_ATTRIBUTES.contains(&name.as_str()))
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use cdp_adapter::fixture::{ElementSpec, FixturePage};

    async fn run(page: &FixturePage, cfg: &SnapshotConfig) -> WalkOutput {
        walk(page, PageId::new(), cfg, &CancellationToken::new())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn arena_follows_document_order() {
        let page = FixturePage::new("https://shop.test/");
        let form = page.append(page.body(), ElementSpec::new("form"));
        page.append(form, ElementSpec::new("input").attr("name", "q").attr("class", "wide"));
        page.append(form, ElementSpec::new("button").text("Search"));
        page.append(page.body(), ElementSpec::new("script"));

        let out = run(&page, &SnapshotConfig::default()).await;
        let tags: Vec<&str> = out.nodes.iter().map(|n| n.tag.as_str()).collect();
        assert_eq!(tags, vec!["html", "body", "form", "input", "button"]);
        assert_eq!(out.roots, vec![0]);
        assert_eq!(out.nodes[2].children, vec![3, 4]);
        assert_eq!(out.url, "https://shop.test/");
        assert_eq!(out.stats.visited, 5);

        let input = &out.nodes[3];
        assert_eq!(input.attr("name"), Some("q"));
        assert_eq!(input.attr("class"), None);
        assert_eq!(input.role.as_deref(), Some("textbox"));
        assert_eq!(out.nodes[4].text, "Search");
        // text is only fetched for interactable nodes
        assert_eq!(out.nodes[2].text, "");
    }

    #[tokio::test]
    async fn children_of_rejected_parents_are_walked() {
        let page = FixturePage::new("https://shop.test/");
        let wrapper = page.append(page.body(), ElementSpec::new("div").covered());
        page.append(wrapper, ElementSpec::new("a").attr("href", "/x").text("X"));

        let out = run(&page, &SnapshotConfig::default()).await;
        let link = out.nodes.iter().find(|n| n.tag == "a").unwrap();
        assert!(link.verdict.interactable);
        assert_eq!(out.nodes[link.parent.unwrap()].verdict.failed, Some(Check::Occlusion));
    }

    #[tokio::test]
    async fn frame_depth_limit_zero_keeps_frames_opaque() {
        let page = FixturePage::new("https://shop.test/");
        let frame = page.append_frame(page.body(), "https://shop.test/inner");
        page.append(frame.body, ElementSpec::new("button").text("Inner"));

        let out = run(&page, &SnapshotConfig::default().with_frame_depth(0)).await;
        let placeholder = out.nodes.iter().find(|n| n.tag == "iframe").unwrap();
        assert_eq!(
            placeholder.kind,
            NodeKind::OpaqueFrame {
                reason: OpaqueReason::DepthLimit,
                url: "https://shop.test/inner".into()
            }
        );
        assert!(placeholder.children.is_empty());
        assert_eq!(out.stats.opaque_frames, 1);
        assert!(out.nodes.iter().all(|n| n.tag != "button"));
    }

    #[tokio::test]
    async fn same_origin_frames_are_keyed_by_ordinal() {
        let page = FixturePage::new("https://shop.test/");
        page.append_frame(page.body(), "https://ads.test/");
        let second = page.append_frame(page.body(), "about:blank");
        page.append(second.body, ElementSpec::new("button").text("Inner"));

        let out = run(&page, &SnapshotConfig::default()).await;
        let button = out.nodes.iter().find(|n| n.tag == "button").unwrap();
        assert_eq!(button.frame.path, vec![1]);
        assert_eq!(button.frame.url, "about:blank");
        assert_eq!(button.frame.origin, "https://shop.test/");
        let frame_owner = &out.nodes[out.nodes[out.nodes[button.parent.unwrap()].parent.unwrap()]
            .parent
            .unwrap()];
        assert!(matches!(frame_owner.kind, NodeKind::Frame { .. }));
    }

    #[tokio::test]
    async fn budget_stops_the_walk() {
        let page = FixturePage::new("https://shop.test/");
        for label in ["a", "b", "c"] {
            page.append(page.body(), ElementSpec::new("button").text(label));
        }
        let cfg = SnapshotConfig {
            max_nodes: Some(3),
            ..SnapshotConfig::default()
        };
        let out = run(&page, &cfg).await;
        assert_eq!(out.stats.visited, 3);
        assert_eq!(out.stats.over_budget, 2);
        assert_eq!(out.nodes.len(), 3);
    }

    #[tokio::test]
    async fn cancelled_token_aborts() {
        let page = FixturePage::new("https://shop.test/");
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = walk(&page, PageId::new(), &SnapshotConfig::default(), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, PerceiverError::Cancelled));
    }
}
