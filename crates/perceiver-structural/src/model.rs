use std::collections::{BTreeMap, HashMap};
use std::fmt;

use cdp_adapter::util::inherits_origin;
use cdp_adapter::{BoxRect, NodeRef, PageId};
use chrono::{DateTime, Utc};
use pagepilot_core_types::{ErrorKind, SnapshotId};
use serde::Serialize;

use crate::policy::SnapshotConfig;

/// Position of a node in [`Snapshot::nodes`]. Ids follow pre-order, so
/// ascending id is document order.
pub type NodeId = usize;

/// Identifies the document a node came from: the chain of frame ordinals
/// from the top document plus that document's URL.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize)]
pub struct FrameKey {
    pub path: Vec<u32>,
    pub url: String,
    /// URL whose origin the document runs under. Differs from `url` for
    /// `about:blank` and `about:srcdoc` frames, which inherit their parent's.
    pub origin: String,
}

impl FrameKey {
    pub fn top(url: impl Into<String>) -> Self {
        let url = url.into();
        Self {
            path: Vec::new(),
            origin: url.clone(),
            url,
        }
    }

    pub fn child(&self, ordinal: u32, url: impl Into<String>) -> Self {
        let url = url.into();
        let mut path = self.path.clone();
        path.push(ordinal);
        let origin = if inherits_origin(&url) {
            self.origin.clone()
        } else {
            url.clone()
        };
        Self { path, url, origin }
    }

    pub fn depth(&self) -> u32 {
        self.path.len() as u32
    }

    pub fn is_top(&self) -> bool {
        self.path.is_empty()
    }
}

impl fmt::Display for FrameKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            return f.write_str("top");
        }
        let parts: Vec<String> = self.path.iter().map(u32::to_string).collect();
        write!(f, "frame[{}]", parts.join("."))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OpaqueReason {
    CrossOrigin,
    DepthLimit,
}

impl OpaqueReason {
    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            OpaqueReason::CrossOrigin => Some(ErrorKind::FrameAccessDenied),
            OpaqueReason::DepthLimit => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NodeKind {
    Element,
    /// Frame owner whose same-origin document was walked; its children are
    /// the frame's elements.
    Frame { url: String },
    /// Frame whose contents were not walked. Never has children.
    OpaqueFrame { reason: OpaqueReason, url: String },
}

/// Classifier checks, in evaluation order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Check {
    Connected,
    Area,
    Occlusion,
    Visibility,
    Role,
    Enabled,
    Timeout,
    Probe,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Verdict {
    pub interactable: bool,
    /// First failing check, `None` when the node qualified.
    pub failed: Option<Check>,
    pub reason: String,
}

impl Verdict {
    pub fn pass(reason: impl Into<String>) -> Self {
        Self {
            interactable: true,
            failed: None,
            reason: reason.into(),
        }
    }

    pub fn fail(check: Check, reason: impl Into<String>) -> Self {
        Self {
            interactable: false,
            failed: Some(check),
            reason: reason.into(),
        }
    }

    pub fn is_detached(&self) -> bool {
        self.failed == Some(Check::Connected)
    }

    pub fn timed_out(&self) -> bool {
        self.failed == Some(Check::Timeout)
    }

    /// Failure category for the agent loop, when the node failed for a
    /// reason other than simply not qualifying.
    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self.failed {
            Some(Check::Timeout) => Some(ErrorKind::ClassifierTimeout),
            _ => None,
        }
    }
}

/// One element seen during a walk. Holds a weak [`NodeRef`] back into the
/// live page, never the element itself.
#[derive(Clone, Debug, Serialize)]
pub struct Node {
    pub id: NodeId,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    pub node_ref: NodeRef,
    pub kind: NodeKind,
    pub tag: String,
    pub role: Option<String>,
    pub text: String,
    /// Identification subset: id, name, aria-label, placeholder, type,
    /// value, title, alt, href, role, contenteditable.
    pub attributes: BTreeMap<String, String>,
    pub has_box: bool,
    pub rect: Option<BoxRect>,
    pub enabled: bool,
    pub frame: FrameKey,
    pub verdict: Verdict,
}

impl Node {
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LabelSource {
    AriaLabel,
    Text,
    Placeholder,
    Value,
    Title,
    Alt,
    Name,
    Tag,
}

/// A node that passed the classifier, as shown to the decision process.
#[derive(Clone, Debug, Serialize)]
pub struct InteractableNode {
    pub index: usize,
    pub node: NodeId,
    pub node_ref: NodeRef,
    pub tag: String,
    pub role: Option<String>,
    pub label: String,
    pub label_source: LabelSource,
    pub text: String,
    pub attributes: BTreeMap<String, String>,
    pub frame: FrameKey,
    /// XPath hint built from the strongest identifying attribute.
    pub locator: String,
    pub rect: Option<BoxRect>,
}

impl InteractableNode {
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct WalkStats {
    pub visited: usize,
    pub detached: usize,
    pub timed_out: usize,
    pub probe_errors: usize,
    pub opaque_frames: usize,
    /// Subtrees skipped because `max_nodes` was reached.
    pub over_budget: usize,
}

/// Immutable indexed view of a page at one instant.
///
/// Indices run `0..len()` and are only meaningful for this snapshot; a later
/// snapshot of the same page may number everything differently.
#[derive(Clone, Debug, Serialize)]
pub struct Snapshot {
    id: SnapshotId,
    page: PageId,
    url: String,
    captured_at: DateTime<Utc>,
    config: SnapshotConfig,
    roots: Vec<NodeId>,
    nodes: Vec<Node>,
    interactables: Vec<InteractableNode>,
    #[serde(skip)]
    lookup: HashMap<usize, NodeRef>,
    stats: WalkStats,
}

impl Snapshot {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        page: PageId,
        url: String,
        config: SnapshotConfig,
        roots: Vec<NodeId>,
        nodes: Vec<Node>,
        interactables: Vec<InteractableNode>,
        stats: WalkStats,
    ) -> Self {
        let lookup = interactables
            .iter()
            .map(|node| (node.index, node.node_ref))
            .collect();
        Self {
            id: SnapshotId::new(),
            page,
            url,
            captured_at: Utc::now(),
            config,
            roots,
            nodes,
            interactables,
            lookup,
            stats,
        }
    }

    pub fn id(&self) -> &SnapshotId {
        &self.id
    }

    pub fn page(&self) -> PageId {
        self.page
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }

    pub fn config(&self) -> &SnapshotConfig {
        &self.config
    }

    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn interactables(&self) -> &[InteractableNode] {
        &self.interactables
    }

    pub fn get(&self, index: usize) -> Option<&InteractableNode> {
        self.interactables.get(index)
    }

    /// Weak reference for `index`, if the index belongs to this snapshot.
    pub fn lookup(&self, index: usize) -> Option<NodeRef> {
        self.lookup.get(&index).copied()
    }

    pub fn len(&self) -> usize {
        self.interactables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.interactables.is_empty()
    }

    pub fn stats(&self) -> &WalkStats {
        &self.stats
    }
}
