//! DOM shapes returned by the adapter.
//!
//! Everything here is a copy of what the browser reported at query time. A
//! [`NodeRef`] is the only link back to the live page and must be re-resolved
//! on every use; the element behind it can disappear at any moment.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Weak reference to a live element: the browser's `backendNodeId`.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeRef(pub u64);

impl fmt::Display for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DomNodeKind {
    Document,
    Element,
    ShadowRoot,
}

/// One node as described by the browser, children listed but not expanded.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DomNode {
    pub node: NodeRef,
    pub kind: DomNodeKind,
    /// Lower-case local name; `#document` / `#shadow-root` for the other kinds.
    pub tag: String,
    pub attributes: BTreeMap<String, String>,
    /// Element children and author shadow roots, in document order.
    pub children: Vec<NodeRef>,
    /// Document hosted by a frame owner, when the browser exposes it in-process.
    pub content_document: Option<NodeRef>,
    pub document_url: Option<String>,
}

impl DomNode {
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    pub fn has_attr(&self, name: &str) -> bool {
        self.attributes.contains_key(name)
    }

    pub fn is_frame_owner(&self) -> bool {
        self.kind == DomNodeKind::Element && matches!(self.tag.as_str(), "iframe" | "frame")
    }
}

/// Viewport-relative rectangle (CSS pixels).
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BoxRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl BoxRect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn area(&self) -> f64 {
        self.width.max(0.0) * self.height.max(0.0)
    }

    pub fn is_empty(&self) -> bool {
        self.area() <= 0.0
    }

    pub fn center(&self) -> (f64, f64) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    /// Center of a CDP content quad (`[x1, y1, ..., x4, y4]`).
    pub fn quad_center(quad: &[f64]) -> Option<(f64, f64)> {
        if quad.len() < 8 {
            return None;
        }
        let xs = [quad[0], quad[2], quad[4], quad[6]];
        let ys = [quad[1], quad[3], quad[5], quad[7]];
        Some((xs.iter().sum::<f64>() / 4.0, ys.iter().sum::<f64>() / 4.0))
    }
}

/// Computed style properties the classifier looks at.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StyleFacts {
    pub display: String,
    pub visibility: String,
    pub opacity: f64,
    pub pointer_events: String,
}

impl Default for StyleFacts {
    fn default() -> Self {
        Self {
            display: "block".into(),
            visibility: "visible".into(),
            opacity: 1.0,
            pointer_events: "auto".into(),
        }
    }
}

impl StyleFacts {
    pub fn hidden() -> Self {
        Self {
            display: "none".into(),
            ..Self::default()
        }
    }
}

/// Live form-control state; attributes alone miss `fieldset[disabled]` and
/// script-assigned values.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FormState {
    pub disabled: bool,
    pub readonly: bool,
    pub value: Option<String>,
    pub selected: Option<String>,
    pub options: Vec<String>,
    pub content_editable: bool,
}
