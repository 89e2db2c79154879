//! Text views of a [`Snapshot`] for the decision process and for humans.

use std::collections::HashMap;

use crate::indexer::truncate_chars;
use crate::model::{InteractableNode, NodeId, NodeKind, OpaqueReason, Snapshot};

const HREF_MAX_CHARS: usize = 40;

/// One `[index]:<tag attrs>label</tag>` line per interactable node.
pub fn prompt_lines(snapshot: &Snapshot) -> Vec<String> {
    snapshot.interactables().iter().map(prompt_line).collect()
}

pub fn prompt(snapshot: &Snapshot) -> String {
    prompt_lines(snapshot).join("\n")
}

fn prompt_line(node: &InteractableNode) -> String {
    let mut attrs = String::new();
    for name in ["type", "placeholder"] {
        if let Some(value) = node.attr(name).filter(|v| !v.is_empty()) {
            attrs.push_str(&format!(" {name}=\"{}\"", attr_value(value)));
        }
    }
    if let Some(href) = node.attr("href").filter(|v| !v.is_empty()) {
        let href = truncate_chars(href, HREF_MAX_CHARS);
        attrs.push_str(&format!(" href=\"{}\"", attr_value(&href)));
    }
    if let Some(role) = node.role.as_deref().filter(|r| *r != node.tag) {
        attrs.push_str(&format!(" role=\"{}\"", attr_value(role)));
    }
    format!(
        "[{}]:<{}{}>{}</{}>",
        node.index, node.tag, attrs, node.label, node.tag
    )
}

/// Keep an attribute on one line and inside its quotes.
fn attr_value(value: &str) -> String {
    value
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .replace('"', "&quot;")
}

/// Indented tree of everything that leads to an interactable node or a frame
/// placeholder. Containers with nothing to show underneath are omitted.
pub fn outline(snapshot: &Snapshot) -> String {
    let by_node: HashMap<NodeId, &InteractableNode> = snapshot
        .interactables()
        .iter()
        .map(|n| (n.node, n))
        .collect();
    let mut out = Vec::new();
    for root in snapshot.roots() {
        outline_node(snapshot, &by_node, *root, 0, &mut out);
    }
    out.join("\n")
}

fn outline_node(
    snapshot: &Snapshot,
    by_node: &HashMap<NodeId, &InteractableNode>,
    id: NodeId,
    depth: usize,
    out: &mut Vec<String>,
) -> bool {
    let Some(node) = snapshot.node(id) else {
        return false;
    };
    let indent = "  ".repeat(depth);

    if let NodeKind::OpaqueFrame { reason, url } = &node.kind {
        let why = match reason {
            OpaqueReason::CrossOrigin => "cross-origin",
            OpaqueReason::DepthLimit => "depth limit",
        };
        out.push(format!("{indent}[frame: {why} {url}]"));
        return true;
    }

    let line = match (by_node.get(&id), &node.kind) {
        (Some(item), _) => format!("{indent}[{}] <{}> {}", item.index, item.tag, item.label),
        (None, NodeKind::Frame { url }) => format!("{indent}<{}> {url}", node.tag),
        (None, _) => format!("{indent}<{}>", node.tag),
    };
    let at = out.len();
    out.push(line);

    let mut shown = by_node.contains_key(&id);
    for child in &node.children {
        shown |= outline_node(snapshot, by_node, *child, depth + 1, out);
    }
    if !shown {
        out.truncate(at);
    }
    shown
}
