//! Index assignment, labels and locator hints.

use std::collections::HashMap;

use cdp_adapter::PageId;

use crate::model::{InteractableNode, LabelSource, Node, NodeKind, Snapshot};
use crate::policy::SnapshotConfig;
use crate::walker::WalkOutput;

/// Number interactable nodes `0..N` in document order and freeze the result.
pub fn assign(page: PageId, cfg: &SnapshotConfig, walk: WalkOutput) -> Snapshot {
    let mut seen: HashMap<String, usize> = HashMap::new();
    let mut interactables = Vec::new();

    // arena ids are pre-order, so iterating the arena is the DFS order
    for node in walk
        .nodes
        .iter()
        .filter(|n| n.kind == NodeKind::Element && n.verdict.interactable)
    {
        let (raw, label_source) = label_for(node);
        let mut label = truncate_chars(&raw, cfg.label_max_chars);
        if cfg.disambiguate_labels {
            let count = seen.entry(label.clone()).or_insert(0);
            *count += 1;
            if *count > 1 {
                label = with_suffix(&raw, *count, cfg.label_max_chars);
            }
        }

        interactables.push(InteractableNode {
            index: interactables.len(),
            node: node.id,
            node_ref: node.node_ref,
            tag: node.tag.clone(),
            role: node.role.clone(),
            label,
            label_source,
            text: node.text.clone(),
            attributes: node.attributes.clone(),
            frame: node.frame.clone(),
            locator: locator_for(node),
            rect: node.rect,
        });
    }

    Snapshot::new(
        page,
        walk.url,
        cfg.clone(),
        walk.roots,
        walk.nodes,
        interactables,
        walk.stats,
    )
}

/// Highest-priority non-empty label source.
pub fn label_for(node: &Node) -> (String, LabelSource) {
    let attr = |name: &str| node.attr(name).map(collapse).filter(|s| !s.is_empty());

    if let Some(label) = attr("aria-label") {
        return (label, LabelSource::AriaLabel);
    }
    let text = collapse(&node.text);
    if !text.is_empty() {
        return (text, LabelSource::Text);
    }
    let tiers = [
        ("placeholder", LabelSource::Placeholder),
        ("value", LabelSource::Value),
        ("title", LabelSource::Title),
        ("alt", LabelSource::Alt),
        ("name", LabelSource::Name),
    ];
    for (name, source) in tiers {
        if let Some(label) = attr(name) {
            return (label, source);
        }
    }
    (node.tag.clone(), LabelSource::Tag)
}

/// XPath built from the strongest identifying attribute or the node text.
pub fn locator_for(node: &Node) -> String {
    let tag = &node.tag;
    let present = |name: &str| node.attr(name).map(str::trim).filter(|v| !v.is_empty());

    if let Some(id) = present("id") {
        return format!("//{tag}[@id={}]", xpath_literal(id));
    }
    if let Some(name) = present("name") {
        return format!("//{tag}[@name={}]", xpath_literal(name));
    }
    let text = collapse(&node.text);
    if !text.is_empty() {
        return format!("//{tag}[normalize-space()={}]", xpath_literal(&text));
    }
    if let Some(placeholder) = present("placeholder") {
        return format!("//{tag}[@placeholder={}]", xpath_literal(placeholder));
    }
    if let Some(label) = present("aria-label") {
        return format!("//{tag}[@aria-label={}]", xpath_literal(label));
    }
    format!("//{tag}")
}

/// Quote `value` as an XPath string literal, falling back to `concat()` when
/// it holds both quote kinds.
pub fn xpath_literal(value: &str) -> String {
    if !value.contains('\'') {
        return format!("'{value}'");
    }
    if !value.contains('"') {
        return format!("\"{value}\"");
    }
    let parts: Vec<String> = value
        .split('\'')
        .map(|part| format!("'{part}'"))
        .collect();
    format!("concat({})", parts.join(", \"'\", "))
}

/// Cut to `max` characters, the last three replaced by `...`.
pub fn truncate_chars(value: &str, max: usize) -> String {
    if value.chars().count() <= max {
        return value.to_string();
    }
    if max <= 3 {
        return value.chars().take(max).collect();
    }
    let mut out: String = value.chars().take(max - 3).collect();
    out.push_str("...");
    out
}

/// Append ` (n)` to `base`, shortening `base` first so the whole label
/// stays within `max` characters.
fn with_suffix(base: &str, count: usize, max: usize) -> String {
    let suffix = format!(" ({count})");
    let room = max.saturating_sub(suffix.chars().count());
    format!("{}{suffix}", truncate_chars(base, room))
}

fn collapse(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}
