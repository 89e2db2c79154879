//! Element classifier.
//!
//! [`classify`] runs the interactability checks in a fixed order and stops at
//! the first one that fails:
//!
//! 1. connected to the document
//! 2. non-zero rendered area
//! 3. wins the hit test at its center
//! 4. not hidden by style or attributes
//! 5. supported tag/role, or some other interaction signal
//! 6. enabled
//!
//! `include_hidden` skips 2 to 4, `include_disabled` skips 6. [`recheck`] is
//! the narrowed variant the action resolver runs right before dispatch.

use std::collections::BTreeMap;

use cdp_adapter::{AdapterError, BoxRect, Cdp, DomNode, FormState, NodeRef, PageId, StyleFacts};
use tokio::time::timeout;
use tracing::debug;

use crate::model::{Check, Verdict};
use crate::policy::SnapshotConfig;

const INTERACTIVE_ROLES: &[&str] = &[
    "button",
    "link",
    "checkbox",
    "radio",
    "menuitem",
    "menuitemcheckbox",
    "menuitemradio",
    "tab",
    "switch",
    "option",
    "combobox",
    "textbox",
    "searchbox",
    "slider",
    "spinbutton",
    "listbox",
    "treeitem",
];

/// Tags whose `:disabled` state the browser tracks.
const FORM_TAGS: &[&str] = &[
    "button", "input", "select", "textarea", "option", "optgroup", "fieldset",
];

/// What the classifier learned about a node, kept for the snapshot.
#[derive(Clone, Debug)]
pub struct Probe {
    pub verdict: Verdict,
    pub rect: Option<BoxRect>,
    pub enabled: bool,
}

impl Probe {
    fn failed(check: Check, reason: impl Into<String>, rect: Option<BoxRect>) -> Self {
        Self {
            verdict: Verdict::fail(check, reason),
            rect,
            enabled: true,
        }
    }
}

/// Classify `node`. Never fails: detached nodes come back with
/// [`Check::Connected`], a blown `node_timeout` with [`Check::Timeout`], and
/// any other adapter failure with [`Check::Probe`].
pub async fn classify(cdp: &dyn Cdp, page: PageId, node: &DomNode, cfg: &SnapshotConfig) -> Probe {
    match timeout(cfg.node_timeout(), classify_inner(cdp, page, node, cfg)).await {
        Ok(Ok(probe)) => probe,
        Ok(Err(err)) => probe_error(err),
        Err(_) => {
            debug!(node = %node.node, tag = %node.tag, "classifier timed out");
            Probe::failed(
                Check::Timeout,
                format!("timeout({}ms)", cfg.node_timeout_ms),
                None,
            )
        }
    }
}

fn probe_error(err: AdapterError) -> Probe {
    if err.is_detached() {
        Probe::failed(Check::Connected, "detached", None)
    } else {
        Probe::failed(Check::Probe, format!("probe_failed({})", err.kind), None)
    }
}

async fn classify_inner(
    cdp: &dyn Cdp,
    page: PageId,
    node: &DomNode,
    cfg: &SnapshotConfig,
) -> Result<Probe, AdapterError> {
    let target = node.node;
    if !cdp.is_connected(page, target).await? {
        return Ok(Probe::failed(Check::Connected, "detached", None));
    }

    let rect = cdp.bounding_box(page, target).await?;
    if !cfg.include_hidden {
        let Some(area) = rect.filter(|r| !r.is_empty()) else {
            return Ok(Probe::failed(Check::Area, "zero_area", rect));
        };

        let (x, y) = area.center();
        if !cdp.is_topmost_at(page, target, x, y).await? {
            return Ok(Probe::failed(Check::Occlusion, "occluded", rect));
        }

        let style = cdp.computed_style(page, target).await?;
        let flags = hidden_flags(&style, &node.attributes);
        if !flags.is_empty() {
            return Ok(Probe::failed(
                Check::Visibility,
                format_reason("not_visible", &flags),
                rect,
            ));
        }
    }

    if !has_static_signal(&node.tag, &node.attributes, cfg.include_hidden)
        && !cdp.has_click_listener(page, target).await?
    {
        return Ok(Probe::failed(Check::Role, "no_interaction_signal", rect));
    }

    let form = if FORM_TAGS.contains(&node.tag.as_str()) {
        Some(cdp.form_state(page, target).await?)
    } else {
        None
    };
    let enabled = !disabled(&node.attributes, form.as_ref());
    if !enabled && !cfg.include_disabled {
        return Ok(Probe {
            verdict: Verdict::fail(Check::Enabled, "disabled"),
            rect,
            enabled,
        });
    }

    Ok(Probe {
        verdict: Verdict::pass("interactable"),
        rect,
        enabled,
    })
}

/// Narrowed liveness check run before an action: connected, has area and is
/// not style-hidden (unless `include_hidden`), enabled (unless
/// `include_disabled`). Occlusion and role are not re-evaluated.
pub async fn recheck(cdp: &dyn Cdp, page: PageId, node: NodeRef, cfg: &SnapshotConfig) -> Verdict {
    match timeout(cfg.node_timeout(), recheck_inner(cdp, page, node, cfg)).await {
        Ok(Ok(verdict)) => verdict,
        Ok(Err(err)) => probe_error(err).verdict,
        Err(_) => Verdict::fail(Check::Timeout, format!("timeout({}ms)", cfg.node_timeout_ms)),
    }
}

async fn recheck_inner(
    cdp: &dyn Cdp,
    page: PageId,
    target: NodeRef,
    cfg: &SnapshotConfig,
) -> Result<Verdict, AdapterError> {
    if !cdp.is_connected(page, target).await? {
        return Ok(Verdict::fail(Check::Connected, "detached"));
    }
    let node = cdp.describe_node(page, target).await?;
    if !cfg.include_hidden {
        let rect = cdp.bounding_box(page, target).await?;
        if rect.map(|r| r.is_empty()).unwrap_or(true) {
            return Ok(Verdict::fail(Check::Area, "zero_area"));
        }
        let style = cdp.computed_style(page, target).await?;
        let flags = hidden_flags(&style, &node.attributes);
        if !flags.is_empty() {
            return Ok(Verdict::fail(
                Check::Visibility,
                format_reason("not_visible", &flags),
            ));
        }
    }
    if !cfg.include_disabled {
        let form = if FORM_TAGS.contains(&node.tag.as_str()) {
            Some(cdp.form_state(page, target).await?)
        } else {
            None
        };
        if disabled(&node.attributes, form.as_ref()) {
            return Ok(Verdict::fail(Check::Enabled, "disabled"));
        }
    }
    Ok(Verdict::pass("live"))
}

/// Style and attribute reasons the node is not visible; empty when visible.
pub fn hidden_flags(style: &StyleFacts, attrs: &BTreeMap<String, String>) -> Vec<String> {
    let mut flags = Vec::new();
    if style.display.trim().eq_ignore_ascii_case("none") {
        flags.push("display:none".to_string());
    }
    let visibility = style.visibility.trim().to_ascii_lowercase();
    if visibility == "hidden" || visibility == "collapse" {
        flags.push(format!("visibility:{visibility}"));
    }
    if style.opacity <= 0.0 {
        flags.push("opacity:0".to_string());
    }
    if attrs.contains_key("hidden") {
        flags.push("hidden_attribute".to_string());
    }
    if attr_flag_true(attrs, "aria-hidden") {
        flags.push("aria_hidden".to_string());
    }
    flags
}

/// Interaction signals readable from the tag and attributes alone.
pub fn has_static_signal(tag: &str, attrs: &BTreeMap<String, String>, include_hidden: bool) -> bool {
    supported_tag(tag, attrs, include_hidden)
        || explicit_role(attrs)
            .map(|role| INTERACTIVE_ROLES.contains(&role.as_str()))
            .unwrap_or(false)
        || is_content_editable(attrs)
        || attrs.contains_key("onclick")
        || attrs
            .get("tabindex")
            .and_then(|v| v.trim().parse::<i32>().ok())
            .map(|v| v >= 0)
            .unwrap_or(false)
}

fn supported_tag(tag: &str, attrs: &BTreeMap<String, String>, include_hidden: bool) -> bool {
    match tag {
        "button" | "select" | "textarea" | "summary" | "option" | "details" => true,
        "a" => attrs.contains_key("href"),
        "input" => include_hidden || input_type(attrs) != "hidden",
        _ => false,
    }
}

pub fn is_content_editable(attrs: &BTreeMap<String, String>) -> bool {
    attrs
        .get("contenteditable")
        .map(|v| {
            let v = v.trim().to_ascii_lowercase();
            v.is_empty() || v == "true" || v == "plaintext-only"
        })
        .unwrap_or(false)
}

pub fn input_type(attrs: &BTreeMap<String, String>) -> String {
    attrs
        .get("type")
        .map(|t| t.trim().to_ascii_lowercase())
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| "text".to_string())
}

fn explicit_role(attrs: &BTreeMap<String, String>) -> Option<String> {
    attrs
        .get("role")
        .and_then(|r| r.split_whitespace().next())
        .map(|r| r.to_ascii_lowercase())
}

/// Explicit `role` attribute, else the implicit ARIA role of the tag.
pub fn role_of(tag: &str, attrs: &BTreeMap<String, String>) -> Option<String> {
    if let Some(role) = explicit_role(attrs) {
        return Some(role);
    }
    let implicit = match tag {
        "a" if attrs.contains_key("href") => "link",
        "button" | "summary" => "button",
        "textarea" => "textbox",
        "option" => "option",
        "details" => "group",
        "select" => {
            let multi = attrs.contains_key("multiple")
                || attrs
                    .get("size")
                    .and_then(|s| s.trim().parse::<u32>().ok())
                    .map(|s| s > 1)
                    .unwrap_or(false);
            if multi {
                "listbox"
            } else {
                "combobox"
            }
        }
        "input" => match input_type(attrs).as_str() {
            "checkbox" => "checkbox",
            "radio" => "radio",
            "submit" | "button" | "reset" | "image" => "button",
            "range" => "slider",
            "number" => "spinbutton",
            "search" => "searchbox",
            "hidden" => return None,
            _ => "textbox",
        },
        _ => return None,
    };
    Some(implicit.to_string())
}

fn disabled(attrs: &BTreeMap<String, String>, form: Option<&FormState>) -> bool {
    attrs.contains_key("disabled")
        || attr_flag_true(attrs, "aria-disabled")
        || form.map(|f| f.disabled).unwrap_or(false)
}

fn attr_flag_true(attrs: &BTreeMap<String, String>, key: &str) -> bool {
    attrs.get(key).map_or(false, |value| {
        let normalized = value.trim().to_ascii_lowercase();
        matches!(normalized.as_str(), "true" | "1" | "yes")
    })
}

fn format_reason(base: &str, issues: &[String]) -> String {
    if issues.is_empty() {
        base.to_string()
    } else {
        format!("{}({})", base, issues.join(","))
    }
}
