use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Knobs for one snapshot pass.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotConfig {
    /// Skip the area, occlusion and visibility checks.
    pub include_hidden: bool,
    /// Skip the enabled check.
    pub include_disabled: bool,
    /// How many levels of same-origin iframes to descend into; 0 keeps the
    /// walk in the top document.
    pub frame_depth_limit: u32,
    /// Budget for all browser queries made while classifying one node.
    pub node_timeout_ms: u64,
    pub label_max_chars: usize,
    pub text_max_chars: usize,
    /// Suffix repeated labels with ` (2)`, ` (3)` ... in document order.
    pub disambiguate_labels: bool,
    /// Restrict the walk to the first element matching this CSS selector.
    pub root_selector: Option<String>,
    /// Stop visiting elements once this many have been seen.
    pub max_nodes: Option<usize>,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            include_hidden: false,
            include_disabled: false,
            frame_depth_limit: 2,
            node_timeout_ms: 750,
            label_max_chars: 50,
            text_max_chars: 100,
            disambiguate_labels: true,
            root_selector: None,
            max_nodes: None,
        }
    }
}

impl SnapshotConfig {
    pub fn node_timeout(&self) -> Duration {
        Duration::from_millis(self.node_timeout_ms.max(1))
    }

    pub fn with_hidden(mut self, include: bool) -> Self {
        self.include_hidden = include;
        self
    }

    pub fn with_disabled(mut self, include: bool) -> Self {
        self.include_disabled = include;
        self
    }

    pub fn with_frame_depth(mut self, depth: u32) -> Self {
        self.frame_depth_limit = depth;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_config_keeps_defaults() {
        let cfg: SnapshotConfig =
            serde_json::from_value(serde_json::json!({ "include_hidden": true })).unwrap();
        assert!(cfg.include_hidden);
        assert_eq!(cfg.label_max_chars, 50);
        assert_eq!(cfg.node_timeout(), Duration::from_millis(750));
    }
}
