use anyhow::{Context, Result};
use clap::Args;
use pagepilot_core_types::SnapshotId;
use perceiver_structural::render;
use perceiver_structural::{InteractableNode, Snapshot, SnapshotConfig, WalkStats};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use url::Url;

use super::output::OutputFormat;
use crate::config::AppConfig;
use crate::session::Browser;

/// Per-run overrides of the `snapshot` config section.
#[derive(Args, Clone, Debug, Default)]
pub struct SnapshotFlags {
    /// Also index hidden, zero-sized and covered elements
    #[arg(long)]
    pub include_hidden: bool,

    /// Also index disabled controls
    #[arg(long)]
    pub include_disabled: bool,

    /// Same-origin iframe levels to descend into
    #[arg(long, value_name = "N")]
    pub frame_depth: Option<u32>,

    /// Only walk the first element matching this CSS selector
    #[arg(long, value_name = "SELECTOR")]
    pub root: Option<String>,

    /// Stop after visiting this many elements
    #[arg(long, value_name = "N")]
    pub max_nodes: Option<usize>,
}

impl SnapshotFlags {
    /// Boolean flags can only switch a check off; unset options keep the config value.
    pub fn apply(&self, base: &SnapshotConfig) -> SnapshotConfig {
        let mut cfg = base.clone();
        cfg.include_hidden |= self.include_hidden;
        cfg.include_disabled |= self.include_disabled;
        if let Some(depth) = self.frame_depth {
            cfg.frame_depth_limit = depth;
        }
        if let Some(root) = &self.root {
            cfg.root_selector = Some(root.clone());
        }
        if let Some(max) = self.max_nodes {
            cfg.max_nodes = Some(max);
        }
        cfg
    }
}

#[derive(Args, Clone, Debug)]
pub struct SnapshotArgs {
    /// Page to open
    #[arg(long)]
    pub url: Url,

    #[command(flatten)]
    pub flags: SnapshotFlags,

    /// Print the indented element tree instead of one line per element
    #[arg(long)]
    pub outline: bool,

    /// Scroll the first element showing this text into view before indexing
    #[arg(long, value_name = "TEXT")]
    pub scroll_to_text: Option<String>,

    /// Outline these indices in the page after indexing (comma separated)
    #[arg(long, value_name = "INDEX", value_delimiter = ',')]
    pub highlight: Vec<usize>,
}

#[derive(Debug, Serialize)]
pub struct SnapshotReport<'a> {
    pub id: &'a SnapshotId,
    pub url: &'a str,
    pub captured_at: String,
    pub stats: &'a WalkStats,
    pub elements: &'a [InteractableNode],
    pub prompt: Vec<String>,
}

impl<'a> SnapshotReport<'a> {
    pub fn new(snapshot: &'a Snapshot) -> Self {
        Self {
            id: snapshot.id(),
            url: snapshot.url(),
            captured_at: snapshot.captured_at().to_rfc3339(),
            stats: snapshot.stats(),
            elements: snapshot.interactables(),
            prompt: render::prompt_lines(snapshot),
        }
    }
}

pub fn render_human(snapshot: &Snapshot, outline: bool) -> String {
    let stats = snapshot.stats();
    let mut out = vec![
        format!(
            "{} interactable elements on {} (snapshot {})",
            snapshot.len(),
            snapshot.url(),
            snapshot.id()
        ),
        format!(
            "visited {}, detached {}, timed out {}, probe errors {}, opaque frames {}, over budget {}",
            stats.visited,
            stats.detached,
            stats.timed_out,
            stats.probe_errors,
            stats.opaque_frames,
            stats.over_budget
        ),
        String::new(),
    ];
    if snapshot.is_empty() {
        out.push("(no interactable elements)".to_string());
    } else if outline {
        out.push(render::outline(snapshot));
    } else {
        out.push(render::prompt(snapshot));
    }
    out.join("\n")
}

pub async fn cmd_snapshot(
    args: SnapshotArgs,
    config: &AppConfig,
    output: OutputFormat,
    cancel: &CancellationToken,
) -> Result<()> {
    let mut config = config.clone();
    config.snapshot = args.flags.apply(&config.snapshot);

    let browser = Browser::launch(config.browser.clone())
        .await
        .context("Failed to start browser")?;
    let result = run_snapshot(&browser, &args, &config, output, cancel).await;
    browser.shutdown().await;
    result
}

async fn run_snapshot(
    browser: &Browser,
    args: &SnapshotArgs,
    config: &AppConfig,
    output: OutputFormat,
    cancel: &CancellationToken,
) -> Result<()> {
    let session = browser
        .open(args.url.as_str(), config)
        .await
        .with_context(|| format!("Failed to open {}", args.url))?;
    if let Some(text) = &args.scroll_to_text {
        let done = session
            .scroll_to_text(text, cancel)
            .await
            .with_context(|| format!("Failed to scroll to {text:?}"))?;
        info!("{}", done.message);
    }
    let snapshot = session
        .build_snapshot(cancel)
        .await
        .context("Failed to build snapshot")?;
    for index in &args.highlight {
        match session.highlight(&snapshot, *index, cancel).await {
            Ok(entry) => info!(index, label = %entry.label, "highlighted"),
            Err(err) => warn!(index, error = %err, "highlight failed"),
        }
    }
    session.close();

    output.emit(&SnapshotReport::new(&snapshot), || {
        render_human(&snapshot, args.outline)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_flags_keep_config_values() {
        let base = SnapshotConfig {
            include_hidden: true,
            frame_depth_limit: 3,
            ..SnapshotConfig::default()
        };
        let flags = SnapshotFlags {
            include_disabled: true,
            root: Some("form".into()),
            ..SnapshotFlags::default()
        };
        let cfg = flags.apply(&base);
        assert!(cfg.include_hidden);
        assert!(cfg.include_disabled);
        assert_eq!(cfg.frame_depth_limit, 3);
        assert_eq!(cfg.root_selector.as_deref(), Some("form"));
        assert_eq!(cfg.max_nodes, None);

        let zero = SnapshotFlags {
            frame_depth: Some(0),
            ..SnapshotFlags::default()
        };
        assert_eq!(zero.apply(&base).frame_depth_limit, 0);
    }

    #[test]
    fn page_helpers_parse() {
        use crate::cli::{Cli, Commands};
        use clap::Parser;

        let cli = Cli::try_parse_from([
            "pagepilot",
            "snapshot",
            "--url",
            "https://shop.test/",
            "--scroll-to-text",
            "Reviews",
            "--highlight",
            "0,3",
        ])
        .unwrap();
        let Commands::Snapshot(args) = cli.command else {
            panic!("expected snapshot");
        };
        assert_eq!(args.scroll_to_text.as_deref(), Some("Reviews"));
        assert_eq!(args.highlight, vec![0, 3]);
    }
}
