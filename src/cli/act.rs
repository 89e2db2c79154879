use action_primitives::{ActionKind, ActionPayload, ActionRequest, ActionResult};
use anyhow::{bail, Context, Result};
use clap::{Args, ValueEnum};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::warn;
use url::Url;

use super::output::OutputFormat;
use super::snapshot::{render_human as render_snapshot, SnapshotFlags, SnapshotReport};
use crate::config::AppConfig;
use crate::session::Browser;

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ActionChoice {
    Click,
    Type,
    Select,
    Scroll,
    Read,
    PressKey,
}

impl From<ActionChoice> for ActionKind {
    fn from(choice: ActionChoice) -> Self {
        match choice {
            ActionChoice::Click => ActionKind::Click,
            ActionChoice::Type => ActionKind::Type,
            ActionChoice::Select => ActionKind::Select,
            ActionChoice::Scroll => ActionKind::Scroll,
            ActionChoice::Read => ActionKind::Read,
            ActionChoice::PressKey => ActionKind::PressKey,
        }
    }
}

#[derive(Args, Clone, Debug)]
pub struct ActArgs {
    /// Page to open
    #[arg(long)]
    pub url: Url,

    /// Index from the first snapshot
    #[arg(long)]
    pub index: usize,

    /// What to do with the element
    #[arg(long, value_enum)]
    pub action: ActionChoice,

    /// Text to type (also accepted as the option for select)
    #[arg(long)]
    pub text: Option<String>,

    /// Option to pick, by value or visible label
    #[arg(long)]
    pub option: Option<String>,

    /// Horizontal scroll offset in pixels
    #[arg(long, allow_hyphen_values = true)]
    pub dx: Option<f64>,

    /// Vertical scroll offset in pixels
    #[arg(long, allow_hyphen_values = true)]
    pub dy: Option<f64>,

    /// Key to press, e.g. Enter, Tab, ArrowDown
    #[arg(long)]
    pub key: Option<String>,

    /// Press Enter after typing
    #[arg(long)]
    pub submit: bool,

    #[command(flatten)]
    pub flags: SnapshotFlags,

    /// Print the follow-up snapshot as an indented tree
    #[arg(long)]
    pub outline: bool,
}

impl ActArgs {
    /// Build the request as the agent would have sent it. Missing payloads are
    /// left for the resolver to reject.
    pub fn request(&self) -> ActionRequest {
        let kind = ActionKind::from(self.action);
        let payload = match self.action {
            ActionChoice::Type => self.text.clone().map(ActionPayload::Text),
            ActionChoice::Select => self
                .option
                .clone()
                .map(ActionPayload::Option)
                .or_else(|| self.text.clone().map(ActionPayload::Text)),
            ActionChoice::Scroll if self.dx.is_some() || self.dy.is_some() => {
                Some(ActionPayload::Offset {
                    dx: self.dx.unwrap_or(0.0),
                    dy: self.dy.unwrap_or(0.0),
                })
            }
            ActionChoice::PressKey => self.key.clone().map(ActionPayload::Key),
            _ => None,
        };
        let mut request = ActionRequest::new(self.index, kind);
        request.payload = payload;
        request.with_submit(self.submit)
    }
}

#[derive(Debug, Serialize)]
struct ActReport<'a> {
    result: &'a ActionResult,
    snapshot: SnapshotReport<'a>,
}

pub async fn cmd_act(
    args: ActArgs,
    config: &AppConfig,
    output: OutputFormat,
    cancel: &CancellationToken,
) -> Result<()> {
    let mut config = config.clone();
    config.snapshot = args.flags.apply(&config.snapshot);

    let browser = Browser::launch(config.browser.clone())
        .await
        .context("Failed to start browser")?;
    let result = run_act(&browser, &args, &config, output, cancel).await;
    browser.shutdown().await;
    result
}

async fn run_act(
    browser: &Browser,
    args: &ActArgs,
    config: &AppConfig,
    output: OutputFormat,
    cancel: &CancellationToken,
) -> Result<()> {
    let session = browser
        .open(args.url.as_str(), config)
        .await
        .with_context(|| format!("Failed to open {}", args.url))?;

    let before = session
        .build_snapshot(cancel)
        .await
        .context("Failed to build snapshot")?;
    let result = session.execute(&before, args.request(), cancel).await;
    if let Some(warning) = &result.warning {
        warn!(index = result.index, "{warning}");
    }
    let after = session
        .build_snapshot(cancel)
        .await
        .context("Failed to build follow-up snapshot")?;
    session.close();

    let report = ActReport {
        result: &result,
        snapshot: SnapshotReport::new(&after),
    };
    output.emit(&report, || {
        format!(
            "{}\n\n{}",
            render_result(&result),
            render_snapshot(&after, args.outline)
        )
    })?;

    if !result.success {
        bail!(
            "{} on [{}] failed: {}",
            result.kind,
            result.index,
            result.message
        );
    }
    Ok(())
}

pub fn render_result(result: &ActionResult) -> String {
    let latency = humantime::format_duration(std::time::Duration::from_millis(result.latency_ms));
    let mut lines = vec![match result.error {
        None => format!("✓ {} [{}] in {}: {}", result.kind, result.index, latency, result.message),
        Some(kind) => format!(
            "✗ {} [{}] {} in {}: {}",
            result.kind,
            result.index,
            kind.as_str(),
            latency,
            result.message
        ),
    }];
    if let Some(value) = &result.value {
        if let Ok(text) = serde_json::to_string(value) {
            lines.push(format!("  value: {text}"));
        }
    }
    if let Some(warning) = &result.warning {
        lines.push(format!("  warning: {warning}"));
    }
    lines.join("\n")
}
