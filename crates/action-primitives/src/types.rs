//! Core data types for action resolution

use std::fmt;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use pagepilot_core_types::{ActionId, ErrorKind};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

/// Default scroll when no offset is given: one step down.
pub const DEFAULT_SCROLL_DY: f64 = 300.0;

/// Execution context for one action
///
/// Carries the deadline for the whole action, the cancellation token the
/// agent loop can trip, and the id used to correlate log lines and results.
#[derive(Clone, Debug)]
pub struct ExecCtx {
    /// Deadline for this operation
    pub deadline: Instant,

    /// Cancellation token for cooperative cancellation
    pub cancel_token: CancellationToken,

    /// Unique identifier for this action
    pub action_id: ActionId,
}

impl ExecCtx {
    pub fn new(timeout: Duration, cancel_token: CancellationToken) -> Self {
        Self {
            deadline: Instant::now() + timeout,
            cancel_token,
            action_id: ActionId::new(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    pub fn remaining_time(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Click,
    Type,
    Select,
    Scroll,
    Read,
    PressKey,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Click => "click",
            ActionKind::Type => "type",
            ActionKind::Select => "select",
            ActionKind::Scroll => "scroll",
            ActionKind::Read => "read",
            ActionKind::PressKey => "press_key",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionPayload {
    Text(String),
    Option(String),
    Offset { dx: f64, dy: f64 },
    Key(String),
}

impl fmt::Display for ActionPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionPayload::Text(text) => write!(f, "text={text:?}"),
            ActionPayload::Option(option) => write!(f, "option={option:?}"),
            ActionPayload::Offset { dx, dy } => write!(f, "offset=({dx},{dy})"),
            ActionPayload::Key(key) => write!(f, "key={key:?}"),
        }
    }
}

/// One decision from the agent: act on `index` of the current snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRequest {
    pub index: usize,
    #[serde(rename = "action")]
    pub kind: ActionKind,
    #[serde(default)]
    pub payload: Option<ActionPayload>,
    /// Press Enter after typing. Only meaningful for [`ActionKind::Type`].
    #[serde(default)]
    pub submit: bool,
}

impl ActionRequest {
    pub fn new(index: usize, kind: ActionKind) -> Self {
        Self {
            index,
            kind,
            payload: None,
            submit: false,
        }
    }

    pub fn click(index: usize) -> Self {
        Self::new(index, ActionKind::Click)
    }

    pub fn type_text(index: usize, text: impl Into<String>) -> Self {
        Self::new(index, ActionKind::Type).with_payload(ActionPayload::Text(text.into()))
    }

    pub fn select(index: usize, option: impl Into<String>) -> Self {
        Self::new(index, ActionKind::Select).with_payload(ActionPayload::Option(option.into()))
    }

    pub fn scroll(index: usize, dx: f64, dy: f64) -> Self {
        Self::new(index, ActionKind::Scroll).with_payload(ActionPayload::Offset { dx, dy })
    }

    pub fn read(index: usize) -> Self {
        Self::new(index, ActionKind::Read)
    }

    pub fn press_key(index: usize, key: impl Into<String>) -> Self {
        Self::new(index, ActionKind::PressKey).with_payload(ActionPayload::Key(key.into()))
    }

    pub fn with_payload(mut self, payload: ActionPayload) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn with_submit(mut self, submit: bool) -> Self {
        self.submit = submit;
        self
    }
}

/// Data returned by a primitive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExtractedValue {
    Text { text: String },
    Options {
        selected: Option<String>,
        options: Vec<String>,
    },
}

/// What a successful dispatch reports back to the resolver.
#[derive(Debug, Clone, Default)]
pub struct Dispatched {
    pub message: String,
    pub value: Option<ExtractedValue>,
}

impl Dispatched {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            value: None,
        }
    }

    pub fn with_value(mut self, value: ExtractedValue) -> Self {
        self.value = Some(value);
        self
    }
}

/// Outcome of one resolved action
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionResult {
    pub action_id: ActionId,
    pub index: usize,
    pub kind: ActionKind,
    pub success: bool,
    pub error: Option<ErrorKind>,
    pub message: String,
    pub value: Option<ExtractedValue>,
    pub warning: Option<String>,

    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub started_at: DateTime<Utc>,

    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub finished_at: DateTime<Utc>,

    pub latency_ms: u64,
}

impl ActionResult {
    pub fn is_success(&self) -> bool {
        self.success
    }
}

/// Repeat-guard knobs; `enabled = false` lets every action through.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepeatGuardConfig {
    pub enabled: bool,
    pub capacity: usize,
    pub window_ms: u64,
    pub max_repeats: usize,
}

impl Default for RepeatGuardConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            capacity: 15,
            window_ms: 30_000,
            max_repeats: 3,
        }
    }
}

impl RepeatGuardConfig {
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActionConfig {
    pub action_timeout_ms: u64,
    pub repeat_guard: RepeatGuardConfig,
}

impl Default for ActionConfig {
    fn default() -> Self {
        Self {
            action_timeout_ms: 10_000,
            repeat_guard: RepeatGuardConfig::default(),
        }
    }
}

impl ActionConfig {
    pub fn action_timeout(&self) -> Duration {
        Duration::from_millis(self.action_timeout_ms.max(1))
    }
}
