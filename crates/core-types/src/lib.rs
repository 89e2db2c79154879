//! Identifiers and the failure taxonomy shared by every PagePilot crate.

use std::fmt;

use thiserror::Error;
use uuid::Uuid;

/// Unique identifier for a page/tab driven by the adapter.
#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct PageId(pub Uuid);

impl PageId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for PageId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct SnapshotId(pub String);

impl SnapshotId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for SnapshotId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SnapshotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct ActionId(pub String);

impl ActionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for ActionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Failure categories reported to the agent loop.
///
/// Node-level kinds (`ClassifierTimeout`, `FrameAccessDenied`) are recorded on
/// snapshot nodes; the rest surface on failed action results.
#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Debug, Error, Eq, PartialEq, Hash)]
pub enum ErrorKind {
    #[error("index not found")]
    IndexNotFound,
    #[error("stale element")]
    StaleElement,
    #[error("invalid payload")]
    InvalidPayload,
    #[error("action dispatch failed")]
    ActionDispatchFailed,
    #[error("classifier timed out")]
    ClassifierTimeout,
    #[error("frame access denied")]
    FrameAccessDenied,
    #[error("cancelled")]
    Cancelled,
    #[error("repeated action")]
    RepeatedAction,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::IndexNotFound => "IndexNotFound",
            ErrorKind::StaleElement => "StaleElement",
            ErrorKind::InvalidPayload => "InvalidPayload",
            ErrorKind::ActionDispatchFailed => "ActionDispatchFailed",
            ErrorKind::ClassifierTimeout => "ClassifierTimeout",
            ErrorKind::FrameAccessDenied => "FrameAccessDenied",
            ErrorKind::Cancelled => "Cancelled",
            ErrorKind::RepeatedAction => "RepeatedAction",
        }
    }

    /// Whether a fresh snapshot can plausibly make the same request succeed.
    pub fn resnapshot_may_help(&self) -> bool {
        matches!(
            self,
            ErrorKind::IndexNotFound | ErrorKind::StaleElement | ErrorKind::ClassifierTimeout
        )
    }
}
