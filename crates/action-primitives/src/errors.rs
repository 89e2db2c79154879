//! Error types for action resolution

use cdp_adapter::AdapterError;
use pagepilot_core_types::ErrorKind;
use thiserror::Error;

/// Why an action did not run, or did not finish.
#[derive(Debug, Error)]
pub enum ActionError {
    /// The index is not part of the snapshot the request was made against
    #[error("index {index} not in snapshot (valid range 0..{len})")]
    IndexNotFound { index: usize, len: usize },

    /// The element no longer qualifies in the live page
    #[error("element at index {index} is stale: {reason}")]
    StaleElement { index: usize, reason: String },

    /// Payload missing, of the wrong shape, or wrong for the target element
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    /// The browser rejected or did not complete the input command
    #[error("dispatch failed: {message}")]
    DispatchFailed {
        message: String,
        #[source]
        source: AdapterError,
    },

    /// The liveness re-check ran out of time
    #[error("liveness check for index {index} timed out")]
    ClassifierTimeout { index: usize },

    #[error("action cancelled before dispatch")]
    Cancelled,

    /// Same action on the same element repeated too often in a row
    #[error("action repeated {count} times in a row: {fingerprint}")]
    RepeatedAction { count: usize, fingerprint: String },
}

impl ActionError {
    pub fn dispatch(source: AdapterError) -> Self {
        ActionError::DispatchFailed {
            message: source.to_string(),
            source,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ActionError::IndexNotFound { .. } => ErrorKind::IndexNotFound,
            ActionError::StaleElement { .. } => ErrorKind::StaleElement,
            ActionError::InvalidPayload(_) => ErrorKind::InvalidPayload,
            ActionError::DispatchFailed { .. } => ErrorKind::ActionDispatchFailed,
            ActionError::ClassifierTimeout { .. } => ErrorKind::ClassifierTimeout,
            ActionError::Cancelled => ErrorKind::Cancelled,
            ActionError::RepeatedAction { .. } => ErrorKind::RepeatedAction,
        }
    }

    /// Adapter failure behind a dispatch error, if any.
    pub fn adapter_error(&self) -> Option<&AdapterError> {
        match self {
            ActionError::DispatchFailed { source, .. } => Some(source),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cdp_adapter::AdapterErrorKind;
    use std::error::Error as _;

    #[test]
    fn dispatch_errors_keep_their_source() {
        let err = ActionError::dispatch(
            AdapterError::new(AdapterErrorKind::OptionNotFound).with_hint("no option 'XL'"),
        );
        assert_eq!(err.kind(), ErrorKind::ActionDispatchFailed);
        assert_eq!(err.to_string(), "dispatch failed: option not found: no option 'XL'");
        assert!(err.source().is_some());
        assert_eq!(
            err.adapter_error().map(|e| e.kind),
            Some(AdapterErrorKind::OptionNotFound)
        );
    }
}
