//! Chromium DevTools Protocol surface used by PagePilot.
//!
//! The [`Cdp`] trait is everything the snapshot builder and the action
//! resolver need from a browser: describe a node, measure it, read its style
//! and form state, and dispatch input to it. [`CdpAdapter`] implements it over
//! a raw chromiumoxide connection; the `fixture` feature provides an in-memory
//! page for tests.

use std::{env, path::PathBuf};

use which::which;

pub mod ids {
    pub use crate::dom::NodeRef;
    pub use pagepilot_core_types::PageId;
}

pub mod error {
    use serde::{Deserialize, Serialize};
    use std::fmt;
    use thiserror::Error;

    /// High-level error categories surfaced by the adapter.
    #[derive(Clone, Copy, Debug, Error, PartialEq, Eq, Serialize, Deserialize)]
    pub enum AdapterErrorKind {
        #[error("timed out")]
        Timeout,
        #[error("cdp i/o failure")]
        CdpIo,
        #[error("target page not found")]
        TargetNotFound,
        #[error("node detached")]
        NodeDetached,
        #[error("element not interactable")]
        NotInteractable,
        #[error("option not found")]
        OptionNotFound,
        #[error("internal error")]
        Internal,
    }

    /// Enriched error metadata passed back to higher layers.
    #[derive(Clone, Debug, Serialize, Deserialize)]
    pub struct AdapterError {
        pub kind: AdapterErrorKind,
        pub hint: Option<String>,
        pub retriable: bool,
        pub data: Option<serde_json::Value>,
    }

    impl fmt::Display for AdapterError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{}", self.kind)?;
            if let Some(hint) = &self.hint {
                write!(f, ": {}", hint)?;
            }
            Ok(())
        }
    }

    impl std::error::Error for AdapterError {}

    impl AdapterError {
        pub fn new(kind: AdapterErrorKind) -> Self {
            Self {
                kind,
                hint: None,
                retriable: false,
                data: None,
            }
        }

        pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
            self.hint = Some(hint.into());
            self
        }

        pub fn retriable(mut self, flag: bool) -> Self {
            self.retriable = flag;
            self
        }

        pub fn with_data(mut self, data: serde_json::Value) -> Self {
            self.data = Some(data);
            self
        }

        pub fn is_detached(&self) -> bool {
            self.kind == AdapterErrorKind::NodeDetached
        }
    }
}

pub mod config {
    use crate::detect_chrome_executable;
    use serde::{Deserialize, Serialize};
    use std::{
        env,
        path::{Path, PathBuf},
    };

    /// Configuration for launching and tuning the adapter.
    #[derive(Clone, Debug, Serialize, Deserialize)]
    #[serde(default)]
    pub struct CdpConfig {
        pub executable: PathBuf,
        pub user_data_dir: PathBuf,
        pub headless: bool,
        pub default_deadline_ms: u64,
        pub websocket_url: Option<String>,
        pub heartbeat_interval_ms: u64,
    }

    impl Default for CdpConfig {
        fn default() -> Self {
            Self {
                executable: default_chrome_path(),
                user_data_dir: default_profile_dir(),
                headless: resolve_headless_default(),
                default_deadline_ms: 30_000,
                websocket_url: None,
                heartbeat_interval_ms: 15_000,
            }
        }
    }

    fn resolve_headless_default() -> bool {
        // "0", "false", "no", "off" mean headful
        match env::var("PAGEPILOT_HEADLESS") {
            Ok(value) => {
                let lower = value.to_ascii_lowercase();
                !matches!(lower.as_str(), "0" | "false" | "no" | "off")
            }
            Err(_) => true,
        }
    }

    fn default_chrome_path() -> PathBuf {
        detect_chrome_executable().unwrap_or_default()
    }

    fn default_profile_dir() -> PathBuf {
        if let Ok(path) = env::var("PAGEPILOT_CHROME_PROFILE") {
            return PathBuf::from(path);
        }
        Path::new("./.pagepilot-profile").into()
    }
}

/// Executable names searched on `PATH`, most specific first.
#[cfg(target_os = "windows")]
const CHROME_NAMES: &[&str] = &["chrome.exe", "chromium.exe", "msedge.exe"];
#[cfg(not(target_os = "windows"))]
const CHROME_NAMES: &[&str] = &[
    "google-chrome-stable",
    "google-chrome",
    "chromium",
    "chromium-browser",
];

/// Locate Chrome: `PAGEPILOT_CHROME`, then `PATH`, then the platform's usual
/// install locations unless `PAGEPILOT_SKIP_OS_PATHS` is set.
pub(crate) fn detect_chrome_executable() -> Option<PathBuf> {
    env_override()
        .or_else(|| CHROME_NAMES.iter().find_map(|name| which(name).ok()))
        .or_else(|| {
            if flag_set("PAGEPILOT_SKIP_OS_PATHS") {
                return None;
            }
            install_locations().into_iter().find(|path| path.exists())
        })
}

fn env_override() -> Option<PathBuf> {
    let raw = env::var("PAGEPILOT_CHROME").ok()?;
    let trimmed = raw.trim();
    let path = PathBuf::from(trimmed);
    (!trimmed.is_empty() && path.exists()).then_some(path)
}

fn flag_set(name: &str) -> bool {
    env::var(name)
        .map(|value| !value.trim().is_empty())
        .unwrap_or(false)
}

fn install_locations() -> Vec<PathBuf> {
    if cfg!(target_os = "windows") {
        ["PROGRAMFILES", "PROGRAMFILES(X86)", "LOCALAPPDATA"]
            .iter()
            .filter_map(|key| env::var(key).ok())
            .map(|root| PathBuf::from(root.trim()))
            .flat_map(|root| {
                [
                    "Google/Chrome/Application/chrome.exe",
                    "Chromium/Application/chrome.exe",
                    "Microsoft/Edge/Application/msedge.exe",
                ]
                .map(|tail| root.join(tail))
            })
            .collect()
    } else if cfg!(target_os = "macos") {
        [
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
            "/Applications/Chromium.app/Contents/MacOS/Chromium",
        ]
        .iter()
        .map(PathBuf::from)
        .collect()
    } else {
        [
            "/usr/bin/google-chrome-stable",
            "/usr/bin/google-chrome",
            "/usr/bin/chromium-browser",
            "/usr/bin/chromium",
            "/snap/bin/chromium",
        ]
        .iter()
        .map(PathBuf::from)
        .collect()
    }
}

pub(crate) fn resolve_chrome_path(cfg: &config::CdpConfig) -> Option<PathBuf> {
    if !cfg.executable.as_os_str().is_empty() && cfg.executable.exists() {
        return Some(cfg.executable.clone());
    }
    detect_chrome_executable()
}

pub mod adapter;
pub mod dom;
#[cfg(any(test, feature = "fixture"))]
pub mod fixture;
pub mod keys;
pub mod metrics;
pub mod registry;
mod scripts;
pub mod transport;
pub mod util;

pub use adapter::{Cdp, CdpAdapter};
pub use config::CdpConfig;
pub use dom::{BoxRect, DomNode, DomNodeKind, FormState, NodeRef, StyleFacts};
pub use error::{AdapterError, AdapterErrorKind};
pub use ids::PageId;
pub use metrics::AdapterMetricsSnapshot;
pub use registry::{Registry, TabGates};
pub use transport::{CdpTransport, ChromeTransport, CommandTarget, Endpoint, TransportEvent};

#[cfg(test)]
mod tests {
    use super::{detect_chrome_executable, CHROME_NAMES};
    use serial_test::serial;
    use std::ffi::OsString;
    use std::{env, fs};
    use tempfile::tempdir;

    /// Run `f` with the given variables set, restoring them afterwards.
    fn with_env<T>(vars: &[(&str, OsString)], f: impl FnOnce() -> T) -> T {
        let saved: Vec<_> = vars.iter().map(|(k, _)| (*k, env::var_os(k))).collect();
        for (key, value) in vars {
            env::set_var(key, value);
        }
        let out = f();
        for (key, value) in saved {
            match value {
                Some(value) => env::set_var(key, value),
                None => env::remove_var(key),
            }
        }
        out
    }

    #[test]
    #[serial]
    fn explicit_chrome_wins() {
        let dir = tempdir().unwrap();
        let exe = dir.path().join("my-chrome");
        fs::write(&exe, b"").unwrap();
        let found = with_env(&[("PAGEPILOT_CHROME", exe.clone().into())], detect_chrome_executable);
        assert_eq!(found, Some(exe));
    }

    #[test]
    #[serial]
    fn path_lookup_then_nothing() {
        let dir = tempdir().unwrap();
        let exe = dir.path().join(CHROME_NAMES[0]);
        fs::write(&exe, b"").unwrap();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&exe, fs::Permissions::from_mode(0o755)).unwrap();
        }
        let base = [
            ("PAGEPILOT_CHROME", OsString::new()),
            ("PAGEPILOT_SKIP_OS_PATHS", "1".into()),
        ];

        let mut on_path = base.to_vec();
        on_path.push(("PATH", dir.path().into()));
        assert_eq!(with_env(&on_path, detect_chrome_executable), Some(exe));

        let empty = tempdir().unwrap();
        let mut nowhere = base.to_vec();
        nowhere.push(("PATH", empty.path().into()));
        assert_eq!(with_env(&nowhere, detect_chrome_executable), None);
    }
}
