//! DevTools socket plumbing.
//!
//! A [`ChromeTransport`] owns one [`Link`] at a time: a websocket to a
//! launched or already running Chrome, pumped by a single task that matches
//! responses to calls and forwards events in arrival order. Protocol errors
//! are mapped to [`AdapterErrorKind`]s here so callers above never parse
//! Chrome's messages. A dead link is replaced on next use.

use std::collections::HashMap;
use std::convert::TryInto;
use std::fs;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::async_process::Child;
use chromiumoxide::browser::BrowserConfig;
use chromiumoxide::cdp::browser_protocol::target::SessionId as CdpSessionId;
use chromiumoxide::cdp::events::CdpEventMessage;
use chromiumoxide::conn::Connection;
use chromiumoxide::error::CdpError;
use chromiumoxide_types::{CallId, CdpJsonEventMessage, Message, MethodId, Response};
use futures::{future::BoxFuture, StreamExt};
use serde_json::{json, Value};
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::CdpConfig;
use crate::error::{AdapterError, AdapterErrorKind};
use crate::util::extract_ws_url;

/// Upper bound on a keep-alive round trip, whatever the command deadline.
const KEEPALIVE_DEADLINE: Duration = Duration::from_secs(5);
const LAUNCH_TIMEOUT: Duration = Duration::from_secs(20);

#[derive(Clone, Debug)]
pub struct TransportEvent {
    pub method: String,
    pub params: Value,
    pub session_id: Option<String>,
}

#[derive(Clone, Debug)]
pub enum CommandTarget {
    Browser,
    Session(String),
}

#[async_trait]
pub trait CdpTransport: Send + Sync {
    /// Connect if needed and subscribe to target attach events.
    async fn start(&self) -> Result<(), AdapterError>;
    /// Next protocol event; `None` once the link is gone.
    async fn next_event(&self) -> Option<TransportEvent>;
    async fn send_command(
        &self,
        target: CommandTarget,
        method: &str,
        params: Value,
    ) -> Result<Value, AdapterError>;
}

/// Map a protocol error response onto an adapter kind.
///
/// Chrome words the same condition differently depending on the domain that
/// noticed it, so matching is on lowercase fragments.
pub fn protocol_error(code: i64, message: &str) -> AdapterError {
    fn has(lower: &str, fragments: &[&str]) -> bool {
        fragments.iter().any(|f| lower.contains(f))
    }
    let lower = message.to_ascii_lowercase();

    let kind = if has(&lower, &[
        "no node with given id",
        "could not find node with given id",
        "node is detached",
        "does not belong to the document",
        "cannot find context with specified id",
    ]) {
        AdapterErrorKind::NodeDetached
    } else if has(&lower, &[
        "could not compute box model",
        "could not compute content quads",
        "node is not an element",
    ]) {
        AdapterErrorKind::NotInteractable
    } else if has(&lower, &[
        "no target with given id",
        "session with given id not found",
        "target closed",
        "inspected target navigated or closed",
    ]) {
        AdapterErrorKind::TargetNotFound
    } else if code == -32601 || code == -32602 {
        AdapterErrorKind::Internal
    } else {
        AdapterErrorKind::CdpIo
    };

    AdapterError::new(kind)
        .with_hint(format!("cdp error {code}: {message}"))
        .retriable(kind == AdapterErrorKind::CdpIo)
}

/// Failure of the socket itself rather than of one command.
fn link_error(err: CdpError) -> AdapterError {
    let hint = err.to_string();
    match err {
        CdpError::Timeout => AdapterError::new(AdapterErrorKind::Timeout),
        _ => AdapterError::new(AdapterErrorKind::CdpIo),
    }
    .with_hint(hint)
    .retriable(true)
}

fn settle(resp: Response) -> Result<Value, AdapterError> {
    match (resp.result, resp.error) {
        (Some(result), _) => Ok(result),
        (None, Some(error)) => Err(protocol_error(error.code, &error.message)),
        (None, None) => {
            Err(AdapterError::new(AdapterErrorKind::Internal).with_hint("empty cdp response"))
        }
    }
}

/// Where the DevTools socket comes from.
pub enum Endpoint {
    /// A Chrome somebody else started.
    Attach(String),
    /// A Chrome this process launches and owns.
    Launch(Box<BrowserConfig>),
}

impl Endpoint {
    pub fn from_config(cfg: &CdpConfig) -> Result<Self, AdapterError> {
        if let Some(url) = cfg.websocket_url.as_deref().map(str::trim) {
            if !url.starts_with("ws://") && !url.starts_with("wss://") {
                return Err(AdapterError::new(AdapterErrorKind::Internal)
                    .with_hint(format!("websocket_url must be a ws:// url, got '{url}'")));
            }
            return Ok(Endpoint::Attach(url.to_string()));
        }

        if cfg.executable.as_os_str().is_empty() || !cfg.executable.exists() {
            return Err(AdapterError::new(AdapterErrorKind::CdpIo)
                .with_hint(format!(
                    "chrome executable not found at '{}'",
                    cfg.executable.display()
                ))
                .with_data(json!({
                    "remediation": "set PAGEPILOT_CHROME or browser.websocket_url"
                })));
        }

        let profile = if cfg.user_data_dir.is_absolute() {
            cfg.user_data_dir.clone()
        } else {
            std::env::current_dir()
                .map_err(|err| {
                    AdapterError::new(AdapterErrorKind::Internal)
                        .with_hint(format!("cannot resolve profile dir: {err}"))
                })?
                .join(&cfg.user_data_dir)
        };
        fs::create_dir_all(&profile).map_err(|err| {
            AdapterError::new(AdapterErrorKind::Internal)
                .with_hint(format!("cannot create profile dir {}: {err}", profile.display()))
        })?;

        let mut builder = BrowserConfig::builder()
            .chrome_executable(cfg.executable.clone())
            .user_data_dir(profile)
            .request_timeout(Duration::from_millis(cfg.default_deadline_ms))
            .launch_timeout(LAUNCH_TIMEOUT)
            .args(chrome_args(cfg.headless));
        if !cfg.headless {
            builder = builder.with_head();
        }
        if sandbox_disabled() {
            builder = builder.no_sandbox();
        }
        let config = builder.build().map_err(|err| {
            AdapterError::new(AdapterErrorKind::Internal)
                .with_hint(format!("browser config error: {err}"))
        })?;
        Ok(Endpoint::Launch(Box::new(config)))
    }
}

/// Launch flags. Popups stay allowed so clicks open what they would for a user.
fn chrome_args(headless: bool) -> Vec<&'static str> {
    let mut args = vec![
        "--no-first-run",
        "--no-default-browser-check",
        "--disable-background-networking",
        "--disable-component-update",
        "--disable-default-apps",
        "--disable-extensions",
        "--disable-sync",
        "--disable-popup-blocking",
        "--disable-dev-shm-usage",
        "--password-store=basic",
        "--use-mock-keychain",
        "--remote-allow-origins=*",
    ];
    if headless {
        args.extend(["--headless=new", "--hide-scrollbars", "--mute-audio"]);
    }
    args
}

fn sandbox_disabled() -> bool {
    std::env::var("PAGEPILOT_DISABLE_SANDBOX")
        .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(false)
}

type Connector =
    Arc<dyn Fn(CdpConfig) -> BoxFuture<'static, Result<Link, AdapterError>> + Send + Sync>;

/// [`CdpTransport`] over chromiumoxide's raw [`Connection`].
pub struct ChromeTransport {
    cfg: CdpConfig,
    link: Mutex<Option<Arc<Link>>>,
    connect: Connector,
}

impl ChromeTransport {
    pub fn new(cfg: CdpConfig) -> Self {
        let connect: Connector = Arc::new(
            |cfg: CdpConfig| -> BoxFuture<'static, Result<Link, AdapterError>> {
                Box::pin(Link::open(cfg))
            },
        );
        Self::with_connector(cfg, connect)
    }

    fn with_connector(cfg: CdpConfig, connect: Connector) -> Self {
        Self {
            cfg,
            link: Mutex::new(None),
            connect,
        }
    }

    fn deadline(&self) -> Duration {
        Duration::from_millis(self.cfg.default_deadline_ms)
    }

    async fn link(&self) -> Result<Arc<Link>, AdapterError> {
        let mut slot = self.link.lock().await;
        if let Some(link) = slot.as_ref().filter(|link| link.is_alive()) {
            return Ok(Arc::clone(link));
        }
        if slot.take().is_some() {
            warn!(target: "cdp-transport", "devtools link lost; reconnecting");
        }
        let link = Arc::new((self.connect)(self.cfg.clone()).await?);
        *slot = Some(Arc::clone(&link));
        Ok(link)
    }
}

#[async_trait]
impl CdpTransport for ChromeTransport {
    async fn start(&self) -> Result<(), AdapterError> {
        let link = self.link().await?;
        let deadline = self.deadline();
        link.call(
            CommandTarget::Browser,
            "Target.setDiscoverTargets",
            json!({ "discover": true }),
            deadline,
        )
        .await?;
        link.call(
            CommandTarget::Browser,
            "Target.setAutoAttach",
            json!({ "autoAttach": true, "waitForDebuggerOnStart": false, "flatten": true }),
            deadline,
        )
        .await?;
        Ok(())
    }

    async fn next_event(&self) -> Option<TransportEvent> {
        match self.link().await {
            Ok(link) => link.next_event().await,
            Err(err) => {
                warn!(target: "cdp-transport", ?err, "no devtools link");
                None
            }
        }
    }

    async fn send_command(
        &self,
        target: CommandTarget,
        method: &str,
        params: Value,
    ) -> Result<Value, AdapterError> {
        self.link()
            .await?
            .call(target, method, params, self.deadline())
            .await
    }
}

struct Call {
    target: CommandTarget,
    method: String,
    params: Value,
    reply: oneshot::Sender<Result<Value, AdapterError>>,
}

type Inflight = HashMap<CallId, oneshot::Sender<Result<Value, AdapterError>>>;

/// One live websocket plus the tasks serving it.
pub struct Link {
    calls: mpsc::Sender<Call>,
    events: Mutex<mpsc::Receiver<TransportEvent>>,
    tasks: Vec<JoinHandle<()>>,
    chrome: parking_lot::Mutex<Option<Child>>,
    alive: Arc<AtomicBool>,
}

impl Link {
    async fn open(cfg: CdpConfig) -> Result<Link, AdapterError> {
        let (chrome, ws_url) = match Endpoint::from_config(&cfg)? {
            Endpoint::Attach(url) => (None, url),
            Endpoint::Launch(config) => {
                let mut child = config.launch().map_err(|err| {
                    AdapterError::new(AdapterErrorKind::CdpIo)
                        .with_hint(format!("failed to launch chrome: {err}"))
                })?;
                let url = extract_ws_url(&mut child).await.map_err(|err| {
                    AdapterError::new(AdapterErrorKind::CdpIo).with_hint(err.to_string())
                })?;
                (Some(child), url)
            }
        };

        let conn = Connection::<CdpEventMessage>::connect(&ws_url)
            .await
            .map_err(link_error)?;
        let (calls, calls_rx) = mpsc::channel(128);
        let (events_tx, events) = mpsc::channel(512);
        let alive = Arc::new(AtomicBool::new(true));

        let pump_alive = Arc::clone(&alive);
        let mut tasks = vec![tokio::spawn(async move {
            if let Err(err) = pump(conn, calls_rx, events_tx).await {
                warn!(target: "cdp-transport", ?err, "devtools link failed");
            }
            pump_alive.store(false, Ordering::Relaxed);
        })];
        if cfg.heartbeat_interval_ms > 0 {
            tasks.push(tokio::spawn(keepalive(
                calls.clone(),
                Arc::clone(&alive),
                Duration::from_millis(cfg.heartbeat_interval_ms),
            )));
        }

        info!(target: "cdp-transport", url = %ws_url, launched = chrome.is_some(), "devtools link open");
        Ok(Link {
            calls,
            events: Mutex::new(events),
            tasks,
            chrome: parking_lot::Mutex::new(chrome),
            alive,
        })
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Relaxed)
    }

    async fn call(
        &self,
        target: CommandTarget,
        method: &str,
        params: Value,
        deadline: Duration,
    ) -> Result<Value, AdapterError> {
        let (reply, answer) = oneshot::channel();
        let call = Call {
            target,
            method: method.to_string(),
            params,
            reply,
        };
        if self.calls.send(call).await.is_err() {
            self.alive.store(false, Ordering::Relaxed);
            return Err(AdapterError::new(AdapterErrorKind::CdpIo)
                .with_hint("devtools link closed")
                .retriable(true));
        }
        match timeout(deadline, answer).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(AdapterError::new(AdapterErrorKind::CdpIo)
                .with_hint(format!("{method}: link dropped before replying"))
                .retriable(true)),
            Err(_) => Err(AdapterError::new(AdapterErrorKind::Timeout)
                .with_hint(format!("{method}: no reply within {}ms", deadline.as_millis()))),
        }
    }

    async fn next_event(&self) -> Option<TransportEvent> {
        self.events.lock().await.recv().await
    }
}

impl Drop for Link {
    fn drop(&mut self) {
        self.alive.store(false, Ordering::Relaxed);
        for task in &self.tasks {
            task.abort();
        }
        let Some(mut child) = self.chrome.lock().take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(err) = child.kill().await {
                        warn!(target: "cdp-transport", ?err, "failed to stop chrome");
                    }
                });
            }
            Err(_) => debug!(target: "cdp-transport", "no runtime left to stop chrome"),
        }
    }
}

/// Own the socket: submit calls, route replies, forward events. Returns when
/// the socket closes; every call still waiting is failed first.
async fn pump(
    mut conn: Connection<CdpEventMessage>,
    mut calls: mpsc::Receiver<Call>,
    events: mpsc::Sender<TransportEvent>,
) -> Result<(), AdapterError> {
    let mut inflight = Inflight::new();

    let outcome = loop {
        tokio::select! {
            Some(call) = calls.recv() => submit(&mut conn, call, &mut inflight),
            message = conn.next() => match message {
                Some(Ok(Message::Response(resp))) => {
                    if let Some(reply) = inflight.remove(&resp.id) {
                        let _ = reply.send(settle(resp));
                    }
                }
                Some(Ok(Message::Event(event))) => {
                    if let Some(event) = decode_event(event) {
                        if events.send(event).await.is_err() {
                            break Ok(());
                        }
                    }
                }
                Some(Err(err)) => break Err(link_error(err)),
                None => break Ok(()),
            },
        }
    };

    let reason = match &outcome {
        Err(err) => err.clone(),
        Ok(()) => AdapterError::new(AdapterErrorKind::CdpIo)
            .with_hint("devtools socket closed")
            .retriable(true),
    };
    for (_, reply) in inflight.drain() {
        let _ = reply.send(Err(reason.clone()));
    }
    outcome
}

fn submit(conn: &mut Connection<CdpEventMessage>, call: Call, inflight: &mut Inflight) {
    let session = match call.target {
        CommandTarget::Browser => None,
        CommandTarget::Session(id) => Some(CdpSessionId::from(id)),
    };
    let method: MethodId = call.method.clone().into();
    match conn.submit_command(method, session, call.params) {
        Ok(id) => {
            inflight.insert(id, call.reply);
        }
        Err(err) => {
            let _ = call.reply.send(Err(link_error(CdpError::from(err))));
        }
    }
}

fn decode_event(event: CdpEventMessage) -> Option<TransportEvent> {
    let raw: CdpJsonEventMessage = match event.try_into() {
        Ok(raw) => raw,
        Err(err) => {
            debug!(target: "cdp-transport", ?err, "undecodable event dropped");
            return None;
        }
    };
    Some(TransportEvent {
        method: raw.method.into_owned(),
        params: raw.params,
        session_id: raw.session_id,
    })
}

/// Ping the browser until a ping fails, then mark the link dead so the next
/// command reconnects.
async fn keepalive(calls: mpsc::Sender<Call>, alive: Arc<AtomicBool>, every: Duration) {
    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    ticker.tick().await;

    while alive.load(Ordering::Relaxed) {
        ticker.tick().await;
        let (reply, answer) = oneshot::channel();
        let ping = Call {
            target: CommandTarget::Browser,
            method: "Browser.getVersion".to_string(),
            params: json!({}),
            reply,
        };
        if calls.send(ping).await.is_err() {
            break;
        }
        match timeout(KEEPALIVE_DEADLINE, answer).await {
            Ok(Ok(Ok(_))) => {}
            outcome => {
                warn!(target: "cdp-transport", ?outcome, "keep-alive failed; marking link dead");
                alive.store(false, Ordering::Relaxed);
                break;
            }
        }
    }
}

#[cfg(test)]
impl Link {
    /// A link with no socket behind it; calls queue up and never answer.
    fn idle() -> (Link, Arc<AtomicBool>) {
        let (calls, calls_rx) = mpsc::channel(8);
        let (events_tx, events) = mpsc::channel(8);
        let alive = Arc::new(AtomicBool::new(true));
        let task = tokio::spawn(async move {
            let _keep = (calls_rx, events_tx);
            futures::future::pending::<()>().await;
        });
        (
            Link {
                calls,
                events: Mutex::new(events),
                tasks: vec![task],
                chrome: parking_lot::Mutex::new(None),
                alive: Arc::clone(&alive),
            },
            alive,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn vanished_nodes_and_targets_are_told_apart() {
        let detached = protocol_error(-32000, "No node with given id found");
        assert_eq!(detached.kind, AdapterErrorKind::NodeDetached);
        assert!(!detached.retriable);
        assert_eq!(
            protocol_error(-32000, "Could not compute content quads.").kind,
            AdapterErrorKind::NotInteractable
        );
        assert_eq!(
            protocol_error(-32001, "Session with given id not found.").kind,
            AdapterErrorKind::TargetNotFound
        );
        assert_eq!(
            protocol_error(-32000, "Target closed").kind,
            AdapterErrorKind::TargetNotFound
        );
        assert_eq!(
            protocol_error(-32601, "'DOM.frobnicate' wasn't found").kind,
            AdapterErrorKind::Internal
        );
        let other = protocol_error(-32000, "Something odd");
        assert_eq!(other.kind, AdapterErrorKind::CdpIo);
        assert!(other.retriable);
    }

    #[test]
    fn responses_settle_into_values_or_errors() {
        let ok: Response =
            serde_json::from_value(json!({ "id": 8, "result": { "nodeId": 1 } })).unwrap();
        assert_eq!(settle(ok).unwrap()["nodeId"], 1);

        let failed: Response = serde_json::from_value(json!({
            "id": 7,
            "error": { "code": -32000, "message": "Node is detached from document" }
        }))
        .unwrap();
        let err = settle(failed).unwrap_err();
        assert!(err.is_detached());
        assert!(err.hint.unwrap().contains("-32000"));
    }

    #[test]
    fn websocket_endpoint_skips_chrome_discovery() {
        let cfg = CdpConfig {
            websocket_url: Some(" ws://127.0.0.1:9222/devtools/browser/x ".into()),
            executable: "/nowhere/chrome".into(),
            ..CdpConfig::default()
        };
        match Endpoint::from_config(&cfg) {
            Ok(Endpoint::Attach(url)) => assert_eq!(url, "ws://127.0.0.1:9222/devtools/browser/x"),
            _ => panic!("expected an attach endpoint"),
        }

        let bad = CdpConfig {
            websocket_url: Some("http://127.0.0.1:9222".into()),
            ..CdpConfig::default()
        };
        assert!(Endpoint::from_config(&bad).is_err());
    }

    #[test]
    fn missing_executable_is_reported() {
        let cfg = CdpConfig {
            executable: "/nowhere/chrome".into(),
            websocket_url: None,
            ..CdpConfig::default()
        };
        let err = match Endpoint::from_config(&cfg) {
            Err(err) => err,
            Ok(_) => panic!("expected an error"),
        };
        assert_eq!(err.kind, AdapterErrorKind::CdpIo);
        assert!(err.hint.unwrap().contains("/nowhere/chrome"));
    }

    #[test]
    fn headless_flags_follow_the_config() {
        assert!(chrome_args(true).contains(&"--headless=new"));
        assert!(!chrome_args(false).contains(&"--headless=new"));
    }

    #[tokio::test]
    async fn dead_link_is_replaced_on_next_use() {
        let opened = Arc::new(AtomicUsize::new(0));
        let flags = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let connector: Connector = {
            let opened = Arc::clone(&opened);
            let flags = Arc::clone(&flags);
            Arc::new(
                move |_cfg: CdpConfig| -> BoxFuture<'static, Result<Link, AdapterError>> {
                    opened.fetch_add(1, Ordering::SeqCst);
                    let (link, alive) = Link::idle();
                    flags.lock().push(alive);
                    Box::pin(async move { Ok(link) })
                },
            )
        };
        let transport = ChromeTransport::with_connector(CdpConfig::default(), connector);

        let first = transport.link().await.unwrap();
        let again = transport.link().await.unwrap();
        assert!(Arc::ptr_eq(&first, &again));
        assert_eq!(opened.load(Ordering::SeqCst), 1);

        flags.lock()[0].store(false, Ordering::SeqCst);
        let second = transport.link().await.unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(opened.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn unanswered_calls_time_out() {
        let (link, _alive) = Link::idle();
        let err = link
            .call(
                CommandTarget::Browser,
                "Browser.getVersion",
                json!({}),
                Duration::from_millis(20),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind, AdapterErrorKind::Timeout);
        assert!(err.hint.unwrap().contains("Browser.getVersion"));
    }
}
