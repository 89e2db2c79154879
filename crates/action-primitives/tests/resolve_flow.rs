use std::sync::Arc;
use std::time::Duration;

use action_primitives::{
    ActionConfig, ActionKind, ActionRequest, ActionResolver, ActionResult, DefaultActionResolver,
    ExecCtx, ExtractedValue, RepeatGuardConfig,
};
use cdp_adapter::fixture::{ElementSpec, FixtureEvent, FixturePage};
use cdp_adapter::{AdapterErrorKind, Cdp, PageId};
use pagepilot_core_types::ErrorKind;
use perceiver_structural::{Snapshot, SnapshotConfig, StructuralPerceiver, StructuralPerceiverImpl};
use tokio_util::sync::CancellationToken;

struct Harness {
    page: Arc<FixturePage>,
    pid: PageId,
    resolver: DefaultActionResolver,
}

impl Harness {
    fn new() -> Self {
        Self::with_config(ActionConfig::default())
    }

    fn with_config(cfg: ActionConfig) -> Self {
        let page = Arc::new(FixturePage::new("https://shop.test/"));
        let cdp: Arc<dyn Cdp> = page.clone();
        Self {
            resolver: DefaultActionResolver::with_cdp(cdp, cfg),
            page,
            pid: PageId::new(),
        }
    }

    async fn snapshot_with(&self, cfg: &SnapshotConfig) -> Snapshot {
        StructuralPerceiverImpl::new(self.page.clone())
            .build_snapshot(self.pid, cfg, &CancellationToken::new())
            .await
            .expect("snapshot")
    }

    async fn snapshot(&self) -> Snapshot {
        self.snapshot_with(&SnapshotConfig::default()).await
    }

    async fn act(&self, snapshot: &Snapshot, request: ActionRequest) -> ActionResult {
        let ctx = ExecCtx::new(Duration::from_secs(5), CancellationToken::new());
        self.resolver.resolve(snapshot, request, &ctx).await
    }
}

#[tokio::test]
async fn typing_into_a_text_input_sets_its_value() {
    let h = Harness::new();
    let input = h
        .page
        .append(h.page.body(), ElementSpec::new("input").attr("name", "q"));
    let snap = h.snapshot().await;

    let result = h.act(&snap, ActionRequest::type_text(0, "hello")).await;
    assert!(result.success, "{}", result.message);
    assert_eq!(result.error, None);
    assert_eq!(result.kind, ActionKind::Type);
    assert_eq!(h.page.value_of(input).as_deref(), Some("hello"));
    assert!(result.finished_at >= result.started_at);
}

#[tokio::test]
async fn typing_into_a_button_is_rejected_before_dispatch() {
    let h = Harness::new();
    h.page
        .append(h.page.body(), ElementSpec::new("button").text("Go"));
    let snap = h.snapshot().await;

    let result = h.act(&snap, ActionRequest::type_text(0, "hello")).await;
    assert!(!result.success);
    assert_eq!(result.error, Some(ErrorKind::InvalidPayload));
    assert!(h.page.dispatched().is_empty());
}

#[tokio::test]
async fn indices_outside_the_snapshot_are_not_found() {
    let h = Harness::new();
    for label in ["a", "b", "c"] {
        h.page
            .append(h.page.body(), ElementSpec::new("button").text(label));
    }
    let snap = h.snapshot().await;
    assert_eq!(snap.len(), 3);

    let result = h.act(&snap, ActionRequest::click(5)).await;
    assert_eq!(result.error, Some(ErrorKind::IndexNotFound));
    assert!(result.message.contains("0..3"));
    assert!(h.page.dispatched().is_empty());
}

#[tokio::test]
async fn removed_or_hidden_elements_are_stale() {
    let h = Harness::new();
    let first = h
        .page
        .append(h.page.body(), ElementSpec::new("button").text("First"));
    let second = h
        .page
        .append(h.page.body(), ElementSpec::new("button").text("Second"));
    let snap = h.snapshot().await;

    h.page.remove(first);
    let result = h.act(&snap, ActionRequest::click(0)).await;
    assert_eq!(result.error, Some(ErrorKind::StaleElement));

    h.page.set_style(second, cdp_adapter::StyleFacts::hidden());
    let result = h.act(&snap, ActionRequest::click(1)).await;
    assert_eq!(result.error, Some(ErrorKind::StaleElement));
    assert!(result.message.contains("display:none"));
    assert!(h.page.dispatched().is_empty());
}

#[tokio::test]
async fn slow_recheck_reports_classifier_timeout() {
    let h = Harness::new();
    let button = h
        .page
        .append(h.page.body(), ElementSpec::new("button").text("Go"));
    let cfg = SnapshotConfig {
        node_timeout_ms: 40,
        ..SnapshotConfig::default()
    };
    let snap = h.snapshot_with(&cfg).await;

    h.page.set_delay(button, Some(Duration::from_millis(400)));
    let result = h.act(&snap, ActionRequest::click(0)).await;
    assert_eq!(result.error, Some(ErrorKind::ClassifierTimeout));
}

#[tokio::test]
async fn slow_dispatch_fails_at_the_action_deadline() {
    let cfg = ActionConfig {
        action_timeout_ms: 100,
        ..ActionConfig::default()
    };
    let h = Harness::with_config(cfg.clone());
    let button = h
        .page
        .append(h.page.body(), ElementSpec::new("button").text("Pay"));
    let snap = h.snapshot().await;

    h.page.set_input_delay(button, Some(Duration::from_millis(500)));
    let ctx = ExecCtx::new(cfg.action_timeout(), CancellationToken::new());
    let result = h.resolver.resolve(&snap, ActionRequest::click(0), &ctx).await;
    assert!(!result.success);
    assert_eq!(result.error, Some(ErrorKind::ActionDispatchFailed));
    assert!(
        result.message.contains(&AdapterErrorKind::Timeout.to_string()),
        "{}",
        result.message
    );
    assert!(h.page.dispatched().is_empty());

    h.page.set_input_delay(button, None);
    let retried = h.act(&snap, ActionRequest::click(0)).await;
    assert!(retried.success, "{}", retried.message);
    assert_eq!(h.page.dispatched(), vec![FixtureEvent::Click(button)]);
}

#[tokio::test]
async fn click_then_submit_typing() {
    let h = Harness::new();
    let input = h.page.append(
        h.page.body(),
        ElementSpec::new("input").attr("type", "search").attr("name", "q"),
    );
    let button = h
        .page
        .append(h.page.body(), ElementSpec::new("button").text("Search"));
    let snap = h.snapshot().await;

    let typed = h
        .act(&snap, ActionRequest::type_text(0, "boots").with_submit(true))
        .await;
    assert!(typed.success, "{}", typed.message);
    let clicked = h.act(&snap, ActionRequest::click(1)).await;
    assert!(clicked.success);

    assert_eq!(
        h.page.dispatched(),
        vec![
            FixtureEvent::Type(input, "boots".into()),
            FixtureEvent::Key(input, "Enter".into()),
            FixtureEvent::Click(button),
        ]
    );
}

#[tokio::test]
async fn select_and_read_a_dropdown() {
    let h = Harness::new();
    let size = h.page.append(
        h.page.body(),
        ElementSpec::new("select")
            .attr("name", "size")
            .options(&["S", "M", "L"]),
    );
    let snap = h.snapshot().await;

    let picked = h.act(&snap, ActionRequest::select(0, "M")).await;
    assert!(picked.success, "{}", picked.message);
    assert_eq!(h.page.selected_of(size).as_deref(), Some("M"));

    let read = h.act(&snap, ActionRequest::read(0)).await;
    assert_eq!(
        read.value,
        Some(ExtractedValue::Options {
            selected: Some("M".into()),
            options: vec!["S".into(), "M".into(), "L".into()],
        })
    );

    let missing = h.act(&snap, ActionRequest::select(0, "XL")).await;
    assert_eq!(missing.error, Some(ErrorKind::ActionDispatchFailed));
    assert!(missing.message.contains("option not found"));
}

#[tokio::test]
async fn scroll_without_payload_goes_down() {
    let h = Harness::new();
    let list = h.page.append(
        h.page.body(),
        ElementSpec::new("div")
            .attr("role", "listbox")
            .attr("data-scrollable", ""),
    );
    let snap = h.snapshot().await;

    let result = h
        .act(&snap, ActionRequest::new(0, ActionKind::Scroll))
        .await;
    assert!(result.success);
    assert!(result.message.contains("element"));
    assert_eq!(
        h.page.dispatched(),
        vec![FixtureEvent::Scroll(list, 0.0, 300.0)]
    );
}

#[tokio::test]
async fn scroll_to_text_finds_unindexed_copy() {
    let h = Harness::new();
    h.page
        .append(h.page.body(), ElementSpec::new("button").text("Buy"));
    let note = h
        .page
        .append(h.page.body(), ElementSpec::new("p").text("Returns within 30 days"));
    let ctx = ExecCtx::new(Duration::from_secs(5), CancellationToken::new());

    let done = h
        .resolver
        .scroll_to_text(h.pid, "  within 30 days ", &ctx)
        .await
        .expect("text found");
    assert!(done.message.contains("within 30 days"));
    assert_eq!(h.page.dispatched(), vec![FixtureEvent::ScrollToText(note)]);

    let err = h
        .resolver
        .scroll_to_text(h.pid, "Warranty", &ctx)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ActionDispatchFailed);
    assert_eq!(
        err.adapter_error().map(|e| e.kind),
        Some(AdapterErrorKind::NotInteractable)
    );

    let err = h.resolver.scroll_to_text(h.pid, " ", &ctx).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidPayload);
    assert_eq!(h.page.dispatched().len(), 1);
}

#[tokio::test]
async fn highlights_follow_indices_and_clear_together() {
    let h = Harness::new();
    let buy = h
        .page
        .append(h.page.body(), ElementSpec::new("button").text("Buy"));
    let help = h
        .page
        .append(h.page.body(), ElementSpec::new("a").attr("href", "/help").text("Help"));
    let snap = h.snapshot().await;
    let ctx = ExecCtx::new(Duration::from_secs(5), CancellationToken::new());

    let entry = h.resolver.highlight(&snap, 1, &ctx).await.expect("highlight");
    assert_eq!(entry.node_ref, help);
    h.resolver.highlight(&snap, 0, &ctx).await.expect("highlight");
    h.resolver.highlight(&snap, 0, &ctx).await.expect("highlight again");
    assert_eq!(h.page.highlighted(), vec![buy, help]);

    let err = h.resolver.highlight(&snap, 5, &ctx).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::IndexNotFound);

    h.page.remove(help);
    assert_eq!(h.resolver.clear_highlights(h.pid, &ctx).await.unwrap(), 2);
    assert!(h.page.highlighted().is_empty());
    assert_eq!(h.resolver.clear_highlights(h.pid, &ctx).await.unwrap(), 0);

    let err = h.resolver.highlight(&snap, 1, &ctx).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::StaleElement);
    assert!(h.page.dispatched().is_empty());
}

#[tokio::test]
async fn adapter_failures_are_reported_once() {
    let h = Harness::new();
    let button = h
        .page
        .append(h.page.body(), ElementSpec::new("button").text("Pay"));
    let snap = h.snapshot().await;

    h.page.fail_dispatch(button, AdapterErrorKind::NotInteractable);
    let failed = h.act(&snap, ActionRequest::click(0)).await;
    assert_eq!(failed.error, Some(ErrorKind::ActionDispatchFailed));
    assert!(failed.message.contains("not interactable"));
    assert!(h.page.dispatched().is_empty());

    let retried = h.act(&snap, ActionRequest::click(0)).await;
    assert!(retried.success);
    assert_eq!(h.page.dispatched(), vec![FixtureEvent::Click(button)]);
}

#[tokio::test]
async fn cancelled_actions_never_dispatch() {
    let h = Harness::new();
    h.page
        .append(h.page.body(), ElementSpec::new("button").text("Go"));
    let snap = h.snapshot().await;

    let cancel = CancellationToken::new();
    cancel.cancel();
    let ctx = ExecCtx::new(Duration::from_secs(5), cancel);
    let result = h.resolver.resolve(&snap, ActionRequest::click(0), &ctx).await;
    assert_eq!(result.error, Some(ErrorKind::Cancelled));
    assert_eq!(result.action_id, ctx.action_id);
    assert!(h.page.dispatched().is_empty());
}

#[tokio::test]
async fn repeat_guard_warns_then_blocks() {
    let h = Harness::new();
    h.page
        .append(h.page.body(), ElementSpec::new("button").attr("id", "next").text("Next"));
    let snap = h.snapshot().await;

    let first = h.act(&snap, ActionRequest::click(0)).await;
    assert!(first.success && first.warning.is_none());
    let second = h.act(&snap, ActionRequest::click(0)).await;
    assert!(second.success);
    assert!(second.warning.as_deref().unwrap().contains("//button[@id='next']"));
    let third = h.act(&snap, ActionRequest::click(0)).await;
    assert_eq!(third.error, Some(ErrorKind::RepeatedAction));
    assert_eq!(h.page.dispatched().len(), 2);
}

#[test]
fn disabled_guard_lets_repeats_through() {
    tokio_test::block_on(async {
        let h = Harness::with_config(ActionConfig {
            repeat_guard: RepeatGuardConfig {
                enabled: false,
                ..RepeatGuardConfig::default()
            },
            ..ActionConfig::default()
        });
        h.page
            .append(h.page.body(), ElementSpec::new("button").text("Again"));
        let snap = h.snapshot().await;
        for _ in 0..4 {
            let result = h.act(&snap, ActionRequest::click(0)).await;
            assert!(result.success);
            assert!(result.warning.is_none());
        }
    });
}
