use anyhow::{Context, Result};
use cdp_adapter::AdapterMetricsSnapshot;
use prometheus::{Encoder, TextEncoder};
use serde::Serialize;

use super::output::OutputFormat;

#[derive(Debug, Clone, Serialize)]
pub struct MetricsReport {
    pub perceiver: perceiver_structural::metrics::MetricSnapshot,
    pub actions: action_primitives::metrics::MetricSnapshot,
    pub adapter: AdapterMetricsSnapshot,
}

pub fn collect() -> MetricsReport {
    MetricsReport {
        perceiver: perceiver_structural::metrics::snapshot(),
        actions: action_primitives::metrics::snapshot(),
        adapter: cdp_adapter::metrics::snapshot(),
    }
}

/// Adapter command counters in the Prometheus text exposition format.
pub fn prometheus_text() -> Result<String> {
    let registry = prometheus::Registry::new();
    cdp_adapter::metrics::register_metrics(&registry);
    let mut buffer = Vec::new();
    TextEncoder::new()
        .encode(&registry.gather(), &mut buffer)
        .context("Failed to encode prometheus metrics")?;
    String::from_utf8(buffer).context("Prometheus output was not UTF-8")
}

pub fn print_metrics(output: OutputFormat) -> Result<()> {
    let report = collect();
    let exposition = prometheus_text()?;
    output.emit(&report, || render_human(&report, &exposition))
}

fn render_human(report: &MetricsReport, exposition: &str) -> String {
    let p = &report.perceiver;
    let a = &report.actions;
    let mut lines = vec![
        "Metrics".to_string(),
        "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━".to_string(),
        format!(
            "Snapshots:      {} built, {} failed, avg {:.1} ms",
            p.snapshot.total, p.snapshot_failed, p.snapshot.avg_ms
        ),
        format!(
            "Nodes:          {} visited, {} indexed, {} detached, {} timed out, {} probe failures",
            p.nodes.visited, p.nodes.indexed, p.nodes.detached, p.nodes.timed_out, p.nodes.probe_failed
        ),
        format!("Opaque frames:  {}", p.nodes.opaque_frames),
        format!(
            "Rechecks:       {} ({} stale), avg {:.1} ms",
            p.recheck.total, p.recheck_stale, p.recheck.avg_ms
        ),
        format!(
            "Actions:        {} total, {} succeeded, {} warned, avg {:.1} ms",
            a.total, a.succeeded, a.warned, a.avg_ms
        ),
    ];
    for (kind, count) in a.failures.iter().filter(|(_, count)| **count > 0) {
        lines.push(format!("  {kind}: {count}"));
    }
    lines.push(format!(
        "CDP commands:   {} sent, {} ok, {} failed",
        report.adapter.commands, report.adapter.command_success, report.adapter.command_failures
    ));
    if !exposition.trim().is_empty() {
        lines.push(String::new());
        lines.push(exposition.trim_end().to_string());
    }
    lines.join("\n")
}
