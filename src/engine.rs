//! Aggregation of weekly entries into a value and a traffic-light status.

use tracing::debug;

use crate::models::{AggregateResult, InputRole, Metric, MetricKind, Status, WeeklyEntry};
use crate::policy::StatusThresholds;

/// Slack allowed on threshold comparisons so that a value sitting exactly on a
/// boundary is not pushed across it by float rounding.
const BOUNDARY_EPSILON: f64 = 1e-9;

/// Aggregate a metric's entries using the default thresholds.
pub fn compute_status<'a, I>(metric: &Metric, entries: I) -> AggregateResult
where
    I: IntoIterator<Item = &'a WeeklyEntry>,
{
    compute_status_with(metric, entries, &StatusThresholds::default())
}

/// Aggregate a metric's entries and classify the result.
///
/// Entries recorded for other metrics are ignored, so callers may pass a
/// user's whole history.
pub fn compute_status_with<'a, I>(
    metric: &Metric,
    entries: I,
    thresholds: &StatusThresholds,
) -> AggregateResult
where
    I: IntoIterator<Item = &'a WeeklyEntry>,
{
    let entries: Vec<&WeeklyEntry> = entries
        .into_iter()
        .filter(|entry| entry.metric_id == metric.id)
        .collect();

    if entries.is_empty() {
        return AggregateResult::unknown();
    }

    let value = reduce(metric, &entries);
    let max_period = entries.iter().map(|e| e.period).max().unwrap_or(1).max(1);
    let status = classify(metric.kind, value, metric.target, max_period, thresholds);

    debug!(
        metric = %metric.id,
        kind = %metric.kind,
        entries = entries.len(),
        value,
        %status,
        "computed metric status"
    );

    AggregateResult { value, status }
}

/// Reduce entries into the metric's comparable value. Zero entries yield zero.
pub fn reduce(metric: &Metric, entries: &[&WeeklyEntry]) -> f64 {
    if entries.is_empty() {
        return 0.0;
    }

    match metric.kind {
        MetricKind::PercentageCumulative => {
            let total = sum_role(metric, entries, InputRole::Primary);
            let success = sum_role(metric, entries, InputRole::Secondary);
            percentage(success, total)
        }
        MetricKind::SumTarget => sum_role(metric, entries, InputRole::Primary),
        MetricKind::PercentageAverage | MetricKind::MaxLimit => {
            sum_role(metric, entries, InputRole::Primary) / entries.len() as f64
        }
    }
}

/// Classify a reduced value against the metric's target.
///
/// `max_period` is the highest period among the entries and only matters for
/// sum targets, which are paced linearly over the quarter.
pub fn classify(
    kind: MetricKind,
    value: f64,
    target: f64,
    max_period: u32,
    thresholds: &StatusThresholds,
) -> Status {
    match kind {
        MetricKind::MaxLimit => {
            if at_most(value, target) {
                Status::OnTrack
            } else if at_most(value, target * thresholds.limit_at_risk) {
                Status::AtRisk
            } else {
                Status::Critical
            }
        }
        MetricKind::SumTarget => {
            let expected = thresholds.expected_progress(target, max_period);
            if at_least(value, expected * thresholds.pacing_on_track) {
                Status::OnTrack
            } else if at_least(value, expected * thresholds.pacing_at_risk) {
                Status::AtRisk
            } else {
                Status::Critical
            }
        }
        MetricKind::PercentageCumulative | MetricKind::PercentageAverage => {
            if at_least(value, target) {
                Status::OnTrack
            } else if at_least(value, target * thresholds.percentage_at_risk) {
                Status::AtRisk
            } else {
                Status::Critical
            }
        }
    }
}

/// Value a single week's entry represents on its own, independent of history.
pub fn entry_display_value(metric: &Metric, entry: &WeeklyEntry) -> f64 {
    match metric.kind {
        MetricKind::PercentageCumulative => percentage(
            entry.role_value(metric, InputRole::Secondary),
            entry.role_value(metric, InputRole::Primary),
        ),
        _ => entry.role_value(metric, InputRole::Primary),
    }
}

/// Per-period display values for a metric, ordered by period.
pub fn weekly_series<'a, I>(metric: &Metric, entries: I) -> Vec<(u32, f64)>
where
    I: IntoIterator<Item = &'a WeeklyEntry>,
{
    let mut series: Vec<(u32, f64)> = entries
        .into_iter()
        .filter(|entry| entry.metric_id == metric.id)
        .map(|entry| (entry.period, entry_display_value(metric, entry)))
        .collect();
    series.sort_by_key(|(period, _)| *period);
    series
}

fn sum_role(metric: &Metric, entries: &[&WeeklyEntry], role: InputRole) -> f64 {
    entries.iter().map(|e| e.role_value(metric, role)).sum()
}

fn percentage(part: f64, whole: f64) -> f64 {
    if whole == 0.0 {
        0.0
    } else {
        (part / whole) * 100.0
    }
}

fn tolerance(bound: f64) -> f64 {
    BOUNDARY_EPSILON * bound.abs().max(1.0)
}

fn at_least(value: f64, bound: f64) -> bool {
    value >= bound - tolerance(bound)
}

fn at_most(value: f64, bound: f64) -> bool {
    value <= bound + tolerance(bound)
}
