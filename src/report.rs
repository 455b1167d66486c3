use std::fmt::Write;

use crate::config::TeamConfig;
use crate::engine;
use crate::feedback::FeedbackLog;
use crate::models::{AggregateResult, Metric, Status, User, QUARTER_PERIODS};
use crate::policy::StatusThresholds;
use crate::store::EntryStore;

/// One row of the performance table.
#[derive(Debug, Clone)]
pub struct MetricRow {
    pub user_id: String,
    pub user_name: String,
    pub metric: Metric,
    pub result: AggregateResult,
    /// Display value per period, index 0 is period 1.
    pub cells: Vec<Option<f64>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusCounts {
    pub on_track: usize,
    pub at_risk: usize,
    pub critical: usize,
    pub unknown: usize,
}

impl StatusCounts {
    pub fn add(&mut self, status: Status) {
        match status {
            Status::OnTrack => self.on_track += 1,
            Status::AtRisk => self.at_risk += 1,
            Status::Critical => self.critical += 1,
            Status::Unknown => self.unknown += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.on_track + self.at_risk + self.critical + self.unknown
    }
}

pub fn metric_row(
    user: &User,
    metric: &Metric,
    store: &EntryStore,
    thresholds: &StatusThresholds,
) -> MetricRow {
    let entries = store.entries_for_metric(&user.id, &metric.id);
    let result = engine::compute_status_with(metric, entries.iter().copied(), thresholds);

    let mut cells = vec![None; QUARTER_PERIODS as usize];
    for (period, value) in engine::weekly_series(metric, entries.iter().copied()) {
        if let Some(cell) = period
            .checked_sub(1)
            .and_then(|index| cells.get_mut(index as usize))
        {
            *cell = Some(value);
        }
    }

    MetricRow {
        user_id: user.id.clone(),
        user_name: user.name.clone(),
        metric: metric.clone(),
        result,
        cells,
    }
}

pub fn performance_rows(
    users: &[User],
    store: &EntryStore,
    thresholds: &StatusThresholds,
) -> Vec<MetricRow> {
    users
        .iter()
        .flat_map(|user| {
            user.metrics
                .iter()
                .map(move |metric| metric_row(user, metric, store, thresholds))
        })
        .collect()
}

pub fn summarize(rows: &[MetricRow]) -> StatusCounts {
    let mut counts = StatusCounts::default();
    for row in rows {
        counts.add(row.result.status);
    }
    counts
}

pub fn format_value(value: f64, unit: &str) -> String {
    if unit == "%" {
        format!("{value:.1}%")
    } else {
        format!("{value:.1} {unit}")
    }
}

pub fn build_table(rows: &[MetricRow], current_period: u32) -> String {
    let mut output = String::new();

    let _ = write!(output, "| Person | Metric | Target | Result | Status |");
    for period in 1..=QUARTER_PERIODS {
        let marker = if period == current_period { "*" } else { "" };
        let _ = write!(output, " S{period}{marker} |");
    }
    let _ = writeln!(output);
    let _ = write!(output, "|---|---|---|---|---|");
    for _ in 1..=QUARTER_PERIODS {
        let _ = write!(output, "---|");
    }
    let _ = writeln!(output);

    for row in rows {
        let _ = write!(
            output,
            "| {} | {} | {} | {} | {} ({}) |",
            row.user_name,
            row.metric.title,
            format_value(row.metric.target, &row.metric.unit),
            format_value(row.result.value, &row.metric.unit),
            row.result.status,
            row.result.status.color()
        );
        for cell in &row.cells {
            match cell {
                Some(value) => {
                    let _ = write!(output, " {value:.0} |");
                }
                None => {
                    let _ = write!(output, " - |");
                }
            }
        }
        let _ = writeln!(output);
    }

    output
}

/// Individual review: metric cards, weekly history and the open commitment.
pub fn build_review(
    user: &User,
    store: &EntryStore,
    feedback: &FeedbackLog,
    current_period: u32,
    thresholds: &StatusThresholds,
) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# Review: {} ({})", user.name, user.role_title);
    let _ = writeln!(output, "Period {current_period} of {QUARTER_PERIODS}");
    let _ = writeln!(output);

    if user.metrics.is_empty() {
        let _ = writeln!(output, "No metrics configured.");
    }

    for metric in &user.metrics {
        let row = metric_row(user, metric, store, thresholds);
        let _ = writeln!(output, "## {}", metric.title);
        let _ = writeln!(
            output,
            "- Result: {} against target {} ({})",
            format_value(row.result.value, &metric.unit),
            format_value(metric.target, &metric.unit),
            row.result.status
        );

        let entries = store.entries_for_metric(&user.id, &metric.id);
        let series = engine::weekly_series(metric, entries.iter().copied());
        if series.is_empty() {
            let _ = writeln!(output, "- No check-ins yet.");
        } else {
            let points: Vec<String> = series
                .iter()
                .map(|(period, value)| format!("S{period}: {value:.1}"))
                .collect();
            let _ = writeln!(output, "- History: {}", points.join(", "));
        }

        if !store.has_submitted(&user.id, current_period, &metric.id) {
            let _ = writeln!(output, "- Check-in for period {current_period} is pending.");
        }
        let _ = writeln!(output);
    }

    let _ = writeln!(output, "## Last Commitment");
    match feedback.previous_commitment(&user.id, current_period) {
        Some(previous) => {
            let commitment = previous.commitment.as_deref().unwrap_or("(none recorded)");
            let done = match previous.commitment_completed {
                Some(true) => "completed",
                Some(false) => "not completed",
                None => "not reviewed",
            };
            let _ = writeln!(
                output,
                "- Period {}: {} ({})",
                previous.period, commitment, done
            );
        }
        None => {
            let _ = writeln!(output, "No commitment recorded for the previous period.");
        }
    }

    if let Some(current) = feedback.for_period(&user.id, current_period) {
        let _ = writeln!(output);
        let _ = writeln!(output, "## This Period");
        write_notes(
            &mut output,
            current.blockers.as_deref(),
            current.learning.as_deref(),
            current.commitment.as_deref(),
        );
    }

    output
}

pub fn build_report(config: &TeamConfig, store: &EntryStore, feedback: &FeedbackLog) -> String {
    let rows = performance_rows(&config.users, store, &config.thresholds);
    let counts = summarize(&rows);

    let mut output = String::new();
    let _ = writeln!(output, "# Team Scorecard Report");
    let _ = writeln!(
        output,
        "Period {} of {}",
        config.current_period, QUARTER_PERIODS
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Status Mix");

    if counts.total() == 0 {
        let _ = writeln!(output, "No metrics configured.");
    } else {
        let _ = writeln!(output, "- on-track: {}", counts.on_track);
        let _ = writeln!(output, "- at-risk: {}", counts.at_risk);
        let _ = writeln!(output, "- critical: {}", counts.critical);
        let _ = writeln!(output, "- unknown: {}", counts.unknown);
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Performance");
    if rows.is_empty() {
        let _ = writeln!(output, "No metrics configured.");
    } else {
        output.push_str(&build_table(&rows, config.current_period));
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Latest Feedback");
    let mut any_feedback = false;
    for user in &config.users {
        if let Some(latest) = feedback.latest(&user.id) {
            any_feedback = true;
            let _ = writeln!(output, "### {} (period {})", user.name, latest.period);
            write_notes(
                &mut output,
                latest.blockers.as_deref(),
                latest.learning.as_deref(),
                latest.commitment.as_deref(),
            );
        }
    }
    if !any_feedback {
        let _ = writeln!(output, "No feedback recorded yet.");
    }

    output
}

fn write_notes(
    output: &mut String,
    blockers: Option<&str>,
    learning: Option<&str>,
    commitment: Option<&str>,
) {
    for (label, note) in [
        ("Blockers", blockers),
        ("Learning", learning),
        ("Commitment", commitment),
    ] {
        if let Some(note) = note.filter(|n| !n.trim().is_empty()) {
            let _ = writeln!(output, "- {label}: {note}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Feedback, InputField, MetricKind, UserRole};
    use chrono::Utc;
    use std::collections::BTreeMap;

    fn user() -> User {
        User {
            id: "u1".to_string(),
            name: "Rafael".to_string(),
            role: UserRole::Contributor,
            role_title: "Paid Traffic".to_string(),
            metrics: vec![
                Metric {
                    id: "m_cpa".to_string(),
                    title: "Accounts with lower CPA".to_string(),
                    target: 60.0,
                    unit: "%".to_string(),
                    kind: MetricKind::PercentageCumulative,
                    description: None,
                    inputs: vec![
                        InputField::new("total_accounts", "Accounts worked"),
                        InputField::new("reduced_accounts", "Accounts with lower CPA"),
                    ],
                },
                Metric {
                    id: "m_sales".to_string(),
                    title: "Sales".to_string(),
                    target: 12.0,
                    unit: "un".to_string(),
                    kind: MetricKind::SumTarget,
                    description: None,
                    inputs: vec![InputField::new("sales", "Sales closed")],
                },
            ],
        }
    }

    fn inputs(values: &[(&str, f64)]) -> BTreeMap<String, f64> {
        values.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    fn store() -> EntryStore {
        let mut store = EntryStore::new();
        store.upsert(
            "u1",
            1,
            "m_cpa",
            inputs(&[("total_accounts", 10.0), ("reduced_accounts", 5.0)]),
        );
        store.upsert(
            "u1",
            2,
            "m_cpa",
            inputs(&[("total_accounts", 10.0), ("reduced_accounts", 5.0)]),
        );
        store
    }

    #[test]
    fn rows_carry_status_and_cells() {
        let user = user();
        let rows = performance_rows(
            std::slice::from_ref(&user),
            &store(),
            &StatusThresholds::default(),
        );
        assert_eq!(rows.len(), 2);

        let cpa = &rows[0];
        assert_eq!(cpa.result.status, Status::AtRisk);
        assert_eq!(cpa.cells[0], Some(50.0));
        assert_eq!(cpa.cells[2], None);
        assert_eq!(cpa.cells.len(), 13);

        assert_eq!(rows[1].result.status, Status::Unknown);

        let counts = summarize(&rows);
        assert_eq!(counts.at_risk, 1);
        assert_eq!(counts.unknown, 1);
        assert_eq!(counts.total(), 2);
    }

    #[test]
    fn table_has_a_column_per_period() {
        let user = user();
        let rows = performance_rows(
            std::slice::from_ref(&user),
            &store(),
            &StatusThresholds::default(),
        );
        let table = build_table(&rows, 2);
        assert!(table.contains("S2* |"));
        assert!(table.contains("S13 |"));
        assert!(table.contains("at-risk (yellow)"));
        assert!(table.contains("unknown (gray)"));
    }

    #[test]
    fn review_shows_pending_check_ins_and_commitment() {
        let user = user();
        let mut feedback = FeedbackLog::new();
        feedback.upsert(Feedback {
            user_id: "u1".to_string(),
            period: 2,
            blockers: Some("Client approvals slow".to_string()),
            commitment: Some("Audit two accounts".to_string()),
            learning: None,
            commitment_completed: Some(true),
            recorded_at: Utc::now(),
        });

        let review = build_review(&user, &store(), &feedback, 3, &StatusThresholds::default());
        assert!(review.contains("# Review: Rafael"));
        assert!(review.contains("History: S1: 50.0, S2: 50.0"));
        assert!(review.contains("Check-in for period 3 is pending."));
        assert!(review.contains("Period 2: Audit two accounts (completed)"));
        assert!(review.contains("No check-ins yet."));
    }

    #[test]
    fn report_lists_latest_feedback() {
        let config = TeamConfig {
            current_period: 2,
            thresholds: StatusThresholds::default(),
            users: vec![user()],
        };
        let mut feedback = FeedbackLog::new();
        feedback.upsert(Feedback {
            user_id: "u1".to_string(),
            period: 1,
            blockers: None,
            commitment: None,
            learning: Some("Shorter briefs work".to_string()),
            commitment_completed: None,
            recorded_at: Utc::now(),
        });

        let report = build_report(&config, &store(), &feedback);
        assert!(report.contains("- at-risk: 1"));
        assert!(report.contains("### Rafael (period 1)"));
        assert!(report.contains("- Learning: Shorter briefs work"));
    }

    #[test]
    fn values_are_formatted_with_units() {
        assert_eq!(format_value(50.0, "%"), "50.0%");
        assert_eq!(format_value(4.0, "un"), "4.0 un");
    }
}
