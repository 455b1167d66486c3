use std::collections::BTreeMap;
use std::io::Read;

use anyhow::Context;
use chrono::Utc;
use serde::Deserialize;
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::TeamConfig;
use crate::feedback::FeedbackLog;
use crate::models::{coerce_inputs, Feedback, Metric, MetricKind, WeeklyEntry, QUARTER_PERIODS};
use crate::store::EntryStore;

/// Periods the seed command fills in.
const SEED_PERIODS: u32 = 3;

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Insert sample entries for the first periods of every configured metric.
pub async fn seed(pool: &PgPool, config: &TeamConfig) -> anyhow::Result<usize> {
    let mut inserted = 0usize;

    for user in &config.users {
        for (index, metric) in user.metrics.iter().enumerate() {
            for period in 1..=SEED_PERIODS {
                let entry = WeeklyEntry {
                    user_id: user.id.clone(),
                    metric_id: metric.id.clone(),
                    period,
                    inputs: sample_inputs(metric, period, index as u32),
                    created_at: Utc::now(),
                };
                upsert_entry(pool, &entry).await?;
                inserted += 1;
            }
        }
    }

    Ok(inserted)
}

/// Deterministic, plausible inputs for a metric in a given period.
pub fn sample_inputs(metric: &Metric, period: u32, salt: u32) -> BTreeMap<String, f64> {
    let mut inputs = BTreeMap::new();
    let spread = (period * 7 + salt * 3) % 10;

    match metric.kind {
        MetricKind::PercentageCumulative => {
            let total = f64::from(spread + 1);
            let success = (total * (0.4 + f64::from(spread % 5) / 10.0)).floor();
            if let Some(key) = metric.primary_key() {
                inputs.insert(key.to_string(), total);
            }
            if let Some(key) = metric.secondary_key() {
                inputs.insert(key.to_string(), success);
            }
        }
        MetricKind::SumTarget => {
            if let Some(key) = metric.primary_key() {
                inputs.insert(key.to_string(), f64::from(spread % 3));
            }
        }
        MetricKind::PercentageAverage | MetricKind::MaxLimit => {
            if let Some(key) = metric.primary_key() {
                inputs.insert(key.to_string(), f64::from(8 + spread % 2));
            }
        }
    }

    inputs
}

/// Replace the entry for the entry's (user, metric, period) tuple in one statement.
pub async fn upsert_entry(pool: &PgPool, entry: &WeeklyEntry) -> anyhow::Result<()> {
    let period = i32::try_from(entry.period).context("period does not fit in INTEGER")?;

    sqlx::query(
        r#"
        INSERT INTO scorecard.weekly_entries
        (id, user_id, metric_id, period, inputs, created_at)
        VALUES ($1, $2, $3, $4, $5, $6)
        ON CONFLICT (user_id, metric_id, period) DO UPDATE
        SET inputs = EXCLUDED.inputs, created_at = EXCLUDED.created_at
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(&entry.user_id)
    .bind(&entry.metric_id)
    .bind(period)
    .bind(Json(&entry.inputs))
    .bind(entry.created_at)
    .execute(pool)
    .await
    .with_context(|| {
        format!(
            "failed to upsert entry for {} / {} / period {}",
            entry.user_id, entry.metric_id, entry.period
        )
    })?;

    Ok(())
}

pub async fn fetch_entries(
    pool: &PgPool,
    user_id: Option<&str>,
) -> anyhow::Result<Vec<WeeklyEntry>> {
    let mut query = String::from(
        "SELECT user_id, metric_id, period, inputs, created_at \
         FROM scorecard.weekly_entries",
    );
    if user_id.is_some() {
        query.push_str(" WHERE user_id = $1");
    }
    query.push_str(" ORDER BY user_id, metric_id, period");

    let mut rows = sqlx::query(&query);
    if let Some(value) = user_id {
        rows = rows.bind(value);
    }

    let records = rows.fetch_all(pool).await?;
    let mut entries = Vec::with_capacity(records.len());

    for row in records {
        let period: i32 = row.get("period");
        let inputs: serde_json::Value = row.get("inputs");
        entries.push(WeeklyEntry {
            user_id: row.get("user_id"),
            metric_id: row.get("metric_id"),
            period: u32::try_from(period).context("negative period in weekly_entries")?,
            inputs: coerce_inputs(&inputs),
            created_at: row.get("created_at"),
        });
    }

    Ok(entries)
}

/// Load stored entries, optionally for one user only, into a fresh store.
pub async fn load_store(pool: &PgPool, user_id: Option<&str>) -> anyhow::Result<EntryStore> {
    Ok(fetch_entries(pool, user_id).await?.into_iter().collect())
}

pub async fn save_feedback(pool: &PgPool, feedback: &Feedback) -> anyhow::Result<()> {
    let period = i32::try_from(feedback.period).context("period does not fit in INTEGER")?;

    sqlx::query(
        r#"
        INSERT INTO scorecard.feedback
        (id, user_id, period, blockers, commitment, learning, commitment_completed, recorded_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        ON CONFLICT (user_id, period) DO UPDATE
        SET blockers = EXCLUDED.blockers,
            commitment = EXCLUDED.commitment,
            learning = EXCLUDED.learning,
            commitment_completed = EXCLUDED.commitment_completed,
            recorded_at = EXCLUDED.recorded_at
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(&feedback.user_id)
    .bind(period)
    .bind(&feedback.blockers)
    .bind(&feedback.commitment)
    .bind(&feedback.learning)
    .bind(feedback.commitment_completed)
    .bind(feedback.recorded_at)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn load_feedback(pool: &PgPool) -> anyhow::Result<FeedbackLog> {
    let records = sqlx::query(
        "SELECT user_id, period, blockers, commitment, learning, commitment_completed, recorded_at \
         FROM scorecard.feedback",
    )
    .fetch_all(pool)
    .await?;

    let mut log = FeedbackLog::new();
    for row in records {
        let period: i32 = row.get("period");
        log.upsert(Feedback {
            user_id: row.get("user_id"),
            period: u32::try_from(period).context("negative period in feedback")?,
            blockers: row.get("blockers"),
            commitment: row.get("commitment"),
            learning: row.get("learning"),
            commitment_completed: row.get("commitment_completed"),
            recorded_at: row.get("recorded_at"),
        });
    }

    Ok(log)
}

#[derive(Debug, Deserialize)]
struct CsvRow {
    user_id: String,
    metric_id: String,
    period: u32,
    input_key: String,
    value: String,
}

/// Parse long-format CSV (`user_id,metric_id,period,input_key,value`) into
/// one entry per (user, metric, period).
pub fn parse_csv_entries<R: Read>(reader: R) -> anyhow::Result<Vec<WeeklyEntry>> {
    let mut reader = csv::Reader::from_reader(reader);
    let mut grouped: BTreeMap<(String, String, u32), BTreeMap<String, f64>> = BTreeMap::new();

    for (line, result) in reader.deserialize::<CsvRow>().enumerate() {
        let row = result.with_context(|| format!("malformed CSV record {}", line + 1))?;

        if !(1..=QUARTER_PERIODS).contains(&row.period) {
            warn!(
                user = %row.user_id,
                metric = %row.metric_id,
                period = row.period,
                "skipping CSV row outside the quarter"
            );
            continue;
        }

        let value = match row.value.trim().parse::<f64>() {
            Ok(v) if v.is_finite() => v,
            _ => {
                warn!(
                    user = %row.user_id,
                    key = %row.input_key,
                    raw = %row.value,
                    "non-numeric CSV value coerced to 0"
                );
                0.0
            }
        };

        grouped
            .entry((row.user_id, row.metric_id, row.period))
            .or_default()
            .insert(row.input_key, value);
    }

    let now = Utc::now();
    Ok(grouped
        .into_iter()
        .map(|((user_id, metric_id, period), inputs)| WeeklyEntry {
            user_id,
            metric_id,
            period,
            inputs,
            created_at: now,
        })
        .collect())
}

pub async fn import_csv(pool: &PgPool, csv_path: &std::path::Path) -> anyhow::Result<usize> {
    let file = std::fs::File::open(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;
    let entries = parse_csv_entries(file)?;

    for entry in &entries {
        upsert_entry(pool, entry).await?;
    }

    info!(count = entries.len(), path = %csv_path.display(), "imported weekly entries");
    Ok(entries.len())
}
