//! Session-owned log of weekly entries.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::models::{Metric, WeeklyEntry};

/// Weekly entries per user, at most one per (metric, period).
#[derive(Debug, Default, Clone)]
pub struct EntryStore {
    entries: HashMap<String, Vec<WeeklyEntry>>,
}

impl EntryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a user's inputs for a metric and period, replacing any prior entry.
    pub fn upsert(
        &mut self,
        user_id: &str,
        period: u32,
        metric_id: &str,
        inputs: BTreeMap<String, f64>,
    ) {
        self.upsert_at(user_id, period, metric_id, inputs, Utc::now());
    }

    /// Same as [`EntryStore::upsert`] with an explicit creation time.
    pub fn upsert_at(
        &mut self,
        user_id: &str,
        period: u32,
        metric_id: &str,
        inputs: BTreeMap<String, f64>,
        created_at: DateTime<Utc>,
    ) {
        self.insert(WeeklyEntry {
            user_id: user_id.to_string(),
            metric_id: metric_id.to_string(),
            period,
            inputs,
            created_at,
        });
    }

    /// Insert an already built entry, replacing the one for the same tuple.
    pub fn insert(&mut self, entry: WeeklyEntry) {
        let user_entries = self.entries.entry(entry.user_id.clone()).or_default();
        let before = user_entries.len();
        user_entries.retain(|e| !(e.period == entry.period && e.metric_id == entry.metric_id));

        debug!(
            user = %entry.user_id,
            metric = %entry.metric_id,
            period = entry.period,
            replaced = before != user_entries.len(),
            "upserted weekly entry"
        );

        user_entries.push(entry);
    }

    /// All entries recorded for a user.
    pub fn entries_for(&self, user_id: &str) -> &[WeeklyEntry] {
        self.entries
            .get(user_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn lookup(&self, user_id: &str, period: u32, metric_id: &str) -> Option<&WeeklyEntry> {
        self.entries_for(user_id)
            .iter()
            .find(|e| e.period == period && e.metric_id == metric_id)
    }

    /// A user's entries for one metric, ordered by period.
    pub fn entries_for_metric(&self, user_id: &str, metric_id: &str) -> Vec<&WeeklyEntry> {
        let mut entries: Vec<&WeeklyEntry> = self
            .entries_for(user_id)
            .iter()
            .filter(|e| e.metric_id == metric_id)
            .collect();
        entries.sort_by_key(|e| e.period);
        entries
    }

    pub fn has_submitted(&self, user_id: &str, period: u32, metric_id: &str) -> bool {
        self.lookup(user_id, period, metric_id).is_some()
    }

    /// Metrics still missing an entry from the user for `period`.
    pub fn pending_metrics<'m>(
        &self,
        user_id: &str,
        period: u32,
        metrics: &'m [Metric],
    ) -> Vec<&'m Metric> {
        metrics
            .iter()
            .filter(|m| !self.has_submitted(user_id, period, &m.id))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl FromIterator<WeeklyEntry> for EntryStore {
    /// Later entries for the same tuple replace earlier ones.
    fn from_iter<I: IntoIterator<Item = WeeklyEntry>>(iter: I) -> Self {
        let mut store = Self::new();
        for entry in iter {
            store.insert(entry);
        }
        store
    }
}

/// Whether the administrative edit flow may change `period`.
pub fn is_editable(period: u32, current_period: u32) -> bool {
    period >= 1 && period <= current_period
}
