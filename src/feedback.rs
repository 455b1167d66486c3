//! Weekly one-on-one notes, one record per (user, period).

use std::collections::HashMap;

use tracing::debug;

use crate::models::Feedback;

#[derive(Debug, Default, Clone)]
pub struct FeedbackLog {
    records: HashMap<String, Vec<Feedback>>,
}

impl FeedbackLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store feedback, replacing any record for the same user and period.
    pub fn upsert(&mut self, feedback: Feedback) {
        let records = self.records.entry(feedback.user_id.clone()).or_default();
        records.retain(|f| f.period != feedback.period);
        debug!(user = %feedback.user_id, period = feedback.period, "saved feedback");
        records.push(feedback);
    }

    pub fn for_user(&self, user_id: &str) -> &[Feedback] {
        self.records
            .get(user_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn for_period(&self, user_id: &str, period: u32) -> Option<&Feedback> {
        self.for_user(user_id).iter().find(|f| f.period == period)
    }

    /// Record with the highest period.
    pub fn latest(&self, user_id: &str) -> Option<&Feedback> {
        self.for_user(user_id).iter().max_by_key(|f| f.period)
    }

    /// The record of the period before `period`, whose commitment is due now.
    pub fn previous_commitment(&self, user_id: &str, period: u32) -> Option<&Feedback> {
        period
            .checked_sub(1)
            .and_then(|previous| self.for_period(user_id, previous))
    }
}
