use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Number of weekly periods in a quarter.
pub const QUARTER_PERIODS: u32 = 13;

/// How a metric's weekly inputs reduce into one value and how that value is judged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    /// Sum of successes over sum of attempts, as a percentage.
    PercentageCumulative,
    /// Mean of a weekly percentage or score.
    PercentageAverage,
    /// Running total paced against the quarter.
    SumTarget,
    /// Mean of a quantity that must stay under the target.
    MaxLimit,
}

impl MetricKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PercentageCumulative => "percentage_cumulative",
            Self::PercentageAverage => "percentage_average",
            Self::SumTarget => "sum_target",
            Self::MaxLimit => "max_limit",
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Role an input field plays in the reduction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputRole {
    /// Denominator for cumulative percentages, the sample for every other kind.
    Primary,
    /// Numerator for cumulative percentages.
    Secondary,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputField {
    pub key: String,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<InputRole>,
}

impl InputField {
    pub fn new(key: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            label: label.into(),
            role: None,
        }
    }

    pub fn with_role(mut self, role: InputRole) -> Self {
        self.role = Some(role);
        self
    }
}

/// A quarterly target definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    pub id: String,
    pub title: String,
    pub target: f64,
    pub unit: String,
    pub kind: MetricKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub inputs: Vec<InputField>,
}

impl Metric {
    /// Key of the field playing `role`.
    ///
    /// An explicitly tagged field wins; otherwise the declaration order decides
    /// (first field primary, second field secondary).
    pub fn field_key(&self, role: InputRole) -> Option<&str> {
        if let Some(field) = self.inputs.iter().find(|f| f.role == Some(role)) {
            return Some(field.key.as_str());
        }

        let position = match role {
            InputRole::Primary => 0,
            InputRole::Secondary => 1,
        };
        self.inputs
            .get(position)
            .filter(|f| f.role.is_none())
            .map(|f| f.key.as_str())
    }

    pub fn primary_key(&self) -> Option<&str> {
        self.field_key(InputRole::Primary)
    }

    pub fn secondary_key(&self) -> Option<&str> {
        self.field_key(InputRole::Secondary)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    Partner,
    Contributor,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub name: String,
    pub role: UserRole,
    #[serde(default)]
    pub role_title: String,
    #[serde(default)]
    pub metrics: Vec<Metric>,
}

impl User {
    pub fn metric(&self, metric_id: &str) -> Option<&Metric> {
        self.metrics.iter().find(|m| m.id == metric_id)
    }
}

/// One weekly submission for a (user, metric, period) tuple.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeeklyEntry {
    pub user_id: String,
    pub metric_id: String,
    pub period: u32,
    pub inputs: BTreeMap<String, f64>,
    pub created_at: DateTime<Utc>,
}

impl WeeklyEntry {
    /// Value of an input field; a missing key reads as zero.
    pub fn input(&self, key: &str) -> f64 {
        self.inputs.get(key).copied().unwrap_or(0.0)
    }

    /// Value of the field playing `role` for `metric`, zero when unresolvable.
    pub fn role_value(&self, metric: &Metric, role: InputRole) -> f64 {
        metric.field_key(role).map(|key| self.input(key)).unwrap_or(0.0)
    }
}

/// Traffic-light classification of an aggregate value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Status {
    OnTrack,
    AtRisk,
    Critical,
    /// No entries recorded yet.
    Unknown,
}

impl Status {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::OnTrack => "on-track",
            Self::AtRisk => "at-risk",
            Self::Critical => "critical",
            Self::Unknown => "unknown",
        }
    }

    pub fn color(self) -> &'static str {
        match self {
            Self::OnTrack => "green",
            Self::AtRisk => "yellow",
            Self::Critical => "red",
            Self::Unknown => "gray",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AggregateResult {
    pub value: f64,
    pub status: Status,
}

impl AggregateResult {
    pub fn unknown() -> Self {
        Self {
            value: 0.0,
            status: Status::Unknown,
        }
    }
}

/// Weekly one-on-one notes for a user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feedback {
    pub user_id: String,
    pub period: u32,
    pub blockers: Option<String>,
    pub commitment: Option<String>,
    pub learning: Option<String>,
    pub commitment_completed: Option<bool>,
    pub recorded_at: DateTime<Utc>,
}

/// Coerce a raw submitted value into a number.
///
/// Numbers pass through, numeric strings are parsed, anything else is zero.
pub fn coerce_input(value: &serde_json::Value) -> f64 {
    let number = match value {
        serde_json::Value::Number(n) => n.as_f64().unwrap_or(0.0),
        serde_json::Value::String(s) => s.trim().parse::<f64>().unwrap_or(0.0),
        _ => 0.0,
    };

    if number.is_finite() {
        number
    } else {
        0.0
    }
}

/// Coerce a JSON object of raw inputs into numeric inputs.
pub fn coerce_inputs(raw: &serde_json::Value) -> BTreeMap<String, f64> {
    match raw {
        serde_json::Value::Object(map) => map
            .iter()
            .map(|(key, value)| (key.clone(), coerce_input(value)))
            .collect(),
        _ => BTreeMap::new(),
    }
}
