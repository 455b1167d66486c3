//! Tolerance constants for status classification.

use serde::Deserialize;

use crate::models::QUARTER_PERIODS;

/// Share of the paced expectation a running total must reach to be on track.
pub const PACING_ON_TRACK_RATIO: f64 = 0.9;
/// Share of the paced expectation below which a running total is critical.
pub const PACING_AT_RISK_RATIO: f64 = 0.7;
/// Multiple of a limit a value may reach before it turns critical.
pub const LIMIT_AT_RISK_RATIO: f64 = 1.2;
/// Share of a percentage target below which a value is critical.
pub const PERCENTAGE_AT_RISK_RATIO: f64 = 0.8;

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StatusThresholds {
    pub pacing_on_track: f64,
    pub pacing_at_risk: f64,
    pub limit_at_risk: f64,
    pub percentage_at_risk: f64,
}

impl Default for StatusThresholds {
    fn default() -> Self {
        Self {
            pacing_on_track: PACING_ON_TRACK_RATIO,
            pacing_at_risk: PACING_AT_RISK_RATIO,
            limit_at_risk: LIMIT_AT_RISK_RATIO,
            percentage_at_risk: PERCENTAGE_AT_RISK_RATIO,
        }
    }
}

impl StatusThresholds {
    /// Linear expectation for a sum target after `elapsed` periods of the quarter.
    pub fn expected_progress(&self, target: f64, elapsed: u32) -> f64 {
        (target / f64::from(QUARTER_PERIODS)) * f64::from(elapsed.max(1))
    }

    /// Returns a description of the first inconsistent setting, if any.
    pub fn check(&self) -> Option<String> {
        let ratios = [
            ("pacing_on_track", self.pacing_on_track),
            ("pacing_at_risk", self.pacing_at_risk),
            ("limit_at_risk", self.limit_at_risk),
            ("percentage_at_risk", self.percentage_at_risk),
        ];
        if let Some((name, value)) = ratios
            .iter()
            .find(|(_, value)| !value.is_finite() || *value <= 0.0)
        {
            return Some(format!("{name} must be a positive number, got {value}"));
        }
        if self.pacing_at_risk > self.pacing_on_track {
            return Some("pacing_at_risk must not exceed pacing_on_track".to_string());
        }
        if self.limit_at_risk < 1.0 {
            return Some("limit_at_risk must be at least 1.0".to_string());
        }
        if self.percentage_at_risk > 1.0 {
            return Some("percentage_at_risk must be at most 1.0".to_string());
        }
        None
    }
}
