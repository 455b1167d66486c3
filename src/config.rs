use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::models::{InputRole, Metric, MetricKind, User, QUARTER_PERIODS};
use crate::policy::StatusThresholds;

/// Team configuration loaded from scorecard.toml.
#[derive(Debug, Clone, Deserialize)]
pub struct TeamConfig {
    #[serde(default = "default_period")]
    pub current_period: u32,
    #[serde(default)]
    pub thresholds: StatusThresholds,
    #[serde(default)]
    pub users: Vec<User>,
}

fn default_period() -> u32 {
    1
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config file {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("invalid configuration for {subject}: {reason}")]
    Invalid { subject: String, reason: String },
}

impl TeamConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::parse(&contents, path)
    }

    pub fn parse(contents: &str, path: &Path) -> Result<Self, ConfigError> {
        let config: TeamConfig = toml::from_str(contents).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=QUARTER_PERIODS).contains(&self.current_period) {
            return Err(invalid(
                "current_period",
                format!("must be between 1 and {QUARTER_PERIODS}"),
            ));
        }
        if let Some(reason) = self.thresholds.check() {
            return Err(invalid("thresholds", reason));
        }

        let mut user_ids = HashSet::new();
        let mut metric_ids = HashSet::new();
        for user in &self.users {
            if !user_ids.insert(user.id.as_str()) {
                return Err(invalid(&user.id, "duplicate user id".to_string()));
            }
            for metric in &user.metrics {
                if !metric_ids.insert(metric.id.as_str()) {
                    return Err(invalid(&metric.id, "duplicate metric id".to_string()));
                }
                validate_metric(metric)?;
            }
        }
        Ok(())
    }

    pub fn user(&self, user_id: &str) -> Option<&User> {
        self.users.iter().find(|u| u.id == user_id)
    }
}

fn validate_metric(metric: &Metric) -> Result<(), ConfigError> {
    for role in [InputRole::Primary, InputRole::Secondary] {
        let tagged = metric
            .inputs
            .iter()
            .filter(|f| f.role == Some(role))
            .count();
        if tagged > 1 {
            return Err(invalid(
                &metric.id,
                format!("{role:?} role declared {tagged} times"),
            ));
        }
    }

    if metric.primary_key().is_none() {
        return Err(invalid(&metric.id, "no primary input field".to_string()));
    }
    if metric.kind == MetricKind::PercentageCumulative && metric.secondary_key().is_none() {
        return Err(invalid(
            &metric.id,
            "percentage_cumulative needs a secondary (numerator) input field".to_string(),
        ));
    }
    if !metric.target.is_finite() {
        return Err(invalid(&metric.id, "target must be a number".to_string()));
    }
    Ok(())
}

fn invalid(subject: &str, reason: String) -> ConfigError {
    ConfigError::Invalid {
        subject: subject.to_string(),
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"
current_period = 4

[thresholds]
pacing_on_track = 0.85

[[users]]
id = "u4"
name = "Leandro"
role = "partner"
role_title = "Partner / Sales"

[[users.metrics]]
id = "m_audits"
title = "Paid audits scheduled"
target = 12
unit = "un"
kind = "sum_target"
inputs = [{ key = "audits_scheduled", label = "New paid audits scheduled" }]

[[users.metrics]]
id = "m_conversion"
title = "Audit to CORE conversion"
target = 25
unit = "%"
kind = "percentage_cumulative"
inputs = [
    { key = "core_closed", label = "CORE deals closed", role = "secondary" },
    { key = "audits_performed", label = "Audits performed", role = "primary" },
]
"#;

    #[test]
    fn loads_team_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scorecard.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let config = TeamConfig::load(&path).unwrap();
        assert_eq!(config.current_period, 4);
        assert_eq!(config.thresholds.pacing_on_track, 0.85);
        assert_eq!(config.thresholds.pacing_at_risk, 0.7);

        let user = config.user("u4").unwrap();
        assert_eq!(user.metrics.len(), 2);
        let conversion = user.metric("m_conversion").unwrap();
        assert_eq!(conversion.primary_key(), Some("audits_performed"));
        assert_eq!(conversion.secondary_key(), Some("core_closed"));
    }

    #[test]
    fn bundled_team_file_is_valid() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("scorecard.toml");
        let config = TeamConfig::load(&path).unwrap();
        assert!(!config.users.is_empty());
        assert!(config.user("u4").unwrap().role == crate::models::UserRole::Partner);
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = TeamConfig::load(&dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn malformed_toml_is_a_parse_error() {
        let err = TeamConfig::parse("current_period = [", Path::new("bad.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn period_out_of_range_is_rejected() {
        let err = TeamConfig::parse("current_period = 14", Path::new("x.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }

    #[test]
    fn cumulative_metric_without_numerator_is_rejected() {
        let contents = SAMPLE.replace(
            "    { key = \"core_closed\", label = \"CORE deals closed\", role = \"secondary\" },\n",
            "",
        );
        let err = TeamConfig::parse(&contents, Path::new("x.toml")).unwrap_err();
        match err {
            ConfigError::Invalid { subject, .. } => assert_eq!(subject, "m_conversion"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn quarter_length_override_is_rejected() {
        let contents = "current_period = 13\n[thresholds]\nquarter_periods = 4\n";
        let err = TeamConfig::parse(contents, Path::new("x.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn duplicate_metric_ids_are_rejected() {
        let contents = SAMPLE.replace("id = \"m_conversion\"", "id = \"m_audits\"");
        let err = TeamConfig::parse(&contents, Path::new("x.toml")).unwrap_err();
        assert!(err.to_string().contains("duplicate metric id"));
    }
}
