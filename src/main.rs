use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{bail, Context};
use chrono::Utc;
use clap::{Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use tracing::info;
use tracing_subscriber::EnvFilter;

use team_scorecard::config::TeamConfig;
use team_scorecard::models::{Feedback, Metric, UserRole, QUARTER_PERIODS};
use team_scorecard::{db, engine, report, store};

#[derive(Parser)]
#[command(name = "scorecard")]
#[command(about = "Weekly team check-ins against quarterly targets", long_about = None)]
struct Cli {
    /// Team configuration file
    #[arg(long, global = true, default_value = "scorecard.toml")]
    config: PathBuf,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load sample check-ins for the first weeks
    Seed,
    /// Import check-ins from a long-format CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Record the current period's numbers for one metric
    CheckIn {
        #[arg(long)]
        user: String,
        #[arg(long)]
        metric: String,
        /// Input values as key=value
        #[arg(long = "input", value_parser = parse_input)]
        inputs: Vec<(String, f64)>,
    },
    /// Correct a past check-in on behalf of a team member
    Edit {
        /// Partner performing the edit
        #[arg(long)]
        editor: String,
        #[arg(long)]
        user: String,
        #[arg(long)]
        metric: String,
        #[arg(long, value_parser = clap::value_parser!(u32).range(1..=QUARTER_PERIODS as i64))]
        period: u32,
        #[arg(long = "input", value_parser = parse_input)]
        inputs: Vec<(String, f64)>,
    },
    /// Show the performance table
    Status {
        #[arg(long)]
        user: Option<String>,
    },
    /// Individual review for one team member
    Review {
        #[arg(long)]
        user: String,
    },
    /// Record one-on-one feedback
    Feedback {
        #[arg(long)]
        user: String,
        #[arg(long, value_parser = clap::value_parser!(u32).range(1..=QUARTER_PERIODS as i64))]
        period: Option<u32>,
        #[arg(long)]
        blockers: Option<String>,
        #[arg(long)]
        commitment: Option<String>,
        #[arg(long)]
        learning: Option<String>,
        /// Whether the commitment recorded for this period was kept
        #[arg(long, value_name = "true|false")]
        completed: Option<bool>,
    },
    /// Generate a markdown report
    Report {
        #[arg(long, default_value = "scorecard-report.md")]
        out: PathBuf,
    },
}

fn parse_input(raw: &str) -> Result<(String, f64), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got `{raw}`"))?;
    let value: f64 = value
        .trim()
        .parse()
        .map_err(|_| format!("`{value}` is not a number"))?;
    Ok((key.trim().to_string(), value))
}

/// Check that every declared field of the metric was provided.
fn collect_inputs(
    metric: &Metric,
    inputs: Vec<(String, f64)>,
) -> anyhow::Result<BTreeMap<String, f64>> {
    let inputs: BTreeMap<String, f64> = inputs.into_iter().collect();
    let missing: Vec<&str> = metric
        .inputs
        .iter()
        .filter(|field| !inputs.contains_key(&field.key))
        .map(|field| field.key.as_str())
        .collect();

    if !missing.is_empty() {
        bail!(
            "metric {} needs values for: {}",
            metric.id,
            missing.join(", ")
        );
    }
    Ok(inputs)
}

/// Only partners may edit, and only periods that have already started.
fn authorize_edit(config: &TeamConfig, editor_id: &str, period: u32) -> anyhow::Result<()> {
    let editor = config
        .user(editor_id)
        .with_context(|| format!("unknown user {editor_id}"))?;
    if editor.role != UserRole::Partner {
        bail!("{} is not allowed to edit other check-ins", editor.name);
    }
    if !store::is_editable(period, config.current_period) {
        bail!(
            "period {period} has not started yet (current period is {})",
            config.current_period
        );
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = TeamConfig::load(&cli.config)?;
    let database_url = std::env::var("DATABASE_URL")
        .context("DATABASE_URL must be set to a production Postgres instance")?;

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("failed to connect to Postgres")?;

    match cli.command {
        Commands::InitDb => {
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            let inserted = db::seed(&pool, &config).await?;
            println!("Seeded {inserted} check-ins.");
        }
        Commands::Import { csv } => {
            let inserted = db::import_csv(&pool, &csv).await?;
            println!("Imported {inserted} check-ins from {}.", csv.display());
        }
        Commands::CheckIn {
            user,
            metric,
            inputs,
        } => {
            let period = config.current_period;
            record_entry(&pool, &config, &user, &metric, period, inputs).await?;
        }
        Commands::Edit {
            editor,
            user,
            metric,
            period,
            inputs,
        } => {
            authorize_edit(&config, &editor, period)?;
            record_entry(&pool, &config, &user, &metric, period, inputs).await?;
        }
        Commands::Status { user } => {
            let entries = db::load_store(&pool, user.as_deref()).await?;
            let users: Vec<_> = match user.as_deref() {
                Some(id) => vec![config
                    .user(id)
                    .with_context(|| format!("unknown user {id}"))?
                    .clone()],
                None => config.users.clone(),
            };
            let rows = report::performance_rows(&users, &entries, &config.thresholds);

            if rows.is_empty() {
                println!("No metrics configured.");
                return Ok(());
            }

            print!("{}", report::build_table(&rows, config.current_period));
            let counts = report::summarize(&rows);
            println!(
                "{} on-track, {} at-risk, {} critical, {} without data",
                counts.on_track, counts.at_risk, counts.critical, counts.unknown
            );
        }
        Commands::Review { user } => {
            let user = config
                .user(&user)
                .with_context(|| format!("unknown user {user}"))?;
            let entries = db::load_store(&pool, Some(user.id.as_str())).await?;
            let feedback = db::load_feedback(&pool).await?;
            print!(
                "{}",
                report::build_review(
                    user,
                    &entries,
                    &feedback,
                    config.current_period,
                    &config.thresholds
                )
            );
        }
        Commands::Feedback {
            user,
            period,
            blockers,
            commitment,
            learning,
            completed,
        } => {
            if config.user(&user).is_none() {
                bail!("unknown user {user}");
            }
            let feedback = Feedback {
                user_id: user,
                period: period.unwrap_or(config.current_period),
                blockers,
                commitment,
                learning,
                commitment_completed: completed,
                recorded_at: Utc::now(),
            };
            db::save_feedback(&pool, &feedback).await?;
            println!(
                "Feedback saved for {} (period {}).",
                feedback.user_id, feedback.period
            );
        }
        Commands::Report { out } => {
            let entries = db::load_store(&pool, None).await?;
            let feedback = db::load_feedback(&pool).await?;
            let report = report::build_report(&config, &entries, &feedback);
            std::fs::write(&out, report)?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}

/// Shared path for check-ins and administrative edits.
async fn record_entry(
    pool: &sqlx::PgPool,
    config: &TeamConfig,
    user_id: &str,
    metric_id: &str,
    period: u32,
    inputs: Vec<(String, f64)>,
) -> anyhow::Result<()> {
    let user = config
        .user(user_id)
        .with_context(|| format!("unknown user {user_id}"))?;
    let metric = user
        .metric(metric_id)
        .with_context(|| format!("{} has no metric {metric_id}", user.name))?;
    let inputs = collect_inputs(metric, inputs)?;

    let mut entries = db::load_store(pool, Some(user_id)).await?;
    entries.upsert(user_id, period, metric_id, inputs);
    let entry = entries
        .lookup(user_id, period, metric_id)
        .context("entry missing right after upsert")?;
    db::upsert_entry(pool, entry).await?;
    info!(user = user_id, metric = metric_id, period, "recorded check-in");

    let result = engine::compute_status_with(
        metric,
        entries.entries_for(user_id),
        &config.thresholds,
    );
    println!(
        "{} period {}: {} is now {} ({})",
        user.name,
        period,
        metric.title,
        report::format_value(result.value, &metric.unit),
        result.status
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use team_scorecard::models::{InputField, MetricKind};

    const TEAM: &str = r#"
current_period = 4

[[users]]
id = "u1"
name = "Rafael"
role = "contributor"

[[users]]
id = "u4"
name = "Leandro"
role = "partner"
"#;

    fn team() -> TeamConfig {
        TeamConfig::parse(TEAM, Path::new("team.toml")).unwrap()
    }

    fn metric() -> Metric {
        Metric {
            id: "m1".to_string(),
            title: "Conversion".to_string(),
            target: 25.0,
            unit: "%".to_string(),
            kind: MetricKind::PercentageCumulative,
            description: None,
            inputs: vec![
                InputField::new("performed", "Audits performed"),
                InputField::new("closed", "Deals closed"),
            ],
        }
    }

    #[test]
    fn inputs_parse_as_key_value_pairs() {
        assert_eq!(parse_input("closed=3").unwrap(), ("closed".to_string(), 3.0));
        assert!(parse_input("closed").is_err());
        assert!(parse_input("closed=many").is_err());
    }

    #[test]
    fn check_in_requires_every_field() {
        let err = collect_inputs(&metric(), vec![("performed".to_string(), 4.0)]).unwrap_err();
        assert!(err.to_string().contains("closed"));

        let inputs = collect_inputs(
            &metric(),
            vec![("performed".to_string(), 4.0), ("closed".to_string(), 1.0)],
        )
        .unwrap();
        assert_eq!(inputs.len(), 2);
    }

    #[test]
    fn check_in_has_no_period_override() {
        let future = Cli::try_parse_from([
            "scorecard", "check-in", "--user", "u1", "--metric", "m1", "--period", "13",
        ]);
        assert!(future.is_err());

        let current = Cli::try_parse_from([
            "scorecard", "check-in", "--user", "u1", "--metric", "m1", "--input", "sales=2",
        ]);
        assert!(matches!(
            current.unwrap().command,
            Commands::CheckIn { .. }
        ));
    }

    #[test]
    fn edits_need_a_partner_and_an_elapsed_period() {
        let config = team();
        assert!(authorize_edit(&config, "u4", 4).is_ok());
        assert!(authorize_edit(&config, "u4", 1).is_ok());
        assert!(authorize_edit(&config, "u4", 5).is_err());
        assert!(authorize_edit(&config, "u1", 3).is_err());
        assert!(authorize_edit(&config, "nobody", 3).is_err());
    }

    fn completed_flag(extra: &[&str]) -> Option<bool> {
        let mut args: Vec<&str> = vec!["scorecard", "feedback", "--user", "u1"];
        args.extend_from_slice(extra);
        match Cli::try_parse_from(args).unwrap().command {
            Commands::Feedback { completed, .. } => completed,
            _ => panic!("expected feedback command"),
        }
    }

    #[test]
    fn completion_flag_is_tri_state() {
        let parse = completed_flag;
        assert_eq!(parse(&[]), None);
        assert_eq!(parse(&["--completed", "true"]), Some(true));
        assert_eq!(parse(&["--completed", "false"]), Some(false));
    }
}
