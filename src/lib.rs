//! Weekly check-ins tracked against quarterly targets.
//!
//! The [`store::EntryStore`] keeps one entry per (user, metric, period) and
//! [`engine::compute_status`] turns a metric's entries into a value and a
//! traffic-light [`models::Status`].

pub mod config;
pub mod db;
pub mod engine;
pub mod feedback;
pub mod models;
pub mod policy;
pub mod report;
pub mod store;

pub use engine::{compute_status, compute_status_with, entry_display_value};
pub use models::{AggregateResult, Metric, MetricKind, Status, WeeklyEntry};
pub use policy::StatusThresholds;
pub use store::EntryStore;
