mod accounts;
mod database;
mod ledger;
mod reservations;
mod revenue;

pub use accounts::*;
pub use database::*;
pub use ledger::*;
pub use reservations::*;
pub use revenue::*;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};

/// SQL migration for initial schema
pub const MIGRATION_001_INITIAL: &str = include_str!("migrations/001_initial.sql");

/// RFC 3339 in UTC with microseconds, e.g. `2024-02-01T00:00:00.000000Z`
const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6fZ";

/// Timestamps are stored as fixed-width RFC 3339 strings so that lexical
/// order in SQL matches chronological order.
pub(crate) fn format_timestamp(at: DateTime<Utc>) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

pub(crate) fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(raw)
        .with_context(|| format!("Invalid timestamp: {}", raw))?
        .with_timezone(&Utc))
}
