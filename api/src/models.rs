use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Aggregate row backing the status projection.
#[derive(Debug, Clone, FromRow)]
pub struct StatusRow {
    pub total_plays: i64,
    pub total_tracks: i64,
    pub first_played: Option<DateTime<Utc>>,
    pub last_played: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DateRange {
    pub first: DateTime<Utc>,
    pub last: DateTime<Utc>,
}

/// Read-only projection over a user's stored plays, recomputed on
/// demand rather than cached.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportStatus {
    pub has_data: bool,
    pub total_tracks: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_range: Option<DateRange>,
}
