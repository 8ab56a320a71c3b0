use std::collections::HashSet;

use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPool;

use crate::classify::PlayCandidate;
use crate::dedupe::PlayKey;
use crate::models::{DateRange, ImportStatus, StatusRow};

pub async fn init_db() -> Result<PgPool> {
    let database_url = std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| "postgresql://localhost/replay_history".to_string());

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(50)
        .acquire_timeout(std::time::Duration::from_secs(30))
        .connect(&database_url)
        .await?;

    // Run migrations
    sqlx::migrate!("./migrations").run(&pool).await?;

    Ok(pool)
}

/// Which of the candidate identity keys already exist for this user.
/// One batched query, no per-entry round trips.
pub async fn fetch_existing_play_keys(
    pool: &PgPool,
    user_id: &str,
    keys: &[PlayKey],
) -> Result<HashSet<PlayKey>, sqlx::Error> {
    if keys.is_empty() {
        return Ok(HashSet::new());
    }

    let track_ids: Vec<String> = keys.iter().map(|k| k.track_id.clone()).collect();
    let played_ats: Vec<DateTime<Utc>> = keys.iter().map(|k| k.played_at).collect();

    let rows = sqlx::query_as::<_, (String, DateTime<Utc>)>(
        r#"
        SELECT p.track_id, p.played_at
        FROM plays p
        JOIN UNNEST($2::text[], $3::timestamptz[]) AS k(track_id, played_at)
          ON p.track_id = k.track_id AND p.played_at = k.played_at
        WHERE p.user_id = $1
        "#,
    )
    .bind(user_id)
    .bind(&track_ids)
    .bind(&played_ats)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|(track_id, played_at)| PlayKey {
            track_id,
            played_at,
        })
        .collect())
}

/// Persist one file's new plays in a single transaction and return how
/// many rows were actually inserted. A key that lost a race to a
/// concurrent import hits the uniqueness constraint, is dropped by
/// ON CONFLICT, and simply does not count as inserted.
pub async fn insert_plays(
    pool: &PgPool,
    user_id: &str,
    plays: &[PlayCandidate],
) -> Result<u64, sqlx::Error> {
    if plays.is_empty() {
        return Ok(0);
    }

    let mut tx = pool.begin().await.map_err(|e| {
        tracing::error!("failed to begin import transaction: {}", e);
        e
    })?;

    let mut inserted = 0u64;
    for play in plays {
        let result = sqlx::query(
            r#"
            INSERT INTO plays (
                user_id, track_id, track_name, artist_name, album_name,
                track_uri, ms_played, played_at, reason_start, reason_end,
                skipped, platform, shuffle, offline, conn_country
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            ON CONFLICT (user_id, track_id, played_at) DO NOTHING
            "#,
        )
        .bind(user_id)
        .bind(&play.track_id)
        .bind(&play.track_name)
        .bind(&play.artist_name)
        .bind(&play.album_name)
        .bind(&play.track_uri)
        .bind(play.ms_played)
        .bind(play.played_at)
        .bind(&play.reason_start)
        .bind(&play.reason_end)
        .bind(play.skipped)
        .bind(&play.platform)
        .bind(play.shuffle)
        .bind(play.offline)
        .bind(&play.conn_country)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            tracing::error!(
                "failed to insert play {} at {}: {}",
                play.track_id,
                play.played_at,
                e
            );
            e
        })?;
        inserted += result.rows_affected();
    }

    tx.commit().await.map_err(|e| {
        tracing::error!("failed to commit import transaction: {}", e);
        e
    })?;

    Ok(inserted)
}

/// Current import state for a user, computed from the live record set.
pub async fn import_status(pool: &PgPool, user_id: &str) -> Result<ImportStatus, sqlx::Error> {
    let row = sqlx::query_as::<_, StatusRow>(
        r#"
        SELECT
            COUNT(*) AS total_plays,
            COUNT(DISTINCT track_id) AS total_tracks,
            MIN(played_at) AS first_played,
            MAX(played_at) AS last_played
        FROM plays
        WHERE user_id = $1
        "#,
    )
    .bind(user_id)
    .fetch_one(pool)
    .await?;

    let date_range = match (row.first_played, row.last_played) {
        (Some(first), Some(last)) => Some(DateRange { first, last }),
        _ => None,
    };

    Ok(ImportStatus {
        has_data: row.total_plays > 0,
        total_tracks: row.total_tracks,
        date_range,
    })
}

/// Irreversibly remove every imported play for a user. Callers are
/// responsible for demanding explicit confirmation first.
pub async fn delete_all_plays(pool: &PgPool, user_id: &str) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM plays WHERE user_id = $1")
        .bind(user_id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected())
}
