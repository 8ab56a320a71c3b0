use axum::{
    body::Bytes,
    extract::{Query, State},
    response::{IntoResponse, Json, Response},
    routing::{delete, get, post},
    Router,
};
use serde::Deserialize;
use sqlx::postgres::PgPool;
use std::net::SocketAddr;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber;

pub mod archive;
pub mod classify;
pub mod db;
pub mod dedupe;
pub mod error;
pub mod export;
pub mod import;
pub mod models;

use error::{AppError, ImportError};
use models::ImportStatus;

#[derive(Clone)]
struct AppState {
    db: PgPool,
}

#[derive(Debug, Deserialize)]
struct ImportQuery {
    user: String,
    #[serde(default)]
    filename: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StatusQuery {
    user: String,
}

#[derive(Debug, Deserialize)]
struct EraseQuery {
    user: String,
    #[serde(default)]
    confirm: bool,
}

/// Accept one uploaded unit: a raw history file, or a zip export that
/// is unwrapped server-side and processed as a batch. A single file
/// answers with its ImportResult; an archive answers with per-file
/// outcomes plus folded totals.
#[axum::debug_handler]
async fn import_history(
    State(state): State<AppState>,
    Query(params): Query<ImportQuery>,
    body: Bytes,
) -> Result<Response, AppError> {
    let file_name = params
        .filename
        .unwrap_or_else(|| "history.json".to_string());
    let bytes = body.to_vec();

    if archive::looks_like_zip(&file_name, &bytes) {
        let files = archive::unwrap_upload(&file_name, bytes)?;
        if files.is_empty() {
            return Err(AppError::BadRequest(format!(
                "{} contains no history files",
                file_name
            )));
        }

        tracing::info!(
            "importing {} files from {} for {}",
            files.len(),
            file_name,
            params.user
        );
        let cancel = CancellationToken::new();
        let batch =
            import::import_batch(&state.db, &params.user, &files, &cancel, |_| {}).await;
        Ok(Json(batch).into_response())
    } else {
        let file = archive::ExportFile {
            name: file_name,
            contents: bytes,
        };
        let result = import::import_file(&state.db, &params.user, &file).await?;
        tracing::info!(
            "imported {} of {} entries from {} for {}",
            result.imported,
            result.total,
            file.name,
            params.user
        );
        Ok(Json(result).into_response())
    }
}

async fn get_status(
    State(state): State<AppState>,
    Query(params): Query<StatusQuery>,
) -> Result<Json<ImportStatus>, AppError> {
    let status = db::import_status(&state.db, &params.user)
        .await
        .map_err(ImportError::Storage)?;
    Ok(Json(status))
}

/// Erase every imported play for the user. Destructive and without
/// undo, so the caller must pass confirm=true explicitly.
async fn delete_data(
    State(state): State<AppState>,
    Query(params): Query<EraseQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    if !params.confirm {
        return Err(AppError::BadRequest(
            "deleting imported history cannot be undone; pass confirm=true".to_string(),
        ));
    }

    let deleted = db::delete_all_plays(&state.db, &params.user)
        .await
        .map_err(ImportError::Storage)?;
    tracing::info!("deleted {} plays for {}", deleted, params.user);
    Ok(Json(serde_json::json!({ "deleted": deleted })))
}

async fn health_check() -> &'static str {
    "ok"
}

pub async fn run() {
    tracing_subscriber::fmt()
        .with_env_filter("replay_history_api=debug,tower_http=debug")
        .init();

    let db = db::init_db().await.expect("failed to initialize database");
    tracing::info!("database initialized");

    let state = AppState { db };

    let app = Router::new()
        .route("/health", get(health_check))
        .route("/api/import/history", post(import_history))
        .route("/api/import/status", get(get_status))
        .route("/api/import/data", delete(delete_data))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], 3001));
    tracing::info!("listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    axum::serve(listener, app).await.unwrap();
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    #[tokio::test]
    async fn health_endpoint_responds() {
        let app = Router::new().route("/health", get(health_check));
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
