use std::sync::Arc;

use axum::{extract::State, Json};
use serde::Serialize;

use crate::error::{AppError, AppResult};
use crate::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub timestamp: String,
}

/// Liveness + database connectivity check.
pub async fn health_check(State(state): State<Arc<AppState>>) -> AppResult<Json<HealthResponse>> {
    sqlx::query("SELECT 1")
        .execute(&state.db)
        .await
        .map_err(AppError::Database)?;

    Ok(Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    }))
}
