use axum::{
    Extension, Json,
    extract::{Path, State},
};
use chrono::Utc;
use tracing::warn;
use uuid::Uuid;

use vigil_types::api::{ApiResponse, Claims, OnlineStatsResponse, PresenceResponse};

use crate::auth::AppState;
use crate::error::ApiError;

/// POST /api/presence/heartbeat: mark the caller online as of now.
pub async fn heartbeat(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    let now = Utc::now();
    let recorder = state.heartbeats.clone();

    // Run blocking DB write off the async runtime
    tokio::task::spawn_blocking(move || recorder.record(claims.sub, now)).await??;

    Ok(Json(ApiResponse::ack()))
}

/// GET /api/presence/online-stats: public live counter. Never fails: a
/// store error degrades to a hidden zero count with an error note.
pub async fn online_stats(State(state): State<AppState>) -> Json<OnlineStatsResponse> {
    let stats = state.stats.clone();
    let timestamp = Utc::now();

    let result = tokio::task::spawn_blocking(move || stats.count())
        .await
        .map_err(anyhow::Error::from)
        .and_then(|r| r);

    match result {
        Ok(stats) => Json(OnlineStatsResponse {
            count: stats.online,
            show_count: stats.online >= 1,
            timestamp,
            error: None,
        }),
        Err(e) => {
            warn!("Online stats unavailable: {}", e);
            Json(OnlineStatsResponse {
                count: 0,
                show_count: false,
                timestamp,
                error: Some("failed to load online stats".to_string()),
            })
        }
    }
}

/// GET /api/presence/{user_id}: single-user presence, offline on failure.
pub async fn get_presence(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Extension(_claims): Extension<Claims>,
) -> Result<Json<ApiResponse<PresenceResponse>>, ApiError> {
    let stats = state.stats.clone();
    let presence = tokio::task::spawn_blocking(move || stats.presence_of(user_id)).await?;

    Ok(Json(ApiResponse::ok(PresenceResponse {
        user_id: presence.user_id,
        // Banned users never show as online.
        is_online: presence.is_online && !presence.is_banned,
        last_seen_at: presence.last_seen_at,
    })))
}
