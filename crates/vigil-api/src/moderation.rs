//! Write path for the moderation collaborator. Users, bans and blocks are
//! owned elsewhere and pushed in here so the presence counter and unread
//! accounting can exclude them. Guarded by the same trusted-caller secret as
//! the cron routes.

use axum::{
    Json,
    extract::{Path, State},
};
use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use vigil_db::to_millis;
use vigil_types::api::{ApiResponse, SetBanRequest};
use vigil_types::models::BlockRelationship;

use crate::auth::AppState;
use crate::error::ApiError;

/// PUT /api/moderation/users/{user_id}: create the offline presence row for
/// a newly registered user. Idempotent.
pub async fn register_user(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    let db = state.db.clone();
    tokio::task::spawn_blocking(move || db.ensure_presence(&user_id.to_string())).await??;

    Ok(Json(ApiResponse::ack()))
}

/// PUT /api/moderation/bans/{user_id}
pub async fn set_ban(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Json(req): Json<SetBanRequest>,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    let db = state.db.clone();
    let banned = req.is_banned;
    tokio::task::spawn_blocking(move || db.set_banned(&user_id.to_string(), banned)).await??;

    info!(%user_id, banned, "ban flag synced");
    Ok(Json(ApiResponse::ack()))
}

/// PUT /api/moderation/blocks: record that `blockerId` blocked `blockedId`.
pub async fn add_block(
    State(state): State<AppState>,
    Json(pair): Json<BlockRelationship>,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    if pair.blocker_id == pair.blocked_id {
        return Err(ApiError::BadRequest("a user cannot block themselves".into()));
    }

    let db = state.db.clone();
    let now = to_millis(Utc::now());
    tokio::task::spawn_blocking(move || {
        db.block(&pair.blocker_id.to_string(), &pair.blocked_id.to_string(), now)
    })
    .await??;

    Ok(Json(ApiResponse::ack()))
}

/// DELETE /api/moderation/blocks: lift a block. 404 when the pair was never
/// blocked in that direction.
pub async fn remove_block(
    State(state): State<AppState>,
    Json(pair): Json<BlockRelationship>,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    let db = state.db.clone();
    let removed = tokio::task::spawn_blocking(move || {
        db.unblock(&pair.blocker_id.to_string(), &pair.blocked_id.to_string())
    })
    .await??;

    if !removed {
        return Err(ApiError::NotFound);
    }
    Ok(Json(ApiResponse::ack()))
}
