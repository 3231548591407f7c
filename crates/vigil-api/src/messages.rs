use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use vigil_db::models::NewMessage;
use vigil_db::to_millis;
use vigil_types::api::{
    ApiResponse, Claims, MarkReadResponse, MessageResponse, SendMessageRequest,
    UnreadCountResponse,
};
use vigil_types::models::Message;

use crate::auth::AppState;
use crate::error::ApiError;

const MAX_BODY_CHARS: usize = 4000;
/// Longest TTL a sender may ask for: 30 days.
const MAX_TTL_SECONDS: u64 = 30 * 24 * 3600;

#[derive(Debug, Deserialize)]
pub struct InboxQuery {
    #[serde(default = "default_limit")]
    pub limit: u32,
}

fn default_limit() -> u32 {
    50
}

/// POST /api/messages: send a direct message, optionally with a TTL.
pub async fn send_message(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if req.body.trim().is_empty() || req.body.chars().count() > MAX_BODY_CHARS {
        return Err(ApiError::BadRequest("message body is empty or too long".into()));
    }
    let ttl = match req.ttl_seconds {
        Some(0) => return Err(ApiError::BadRequest("ttlSeconds must be positive".into())),
        Some(secs) if secs > MAX_TTL_SECONDS => {
            return Err(ApiError::BadRequest("ttlSeconds is too large".into()));
        }
        Some(secs) => Some(chrono::Duration::seconds(secs as i64)),
        None => None,
    };

    let now = Utc::now();
    let message = Message {
        id: Uuid::new_v4(),
        sender_id: claims.sub,
        receiver_id: req.receiver_id,
        body: req.body,
        created_at: now,
        expires_at: ttl.map(|ttl| now + ttl),
        is_read: false,
        is_deleted: false,
    };

    let db = state.db.clone();
    let row = message.clone();
    tokio::task::spawn_blocking(move || {
        let (id, sender, receiver) = (
            row.id.to_string(),
            row.sender_id.to_string(),
            row.receiver_id.to_string(),
        );
        db.insert_message(&NewMessage {
            id: &id,
            sender_id: &sender,
            receiver_id: &receiver,
            body: &row.body,
            created_at: to_millis(row.created_at),
            expires_at: row.expires_at.map(to_millis),
        })
    })
    .await??;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok(MessageResponse::from(message))),
    ))
}

/// GET /api/messages/inbox: visible messages for the caller, newest first.
pub async fn get_inbox(
    State(state): State<AppState>,
    Query(query): Query<InboxQuery>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<ApiResponse<Vec<MessageResponse>>>, ApiError> {
    let unread = state.unread.clone();
    let limit = query.limit.clamp(1, 200);
    let now = Utc::now();

    let messages =
        tokio::task::spawn_blocking(move || unread.inbox(claims.sub, now, limit)).await??;

    Ok(Json(ApiResponse::ok(
        messages.into_iter().map(MessageResponse::from).collect(),
    )))
}

/// POST /api/messages/{id}/read: receiver marks a message read.
pub async fn mark_read(
    State(state): State<AppState>,
    Path(message_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<ApiResponse<MarkReadResponse>>, ApiError> {
    let db = state.db.clone();
    let now = to_millis(Utc::now());

    let updated = tokio::task::spawn_blocking(move || {
        db.mark_read(&message_id.to_string(), &claims.sub.to_string(), now)
    })
    .await??;

    Ok(Json(ApiResponse::ok(MarkReadResponse { updated })))
}

/// GET /api/messages/unread-count: unread total excluding blocked peers and
/// expired messages.
pub async fn unread_count(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<ApiResponse<UnreadCountResponse>>, ApiError> {
    let unread = state.unread.clone();
    let now = Utc::now();

    let count = tokio::task::spawn_blocking(move || unread.count(claims.sub, now)).await??;

    Ok(Json(ApiResponse::ok(UnreadCountResponse {
        unread_count: count.unread_count,
    })))
}
