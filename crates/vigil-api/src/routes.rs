use axum::{
    Router, middleware,
    routing::{get, post, put},
};

use crate::auth::AppState;
use crate::middleware::{require_auth, require_cron_secret};
use crate::{cron, messages, moderation, presence};

/// All API routes with their auth layers. Transport layers (CORS, tracing)
/// are added by the binary.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/api/presence/online-stats", get(presence::online_stats))
        .route("/health", get(|| async { "ok" }));

    let protected_routes = Router::new()
        .route("/api/presence/heartbeat", post(presence::heartbeat))
        .route("/api/presence/{user_id}", get(presence::get_presence))
        .route("/api/messages", post(messages::send_message))
        .route("/api/messages/inbox", get(messages::get_inbox))
        .route("/api/messages/unread-count", get(messages::unread_count))
        .route("/api/messages/{message_id}/read", post(messages::mark_read))
        .layer(middleware::from_fn_with_state(state.clone(), require_auth));

    // Scheduler and moderation sync: trusted callers only.
    let cron_routes = Router::new()
        .route(
            "/api/cron/cleanup-messages",
            get(cron::cleanup_messages).post(cron::cleanup_messages),
        )
        .route(
            "/api/cron/reconcile-presence",
            get(cron::reconcile_presence).post(cron::reconcile_presence),
        )
        .route("/api/moderation/users/{user_id}", put(moderation::register_user))
        .route("/api/moderation/bans/{user_id}", put(moderation::set_ban))
        .route(
            "/api/moderation/blocks",
            put(moderation::add_block).delete(moderation::remove_block),
        )
        .layer(middleware::from_fn_with_state(state.clone(), require_cron_secret));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .merge(cron_routes)
        .with_state(state)
}
