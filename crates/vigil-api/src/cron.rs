//! Routes an external scheduler hits to trigger sweeps. Guarded by
//! [`require_cron_secret`](crate::middleware::require_cron_secret).

use axum::{Json, extract::State};
use chrono::Utc;
use tracing::{info, warn};

use vigil_types::api::{CleanupResponse, ReconcileResponse};

use crate::auth::AppState;
use crate::error::ApiError;

/// GET|POST /api/cron/cleanup-messages: tombstone expired messages, then
/// purge old tombstones when a retention window is configured.
pub async fn cleanup_messages(
    State(state): State<AppState>,
) -> Result<Json<CleanupResponse>, ApiError> {
    let timestamp = Utc::now();
    let expiry = state.expiry.clone();
    let purge_after = state.config.purge_after;

    let report = tokio::task::spawn_blocking(move || {
        let report = expiry.sweep_messages(timestamp)?;

        if let Some(retention) = purge_after {
            // Compaction is best effort; the tombstone sweep already succeeded.
            if let Err(e) = expiry.purge(timestamp, retention) {
                warn!("Tombstone purge failed: {}", e);
            }
        }
        Ok::<_, anyhow::Error>(report)
    })
    .await??;

    info!(
        deleted = report.processed,
        complete = report.complete,
        "cleanup-messages triggered"
    );

    Ok(Json(CleanupResponse {
        success: true,
        deleted_count: report.processed,
        timestamp,
    }))
}

/// GET|POST /api/cron/reconcile-presence: clear ghosts older than the
/// configured staleness threshold.
pub async fn reconcile_presence(
    State(state): State<AppState>,
) -> Result<Json<ReconcileResponse>, ApiError> {
    let timestamp = Utc::now();
    let reconciler = state.reconciler.clone();
    let staleness = state.config.staleness;

    let report =
        tokio::task::spawn_blocking(move || reconciler.sweep(timestamp, staleness)).await??;

    Ok(Json(ReconcileResponse {
        success: true,
        updated_count: report.processed,
        timestamp,
    }))
}
