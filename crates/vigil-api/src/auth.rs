use std::sync::Arc;
use std::time::Duration;

use jsonwebtoken::{DecodingKey, Validation, decode};

use vigil_db::Database;
use vigil_lifecycle::{
    HeartbeatRecorder, MessageExpiryEngine, PresenceReconciler, PresenceStatsAggregator,
    SweepBudget, UnreadCounter,
};
use vigil_types::api::Claims;

use crate::error::ApiError;

pub type AppState = Arc<AppStateInner>;

/// Settings the HTTP layer needs; the binary fills these from the environment.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub jwt_secret: String,
    /// Bearer secret for the cron and moderation-sync routes. `None` rejects
    /// every such call.
    pub cron_secret: Option<String>,
    pub staleness: Duration,
    pub sweep_budget: SweepBudget,
    /// Tombstone retention before physical purge. `None` keeps them forever.
    pub purge_after: Option<Duration>,
}

pub struct AppStateInner {
    pub db: Arc<Database>,
    pub heartbeats: HeartbeatRecorder,
    pub reconciler: PresenceReconciler,
    pub stats: PresenceStatsAggregator,
    pub expiry: MessageExpiryEngine,
    pub unread: UnreadCounter,
    pub config: ApiConfig,
}

impl AppStateInner {
    pub fn new(db: Arc<Database>, config: ApiConfig) -> Self {
        Self {
            heartbeats: HeartbeatRecorder::new(db.clone()),
            reconciler: PresenceReconciler::new(db.clone(), config.sweep_budget),
            stats: PresenceStatsAggregator::new(db.clone()),
            expiry: MessageExpiryEngine::new(db.clone(), config.sweep_budget),
            unread: UnreadCounter::new(db.clone(), db.clone()),
            db,
            config,
        }
    }
}

/// Validate a bearer token issued by the auth provider.
pub fn verify_token(secret: &str, token: &str) -> Result<Claims, ApiError> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|_| ApiError::Unauthorized)
}

/// Compare secrets without short-circuiting on the first differing byte.
pub(crate) fn secrets_match(expected: &str, provided: &str) -> bool {
    let (a, b) = (expected.as_bytes(), provided.as_bytes());
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
