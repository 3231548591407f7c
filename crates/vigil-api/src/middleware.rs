use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use axum_extra::headers::{Authorization, HeaderMapExt, authorization::Bearer};
use tracing::warn;

use crate::auth::{AppState, secrets_match, verify_token};
use crate::error::ApiError;

/// Extract and validate the JWT from the Authorization header, then expose
/// the claims to handlers as an extension.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let bearer = req
        .headers()
        .typed_get::<Authorization<Bearer>>()
        .ok_or(ApiError::Unauthorized)?;

    let claims = verify_token(&state.config.jwt_secret, bearer.token())?;

    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}

/// Gate for scheduler-triggered routes: the bearer token must equal the
/// configured cron secret. Checked before any handler work starts.
pub async fn require_cron_secret(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(expected) = state.config.cron_secret.as_deref() else {
        warn!("Cron route called but no cron secret is configured");
        return Err(ApiError::Unauthorized);
    };

    let provided = req
        .headers()
        .typed_get::<Authorization<Bearer>>()
        .ok_or(ApiError::Unauthorized)?;

    if !secrets_match(expected, provided.token()) {
        warn!("Cron route called with a bad secret");
        return Err(ApiError::Unauthorized);
    }

    Ok(next.run(req).await)
}
