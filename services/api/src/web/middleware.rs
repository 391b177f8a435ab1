//! services/api/src/web/middleware.rs
//!
//! Authentication middleware for protecting routes.

use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::Response,
};
use tracing::error;

use crate::web::{jwt, state::AppState};

/// The authenticated caller, inserted into request extensions by `require_auth`.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub id: String,
    pub email: String,
}

/// Middleware that validates the bearer token and extracts the caller.
///
/// If valid, inserts a `CurrentUser` into request extensions for handlers to use.
/// If invalid or missing, returns 401 Unauthorized.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    // 1. Extract the Authorization header
    let auth_header = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(StatusCode::UNAUTHORIZED)?;

    // 2. Pull the bearer token out of it
    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or(StatusCode::UNAUTHORIZED)?;

    // 3. Verify the token and decode its claims
    let claims = jwt::verify_token(&state.config.jwt_secret, token).map_err(|e| {
        error!("Failed to verify access token: {:?}", e);
        StatusCode::UNAUTHORIZED
    })?;

    // 4. Insert the caller into request extensions
    req.extensions_mut().insert(CurrentUser {
        id: claims.sub,
        email: claims.email,
    });

    // 5. Continue to the handler
    Ok(next.run(req).await)
}
