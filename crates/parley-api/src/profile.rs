use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};
use tracing::error;

use parley_types::api::{Claims, UpdateProfileRequest};
use parley_types::events::ServerEvent;

use crate::auth::AppState;

/// Partial update of the caller's profile fields. Everyone online hears
/// about the change and gets a fresh directory.
pub async fn update_profile(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<UpdateProfileRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    let db = state.db.clone();
    let username = claims.username.clone();
    let UpdateProfileRequest {
        status,
        avatar_url,
        background,
    } = req;

    // Run blocking DB update off the async runtime
    let profile = tokio::task::spawn_blocking(move || {
        db.update_profile(
            &username,
            status.as_deref(),
            avatar_url.as_deref(),
            background.as_deref(),
        )
    })
    .await
    .map_err(|e| {
        error!("spawn_blocking join error: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?
    .map_err(|e| {
        error!("DB update_profile error: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?
    .ok_or(StatusCode::NOT_FOUND)?;

    state
        .gateway
        .transport
        .broadcast_all(ServerEvent::ProfileUpdated {
            username: profile.username,
            status: profile.status,
            avatar_url: profile.avatar_url,
        })
        .await;
    state.gateway.directory.publish().await;

    Ok(StatusCode::NO_CONTENT)
}
