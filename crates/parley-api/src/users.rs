use axum::{Extension, Json, extract::State, response::IntoResponse};

use parley_types::api::Claims;
use parley_types::models::User;

use crate::AppState;
use crate::error::ApiError;

/// List all registered users, mainly for DM participant selection.
/// Sits behind the auth middleware like every other directory read.
pub async fn list_users(
    State(state): State<AppState>,
    Extension(_claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let users = state
        .db
        .list_users()?
        .into_iter()
        .map(|row| row.into_user())
        .collect::<anyhow::Result<Vec<User>>>()?;

    Ok(Json(users))
}

/// The caller's own record.
pub async fn me(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let user = state
        .db
        .get_user_by_id(&claims.sub.to_string())?
        .ok_or_else(|| ApiError::NotFound("user no longer exists".into()))?
        .into_user()?;

    Ok(Json(user))
}
