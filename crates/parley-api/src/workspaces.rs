use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use uuid::Uuid;

use parley_types::api::{Claims, CreateWorkspaceRequest, UpdateWorkspaceRequest};
use parley_types::models::Workspace;

use crate::AppState;
use crate::error::ApiError;

pub async fn list_workspaces(
    State(state): State<AppState>,
    Extension(_claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let workspaces = state
        .db
        .list_workspaces()?
        .into_iter()
        .map(|row| row.into_workspace())
        .collect::<anyhow::Result<Vec<Workspace>>>()?;

    Ok(Json(workspaces))
}

pub async fn create_workspace(
    State(state): State<AppState>,
    Extension(_claims): Extension<Claims>,
    Json(req): Json<CreateWorkspaceRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let name = req.name.trim();
    if name.is_empty() {
        return Err(ApiError::BadRequest("workspace name is required".into()));
    }

    let id = Uuid::new_v4();
    let created_at = Utc::now();
    state
        .db
        .insert_workspace(&id.to_string(), name, &created_at.to_rfc3339())?;

    Ok((
        StatusCode::CREATED,
        Json(Workspace {
            id,
            name: name.to_string(),
            created_at,
        }),
    ))
}

pub async fn get_workspace(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(_claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let workspace = state
        .db
        .get_workspace(&id.to_string())?
        .ok_or_else(|| ApiError::NotFound(format!("workspace {id} not found")))?
        .into_workspace()?;

    Ok(Json(workspace))
}

pub async fn update_workspace(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(_claims): Extension<Claims>,
    Json(req): Json<UpdateWorkspaceRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let name = req.name.trim();
    if name.is_empty() {
        return Err(ApiError::BadRequest("workspace name is required".into()));
    }

    if !state.db.rename_workspace(&id.to_string(), name)? {
        return Err(ApiError::NotFound(format!("workspace {id} not found")));
    }

    let workspace = state
        .db
        .get_workspace(&id.to_string())?
        .ok_or_else(|| ApiError::NotFound(format!("workspace {id} not found")))?
        .into_workspace()?;

    Ok(Json(workspace))
}

/// Deletes the workspace; its channels and their messages cascade away.
pub async fn delete_workspace(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(_claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    if !state.db.delete_workspace(&id.to_string())? {
        return Err(ApiError::NotFound(format!("workspace {id} not found")));
    }

    Ok(StatusCode::NO_CONTENT)
}
