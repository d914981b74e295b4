use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use parley_types::api::{Claims, CreateChannelRequest, UpdateChannelRequest};
use parley_types::models::Channel;

use crate::AppState;
use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct ChannelListQuery {
    pub workspace_id: Option<Uuid>,
}

pub async fn list_channels(
    State(state): State<AppState>,
    Query(query): Query<ChannelListQuery>,
    Extension(_claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let workspace_id = query.workspace_id.map(|id| id.to_string());
    let channels = state
        .db
        .list_channels(workspace_id.as_deref())?
        .into_iter()
        .map(|row| row.into_channel())
        .collect::<anyhow::Result<Vec<Channel>>>()?;

    Ok(Json(channels))
}

/// Channels flagged for the cross-workspace chain listing.
pub async fn list_chain_channels(
    State(state): State<AppState>,
    Extension(_claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let channels = state
        .db
        .list_chain_channels()?
        .into_iter()
        .map(|row| row.into_channel())
        .collect::<anyhow::Result<Vec<Channel>>>()?;

    Ok(Json(channels))
}

/// A channel must belong to exactly one workspace; creation without a valid
/// workspace reference is a referential-integrity failure, not a 404.
pub async fn create_channel(
    State(state): State<AppState>,
    Extension(_claims): Extension<Claims>,
    Json(req): Json<CreateChannelRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let name = req.name.trim();
    if name.is_empty() {
        return Err(ApiError::BadRequest("channel name is required".into()));
    }

    let workspace_id = req
        .workspace
        .ok_or_else(|| ApiError::Validation("workspace id is required".into()))?;

    if state.db.get_workspace(&workspace_id.to_string())?.is_none() {
        return Err(ApiError::Validation(format!(
            "invalid workspace id {workspace_id}"
        )));
    }

    let id = Uuid::new_v4();
    let created_at = Utc::now();
    state.db.insert_channel(
        &id.to_string(),
        name,
        &workspace_id.to_string(),
        req.is_chain,
        &created_at.to_rfc3339(),
    )?;

    Ok((
        StatusCode::CREATED,
        Json(Channel {
            id,
            name: name.to_string(),
            workspace_id,
            is_chain: req.is_chain,
            created_at,
        }),
    ))
}

pub async fn get_channel(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(_claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let channel = state
        .db
        .get_channel(&id.to_string())?
        .ok_or_else(|| ApiError::NotFound(format!("channel {id} not found")))?
        .into_channel()?;

    Ok(Json(channel))
}

/// Rename or re-flag a channel. The workspace reference is fixed for life.
pub async fn update_channel(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(_claims): Extension<Claims>,
    Json(req): Json<UpdateChannelRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if let Some(name) = &req.name {
        if name.trim().is_empty() {
            return Err(ApiError::BadRequest("channel name cannot be empty".into()));
        }
    }

    let name = req.name.as_ref().map(|n| n.trim().to_string());
    if !state
        .db
        .update_channel(&id.to_string(), name.as_deref(), req.is_chain)?
    {
        return Err(ApiError::NotFound(format!("channel {id} not found")));
    }

    let channel = state
        .db
        .get_channel(&id.to_string())?
        .ok_or_else(|| ApiError::NotFound(format!("channel {id} not found")))?
        .into_channel()?;

    Ok(Json(channel))
}

/// Deletes the channel; its messages cascade away.
pub async fn delete_channel(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(_claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    if !state.db.delete_channel(&id.to_string())? {
        return Err(ApiError::NotFound(format!("channel {id} not found")));
    }

    Ok(StatusCode::NO_CONTENT)
}
