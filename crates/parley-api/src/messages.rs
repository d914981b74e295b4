use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use tracing::error;
use uuid::Uuid;

use parley_types::api::{Claims, SendMessageRequest};
use parley_types::events::GatewayEvent;
use parley_types::models::{Destination, Message, MessageOrder};

use crate::AppState;
use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    /// Both orders are always available; the default depends on the
    /// destination kind to match the classic channel/DM viewing styles.
    pub order: Option<MessageOrder>,
}

pub async fn send_channel_message(
    State(state): State<AppState>,
    Path(channel_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    append(state, claims, Destination::Channel(channel_id), req).await
}

pub async fn list_channel_messages(
    State(state): State<AppState>,
    Path(channel_id): Path<Uuid>,
    Query(query): Query<HistoryQuery>,
    Extension(_claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let order = query.order.unwrap_or(MessageOrder::OldestFirst);
    list_history(state, Destination::Channel(channel_id), order).await
}

pub async fn send_dm_message(
    State(state): State<AppState>,
    Path(group_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    append(state, claims, Destination::DmGroup(group_id), req).await
}

pub async fn list_dm_messages(
    State(state): State<AppState>,
    Path(group_id): Path<Uuid>,
    Query(query): Query<HistoryQuery>,
    Extension(_claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let order = query.order.unwrap_or(MessageOrder::NewestFirst);
    list_history(state, Destination::DmGroup(group_id), order).await
}

/// Append to the log: validate the destination, stamp sender and timestamp
/// server-side, persist, then hand the stored message to fan-out. The
/// publish is fire-and-forget — it can never fail or undo the append.
async fn append(
    state: AppState,
    claims: Claims,
    destination: Destination,
    req: SendMessageRequest,
) -> Result<impl IntoResponse, ApiError> {
    if req.content.is_empty() {
        return Err(ApiError::BadRequest("message content is required".into()));
    }

    ensure_destination_exists(&state, destination)?;

    let message = Message {
        id: Uuid::new_v4(),
        sender_id: claims.sub,
        sender_username: claims.username,
        content: req.content,
        destination,
        created_at: state.db.next_timestamp()?,
    };

    // Run the blocking insert off the async runtime
    let db_state = state.clone();
    let stored = message.clone();
    tokio::task::spawn_blocking(move || {
        db_state.db.insert_message(
            &stored.id.to_string(),
            &stored.sender_id.to_string(),
            stored.destination,
            &stored.content,
            &stored.created_at.to_rfc3339(),
        )
    })
    .await
    .map_err(|e| {
        error!("spawn_blocking join error: {e}");
        anyhow::anyhow!("message insert task failed")
    })??;

    // Persisted and acknowledged; now fan out to live subscribers
    state.dispatcher.publish(GatewayEvent::MessageCreate {
        message: message.clone(),
    });

    Ok((StatusCode::CREATED, Json(message)))
}

async fn list_history(
    state: AppState,
    destination: Destination,
    order: MessageOrder,
) -> Result<impl IntoResponse, ApiError> {
    ensure_destination_exists(&state, destination)?;

    let db_state = state.clone();
    let rows = tokio::task::spawn_blocking(move || db_state.db.list_messages(destination, order))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {e}");
            anyhow::anyhow!("history query task failed")
        })??;

    let messages = rows
        .into_iter()
        .map(|row| row.into_message())
        .collect::<anyhow::Result<Vec<Message>>>()?;

    Ok(Json(messages))
}

fn ensure_destination_exists(state: &AppState, destination: Destination) -> Result<(), ApiError> {
    match destination {
        Destination::Channel(id) => {
            if state.db.get_channel(&id.to_string())?.is_none() {
                return Err(ApiError::NotFound(format!("channel {id} not found")));
            }
        }
        Destination::DmGroup(id) => {
            if state.db.get_group(&id.to_string())?.is_none() {
                return Err(ApiError::NotFound(format!("dm group {id} not found")));
            }
        }
    }
    Ok(())
}
