use std::collections::BTreeSet;

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use uuid::Uuid;

use parley_db::models::DmGroupRow;
use parley_db::queries::ResolveGroup;
use parley_types::api::{Claims, CreateDmGroupRequest};
use parley_types::models::{DmGroup, User};

use crate::AppState;
use crate::error::ApiError;

/// Groups the caller belongs to, with participants expanded.
pub async fn list_dm_groups(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let rows = state.db.list_groups_for_user(&claims.sub.to_string())?;

    let mut groups = Vec::with_capacity(rows.len());
    for row in rows {
        groups.push(load_group(&state, row)?);
    }

    Ok(Json(groups))
}

/// Resolve-or-create by canonical participant set. The caller is unioned
/// into the set, so `participants` only needs the other members. Returns
/// 200 with the existing group or 201 with a freshly created one.
pub async fn create_dm_group(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateDmGroupRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if req.participants.is_empty() {
        return Err(ApiError::Validation("no participants provided".into()));
    }

    let member_ids = canonical_member_ids(claims.sub, &req.participants);

    let outcome = state.db.resolve_or_create_group(
        &member_ids,
        &Uuid::new_v4().to_string(),
        &Utc::now().to_rfc3339(),
    )?;

    let (row, status) = match outcome {
        ResolveGroup::Existing(row) => (row, StatusCode::OK),
        ResolveGroup::Created(row) => (row, StatusCode::CREATED),
        ResolveGroup::UnknownUsers(ids) => {
            return Err(ApiError::Validation(format!(
                "unknown participant ids: {}",
                ids.join(", ")
            )));
        }
    };

    let group = load_group(&state, row)?;
    Ok((status, Json(group)))
}

pub async fn get_dm_group(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(_claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let row = state
        .db
        .get_group(&id.to_string())?
        .ok_or_else(|| ApiError::NotFound(format!("dm group {id} not found")))?;

    Ok(Json(load_group(&state, row)?))
}

/// Deletes the group; membership rows and its messages cascade away.
pub async fn delete_dm_group(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(_claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    if !state.db.delete_group(&id.to_string())? {
        return Err(ApiError::NotFound(format!("dm group {id} not found")));
    }

    Ok(StatusCode::NO_CONTENT)
}

/// Canonical participant set: deduplicated, order-independent, with the
/// requester unioned in so callers need not list themselves.
fn canonical_member_ids(requester: Uuid, participants: &[Uuid]) -> BTreeSet<String> {
    participants
        .iter()
        .copied()
        .chain(std::iter::once(requester))
        .map(|id| id.to_string())
        .collect()
}

fn load_group(state: &AppState, row: DmGroupRow) -> Result<DmGroup, ApiError> {
    let participants = state
        .db
        .group_members(&row.id)?
        .into_iter()
        .map(|member| member.into_user())
        .collect::<anyhow::Result<Vec<User>>>()?;

    Ok(row.into_dm_group(participants)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_db::Database;

    fn seed_user(db: &Database, username: &str) -> Uuid {
        let id = Uuid::new_v4();
        db.create_user(
            &id.to_string(),
            username,
            &format!("{username}@example.com"),
            "hash",
            &Utc::now().to_rfc3339(),
        )
        .unwrap();
        id
    }

    #[test]
    fn requester_is_unioned_into_the_member_set() {
        let requester = Uuid::new_v4();
        let other = Uuid::new_v4();

        // Caller omits themselves; the set still contains them
        let set = canonical_member_ids(requester, &[other]);
        assert_eq!(set.len(), 2);
        assert!(set.contains(&requester.to_string()));

        // Caller lists themselves; the union is idempotent
        let explicit = canonical_member_ids(requester, &[other, requester]);
        assert_eq!(set, explicit);
    }

    #[test]
    fn either_party_resolves_to_the_same_group() {
        let db = Database::open_in_memory().unwrap();
        let a = seed_user(&db, "a");
        let b = seed_user(&db, "b");

        // A asks for a DM with [B], B asks for a DM with [A]
        let as_a = canonical_member_ids(a, &[b]);
        let as_b = canonical_member_ids(b, &[a]);
        assert_eq!(as_a, as_b);

        let first = db
            .resolve_or_create_group(&as_a, &Uuid::new_v4().to_string(), &Utc::now().to_rfc3339())
            .unwrap();
        let ResolveGroup::Created(created) = first else {
            panic!("first resolution should create the group");
        };

        // The second caller must land on the existing group, not a new one
        let second = db
            .resolve_or_create_group(&as_b, &Uuid::new_v4().to_string(), &Utc::now().to_rfc3339())
            .unwrap();
        let ResolveGroup::Existing(existing) = second else {
            panic!("second resolution should find the existing group");
        };
        assert_eq!(created.id, existing.id);

        let members = db.group_members(&created.id).unwrap();
        let ids: Vec<String> = members.into_iter().map(|m| m.id).collect();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&a.to_string()));
        assert!(ids.contains(&b.to_string()));
    }
}
