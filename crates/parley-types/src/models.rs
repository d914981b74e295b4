use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workspace {
    pub id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Channel {
    pub id: Uuid,
    pub name: String,
    pub workspace_id: Uuid,
    pub is_chain: bool,
    pub created_at: DateTime<Utc>,
}

/// A direct-message group. Its logical identity is the exact participant
/// set — the id is a handle, never the deduplication key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DmGroup {
    pub id: Uuid,
    pub participants: Vec<User>,
    pub created_at: DateTime<Utc>,
}

/// Where a message lives: a channel or a DM group, never both, never
/// neither. Modeled as a tagged union so the invariant holds structurally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Destination {
    Channel(Uuid),
    DmGroup(Uuid),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub sender_id: Uuid,
    pub sender_username: String,
    pub content: String,
    pub destination: Destination,
    pub created_at: DateTime<Utc>,
}

/// History ordering. Both are first-class: channel views read oldest-first,
/// DM views read newest-first, but either destination accepts either order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageOrder {
    OldestFirst,
    NewestFirst,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn destination_serde_is_tagged() {
        let id = Uuid::new_v4();
        let json = serde_json::to_value(Destination::Channel(id)).unwrap();
        assert_eq!(json["kind"], "channel");
        assert_eq!(json["id"], id.to_string());

        let back: Destination =
            serde_json::from_value(serde_json::json!({ "kind": "dm_group", "id": id })).unwrap();
        assert_eq!(back, Destination::DmGroup(id));
    }

    #[test]
    fn message_order_accepts_both_names() {
        let o: MessageOrder = serde_json::from_str("\"oldest_first\"").unwrap();
        assert_eq!(o, MessageOrder::OldestFirst);
        let o: MessageOrder = serde_json::from_str("\"newest_first\"").unwrap();
        assert_eq!(o, MessageOrder::NewestFirst);
    }
}
