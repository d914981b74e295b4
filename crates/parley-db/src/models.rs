//! Database row types — these map directly to SQLite rows.
//! Distinct from the parley-types API models to keep the DB layer
//! independent; conversions live here and fail loudly on corrupt rows.

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use parley_types::models::{Channel, Destination, DmGroup, Message, User, Workspace};
use uuid::Uuid;

pub struct UserRow {
    pub id: String,
    pub username: String,
    pub email: String,
    pub password: String,
    pub created_at: String,
}

pub struct WorkspaceRow {
    pub id: String,
    pub name: String,
    pub created_at: String,
}

pub struct ChannelRow {
    pub id: String,
    pub name: String,
    pub workspace_id: String,
    pub is_chain: bool,
    pub created_at: String,
}

pub struct DmGroupRow {
    pub id: String,
    pub created_at: String,
}

pub struct MessageRow {
    pub id: String,
    pub sender_id: String,
    pub sender_username: String,
    pub channel_id: Option<String>,
    pub dm_group_id: Option<String>,
    pub content: String,
    pub created_at: String,
}

pub(crate) fn parse_id(raw: &str) -> Result<Uuid> {
    raw.parse().with_context(|| format!("corrupt uuid '{raw}'"))
}

pub(crate) fn parse_ts(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .with_context(|| format!("corrupt timestamp '{raw}'"))
}

impl UserRow {
    pub fn into_user(self) -> Result<User> {
        Ok(User {
            id: parse_id(&self.id)?,
            username: self.username,
            email: self.email,
            created_at: parse_ts(&self.created_at)?,
        })
    }
}

impl WorkspaceRow {
    pub fn into_workspace(self) -> Result<Workspace> {
        Ok(Workspace {
            id: parse_id(&self.id)?,
            name: self.name,
            created_at: parse_ts(&self.created_at)?,
        })
    }
}

impl ChannelRow {
    pub fn into_channel(self) -> Result<Channel> {
        Ok(Channel {
            id: parse_id(&self.id)?,
            name: self.name,
            workspace_id: parse_id(&self.workspace_id)?,
            is_chain: self.is_chain,
            created_at: parse_ts(&self.created_at)?,
        })
    }
}

impl DmGroupRow {
    pub fn into_dm_group(self, participants: Vec<User>) -> Result<DmGroup> {
        Ok(DmGroup {
            id: parse_id(&self.id)?,
            participants,
            created_at: parse_ts(&self.created_at)?,
        })
    }
}

impl MessageRow {
    /// Enforces the exactly-one-destination invariant on decode: a row with
    /// both or neither reference set never becomes a domain `Message`.
    pub fn into_message(self) -> Result<Message> {
        let destination = match (&self.channel_id, &self.dm_group_id) {
            (Some(cid), None) => Destination::Channel(parse_id(cid)?),
            (None, Some(gid)) => Destination::DmGroup(parse_id(gid)?),
            _ => bail!("message '{}' has an ambiguous destination", self.id),
        };

        Ok(Message {
            id: parse_id(&self.id)?,
            sender_id: parse_id(&self.sender_id)?,
            sender_username: self.sender_username,
            content: self.content,
            destination,
            created_at: parse_ts(&self.created_at)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(channel: Option<&str>, dm: Option<&str>) -> MessageRow {
        MessageRow {
            id: Uuid::new_v4().to_string(),
            sender_id: Uuid::new_v4().to_string(),
            sender_username: "ada".into(),
            channel_id: channel.map(str::to_string),
            dm_group_id: dm.map(str::to_string),
            content: "hi".into(),
            created_at: Utc::now().to_rfc3339(),
        }
    }

    #[test]
    fn message_requires_exactly_one_destination() {
        let cid = Uuid::new_v4().to_string();
        let gid = Uuid::new_v4().to_string();

        assert!(row(Some(&cid), None).into_message().is_ok());
        assert!(row(None, Some(&gid)).into_message().is_ok());
        assert!(row(Some(&cid), Some(&gid)).into_message().is_err());
        assert!(row(None, None).into_message().is_err());
    }
}
