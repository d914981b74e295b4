use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Destination, Message};

/// Events sent over the WebSocket gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayEvent {
    /// Server confirms successful authentication
    Ready { user_id: Uuid, username: String },

    /// A new message was appended to a channel or DM group
    MessageCreate { message: Message },
}

impl GatewayEvent {
    /// Returns the destination this event is scoped to. Events that return
    /// `None` are connection-local and never fan out.
    pub fn destination(&self) -> Option<Destination> {
        match self {
            Self::MessageCreate { message } => Some(message.destination),
            Self::Ready { .. } => None,
        }
    }
}

/// Commands sent FROM client TO server over WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayCommand {
    /// Authenticate the WebSocket connection
    Identify { token: String },

    /// Start receiving events for these destinations (additive)
    Subscribe { destinations: Vec<Destination> },

    /// Stop receiving events for these destinations
    Unsubscribe { destinations: Vec<Destination> },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscribe_command_round_trips() {
        let id = Uuid::new_v4();
        let raw = serde_json::json!({
            "type": "Subscribe",
            "data": { "destinations": [{ "kind": "channel", "id": id }] }
        });
        let cmd: GatewayCommand = serde_json::from_value(raw).unwrap();
        match cmd {
            GatewayCommand::Subscribe { destinations } => {
                assert_eq!(destinations, vec![Destination::Channel(id)]);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
