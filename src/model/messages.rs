use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::game::{Board, GameResult, Symbol};

/// Identifies one live client connection. Issued at accept time,
/// invalidated on disconnect, never reused.
#[derive(Debug, Hash, Eq, PartialEq, Clone, Copy)]
pub struct ConnectionId(pub Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        ConnectionId(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl<'de> Deserialize<'de> for ConnectionId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let uuid = Uuid::parse_str(&s).map_err(serde::de::Error::custom)?;
        Ok(ConnectionId(uuid))
    }
}

impl Serialize for ConnectionId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0.to_string())
    }
}

/// Identifies one in-progress match.
#[derive(Debug, Hash, Eq, PartialEq, Clone, Copy)]
pub struct MatchId(pub Uuid);

impl MatchId {
    pub fn new() -> Self {
        MatchId(Uuid::new_v4())
    }
}

impl Default for MatchId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl<'de> Deserialize<'de> for MatchId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let uuid = Uuid::parse_str(&s).map_err(serde::de::Error::custom)?;
        Ok(MatchId(uuid))
    }
}

impl Serialize for MatchId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0.to_string())
    }
}

/// Client commands. Fields are optional so that a missing field reaches the
/// handler, which resolves it to the specific error reply; only a wrong
/// field *type* fails deserialization. Unrecognized types collapse into
/// `Unknown` and are ignored by the router.
#[derive(Deserialize, Debug)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientRequest {
    Username {
        username: Option<String>,
    },
    SendInvite {
        invite_id: Option<ConnectionId>,
    },
    InvitationResponse {
        accepted: Option<bool>,
        from_user_id: Option<ConnectionId>,
    },
    GameMove {
        session_id: Option<MatchId>,
        position: Option<i64>,
    },
    Leave {},
    #[serde(other)]
    Unknown,
}

/// One roster entry in a `player_list` broadcast.
#[derive(Serialize, Debug, Clone)]
pub struct PlayerEntry {
    pub user_id: ConnectionId,
    pub username: String,
}

/// Server push messages.
#[derive(Serialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Welcome {
        your_id: ConnectionId,
    },
    PlayerList {
        players: Vec<PlayerEntry>,
    },
    Invitation {
        from_user_id: ConnectionId,
        from_username: String,
    },
    InvitationResponse {
        accepted: bool,
        from_user_id: ConnectionId,
    },
    YourTurn {
        session_id: MatchId,
        board: Board,
        your_symbol: Symbol,
    },
    WaitForTurn {
        session_id: MatchId,
        board: Board,
        your_symbol: Symbol,
    },
    GameOver {
        result: GameResult,
        #[serde(skip_serializing_if = "Option::is_none")]
        board: Option<Board>,
        #[serde(skip_serializing_if = "Option::is_none")]
        your_symbol: Option<Symbol>,
    },
    GameEnded {
        message: String,
    },
    Error {
        message: String,
    },
}

impl ServerMessage {
    pub fn error(message: impl Into<String>) -> Self {
        ServerMessage::Error {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requests_deserialize_by_type_tag() {
        let request: ClientRequest =
            serde_json::from_str(r#"{"type": "username", "username": "Alice"}"#).unwrap();
        assert!(matches!(
            request,
            ClientRequest::Username { username: Some(name) } if name == "Alice"
        ));
    }

    #[test]
    fn missing_fields_deserialize_as_none() {
        let request: ClientRequest = serde_json::from_str(r#"{"type": "send_invite"}"#).unwrap();
        assert!(matches!(
            request,
            ClientRequest::SendInvite { invite_id: None }
        ));
    }

    #[test]
    fn unknown_type_maps_to_unknown_variant() {
        let request: ClientRequest =
            serde_json::from_str(r#"{"type": "chat", "text": "hi"}"#).unwrap();
        assert!(matches!(request, ClientRequest::Unknown));
    }

    #[test]
    fn ids_round_trip_as_strings() {
        let id = ConnectionId::new();
        let json = serde_json::to_string(&id).unwrap();
        let back: ConnectionId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, back);
    }

    #[test]
    fn game_over_omits_absent_board() {
        let message = ServerMessage::GameOver {
            result: GameResult::Timeout,
            board: None,
            your_symbol: None,
        };
        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"type": "game_over", "result": "timeout"})
        );
    }
}
