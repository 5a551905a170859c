use serde_json::Value;
use tracing::{debug, warn};

use crate::model::messages::{ClientRequest, ConnectionId, MatchId, ServerMessage};
use crate::service::game_session;
use crate::service::registry::{PendingMove, Registry, SessionError};

/// Decodes one inbound text frame and dispatches it. Protocol errors are
/// answered with an `error` message; the connection always stays open.
pub async fn handle_message(registry: &Registry, user_id: ConnectionId, raw: &str) {
    let value: Value = match serde_json::from_str(raw) {
        Ok(value) => value,
        Err(_) => {
            registry
                .send(user_id, ServerMessage::error("Invalid message format"))
                .await;
            return;
        }
    };
    if !value.get("type").is_some_and(Value::is_string) {
        registry
            .send(user_id, ServerMessage::error("Missing 'type' field"))
            .await;
        return;
    }
    let request: ClientRequest = match serde_json::from_value(value) {
        Ok(request) => request,
        Err(error) => {
            // Known type, malformed fields.
            warn!("Rejecting request from {}: {}", user_id, error);
            registry
                .send(user_id, ServerMessage::error("Invalid message format"))
                .await;
            return;
        }
    };
    match request {
        ClientRequest::Username { username } => handle_username(registry, user_id, username).await,
        ClientRequest::SendInvite { invite_id } => {
            handle_send_invite(registry, user_id, invite_id).await
        }
        ClientRequest::InvitationResponse {
            accepted,
            from_user_id,
        } => handle_invitation_response(registry, user_id, accepted, from_user_id).await,
        ClientRequest::GameMove {
            session_id,
            position,
        } => handle_game_move(registry, user_id, session_id, position).await,
        ClientRequest::Leave {} => handle_leave(registry, user_id).await,
        ClientRequest::Unknown => {
            debug!("Ignoring message with unrecognized type from {}", user_id);
        }
    }
}

/// Stores the display name, welcomes the sender with their own id and
/// rebroadcasts the roster. An absent or empty name is a silent no-op.
async fn handle_username(registry: &Registry, user_id: ConnectionId, username: Option<String>) {
    let Some(username) = username.filter(|name| !name.is_empty()) else {
        return;
    };
    registry.set_username(user_id, username).await;
    registry
        .send(user_id, ServerMessage::Welcome { your_id: user_id })
        .await;
    registry.broadcast_player_list().await;
}

/// Forwards an invitation to the target if they are online. No invitation
/// state is stored; the protocol is entirely message-driven.
async fn handle_send_invite(
    registry: &Registry,
    user_id: ConnectionId,
    invite_id: Option<ConnectionId>,
) {
    let Some(invite_id) = invite_id else {
        registry
            .send(user_id, ServerMessage::error("Missing invite_id"))
            .await;
        return;
    };
    if registry.is_connected(invite_id).await {
        let from_username = registry
            .username(user_id)
            .await
            .unwrap_or_else(|| "Unknown".to_owned());
        registry
            .send(
                invite_id,
                ServerMessage::Invitation {
                    from_user_id: user_id,
                    from_username,
                },
            )
            .await;
    } else {
        registry
            .send(
                user_id,
                ServerMessage::error(format!("User {} is not currently online", invite_id)),
            )
            .await;
    }
}

/// A decline is forwarded to the inviter; an accept creates the match and
/// spawns its engine without waiting for it to finish. The inviter moves
/// first.
async fn handle_invitation_response(
    registry: &Registry,
    user_id: ConnectionId,
    accepted: Option<bool>,
    from_user_id: Option<ConnectionId>,
) {
    if !accepted.unwrap_or(false) {
        if let Some(from_user_id) = from_user_id {
            if registry.is_connected(from_user_id).await {
                registry
                    .send(
                        from_user_id,
                        ServerMessage::InvitationResponse {
                            accepted: false,
                            from_user_id: user_id,
                        },
                    )
                    .await;
            }
        }
        return;
    }
    let Some(from_user_id) = from_user_id else {
        registry
            .send(user_id, ServerMessage::error("Player is no longer available"))
            .await;
        return;
    };
    match registry.create_session(from_user_id, user_id).await {
        Ok((match_id, session)) => {
            game_session::spawn(registry.clone(), match_id, session);
        }
        Err(SessionError::PlayerUnavailable) => {
            registry
                .send(user_id, ServerMessage::error("Player is no longer available"))
                .await;
        }
        Err(SessionError::PlayerBusy) => {
            registry
                .send(user_id, ServerMessage::error("Player is already in a game"))
                .await;
        }
    }
}

/// Queues a move for the engine if the sender is the active mover.
/// Off-turn submissions never reach the queue.
async fn handle_game_move(
    registry: &Registry,
    user_id: ConnectionId,
    session_id: Option<MatchId>,
    position: Option<i64>,
) {
    let session = match session_id {
        Some(session_id) => registry.session(session_id).await,
        None => None,
    };
    let Some(session) = session else {
        registry
            .send(user_id, ServerMessage::error("Invalid game session"))
            .await;
        return;
    };
    let current_turn = session.state.lock().await.current_turn;
    if current_turn == user_id {
        if session.moves.sender.send(PendingMove { position }).await.is_err() {
            debug!("Session closed before move from {} was queued", user_id);
        }
    } else {
        registry
            .send(user_id, ServerMessage::error("Not your turn"))
            .await;
    }
}

async fn handle_leave(registry: &Registry, user_id: ConnectionId) {
    registry.disconnect(user_id).await;
    registry.broadcast_player_list().await;
}
