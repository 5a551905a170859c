use std::{collections::HashMap, sync::Arc, time::Duration};

use tokio::sync::{broadcast, mpsc, Mutex};
use tracing::{debug, info, warn};

use crate::model::game::Board;
use crate::model::messages::{ConnectionId, MatchId, PlayerEntry, ServerMessage};
use crate::utility::Channel;

/// A move handed from the `game_move` handler to the match engine.
/// Position is passed through unvalidated; the engine decides.
#[derive(Debug, Clone)]
pub struct PendingMove {
    pub position: Option<i64>,
}

/// Board and turn cursor, mutated only by the engine's loop.
#[derive(Debug)]
pub struct SessionState {
    pub board: Board,
    pub current_turn: ConnectionId,
}

/// Shared handle to one live match. Cloned into the engine task at spawn
/// time; the registry keeps another clone so the router can reach the
/// pending-move channel.
#[derive(Clone, Debug)]
pub struct SessionHandle {
    pub players: (ConnectionId, ConnectionId),
    pub state: Arc<Mutex<SessionState>>,
    pub moves: Channel<PendingMove>,
    /// Fired by `disconnect` so the engine stops instead of waiting out
    /// the move timeout.
    pub cancel: broadcast::Sender<()>,
}

impl SessionHandle {
    fn new(first_mover: ConnectionId, second_mover: ConnectionId) -> Self {
        let (cancel, _) = broadcast::channel(1);
        SessionHandle {
            players: (first_mover, second_mover),
            state: Arc::new(Mutex::new(SessionState {
                board: Board::default(),
                current_turn: first_mover,
            })),
            moves: Channel::from(mpsc::channel(32)),
            cancel,
        }
    }

    pub fn involves(&self, id: ConnectionId) -> bool {
        self.players.0 == id || self.players.1 == id
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum SessionError {
    /// One of the participants is no longer connected.
    PlayerUnavailable,
    /// One of the participants is already in a live match.
    PlayerBusy,
}

struct RegistryState {
    connections: HashMap<ConnectionId, mpsc::Sender<ServerMessage>>,
    players: HashMap<ConnectionId, String>,
    sessions: HashMap<MatchId, SessionHandle>,
}

/// The hub: connection, name and session maps behind one mutex, handed by
/// clone to every connection task and match engine. Delivery is
/// best-effort; a failed send degrades into a disconnect of that peer and
/// is never surfaced to the caller.
#[derive(Clone)]
pub struct Registry {
    state: Arc<Mutex<RegistryState>>,
    game_timeout: Duration,
}

impl Registry {
    pub fn new(game_timeout: Duration) -> Self {
        Registry {
            state: Arc::new(Mutex::new(RegistryState {
                connections: HashMap::new(),
                players: HashMap::new(),
                sessions: HashMap::new(),
            })),
            game_timeout,
        }
    }

    pub fn game_timeout(&self) -> Duration {
        self.game_timeout
    }

    /// Registers a new connection's outbound channel and issues its id.
    pub async fn connect(&self, sender: mpsc::Sender<ServerMessage>) -> ConnectionId {
        let id = ConnectionId::new();
        self.state.lock().await.connections.insert(id, sender);
        info!("Registered connection {}", id);
        id
    }

    /// Idempotent. Drops the outbound channel (which closes the socket
    /// task), forgets the name, and cancels any match the id is part of.
    /// Does not rebroadcast the roster; callers decide that.
    pub async fn disconnect(&self, id: ConnectionId) {
        let mut state = self.state.lock().await;
        if state.connections.remove(&id).is_some() {
            info!("Removed connection {}", id);
        }
        state.players.remove(&id);
        state.sessions.retain(|match_id, session| {
            if session.involves(id) {
                debug!("Cancelling session {} after {} disconnected", match_id, id);
                let _ = session.cancel.send(());
                false
            } else {
                true
            }
        });
    }

    pub async fn is_connected(&self, id: ConnectionId) -> bool {
        self.state.lock().await.connections.contains_key(&id)
    }

    /// Best-effort point-to-point delivery. Unknown ids are ignored; a
    /// closed channel cascades into `disconnect`.
    pub async fn send(&self, id: ConnectionId, message: ServerMessage) {
        let sender = self.state.lock().await.connections.get(&id).cloned();
        let Some(sender) = sender else {
            return;
        };
        if sender.send(message).await.is_err() {
            warn!("Send to {} failed, disconnecting", id);
            self.disconnect(id).await;
        }
    }

    /// Delivers to every connection except `exclude`. Unreachable peers are
    /// collected during the pass and disconnected afterwards.
    pub async fn broadcast(&self, message: ServerMessage, exclude: Option<ConnectionId>) {
        let targets: Vec<(ConnectionId, mpsc::Sender<ServerMessage>)> = {
            let state = self.state.lock().await;
            state
                .connections
                .iter()
                .filter(|(id, _)| Some(**id) != exclude)
                .map(|(id, sender)| (*id, sender.clone()))
                .collect()
        };
        let mut closed = Vec::new();
        for (id, sender) in targets {
            if sender.send(message.clone()).await.is_err() {
                closed.push(id);
            }
        }
        for id in closed {
            warn!("Broadcast to {} failed, disconnecting", id);
            self.disconnect(id).await;
        }
    }

    /// Prunes the name map to live connections, then broadcasts the full
    /// roster. Called after any join, leave or name announcement.
    pub async fn broadcast_player_list(&self) {
        let players = {
            let mut state = self.state.lock().await;
            let stale: Vec<ConnectionId> = state
                .players
                .keys()
                .filter(|id| !state.connections.contains_key(id))
                .copied()
                .collect();
            for id in stale {
                state.players.remove(&id);
            }
            state
                .players
                .iter()
                .map(|(id, username)| PlayerEntry {
                    user_id: *id,
                    username: username.clone(),
                })
                .collect()
        };
        self.broadcast(ServerMessage::PlayerList { players }, None)
            .await;
    }

    pub async fn set_username(&self, id: ConnectionId, username: String) {
        self.state.lock().await.players.insert(id, username);
    }

    pub async fn username(&self, id: ConnectionId) -> Option<String> {
        self.state.lock().await.players.get(&id).cloned()
    }

    /// Creates a match with `first_mover` (the inviter) to move first.
    /// Both participants must still be connected and neither may already be
    /// in a live match.
    pub async fn create_session(
        &self,
        first_mover: ConnectionId,
        second_mover: ConnectionId,
    ) -> Result<(MatchId, SessionHandle), SessionError> {
        let mut state = self.state.lock().await;
        if !state.connections.contains_key(&first_mover)
            || !state.connections.contains_key(&second_mover)
        {
            return Err(SessionError::PlayerUnavailable);
        }
        let busy = state
            .sessions
            .values()
            .any(|session| session.involves(first_mover) || session.involves(second_mover));
        if busy {
            return Err(SessionError::PlayerBusy);
        }
        let match_id = MatchId::new();
        let session = SessionHandle::new(first_mover, second_mover);
        state.sessions.insert(match_id, session.clone());
        info!(
            "Created session {} ({} vs {})",
            match_id, first_mover, second_mover
        );
        Ok((match_id, session))
    }

    pub async fn session(&self, match_id: MatchId) -> Option<SessionHandle> {
        self.state.lock().await.sessions.get(&match_id).cloned()
    }

    pub async fn session_active(&self, match_id: MatchId) -> bool {
        self.state.lock().await.sessions.contains_key(&match_id)
    }

    /// Removes the match (if still registered) and sends both participants
    /// the courtesy notice. Sends to departed connections are no-ops.
    pub async fn end_session(&self, match_id: MatchId, players: (ConnectionId, ConnectionId)) {
        if self.state.lock().await.sessions.remove(&match_id).is_some() {
            info!("Removed session {}", match_id);
        }
        let notice = || ServerMessage::GameEnded {
            message: "Game ended. You can start a new game.".to_owned(),
        };
        self.send(players.0, notice()).await;
        self.send(players.1, notice()).await;
    }
}
