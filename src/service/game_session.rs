use std::time::Duration;

use tokio::time;
use tracing::{debug, error, info};

use crate::model::game::{GameResult, Outcome, Symbol};
use crate::model::messages::{ConnectionId, MatchId, ServerMessage};
use crate::service::registry::{Registry, SessionHandle};

/// Pause after a terminal result so clients can render the final board
/// before the cleanup notice arrives.
const GRACE_DELAY: Duration = Duration::from_secs(2);

/// Spawns the engine for a freshly created match, plus a supervisor that
/// turns a panicked engine into a normal termination notice instead of a
/// silently dead match.
pub fn spawn(registry: Registry, match_id: MatchId, session: SessionHandle) {
    let supervisor_registry = registry.clone();
    let players = session.players;
    let handle = tokio::spawn(run(registry, match_id, session));
    tokio::spawn(async move {
        if let Err(join_error) = handle.await {
            if join_error.is_panic() {
                error!("Session {} panicked: {}", match_id, join_error);
                supervisor_registry.end_session(match_id, players).await;
            }
        }
    });
}

/// The per-match control loop. Alternates turn prompts, consumes one queued
/// move per turn, forfeits both sides on timeout. The board is only ever
/// mutated here; handlers push moves through the session's channel.
pub async fn run(registry: Registry, match_id: MatchId, session: SessionHandle) {
    let mut cancel = session.cancel.subscribe();
    let moves = session.moves.receiver.clone();
    // Sole consumer; hold the receiver for the lifetime of the loop.
    let mut moves = moves.lock().await;
    let (first_mover, second_mover) = session.players;
    let symbol_of = |id: ConnectionId| {
        if id == first_mover {
            Symbol::X
        } else {
            Symbol::O
        }
    };

    info!("Session {} started", match_id);
    loop {
        // A participant disconnect may have pruned the session before we
        // subscribed to the cancel channel.
        if !registry.session_active(match_id).await {
            break;
        }
        let (board, current) = {
            let state = session.state.lock().await;
            (state.board, state.current_turn)
        };
        let opponent = if current == first_mover {
            second_mover
        } else {
            first_mover
        };

        match board.outcome() {
            Some(outcome) => {
                let (winner, loser_result) = match outcome {
                    Outcome::Winner(mark) => {
                        // The mark's owner wins, whatever the turn cursor says.
                        let winner = if mark == Symbol::X { first_mover } else { second_mover };
                        (winner, GameResult::Loss)
                    }
                    Outcome::Draw => (current, GameResult::Draw),
                };
                let winner_result = if loser_result == GameResult::Draw {
                    GameResult::Draw
                } else {
                    GameResult::Win
                };
                let loser = if winner == first_mover { second_mover } else { first_mover };
                registry
                    .send(
                        winner,
                        ServerMessage::GameOver {
                            result: winner_result,
                            board: Some(board),
                            your_symbol: Some(symbol_of(winner)),
                        },
                    )
                    .await;
                registry
                    .send(
                        loser,
                        ServerMessage::GameOver {
                            result: loser_result,
                            board: Some(board),
                            your_symbol: Some(symbol_of(loser)),
                        },
                    )
                    .await;
                time::sleep(GRACE_DELAY).await;
                break;
            }
            None => {
                registry
                    .send(
                        current,
                        ServerMessage::YourTurn {
                            session_id: match_id,
                            board,
                            your_symbol: symbol_of(current),
                        },
                    )
                    .await;
                registry
                    .send(
                        opponent,
                        ServerMessage::WaitForTurn {
                            session_id: match_id,
                            board,
                            your_symbol: symbol_of(opponent),
                        },
                    )
                    .await;

                tokio::select! {
                    _ = cancel.recv() => {
                        debug!("Session {} cancelled", match_id);
                        break;
                    }
                    result = time::timeout(registry.game_timeout(), moves.recv()) => {
                        match result {
                            Err(_elapsed) => {
                                let timeout_notice = || ServerMessage::GameOver {
                                    result: GameResult::Timeout,
                                    board: None,
                                    your_symbol: None,
                                };
                                registry.send(current, timeout_notice()).await;
                                registry.send(opponent, timeout_notice()).await;
                                time::sleep(GRACE_DELAY).await;
                                break;
                            }
                            Ok(None) => break,
                            Ok(Some(pending)) => {
                                // An invalid move is discarded without
                                // advancing the turn; the same player is
                                // re-prompted on the next iteration.
                                let Some(position) = pending.position else {
                                    continue;
                                };
                                if !(0..9).contains(&position) {
                                    continue;
                                }
                                let position = position as usize;
                                let mut state = session.state.lock().await;
                                if state.board.cell(position).is_none() {
                                    state.board.set(position, symbol_of(current));
                                    state.current_turn = opponent;
                                }
                            }
                        }
                    }
                }
            }
        }
    }
    info!("Session {} finished", match_id);
    registry.end_session(match_id, (first_mover, second_mover)).await;
}
