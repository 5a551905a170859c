use std::{net::SocketAddr, time::Duration};

use futures_util::{SinkExt, StreamExt};
use tokio::{
    net::{TcpListener, TcpStream},
    sync::{broadcast, mpsc},
    time,
};
use tokio_tungstenite::{
    accept_async,
    tungstenite::{
        protocol::{frame::coding::CloseCode, CloseFrame},
        Message,
    },
};
use tracing::{debug, error, info, warn};

use crate::model::messages::ConnectionId;
use crate::service::registry::Registry;
use crate::service::router;

enum CloseReason {
    /// The peer closed the socket or the transport failed.
    ClientGone,
    /// The registry dropped this connection (leave, or send-failure cleanup).
    Evicted,
}

/// Accepts websocket connections and spawns one task per connection.
pub struct GameSocket {
    registry: Registry,
    ping_interval: Duration,
}

impl GameSocket {
    pub fn new(registry: Registry, ping_interval: Duration) -> Self {
        GameSocket {
            registry,
            ping_interval,
        }
    }

    /// Accept loop over a pre-bound listener, so callers can signal
    /// readiness only once the port is actually open.
    pub async fn listen(&self, listener: TcpListener, shutdown_receiver: &mut broadcast::Receiver<()>) {
        info!(
            "Initialized ws listener: {}",
            listener.local_addr().expect("Listener has no local address")
        );
        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Err(e) => {
                            error!("Failed to accept connection: {}", e);
                        }
                        Ok((stream, address)) => {
                            tokio::spawn(Self::connection_thread(
                                self.registry.clone(),
                                stream,
                                address,
                                self.ping_interval,
                            ));
                        }
                    }
                },
                _ = shutdown_receiver.recv() => {
                    break;
                }
            };
        }
        info!("Exited ws listener");
    }

    // Task owning one connection's lifetime: registers with the registry,
    // forwards outbound messages, feeds inbound frames to the router, and
    // pings on an interval.
    async fn connection_thread(
        registry: Registry,
        stream: TcpStream,
        address: SocketAddr,
        ping_interval: Duration,
    ) {
        info!("New ws connection: {}", address);
        let stream = match accept_async(stream).await {
            Ok(stream) => stream,
            Err(e) => {
                warn!("Handshake with {} failed: {}", address, e);
                return;
            }
        };
        let (mut ws_sender, mut ws_receiver) = stream.split();

        let (outbound_sender, mut outbound_receiver) = mpsc::channel(100);
        let user_id: ConnectionId = registry.connect(outbound_sender).await;
        debug!("Listening to {:?}", user_id);

        let mut ping = time::interval(ping_interval);
        ping.tick().await; // First tick completes immediately.

        let reason = loop {
            tokio::select! {
                // Push messages queued by the registry or a match engine.
                message = outbound_receiver.recv() => {
                    let Some(message) = message else {
                        break CloseReason::Evicted;
                    };
                    let body = serde_json::to_string(&message)
                        .expect("Could not serialize response.");
                    if ws_sender.send(Message::Text(body)).await.is_err() {
                        break CloseReason::ClientGone;
                    }
                }

                msg = ws_receiver.next() => {
                    match msg {
                        None => break CloseReason::ClientGone,
                        Some(Err(e)) => {
                            warn!("Error receiving from {}: {}", user_id, e);
                            break CloseReason::ClientGone;
                        }
                        Some(Ok(Message::Text(text))) => {
                            router::handle_message(&registry, user_id, &text).await;
                        }
                        Some(Ok(Message::Close(_))) => break CloseReason::ClientGone,
                        // Pong replies are handled by tungstenite on write;
                        // other frame types carry nothing for us.
                        Some(Ok(_)) => {}
                    }
                }

                _ = ping.tick() => {
                    if ws_sender.send(Message::Ping(Vec::new())).await.is_err() {
                        break CloseReason::ClientGone;
                    }
                }
            };
        };

        match reason {
            CloseReason::ClientGone => {
                registry.disconnect(user_id).await;
                registry.broadcast_player_list().await;
                info!("Connection {} closed by peer", user_id);
            }
            CloseReason::Evicted => {
                // Whoever evicted us already did the bookkeeping.
                let _ = ws_sender
                    .send(Message::Close(Some(CloseFrame {
                        code: CloseCode::Normal,
                        reason: "Connection closed by server".into(),
                    })))
                    .await;
                info!("Connection {} closed by server", user_id);
            }
        }
    }
}
