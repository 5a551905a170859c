use axum::{http::HeaderValue, routing::get, Json, Router};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn, Level};

use crate::config::ServerConfig;
use crate::service::registry::Registry;
use crate::service::socket::GameSocket;

/// Binds both listeners, then runs the websocket service and the
/// informational HTTP endpoint until shutdown. The ready signal fires only
/// after both ports are open, so callers can connect immediately.
pub async fn serve(
    config: ServerConfig,
    shutdown_receiver: broadcast::Receiver<()>,
    ready_signal: Option<tokio::sync::oneshot::Sender<()>>,
) {
    let registry = Registry::new(config.game_timeout);
    let mut ws_shutdown_receiver = shutdown_receiver.resubscribe();
    let rest_shutdown_receiver = shutdown_receiver.resubscribe();

    let ws_listener = TcpListener::bind(&config.socket_address)
        .await
        .unwrap_or_else(|e| panic!("Failed to bind to {}: {}", config.socket_address, e));
    let rest_listener = TcpListener::bind(&config.rest_address)
        .await
        .unwrap_or_else(|e| panic!("Failed to bind to {}: {}", config.rest_address, e));

    let socket = GameSocket::new(registry, config.ping_interval);
    let websocket_handle: JoinHandle<()> = tokio::spawn(async move {
        socket.listen(ws_listener, &mut ws_shutdown_receiver).await
    });
    let allowed_origins = config.allowed_origins.clone();
    let rest_handle: JoinHandle<()> = tokio::spawn(async move {
        info_endpoint_thread(rest_listener, allowed_origins, rest_shutdown_receiver).await
    });

    if let Some(ready_signal) = ready_signal {
        info!("Sent ready");
        ready_signal.send(()).expect("Failed to send ready signal");
    }

    websocket_handle
        .await
        .expect("Websocket exited non-gracefully");
    rest_handle
        .await
        .expect("Info endpoint exited non-gracefully");
}

/// Non-core informational endpoint: static service metadata at `/`.
async fn info_endpoint_thread(
    listener: TcpListener,
    allowed_origins: Vec<String>,
    mut shutdown_receiver: broadcast::Receiver<()>,
) {
    let app: Router = Router::new()
        .route("/", get(service_info))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&allowed_origins));
    info!(
        "Info endpoint listening on {}",
        listener.local_addr().expect("Listener has no local address")
    );
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_receiver
                .recv()
                .await
                .expect("Failed to receive shutdown signal");
        })
        .await
        .unwrap();
}

async fn service_info() -> Json<Value> {
    Json(json!({
        "name": "Tic Tac Toe WebSocket Game",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "A real-time multiplayer Tic Tac Toe game over WebSocket",
    }))
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    if allowed_origins.iter().any(|origin| origin == "*") {
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
    }
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| {
            origin
                .parse()
                .map_err(|e| warn!("Skipping unparseable origin {}: {}", origin, e))
                .ok()
        })
        .collect();
    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(Any)
        .allow_headers(Any)
}

/// Spawns a server and waits until it is accepting connections. Used by
/// the integration tests.
pub struct GameServer {
    pub config: ServerConfig,
    shutdown_sender: broadcast::Sender<()>,
}

impl GameServer {
    pub async fn new(config: ServerConfig) -> Self {
        // Init logging, ignore error if already set
        let _ = tracing_subscriber::fmt()
            .with_line_number(true)
            .with_file(true)
            .with_max_level(Level::DEBUG)
            .try_init();

        let (shutdown_sender, shutdown_receiver) = broadcast::channel(1);
        let (ready_sender, ready_receiver) = tokio::sync::oneshot::channel();

        let moved_cfg = config.clone();
        tokio::spawn(serve(moved_cfg, shutdown_receiver, Some(ready_sender)));

        // Wait for server to be ready
        ready_receiver.await.expect("Server failed to start");

        GameServer {
            shutdown_sender,
            config,
        }
    }

    pub async fn shutdown(&self) {
        self.shutdown_sender.send(()).expect("Failed to shutdown");
    }
}
