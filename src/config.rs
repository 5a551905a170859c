use std::env;
use std::time::Duration;

/// Environment-sourced settings. Defaults mirror a development setup:
/// open CORS, 60-second move timeout, 20-second keepalive pings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// WebSocket listener address (`SOCKET_ADDRESS`).
    pub socket_address: String,
    /// Informational HTTP endpoint address (`REST_ADDRESS`).
    pub rest_address: String,
    /// Allowed CORS origins, `ALLOWED_ORIGINS` as a JSON array of strings.
    /// `"*"` anywhere in the list means any origin.
    pub allowed_origins: Vec<String>,
    /// How long the engine waits for the active mover (`GAME_TIMEOUT`, seconds).
    pub game_timeout: Duration,
    /// Keepalive ping interval (`WS_PING_INTERVAL`, seconds).
    pub ping_interval: Duration,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let allowed_origins = env::var("ALLOWED_ORIGINS")
            .ok()
            .and_then(|raw| serde_json::from_str::<Vec<String>>(&raw).ok())
            .unwrap_or_else(|| vec!["*".to_owned()]);
        ServerConfig {
            socket_address: env::var("SOCKET_ADDRESS").unwrap_or_else(|_| "0.0.0.0:3001".to_owned()),
            rest_address: env::var("REST_ADDRESS").unwrap_or_else(|_| "0.0.0.0:8081".to_owned()),
            allowed_origins,
            game_timeout: seconds_from_env("GAME_TIMEOUT", 60),
            ping_interval: seconds_from_env("WS_PING_INTERVAL", 20),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            socket_address: "0.0.0.0:3001".to_owned(),
            rest_address: "0.0.0.0:8081".to_owned(),
            allowed_origins: vec!["*".to_owned()],
            game_timeout: Duration::from_secs(60),
            ping_interval: Duration::from_secs(20),
        }
    }
}

fn seconds_from_env(key: &str, default: u64) -> Duration {
    let seconds = env::var(key)
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(default);
    Duration::from_secs(seconds)
}
