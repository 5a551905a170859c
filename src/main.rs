use tictactoe_server::config::ServerConfig;
use tictactoe_server::entrypoint::serve;
use tictactoe_server::utility::create_shutdown_channel;
use tracing::{debug, Level};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_line_number(true)
        .with_file(true)
        .with_max_level(Level::DEBUG)
        .init();
    let config = ServerConfig::from_env();
    debug!(?config, "Loaded configuration");
    let shutdown_receiver = create_shutdown_channel().await;
    serve(config, shutdown_receiver, None).await;
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;
    use tictactoe_server::config::ServerConfig;
    use tictactoe_server::entrypoint::GameServer;
    use tictactoe_server::test::TestClient;
    use tictactoe_server::utility::random_address;
    use uuid::Uuid;

    async fn test_server(game_timeout: Duration) -> GameServer {
        let config = ServerConfig {
            socket_address: random_address().await,
            rest_address: random_address().await,
            game_timeout,
            ..ServerConfig::default()
        };
        GameServer::new(config).await
    }

    /// Connects a client and announces its display name; returns the
    /// client plus the id the server issued in `welcome`.
    async fn named_client(address: &str, name: &str) -> (TestClient, String) {
        let mut client = TestClient::connect(address).await;
        client
            .send(json!({"type": "username", "username": name}))
            .await;
        let welcome = client.recv_type("welcome").await;
        let id = welcome["your_id"]
            .as_str()
            .expect("welcome should carry your_id")
            .to_owned();
        (client, id)
    }

    /// Runs the invite/accept handshake and returns the session id from
    /// the inviter's first `your_turn` prompt.
    async fn start_match(
        inviter: &mut TestClient,
        inviter_id: &str,
        responder: &mut TestClient,
        responder_id: &str,
    ) -> String {
        inviter
            .send(json!({"type": "send_invite", "invite_id": responder_id}))
            .await;
        let invitation = responder.recv_type("invitation").await;
        assert_eq!(invitation["from_user_id"], inviter_id);
        responder
            .send(json!({
                "type": "invitation_response",
                "accepted": true,
                "from_user_id": inviter_id,
            }))
            .await;
        let prompt = inviter.recv_type("your_turn").await;
        assert_eq!(prompt["your_symbol"], "X");
        let wait = responder.recv_type("wait_for_turn").await;
        assert_eq!(wait["your_symbol"], "O");
        prompt["session_id"]
            .as_str()
            .expect("your_turn should carry session_id")
            .to_owned()
    }

    #[tokio::test]
    async fn announce_name_yields_welcome_and_roster() {
        let server = test_server(Duration::from_secs(60)).await;
        let (mut alice, alice_id) = named_client(&server.config.socket_address, "Alice").await;

        let roster = alice.recv_type("player_list").await;
        let players = roster["players"].as_array().unwrap();
        assert_eq!(players.len(), 1);
        assert_eq!(players[0]["user_id"], alice_id.as_str());
        assert_eq!(players[0]["username"], "Alice");
        server.shutdown().await;
    }

    #[tokio::test]
    async fn invite_accept_and_first_move() {
        let server = test_server(Duration::from_secs(60)).await;
        let address = server.config.socket_address.clone();
        let (mut alice, alice_id) = named_client(&address, "Alice").await;
        let (mut bob, bob_id) = named_client(&address, "Bob").await;

        let session_id = start_match(&mut alice, &alice_id, &mut bob, &bob_id).await;

        alice
            .send(json!({"type": "game_move", "session_id": session_id, "position": 4}))
            .await;
        let prompt = bob.recv_type("your_turn").await;
        assert_eq!(prompt["board"][4], "X");
        let wait = alice.recv_type("wait_for_turn").await;
        assert_eq!(wait["board"][4], "X");
        server.shutdown().await;
    }

    #[tokio::test]
    async fn off_turn_and_unknown_session_moves_are_rejected() {
        let server = test_server(Duration::from_secs(60)).await;
        let address = server.config.socket_address.clone();
        let (mut alice, alice_id) = named_client(&address, "Alice").await;
        let (mut bob, bob_id) = named_client(&address, "Bob").await;
        let session_id = start_match(&mut alice, &alice_id, &mut bob, &bob_id).await;

        // It is Alice's turn; Bob's move never reaches the board.
        bob.send(json!({"type": "game_move", "session_id": session_id, "position": 0}))
            .await;
        let error = bob.recv_type("error").await;
        assert_eq!(error["message"], "Not your turn");

        alice
            .send(json!({"type": "game_move", "session_id": Uuid::new_v4().to_string(), "position": 0}))
            .await;
        let error = alice.recv_type("error").await;
        assert_eq!(error["message"], "Invalid game session");
        server.shutdown().await;
    }

    #[tokio::test]
    async fn full_game_reports_win_loss_and_cleanup() {
        let server = test_server(Duration::from_secs(60)).await;
        let address = server.config.socket_address.clone();
        let (mut alice, alice_id) = named_client(&address, "Alice").await;
        let (mut bob, bob_id) = named_client(&address, "Bob").await;
        let session_id = start_match(&mut alice, &alice_id, &mut bob, &bob_id).await;

        // Alice takes the top row; Bob answers in the middle row. The
        // initial prompts were consumed by start_match, so each later move
        // waits for its own prompt.
        alice
            .send(json!({"type": "game_move", "session_id": session_id, "position": 0}))
            .await;
        bob.recv_type("your_turn").await;
        bob.send(json!({"type": "game_move", "session_id": session_id, "position": 3}))
            .await;
        alice.recv_type("your_turn").await;
        alice
            .send(json!({"type": "game_move", "session_id": session_id, "position": 1}))
            .await;
        bob.recv_type("your_turn").await;
        bob.send(json!({"type": "game_move", "session_id": session_id, "position": 4}))
            .await;
        alice.recv_type("your_turn").await;
        alice
            .send(json!({"type": "game_move", "session_id": session_id, "position": 2}))
            .await;

        let over = alice.recv_type("game_over").await;
        assert_eq!(over["result"], "win");
        assert_eq!(over["your_symbol"], "X");
        assert_eq!(over["board"][0], "X");
        let over = bob.recv_type("game_over").await;
        assert_eq!(over["result"], "loss");

        alice.recv_type("game_ended").await;
        bob.recv_type("game_ended").await;
        server.shutdown().await;
    }

    #[tokio::test]
    async fn no_move_before_timeout_forfeits_both_players() {
        let server = test_server(Duration::from_secs(1)).await;
        let address = server.config.socket_address.clone();
        let (mut alice, alice_id) = named_client(&address, "Alice").await;
        let (mut bob, bob_id) = named_client(&address, "Bob").await;
        start_match(&mut alice, &alice_id, &mut bob, &bob_id).await;

        let over = alice.recv_type("game_over").await;
        assert_eq!(over["result"], "timeout");
        let over = bob.recv_type("game_over").await;
        assert_eq!(over["result"], "timeout");
        alice.recv_type("game_ended").await;
        bob.recv_type("game_ended").await;
        server.shutdown().await;
    }

    #[tokio::test]
    async fn declined_invitation_is_forwarded_to_inviter() {
        let server = test_server(Duration::from_secs(60)).await;
        let address = server.config.socket_address.clone();
        let (mut alice, alice_id) = named_client(&address, "Alice").await;
        let (mut bob, bob_id) = named_client(&address, "Bob").await;

        alice
            .send(json!({"type": "send_invite", "invite_id": bob_id}))
            .await;
        bob.recv_type("invitation").await;
        bob.send(json!({
            "type": "invitation_response",
            "accepted": false,
            "from_user_id": alice_id,
        }))
        .await;
        let response = alice.recv_type("invitation_response").await;
        assert_eq!(response["accepted"], false);
        assert_eq!(response["from_user_id"], bob_id.as_str());
        server.shutdown().await;
    }

    #[tokio::test]
    async fn invite_errors_for_missing_and_offline_targets() {
        let server = test_server(Duration::from_secs(60)).await;
        let address = server.config.socket_address.clone();
        let (mut alice, _alice_id) = named_client(&address, "Alice").await;

        alice.send(json!({"type": "send_invite"})).await;
        let error = alice.recv_type("error").await;
        assert_eq!(error["message"], "Missing invite_id");

        let ghost = Uuid::new_v4().to_string();
        alice
            .send(json!({"type": "send_invite", "invite_id": ghost}))
            .await;
        let error = alice.recv_type("error").await;
        assert_eq!(
            error["message"],
            format!("User {} is not currently online", ghost)
        );
        server.shutdown().await;
    }

    #[tokio::test]
    async fn accepting_from_a_departed_inviter_fails() {
        let server = test_server(Duration::from_secs(60)).await;
        let address = server.config.socket_address.clone();
        let (mut bob, _bob_id) = named_client(&address, "Bob").await;

        bob.send(json!({
            "type": "invitation_response",
            "accepted": true,
            "from_user_id": Uuid::new_v4().to_string(),
        }))
        .await;
        let error = bob.recv_type("error").await;
        assert_eq!(error["message"], "Player is no longer available");
        server.shutdown().await;
    }

    #[tokio::test]
    async fn busy_player_cannot_enter_a_second_match() {
        let server = test_server(Duration::from_secs(60)).await;
        let address = server.config.socket_address.clone();
        let (mut alice, alice_id) = named_client(&address, "Alice").await;
        let (mut bob, bob_id) = named_client(&address, "Bob").await;
        let (mut carol, carol_id) = named_client(&address, "Carol").await;
        start_match(&mut alice, &alice_id, &mut bob, &bob_id).await;

        // Invitations are stateless and still delivered, but acceptance is
        // refused while Bob's match is live.
        carol
            .send(json!({"type": "send_invite", "invite_id": bob_id}))
            .await;
        bob.recv_type("invitation").await;
        bob.send(json!({
            "type": "invitation_response",
            "accepted": true,
            "from_user_id": carol_id,
        }))
        .await;
        let error = bob.recv_type("error").await;
        assert_eq!(error["message"], "Player is already in a game");
        server.shutdown().await;
    }

    #[tokio::test]
    async fn malformed_messages_earn_errors_and_unknown_types_are_ignored() {
        let server = test_server(Duration::from_secs(60)).await;
        let mut client = TestClient::connect(&server.config.socket_address).await;

        client.send_raw("this is not json").await;
        let error = client.recv().await;
        assert_eq!(error["type"], "error");
        assert_eq!(error["message"], "Invalid message format");

        client.send(json!({"position": 4})).await;
        let error = client.recv().await;
        assert_eq!(error["message"], "Missing 'type' field");

        client.send(json!({"type": "username", "username": 42})).await;
        let error = client.recv().await;
        assert_eq!(error["message"], "Invalid message format");

        // Unknown type: silently ignored, connection stays usable. The
        // next reply must be the welcome, proving nothing was sent in
        // between.
        client.send(json!({"type": "chat", "text": "hi"})).await;
        client
            .send(json!({"type": "username", "username": "Alice"}))
            .await;
        let message = client.recv().await;
        assert_eq!(message["type"], "welcome");
        server.shutdown().await;
    }

    #[tokio::test]
    async fn leave_rebroadcasts_roster_and_closes_socket() {
        let server = test_server(Duration::from_secs(60)).await;
        let address = server.config.socket_address.clone();
        let (mut alice, _alice_id) = named_client(&address, "Alice").await;
        let (mut bob, _bob_id) = named_client(&address, "Bob").await;

        bob.send(json!({"type": "leave"})).await;
        loop {
            let roster = alice.recv_type("player_list").await;
            let names: Vec<&str> = roster["players"]
                .as_array()
                .unwrap()
                .iter()
                .map(|p| p["username"].as_str().unwrap())
                .collect();
            if names == ["Alice"] {
                break;
            }
        }
        assert!(bob.expect_close().await);
        server.shutdown().await;
    }

    #[tokio::test]
    async fn info_endpoint_serves_static_metadata() {
        let server = test_server(Duration::from_secs(60)).await;
        let body: serde_json::Value =
            reqwest::get(format!("http://{}/", server.config.rest_address))
                .await
                .expect("Request failed")
                .json()
                .await
                .expect("Expected JSON body");
        assert_eq!(body["name"], "Tic Tac Toe WebSocket Game");
        assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
        server.shutdown().await;
    }
}
