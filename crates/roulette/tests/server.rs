//! Integration tests for the server, handler, and full connection flow.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use roulette::prelude::*;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;

const TOKEN: &str = "test-admin-token";
const RECV_TIMEOUT: Duration = Duration::from_secs(3);

// =========================================================================
// Helpers
// =========================================================================

type ClientWs = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

struct TestServer {
    addr: String,
    shutdown: Option<oneshot::Sender<()>>,
    handle: JoinHandle<Result<(), RouletteError>>,
}

impl TestServer {
    async fn stop(mut self) -> Result<(), RouletteError> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        self.handle.await.expect("server task should not panic")
    }
}

async fn start_server() -> TestServer {
    start_server_with(RouletteServerBuilder::new()).await
}

/// Starts a server on a random port with a fixed shuffle seed.
async fn start_server_with(builder: RouletteServerBuilder) -> TestServer {
    let server = builder
        .bind("127.0.0.1:0")
        .build(StaticTokenAuth::new(TOKEN))
        .await
        .expect("server should build");

    let addr = server
        .local_addr()
        .expect("should have local addr")
        .to_string();

    let (tx, rx) = oneshot::channel::<()>();
    let handle = tokio::spawn(server.run_until(async {
        let _ = rx.await;
    }));

    TestServer {
        addr,
        shutdown: Some(tx),
        handle,
    }
}

fn seeded() -> EngineConfig {
    EngineConfig::default().with_seed(7)
}

struct TestClient {
    ws: ClientWs,
    seq: u64,
}

impl TestClient {
    async fn connect(addr: &str) -> Self {
        let (ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}"))
            .await
            .expect("should connect");
        Self { ws, seq: 0 }
    }

    async fn send(&mut self, request: ClientRequest) {
        self.seq += 1;
        let envelope = Envelope {
            seq: self.seq,
            timestamp: 0,
            payload: Payload::Request(request),
        };
        let json = serde_json::to_string(&envelope).expect("encode");
        self.ws.send(Message::text(json)).await.expect("send");
    }

    async fn send_raw(&mut self, text: &str) {
        self.ws.send(Message::text(text)).await.expect("send");
    }

    /// Next server message, failing the test after a timeout.
    async fn recv(&mut self) -> ServerMessage {
        loop {
            let msg = tokio::time::timeout(RECV_TIMEOUT, self.ws.next())
                .await
                .expect("timed out waiting for a message")
                .expect("stream ended")
                .expect("recv error");
            let text = match msg {
                Message::Text(text) => text,
                Message::Ping(_) | Message::Pong(_) => continue,
                other => panic!("unexpected frame: {other:?}"),
            };
            let envelope: Envelope = serde_json::from_str(text.as_str()).expect("decode");
            match envelope.payload {
                Payload::Response(msg) => return msg,
                other => panic!("expected a response, got {other:?}"),
            }
        }
    }

    /// Skips messages until one matches `pred`. Pushed `PlayerState`
    /// updates can arrive between replies, so most checks go through
    /// here.
    async fn expect(&mut self, pred: impl Fn(&ServerMessage) -> bool) -> ServerMessage {
        loop {
            let msg = self.recv().await;
            if pred(&msg) {
                return msg;
            }
        }
    }

    async fn request(&mut self, request: ClientRequest) -> ServerMessage {
        self.send(request).await;
        self.expect(|m| !matches!(m, ServerMessage::PlayerState { .. })).await
    }

    async fn admin(&mut self, command: AdminCommand) -> ServerMessage {
        self.request(ClientRequest::Admin {
            token: TOKEN.into(),
            command,
        })
        .await
    }

    async fn register(&mut self, name: &str) -> PlayerView {
        match self.request(ClientRequest::Register { name: name.into() }).await {
            ServerMessage::Registered { player } => player,
            other => panic!("expected Registered, got {other:?}"),
        }
    }

    /// Waits for a pushed state matching `pred`.
    async fn state_where(&mut self, pred: impl Fn(&PlayerView) -> bool) -> PlayerView {
        match self
            .expect(|m| matches!(m, ServerMessage::PlayerState { player } if pred(player)))
            .await
        {
            ServerMessage::PlayerState { player } => player,
            _ => unreachable!(),
        }
    }

    async fn expect_closed(&mut self) {
        loop {
            match tokio::time::timeout(RECV_TIMEOUT, self.ws.next())
                .await
                .expect("timed out waiting for close")
            {
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => return,
                Some(Ok(_)) => continue,
            }
        }
    }
}

fn error_code(msg: &ServerMessage) -> u16 {
    match msg {
        ServerMessage::Error { code, .. } => *code,
        other => panic!("expected Error, got {other:?}"),
    }
}

// =========================================================================
// Registration and lookup
// =========================================================================

#[tokio::test]
async fn test_register_returns_fresh_player() {
    let server = start_server().await;
    let mut client = TestClient::connect(&server.addr).await;

    let player = client.register("ada").await;
    assert_eq!(player.name, "ada");
    assert_eq!(player.role, Role::Default);
    assert_eq!(player.health, 100);
    assert_eq!(player.phase, GamePhase::NotStarted);
    assert!(!player.has_submitted);
    assert!(!player.shutting_down);
}

#[tokio::test]
async fn test_get_player_bound_returns_state() {
    let server = start_server().await;
    let mut client = TestClient::connect(&server.addr).await;
    let registered = client.register("ada").await;

    client.send(ClientRequest::GetPlayer).await;
    let player = client.state_where(|_| true).await;
    assert_eq!(player, registered);
}

#[tokio::test]
async fn test_register_blank_name_returns_400() {
    let server = start_server().await;
    let mut client = TestClient::connect(&server.addr).await;

    let reply = client.request(ClientRequest::Register { name: "  ".into() }).await;
    assert_eq!(error_code(&reply), 400);
}

#[tokio::test]
async fn test_register_twice_on_one_connection_returns_409() {
    let server = start_server().await;
    let mut client = TestClient::connect(&server.addr).await;
    client.register("ada").await;

    let reply = client.request(ClientRequest::Register { name: "bob".into() }).await;
    assert_eq!(error_code(&reply), 409);
}

#[tokio::test]
async fn test_get_player_unbound_returns_400() {
    let server = start_server().await;
    let mut client = TestClient::connect(&server.addr).await;

    let reply = client.request(ClientRequest::GetPlayer).await;
    assert_eq!(error_code(&reply), 400);
}

#[tokio::test]
async fn test_attach_unknown_player_returns_404() {
    let server = start_server().await;
    let mut client = TestClient::connect(&server.addr).await;

    let reply = client
        .request(ClientRequest::Attach { player_id: PlayerId(999) })
        .await;
    assert_eq!(error_code(&reply), 404);
}

#[tokio::test]
async fn test_attach_from_second_connection_sees_same_player() {
    let server = start_server().await;
    let mut first = TestClient::connect(&server.addr).await;
    let registered = first.register("ada").await;

    let mut second = TestClient::connect(&server.addr).await;
    second.send(ClientRequest::Attach { player_id: registered.id }).await;
    let attached = second.state_where(|_| true).await;
    assert_eq!(attached.id, registered.id);
    assert_eq!(attached.name, "ada");
}

#[tokio::test]
async fn test_heartbeat_acked_even_when_unbound() {
    let server = start_server().await;
    let mut client = TestClient::connect(&server.addr).await;
    assert_eq!(
        client.request(ClientRequest::Heartbeat).await,
        ServerMessage::HeartbeatAck
    );
}

#[tokio::test]
async fn test_malformed_message_returns_400_and_keeps_connection() {
    let server = start_server().await;
    let mut client = TestClient::connect(&server.addr).await;

    client.send_raw("{not json").await;
    assert_eq!(error_code(&client.recv().await), 400);

    assert_eq!(
        client.request(ClientRequest::Heartbeat).await,
        ServerMessage::HeartbeatAck
    );
}

// =========================================================================
// Admin commands
// =========================================================================

#[tokio::test]
async fn test_admin_wrong_token_returns_401() {
    let server = start_server().await;
    let mut client = TestClient::connect(&server.addr).await;

    let reply = client
        .request(ClientRequest::Admin {
            token: "guess".into(),
            command: AdminCommand::StartGame,
        })
        .await;
    assert_eq!(error_code(&reply), 401);
}

#[tokio::test]
async fn test_start_game_with_too_few_players_returns_409() {
    let server = start_server().await;
    let mut admin = TestClient::connect(&server.addr).await;
    for name in ["a", "b"] {
        TestClient::connect(&server.addr).await.register(name).await;
    }

    let reply = admin.admin(AdminCommand::StartGame).await;
    assert_eq!(error_code(&reply), 409);
}

#[tokio::test]
async fn test_max_rounds_inc_dec_floors_at_one() {
    let server = start_server_with(
        RouletteServerBuilder::new().engine_config(seeded().with_max_rounds(2)),
    )
    .await;
    let mut admin = TestClient::connect(&server.addr).await;

    assert_eq!(
        admin.admin(AdminCommand::IncMaxRounds).await,
        ServerMessage::MaxRounds { max_rounds: 3 }
    );
    for expected in [2, 1, 1] {
        assert_eq!(
            admin.admin(AdminCommand::DecMaxRounds).await,
            ServerMessage::MaxRounds { max_rounds: expected }
        );
    }
}

#[tokio::test]
async fn test_roster_lists_registered_players() {
    let server = start_server().await;
    let mut admin = TestClient::connect(&server.addr).await;
    let mut players = Vec::new();
    for name in ["ada", "bob"] {
        let mut client = TestClient::connect(&server.addr).await;
        players.push(client.register(name).await.id);
    }

    match admin.admin(AdminCommand::Roster).await {
        ServerMessage::Roster { max_rounds, players: roster } => {
            assert_eq!(max_rounds, 5);
            let ids: Vec<_> = roster.iter().map(|r| r.id).collect();
            assert_eq!(ids, players);
        }
        other => panic!("expected Roster, got {other:?}"),
    }
}

#[tokio::test]
async fn test_kick_before_start_closes_player_connection() {
    let server = start_server().await;
    let mut admin = TestClient::connect(&server.addr).await;
    let mut victim = TestClient::connect(&server.addr).await;
    let id = victim.register("mallory").await.id;

    assert_eq!(
        admin.admin(AdminCommand::KickPlayer { player_id: id }).await,
        ServerMessage::PlayerKicked { player_id: id, removed: true }
    );
    assert_eq!(
        victim.expect(|m| !matches!(m, ServerMessage::PlayerState { .. })).await,
        ServerMessage::Kicked
    );
    victim.expect_closed().await;

    let again = admin.admin(AdminCommand::KickPlayer { player_id: id }).await;
    assert_eq!(error_code(&again), 404);
}

#[tokio::test]
async fn test_reset_unbinds_players() {
    let server = start_server().await;
    let mut admin = TestClient::connect(&server.addr).await;
    let mut player = TestClient::connect(&server.addr).await;
    player.register("ada").await;

    assert_eq!(admin.admin(AdminCommand::ResetGame).await, ServerMessage::GameReset);
    assert_eq!(
        player.expect(|m| !matches!(m, ServerMessage::PlayerState { .. })).await,
        ServerMessage::GameReset
    );

    let reply = player.request(ClientRequest::GetPlayer).await;
    assert_eq!(error_code(&reply), 400);
}

// =========================================================================
// Playing a round
// =========================================================================

#[tokio::test]
async fn test_full_round_applies_penalties_and_advances() {
    let server = start_server_with(RouletteServerBuilder::new().engine_config(seeded())).await;
    let mut admin = TestClient::connect(&server.addr).await;

    let mut clients = Vec::new();
    for name in ["ada", "bob", "cy"] {
        let mut client = TestClient::connect(&server.addr).await;
        client.register(name).await;
        clients.push(client);
    }

    assert_eq!(admin.admin(AdminCommand::StartGame).await, ServerMessage::GameStarted);

    let mut roles = Vec::new();
    for client in &mut clients {
        let view = client.state_where(|p| p.phase == GamePhase::InProgress).await;
        assert_eq!(view.round, 1);
        roles.push(view.role);
    }
    assert_eq!(roles.iter().filter(|r| **r == Role::Picker).count(), 1);
    assert_eq!(roles.iter().filter(|r| **r == Role::Guesser).count(), 2);

    // Picker first, then the guessers at distance 10 and 40.
    let picker = roles.iter().position(|r| *r == Role::Picker).unwrap();
    let guessers: Vec<_> = (0..3).filter(|i| *i != picker).collect();

    clients[picker].send(ClientRequest::Submit { number: "50".into() }).await;
    let view = clients[picker].state_where(|p| p.has_submitted).await;
    assert_eq!(view.round, 1);

    clients[guessers[0]].send(ClientRequest::Submit { number: "40".into() }).await;
    clients[guessers[0]].state_where(|p| p.has_submitted).await;
    clients[guessers[1]].send(ClientRequest::Submit { number: "90".into() }).await;

    let after: Vec<_> = {
        let mut views = Vec::new();
        for client in &mut clients {
            views.push(client.state_where(|p| p.round == 2).await);
        }
        views
    };
    assert_eq!(after[picker].health, 100);
    assert_eq!(after[guessers[0]].health, 90);
    assert_eq!(after[guessers[1]].health, 60);
    assert!(after.iter().all(|p| !p.has_submitted));
    assert!(after.iter().all(|p| p.phase == GamePhase::InProgress));
}

#[tokio::test]
async fn test_submit_twice_returns_409() {
    let server = start_server_with(RouletteServerBuilder::new().engine_config(seeded())).await;
    let mut admin = TestClient::connect(&server.addr).await;

    let mut clients = Vec::new();
    for name in ["ada", "bob", "cy"] {
        let mut client = TestClient::connect(&server.addr).await;
        client.register(name).await;
        clients.push(client);
    }
    admin.admin(AdminCommand::StartGame).await;

    let mut picker = None;
    for (i, client) in clients.iter_mut().enumerate() {
        let view = client.state_where(|p| p.phase == GamePhase::InProgress).await;
        if view.role == Role::Picker {
            picker = Some(i);
        }
    }
    let picker = picker.expect("someone is the picker");

    clients[picker].send(ClientRequest::Submit { number: "10".into() }).await;
    clients[picker].state_where(|p| p.has_submitted).await;

    let reply = clients[picker]
        .request(ClientRequest::Submit { number: "20".into() })
        .await;
    assert_eq!(error_code(&reply), 409);
}

#[tokio::test]
async fn test_submit_before_start_returns_409() {
    let server = start_server().await;
    let mut client = TestClient::connect(&server.addr).await;
    client.register("ada").await;

    let reply = client
        .request(ClientRequest::Submit { number: "5".into() })
        .await;
    assert_eq!(error_code(&reply), 409);
}

// =========================================================================
// Background tasks and shutdown
// =========================================================================

#[tokio::test]
async fn test_idle_player_is_swept_before_start() {
    let server = start_server_with(
        RouletteServerBuilder::new()
            .engine_config(EngineConfig {
                heartbeat_timeout: Duration::from_millis(100),
                ..seeded()
            })
            .sweep_interval(Duration::from_millis(50)),
    )
    .await;

    let mut idle = TestClient::connect(&server.addr).await;
    idle.register("sleepy").await;

    assert_eq!(
        idle.expect(|m| !matches!(m, ServerMessage::PlayerState { .. })).await,
        ServerMessage::Kicked
    );
    idle.expect_closed().await;

    let mut admin = TestClient::connect(&server.addr).await;
    match admin.admin(AdminCommand::Roster).await {
        ServerMessage::Roster { players, .. } => assert!(players.is_empty()),
        other => panic!("expected Roster, got {other:?}"),
    }
}

#[tokio::test]
async fn test_shutdown_notifies_connections_and_returns() {
    let server = start_server().await;
    let mut client = TestClient::connect(&server.addr).await;
    client.register("ada").await;

    let addr = server.addr.clone();
    let mut watcher = TestClient::connect(&addr).await;
    // Make sure the watcher's handler is subscribed before shutting down.
    assert_eq!(
        watcher.request(ClientRequest::Heartbeat).await,
        ServerMessage::HeartbeatAck
    );

    server.stop().await.expect("run_until should return Ok");

    for c in [&mut client, &mut watcher] {
        assert_eq!(
            c.expect(|m| !matches!(m, ServerMessage::PlayerState { .. })).await,
            ServerMessage::ShuttingDown
        );
        c.expect_closed().await;
    }
}
