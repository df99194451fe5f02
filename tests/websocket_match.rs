//! Full head-to-head games against a live server over real sockets.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

use parlance::game::swipe::Direction;
use parlance::game::words::fallback_words;
use parlance::network::{
    ClientEvent, ClientMessage, ErrorCode, GameServer, ServerConfig, ServerMessage, SessionClient,
    SessionPhase,
};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn start_server() -> (Arc<GameServer>, String) {
    start_server_with(ServerConfig::default()).await
}

async fn start_server_with(config: ServerConfig) -> (Arc<GameServer>, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());
    let server = Arc::new(GameServer::new(config, fallback_words()));

    let serving = server.clone();
    tokio::spawn(async move { serving.serve(listener).await });
    (server, url)
}

async fn connect(url: &str) -> Socket {
    let (mut ws, _) = connect_async(url).await.unwrap();
    assert!(matches!(recv(&mut ws).await, ServerMessage::Connected { .. }));
    ws
}

async fn send(ws: &mut Socket, msg: ClientMessage) {
    ws.send(Message::Text(msg.to_json().unwrap())).await.unwrap();
}

async fn recv(ws: &mut Socket) -> ServerMessage {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for the server")
            .expect("socket closed")
            .unwrap();
        if let Message::Text(text) = frame {
            return ServerMessage::from_json(&text).unwrap();
        }
    }
}

/// Read until the server ends the connection.
async fn expect_hangup(ws: &mut Socket) {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("server kept the socket open");
        match frame {
            None | Some(Err(_)) | Some(Ok(Message::Close(_))) => return,
            Some(Ok(_)) => {}
        }
    }
}

fn short_idle() -> ServerConfig {
    ServerConfig {
        idle_timeout: Duration::from_millis(300),
        cleanup_interval: Duration::from_millis(50),
        ..ServerConfig::default()
    }
}

async fn wait_for_connections(server: &GameServer, expected: usize) {
    for _ in 0..100 {
        if server.connection_count().await == expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(server.connection_count().await, expected);
}

/// Receive until `done` accepts a message, feeding everything to the client.
async fn pump(
    ws: &mut Socket,
    client: &mut SessionClient,
    t0: Instant,
    done: impl Fn(&ServerMessage) -> bool,
) -> Vec<ClientEvent> {
    let mut events = Vec::new();
    loop {
        let msg = recv(ws).await;
        let finished = done(&msg);
        events.extend(client.handle_message(msg, t0));
        if finished {
            return events;
        }
    }
}

/// Swipe until this end has finished. `decide` picks the direction given
/// whether the card's definition is true.
async fn play_out(ws: &mut Socket, client: &mut SessionClient, t0: Instant, decide: fn(bool) -> Direction) {
    loop {
        let Some(game) = client.game() else { panic!("no game dealt") };
        let Some(card) = game.current_card() else { return };
        let is_true = game
            .deck()
            .definition(card.word_index, card.definition_index)
            .map(|d| d.is_correct)
            .unwrap();

        // Swiping at t0 keeps the measured time at zero
        let (_, msg) = client.swipe(card.id, decide(is_true), t0).unwrap();
        send(ws, msg).await;
        pump(ws, client, t0, |m| matches!(m, ServerMessage::SwipeConfirmed(_))).await;
    }
}

#[tokio::test]
async fn test_two_player_match() {
    let (server, url) = start_server().await;
    let t0 = Instant::now();

    let mut host_ws = connect(&url).await;
    let mut guest_ws = connect(&url).await;
    let mut host = SessionClient::new();
    let mut guest = SessionClient::new();

    // Lobby
    let create = host.create_game("Ada").unwrap();
    send(&mut host_ws, create).await;
    pump(&mut host_ws, &mut host, t0, |m| matches!(m, ServerMessage::RoomCreated { .. })).await;
    let code = host.room_code().unwrap().to_lowercase();
    assert_eq!(host.phase(), SessionPhase::WaitingForOpponent);

    let join = guest.join_game(&code, "Bo").unwrap();
    send(&mut guest_ws, join).await;
    pump(&mut guest_ws, &mut guest, t0, |m| matches!(m, ServerMessage::RoomJoined { .. })).await;
    pump(&mut host_ws, &mut host, t0, |m| matches!(m, ServerMessage::OpponentJoined { .. })).await;
    assert_eq!(guest.opponent().name.as_deref(), Some("Ada"));
    assert_eq!(host.opponent().name.as_deref(), Some("Bo"));

    // Readiness
    let ready = host.ready().unwrap();
    send(&mut host_ws, ready).await;
    let ready = guest.ready().unwrap();
    send(&mut guest_ws, ready).await;
    pump(&mut host_ws, &mut host, t0, |m| matches!(m, ServerMessage::GameStart { .. })).await;
    pump(&mut guest_ws, &mut guest, t0, |m| matches!(m, ServerMessage::GameStart { .. })).await;

    assert_eq!(host.phase(), SessionPhase::InProgress);
    let host_words = host.game().unwrap().deck().words().to_vec();
    assert_eq!(host_words, guest.game().unwrap().deck().words().to_vec());
    assert_eq!(host_words.len(), 2);

    // Host plays perfectly, guest rejects everything
    play_out(&mut host_ws, &mut host, t0, |is_true| if is_true { Direction::Accept } else { Direction::Reject }).await;
    play_out(&mut guest_ws, &mut guest, t0, |_| Direction::Reject).await;

    let guest_events = pump(&mut guest_ws, &mut guest, t0, |m| matches!(m, ServerMessage::GameEnd(_))).await;
    let host_events = pump(&mut host_ws, &mut host, t0, |m| matches!(m, ServerMessage::GameEnd(_))).await;

    assert!(matches!(guest_events.last(), Some(ClientEvent::GameEnded(_))));
    assert!(matches!(host_events.last(), Some(ClientEvent::GameEnded(_))));

    let host_result = host.last_result().unwrap().clone();
    let guest_result = guest.last_result().unwrap().clone();

    assert_eq!(host_result.your_score, host.score());
    assert_eq!(guest_result.your_score, guest.score());
    assert_eq!(host_result.your_score, guest_result.opponent_score);
    assert_eq!(host_result.opponent_score, guest_result.your_score);
    assert!(host_result.your_score > guest_result.your_score);
    assert_eq!(host_result.winner.as_deref(), Some("Ada"));
    assert_eq!(guest_result.winner.as_deref(), Some("Ada"));
    assert!(!host_result.is_tie);

    // Host saw the guest finish through progress updates
    assert!(host.opponent().finished);
    assert_eq!(host.phase(), SessionPhase::Ended);

    server.shutdown();
}

#[tokio::test]
async fn test_dropped_guest_rejoins_then_leaves() {
    let (server, url) = start_server().await;
    let t0 = Instant::now();

    let mut host_ws = connect(&url).await;
    let mut host = SessionClient::new();
    let create = host.create_game("Ada").unwrap();
    send(&mut host_ws, create).await;
    pump(&mut host_ws, &mut host, t0, |m| matches!(m, ServerMessage::RoomCreated { .. })).await;
    let code = host.room_code().unwrap().to_string();

    let mut guest = SessionClient::new();
    let mut guest_ws = connect(&url).await;
    let join = guest.join_game(&code, "Bo").unwrap();
    send(&mut guest_ws, join).await;
    pump(&mut guest_ws, &mut guest, t0, |m| matches!(m, ServerMessage::RoomJoined { .. })).await;
    pump(&mut host_ws, &mut host, t0, |m| matches!(m, ServerMessage::OpponentJoined { .. })).await;

    // Transport drop: the seat is held
    guest_ws.close(None).await.unwrap();
    drop(guest_ws);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(server.room_count().await, 1);

    let mut guest_ws = connect(&url).await;
    let rejoin = ClientMessage::RejoinRoom {
        room_code: code.clone(),
        rejoin_token: guest.rejoin_token().unwrap().to_string(),
    };
    send(&mut guest_ws, rejoin).await;
    let events = pump(&mut guest_ws, &mut guest, t0, |m| matches!(m, ServerMessage::RoomRejoined(_))).await;
    assert!(matches!(events.as_slice(), [ClientEvent::Rejoined { phase: SessionPhase::Ready, card: None }]));

    // A wrong token is refused
    let mut stranger_ws = connect(&url).await;
    send(&mut stranger_ws, ClientMessage::RejoinRoom { room_code: code.clone(), rejoin_token: "nope".into() }).await;
    assert!(matches!(recv(&mut stranger_ws).await, ServerMessage::RejoinError { .. }));

    // Explicit leave tears the room down for the host
    let leave = guest.leave().unwrap();
    send(&mut guest_ws, leave).await;
    let events = pump(&mut host_ws, &mut host, t0, |m| matches!(m, ServerMessage::OpponentDisconnected { .. })).await;
    assert!(matches!(events.last(), Some(ClientEvent::OpponentLeft { .. })));
    assert_eq!(host.phase(), SessionPhase::Lobby);

    for _ in 0..50 {
        if server.room_count().await == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(server.room_count().await, 0);

    server.shutdown();
}

#[tokio::test]
async fn test_idle_socket_is_closed_and_seat_held() {
    let (server, url) = start_server_with(short_idle()).await;

    let mut host_ws = connect(&url).await;
    send(&mut host_ws, ClientMessage::CreateGame { player_name: "Ada".into() }).await;
    let ServerMessage::RoomCreated { room_code, rejoin_token, .. } = recv(&mut host_ws).await else {
        panic!("Expected room_created");
    };

    // Silent past the timeout: told why, then hung up on
    let ServerMessage::Error(error) = recv(&mut host_ws).await else {
        panic!("Expected the idle error");
    };
    assert_eq!(error.code, ErrorCode::InternalError);
    expect_hangup(&mut host_ws).await;
    wait_for_connections(&server, 0).await;

    // The room waits out the grace window for the host
    assert_eq!(server.room_count().await, 1);
    let mut host_ws = connect(&url).await;
    send(&mut host_ws, ClientMessage::RejoinRoom { room_code, rejoin_token }).await;
    let ServerMessage::RoomRejoined(snapshot) = recv(&mut host_ws).await else {
        panic!("Expected room_rejoined");
    };
    assert_eq!(snapshot.phase, SessionPhase::WaitingForOpponent);

    server.shutdown();
}

#[tokio::test]
async fn test_websocket_pings_keep_a_waiting_host() {
    let (server, url) = start_server_with(short_idle()).await;

    let mut host_ws = connect(&url).await;
    send(&mut host_ws, ClientMessage::CreateGame { player_name: "Ada".into() }).await;
    let ServerMessage::RoomCreated { room_code, .. } = recv(&mut host_ws).await else {
        panic!("Expected room_created");
    };

    for _ in 0..8 {
        host_ws.send(Message::Ping(Vec::new())).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    assert_eq!(server.connection_count().await, 1);

    let mut guest_ws = connect(&url).await;
    send(&mut guest_ws, ClientMessage::JoinGame { room_code, player_name: "Bo".into() }).await;
    assert!(matches!(recv(&mut guest_ws).await, ServerMessage::RoomJoined { .. }));
    assert!(matches!(recv(&mut host_ws).await, ServerMessage::OpponentJoined { .. }));

    server.shutdown();
}
