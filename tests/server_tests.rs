//! Exercises the server over real sockets with the echo responder.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use tandarunner::config::Config;
use tandarunner::fragment::MESSAGE_LIST_ID;
use tandarunner::protocol::ClientMessage;
use tandarunner::responder::Responder;
use tandarunner::server::{self, ServerState};
use tandarunner::activity::sample_activities;
use tandarunner::training::TrainingSummary;
use tandarunner::viz::VisualizationSpecs;
use tandarunner::Fragment;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn spawn_server(delay: Duration) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let state = Arc::new(ServerState::new(
        &Config::default(),
        Responder::Echo { delay },
        &VisualizationSpecs::standard(),
    ));
    tokio::spawn(server::run(listener, state));
    addr
}

async fn http_get(addr: SocketAddr, path: &str) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let request = format!("GET {} HTTP/1.1\r\nHost: localhost\r\n\r\n", path);
    stream.write_all(request.as_bytes()).await.unwrap();
    let mut response = String::new();
    stream.read_to_string(&mut response).await.unwrap();
    response
}

async fn connect(addr: SocketAddr) -> Socket {
    let (ws, _) = connect_async(format!("ws://{}/ws/chat/", addr)).await.unwrap();
    ws
}

/// Read fragments until the first terminal one, inclusive.
async fn read_turn(ws: &mut Socket, marker: &str) -> Vec<Fragment> {
    let mut fragments = Vec::new();
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("turn did not finish in time")
            .expect("socket closed")
            .unwrap();
        if let Message::Text(text) = msg {
            let fragment = Fragment::parse(text, marker);
            let done = fragment.is_terminal();
            fragments.push(fragment);
            if done {
                return fragments;
            }
        }
    }
}

fn reply_text(fragments: &[Fragment]) -> String {
    fragments
        .iter()
        .filter(|f| f.tag() == Some("span") && f.attribute("data-role").is_none())
        .map(Fragment::text)
        .collect()
}

// ---------------------------------------------------------------------------
// HTTP
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_index_serves_page() {
    let addr = spawn_server(Duration::ZERO).await;
    let response = http_get(addr, "/").await;
    assert!(response.starts_with("HTTP/1.1 200 OK"));
    assert!(response.contains("text/html"));
    assert!(response.contains(r#"id="message-list""#));
    assert!(response.contains("/ws/chat/"));
    assert!(response.contains("marathon-predictor"));
}

#[tokio::test]
async fn test_index_serves_training_charts() {
    let end = chrono::NaiveDate::from_ymd_opt(2024, 6, 30).unwrap();
    let summary = TrainingSummary::from_activities(&sample_activities(end));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let state = Arc::new(ServerState::new(
        &Config::default(),
        Responder::Echo { delay: Duration::ZERO },
        &VisualizationSpecs::from_training(&summary),
    ));
    tokio::spawn(server::run(listener, state));

    let response = http_get(addr, "/").await;
    for id in ["marathon-predictor", "weekly-chart", "rolling-tanda"] {
        assert!(response.contains(&format!(r#"id="{}""#, id)), "missing chart {}", id);
    }
    assert!(response.contains("Tanda Progression line"));
}

#[tokio::test]
async fn test_health() {
    let addr = spawn_server(Duration::ZERO).await;
    let response = http_get(addr, "/health").await;
    assert!(response.starts_with("HTTP/1.1 200 OK"));
    assert!(response.ends_with("ok"));
}

#[tokio::test]
async fn test_unknown_path_is_404() {
    let addr = spawn_server(Duration::ZERO).await;
    let response = http_get(addr, "/nope").await;
    assert!(response.starts_with("HTTP/1.1 404"));
}

// ---------------------------------------------------------------------------
// Chat socket
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_chat_turn_round_trip() {
    let addr = spawn_server(Duration::ZERO).await;
    let marker = Config::default().chat.marker_attribute;
    let mut ws = connect(addr).await;

    ws.send(Message::Text(ClientMessage::chat("hi").to_json())).await.unwrap();
    let fragments = read_turn(&mut ws, &marker).await;

    let first = &fragments[0];
    assert_eq!(first.attribute("id"), Some(MESSAGE_LIST_ID));
    assert_eq!(first.attribute("data-role"), Some("user"));
    assert_eq!(first.text(), "hi");
    assert!(fragments[..fragments.len() - 1].iter().all(|f| !f.is_terminal()));
    assert_eq!(reply_text(&fragments), "You said: hi");
}

#[tokio::test]
async fn test_consecutive_turns_on_one_socket() {
    let addr = spawn_server(Duration::ZERO).await;
    let marker = Config::default().chat.marker_attribute;
    let mut ws = connect(addr).await;

    for text in ["one", "two"] {
        ws.send(Message::Text(ClientMessage::chat(text).to_json())).await.unwrap();
        let fragments = read_turn(&mut ws, &marker).await;
        assert_eq!(reply_text(&fragments), format!("You said: {}", text));
    }
}

#[tokio::test]
async fn test_stop_mid_turn_still_ends_turn() {
    let addr = spawn_server(Duration::from_millis(100)).await;
    let marker = Config::default().chat.marker_attribute;
    let mut ws = connect(addr).await;

    let long = "one two three four five six seven eight nine ten";
    ws.send(Message::Text(ClientMessage::chat(long).to_json())).await.unwrap();
    // User echo and the empty assistant bubble arrive before any token.
    for _ in 0..2 {
        ws.next().await.unwrap().unwrap();
    }
    ws.send(Message::Text(ClientMessage::stop().to_json())).await.unwrap();

    let rest = tokio::time::timeout(Duration::from_secs(2), read_turn(&mut ws, &marker))
        .await
        .unwrap();
    assert!(rest.last().unwrap().is_terminal());
    assert!(reply_text(&rest).len() < format!("You said: {}", long).len());
}

#[tokio::test]
async fn test_stop_while_idle_is_harmless() {
    let addr = spawn_server(Duration::ZERO).await;
    let marker = Config::default().chat.marker_attribute;
    let mut ws = connect(addr).await;

    ws.send(Message::Text(ClientMessage::stop().to_json())).await.unwrap();
    ws.send(Message::Text(ClientMessage::chat("still here").to_json())).await.unwrap();
    let fragments = read_turn(&mut ws, &marker).await;
    assert_eq!(reply_text(&fragments), "You said: still here");
}

#[tokio::test]
async fn test_malformed_frames_are_ignored() {
    let addr = spawn_server(Duration::ZERO).await;
    let marker = Config::default().chat.marker_attribute;
    let mut ws = connect(addr).await;

    ws.send(Message::Text("not json".into())).await.unwrap();
    ws.send(Message::Text(r#"{"action":"dance"}"#.into())).await.unwrap();
    ws.send(Message::Text(ClientMessage::chat("ok").to_json())).await.unwrap();
    let fragments = read_turn(&mut ws, &marker).await;
    assert_eq!(reply_text(&fragments), "You said: ok");
}
