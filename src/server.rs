//! HTTP page server and the `/ws/chat/` WebSocket endpoint.
//!
//! Each chat turn runs in its own task and reports back to the connection
//! loop over an mpsc channel, so fragments reach the socket in the order they
//! were produced. A stop frame cancels the turn's token; the turn still ends
//! with a terminal fragment so every client returns to idle.

use std::sync::Arc;

use colored::*;
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::WebSocketStream;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::error::Result;
use crate::fragment::FragmentWriter;
use crate::page::{render_page, WS_PATH};
use crate::protocol::{Action, ClientMessage};
use crate::responder::{ChatMessage, Responder};
use crate::viz::VisualizationSpecs;

/// Everything a connection needs, shared read-only across tasks.
pub struct ServerState {
    page: String,
    responder: Responder,
    writer: FragmentWriter,
    system_prompt: Option<String>,
}

impl ServerState {
    pub fn new(config: &Config, responder: Responder, specs: &VisualizationSpecs) -> Self {
        let marker = &config.chat.marker_attribute;
        Self {
            page: render_page(specs, config.visualizations.theme, marker),
            responder,
            writer: FragmentWriter::new(marker.clone()),
            system_prompt: config.chat.system_prompt.clone(),
        }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let specs = VisualizationSpecs::from_config(&config.visualizations)?;
        Ok(Self::new(config, Responder::from_config(&config.chat)?, &specs))
    }
}

/// Bind, announce, and serve until the process is stopped.
pub async fn serve(config: &Config) -> Result<()> {
    let state = Arc::new(ServerState::from_config(config)?);
    let listener = TcpListener::bind(config.bind_addr()).await?;
    let url = format!("http://{}", listener.local_addr()?);

    eprintln!("{}", format!("  Tandarunner running at {}", url).bright_green());
    eprintln!(
        "{}",
        format!("  Replies from: {}", state.responder.name()).bright_cyan()
    );
    eprintln!("{}", "  Press Ctrl+C to stop.".bright_blue());

    if config.server.open_browser {
        open_browser(&url);
    }

    run(listener, state).await
}

fn open_browser(url: &str) {
    #[cfg(target_os = "windows")]
    {
        let _ = std::process::Command::new("cmd")
            .args(["/C", &format!("start {}", url)])
            .spawn();
    }
    #[cfg(target_os = "macos")]
    {
        let _ = std::process::Command::new("open").arg(url).spawn();
    }
    #[cfg(target_os = "linux")]
    {
        let _ = std::process::Command::new("xdg-open").arg(url).spawn();
    }
}

/// Accept loop over an already-bound listener.
pub async fn run(listener: TcpListener, state: Arc<ServerState>) -> Result<()> {
    loop {
        let (stream, addr) = listener.accept().await?;
        let state = Arc::clone(&state);
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, state).await {
                tracing::warn!(%addr, error = %e, "connection error");
            }
        });
    }
}

/// Request line and upgrade flag of an HTTP request head.
#[derive(Debug, PartialEq, Eq)]
pub struct RequestHead {
    pub method: String,
    pub path: String,
    pub websocket: bool,
}

/// Parse as much of a request head as `buf` holds.
pub fn parse_request_head(buf: &[u8]) -> Option<RequestHead> {
    let mut headers = [httparse::EMPTY_HEADER; 32];
    let mut req = httparse::Request::new(&mut headers);
    // A truncated head still yields the request line.
    let _ = req.parse(buf);
    let method = req.method?.to_string();
    let path = req.path?.to_string();
    let websocket = req.headers.iter().any(|h| {
        h.name.eq_ignore_ascii_case("upgrade")
            && std::str::from_utf8(h.value)
                .map(|v| v.trim().eq_ignore_ascii_case("websocket"))
                .unwrap_or(false)
    });
    Some(RequestHead {
        method,
        path,
        websocket,
    })
}

fn http_response(status: &str, content_type: &str, body: &str) -> String {
    format!(
        "HTTP/1.1 {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        content_type,
        body.len(),
        body,
    )
}

async fn handle_connection(mut stream: TcpStream, state: Arc<ServerState>) -> Result<()> {
    // Peek so the WebSocket handshake can still read the full request.
    let mut peek_buf = [0u8; 2048];
    let peek_n = stream.peek(&mut peek_buf).await?;
    let Some(head) = parse_request_head(&peek_buf[..peek_n]) else {
        return Ok(());
    };
    let path = head.path.split('?').next().unwrap_or("/").to_string();

    if head.websocket {
        if path == WS_PATH {
            let ws = tokio_tungstenite::accept_async(stream).await?;
            tracing::info!("chat socket opened");
            handle_chat(ws, state).await;
            tracing::info!("chat socket closed");
        } else {
            tracing::debug!(%path, "websocket upgrade on unknown path");
        }
        return Ok(());
    }

    let mut buf = vec![0u8; 8192];
    let _ = stream.read(&mut buf).await?;

    let response = match (head.method.as_str(), path.as_str()) {
        ("GET", "/") => http_response("200 OK", "text/html; charset=utf-8", &state.page),
        ("GET", "/health") => http_response("200 OK", "text/plain", "ok"),
        _ => http_response("404 Not Found", "text/plain", "Not Found"),
    };
    stream.write_all(response.as_bytes()).await?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Chat socket
// ---------------------------------------------------------------------------

/// Output of a running turn, consumed by the connection loop.
#[derive(Debug)]
enum TurnOutput {
    Fragment(String),
    /// Terminal fragment plus the reply text for the history.
    End { fragment: String, reply: String },
}

async fn handle_chat(ws: WebSocketStream<TcpStream>, state: Arc<ServerState>) {
    let (mut ws_sink, mut ws_source) = ws.split();
    let (turn_tx, mut turn_rx) = mpsc::unbounded_channel::<TurnOutput>();

    let mut history: Vec<ChatMessage> = state
        .system_prompt
        .iter()
        .map(|s| ChatMessage::system(s.clone()))
        .collect();
    let mut active: Option<CancellationToken> = None;

    loop {
        tokio::select! {
            msg = ws_source.next() => {
                match msg {
                    Some(Ok(WsMessage::Text(text))) => match ClientMessage::parse(&text) {
                        Some(ClientMessage::Chat { message }) => {
                            if active.is_some() {
                                tracing::warn!("message received while a turn is in flight; ignored");
                                continue;
                            }
                            if message.trim().is_empty() {
                                continue;
                            }
                            history.push(ChatMessage::user(message.clone()));
                            let echo = state.writer.user_message(&message, true);
                            if ws_sink.send(WsMessage::Text(echo)).await.is_err() {
                                break;
                            }
                            let cancel = CancellationToken::new();
                            active = Some(cancel.clone());
                            tokio::spawn(run_turn(
                                Arc::clone(&state),
                                history.clone(),
                                turn_tx.clone(),
                                cancel,
                            ));
                        }
                        Some(ClientMessage::Control { action: Action::Stop }) => {
                            match &active {
                                Some(cancel) => {
                                    tracing::info!("stop requested");
                                    cancel.cancel();
                                }
                                None => tracing::debug!("stop with nothing in flight"),
                            }
                        }
                        None => {}
                    },
                    Some(Ok(WsMessage::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => {}
                }
            }

            Some(out) = turn_rx.recv() => {
                match out {
                    TurnOutput::Fragment(html) => {
                        if ws_sink.send(WsMessage::Text(html)).await.is_err() {
                            break;
                        }
                    }
                    TurnOutput::End { fragment, reply } => {
                        history.push(ChatMessage::assistant(reply));
                        active = None;
                        if ws_sink.send(WsMessage::Text(fragment)).await.is_err() {
                            break;
                        }
                    }
                }
            }
        }
    }

    if let Some(cancel) = active {
        cancel.cancel();
    }
}

async fn run_turn(
    state: Arc<ServerState>,
    history: Vec<ChatMessage>,
    out: mpsc::UnboundedSender<TurnOutput>,
    cancel: CancellationToken,
) {
    let message_id = format!("msg-{}", uuid::Uuid::new_v4());
    let writer = &state.writer;
    let _ = out.send(TurnOutput::Fragment(writer.assistant_start(&message_id)));

    let (chunk_tx, mut chunk_rx) = mpsc::unbounded_channel::<String>();
    let responder = state.responder.clone();
    let turn_cancel = cancel.clone();
    let producer = tokio::spawn(async move { responder.stream(&history, chunk_tx, turn_cancel).await });

    let mut reply = String::new();
    while let Some(chunk) = chunk_rx.recv().await {
        reply.push_str(&chunk);
        let _ = out.send(TurnOutput::Fragment(writer.assistant_token(&message_id, &chunk)));
    }

    match producer.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            tracing::error!(error = %e, "reply failed");
            let _ = out.send(TurnOutput::Fragment(writer.notice(&message_id, &format!("Error: {}", e))));
        }
        Err(e) => tracing::error!(error = %e, "reply task panicked"),
    }
    if cancel.is_cancelled() {
        tracing::info!(chars = reply.len(), "turn stopped early");
    }

    let _ = out.send(TurnOutput::End {
        fragment: writer.assistant_end(&message_id),
        reply,
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_get() {
        let head = parse_request_head(b"GET /health HTTP/1.1\r\nHost: x\r\n\r\n").unwrap();
        assert_eq!(head.method, "GET");
        assert_eq!(head.path, "/health");
        assert!(!head.websocket);
    }

    #[test]
    fn test_parse_websocket_upgrade() {
        let raw = b"GET /ws/chat/ HTTP/1.1\r\nHost: x\r\nConnection: Upgrade\r\nUpgrade: websocket\r\nSec-WebSocket-Version: 13\r\n\r\n";
        let head = parse_request_head(raw).unwrap();
        assert_eq!(head.path, WS_PATH);
        assert!(head.websocket);
    }

    #[test]
    fn test_parse_upgrade_header_case_insensitive() {
        let raw = b"GET /ws/chat/ HTTP/1.1\r\nupgrade: WebSocket\r\n\r\n";
        assert!(parse_request_head(raw).unwrap().websocket);
    }

    #[test]
    fn test_parse_truncated_head_keeps_request_line() {
        let head = parse_request_head(b"GET / HTTP/1.1\r\nHost: exa").unwrap();
        assert_eq!(head.path, "/");
    }

    #[test]
    fn test_parse_garbage_is_none() {
        assert!(parse_request_head(b"").is_none());
    }

    #[test]
    fn test_http_response_content_length() {
        let resp = http_response("200 OK", "text/plain", "ok");
        assert!(resp.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(resp.contains("Content-Length: 2\r\n"));
        assert!(resp.ends_with("\r\n\r\nok"));
    }
}
