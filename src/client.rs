//! Terminal chat client.
//!
//! Connects to the chat socket and drives a [`ChatSession`] with a view that
//! prints applied fragments. Typing `/stop` cancels the current reply,
//! `/quit` exits.

use std::io::Write;

use colored::*;
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::Message as WsMessage;

use crate::config::Config;
use crate::coordinator::Controls;
use crate::error::{ChatError, Result};
use crate::fragment::{Fragment, MESSAGE_LIST_ID};
use crate::protocol::ClientMessage;
use crate::session::{ChatSession, ChatView, Transport};

// ---------------------------------------------------------------------------
// View
// ---------------------------------------------------------------------------

/// Renders fragments as lines of text on any writer.
pub struct TerminalView<W: Write> {
    out: W,
    messages: usize,
    controls: Controls,
}

impl TerminalView<std::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write> TerminalView<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            messages: 0,
            controls: Controls::ENABLED,
        }
    }

    pub fn controls(&self) -> Controls {
        self.controls
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn prompt(&mut self) {
        let _ = write!(self.out, "\n{} ", ">".bright_blue());
        let _ = self.out.flush();
    }
}

impl<W: Write> ChatView for TerminalView<W> {
    // The line editor already consumed the text; nothing to clear or shrink.
    fn clear_input(&mut self) {}

    fn reset_input_height(&mut self) {}

    fn set_controls(&mut self, controls: Controls) {
        self.controls = controls;
    }

    fn focus_input(&mut self) {
        self.prompt();
    }

    fn message_count(&self) -> usize {
        self.messages
    }

    fn apply_fragment(&mut self, fragment: &Fragment) {
        let text = fragment.text();
        let opens_message = fragment.attribute("id") == Some(MESSAGE_LIST_ID);
        if opens_message {
            self.messages += 1;
        }
        let _ = match (opens_message, fragment.attribute("data-role")) {
            (true, Some("user")) => write!(self.out, "\n{} {}", "you:".bright_green().bold(), text.trim()),
            (true, _) => write!(self.out, "\n{} {}", "tanda:".bright_magenta().bold(), text),
            (false, Some("notice")) => write!(self.out, "{}", text.dimmed()),
            (false, _) => write!(self.out, "{}", text),
        };
    }

    fn scroll_to_bottom(&mut self) {
        let _ = self.out.flush();
    }
}

// ---------------------------------------------------------------------------
// Transport
// ---------------------------------------------------------------------------

/// Queues outbound frames for the socket writer task.
pub struct WsTransport {
    tx: mpsc::UnboundedSender<WsMessage>,
}

impl WsTransport {
    pub fn new(tx: mpsc::UnboundedSender<WsMessage>) -> Self {
        Self { tx }
    }

    fn push(&self, msg: ClientMessage) -> Result<()> {
        self.tx
            .send(WsMessage::Text(msg.to_json()))
            .map_err(|_| ChatError::Transport("socket writer stopped".to_string()))
    }
}

impl Transport for WsTransport {
    fn send_message(&mut self, text: &str) -> Result<()> {
        self.push(ClientMessage::chat(text))
    }

    fn send_stop(&mut self) -> Result<()> {
        self.push(ClientMessage::stop())
    }
}

// ---------------------------------------------------------------------------
// Loop
// ---------------------------------------------------------------------------

/// A line typed by the user.
#[derive(Debug, PartialEq, Eq)]
pub enum Command<'a> {
    Stop,
    Quit,
    Send(&'a str),
}

pub fn parse_command(line: &str) -> Command<'_> {
    match line.trim() {
        "/stop" => Command::Stop,
        "/quit" | "/exit" => Command::Quit,
        _ => Command::Send(line),
    }
}

pub async fn run(url: &str, config: &Config) -> Result<()> {
    let (ws, _) = tokio_tungstenite::connect_async(url).await?;
    tracing::info!(%url, "connected");
    eprintln!(
        "{}",
        "  Connected. /stop cancels a reply, /quit exits.".bright_blue()
    );

    let (mut ws_sink, mut ws_source) = ws.split();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<WsMessage>();
    let writer = tokio::spawn(async move {
        while let Some(msg) = out_rx.recv().await {
            if ws_sink.send(msg).await.is_err() {
                break;
            }
        }
        let _ = ws_sink.close().await;
    });

    let mut session = ChatSession::new(
        TerminalView::stdout(),
        WsTransport::new(out_tx),
        config.chat.marker_attribute.clone(),
    );
    let stall_timeout = config.client.stall_timeout();
    let mut last_activity = Instant::now();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    session.view_mut().focus_input();

    loop {
        let stall_deadline = match stall_timeout {
            Some(limit) if session.state().generating() => Some(last_activity + limit),
            _ => None,
        };
        let stall = async move {
            match stall_deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                match parse_command(&line) {
                    Command::Quit => break,
                    Command::Stop => session.stop(),
                    Command::Send(text) => {
                        if !session.controls().input_enabled {
                            println!("{}", "  (reply in progress; /stop to cancel)".dimmed());
                            continue;
                        }
                        if text.trim().is_empty() {
                            session.view_mut().focus_input();
                            continue;
                        }
                        last_activity = Instant::now();
                        session.send(text);
                    }
                }
            }

            msg = ws_source.next() => {
                match msg {
                    Some(Ok(WsMessage::Text(text))) => {
                        last_activity = Instant::now();
                        session.receive_fragment(&text);
                    }
                    Some(Ok(WsMessage::Close(_))) | Some(Err(_)) | None => {
                        session.transport_failed();
                        eprintln!("\n{}", "  Connection closed.".bright_red());
                        break;
                    }
                    Some(Ok(_)) => {}
                }
            }

            _ = stall => {
                eprintln!("\n{}", "  No reply for too long; input re-enabled.".yellow());
                session.stalled();
            }
        }
    }

    drop(session);
    let _ = writer.await;
    Ok(())
}
