//! Reply sources for the chat server.
//!
//! A responder streams text chunks into an mpsc channel until the reply is
//! complete or the turn's cancellation token fires. Both paths return
//! `Ok(())`; the caller decides what the client sees.

use std::env;
use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::config::{ChatConfig, ResponderKind};
use crate::error::{ChatError, Result};

/// One entry of the conversation history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: "system".to_string(), content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: "user".to_string(), content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: "assistant".to_string(), content: content.into() }
    }
}

// -- OpenAI SSE types -------------------------------------------------------

#[derive(Debug, Serialize)]
struct OpenAIChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct OpenAIDelta {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAIChoice {
    delta: OpenAIDelta,
}

#[derive(Debug, Deserialize)]
struct OpenAIChunk {
    choices: Vec<OpenAIChoice>,
}

/// Extract the content delta from one SSE line, if it carries any.
pub fn parse_openai_line(line: &str) -> Option<String> {
    let json_str = line.trim().strip_prefix("data: ")?;
    if json_str == "[DONE]" {
        return None;
    }
    let chunk: OpenAIChunk = serde_json::from_str(json_str).ok()?;
    chunk.choices.into_iter().next()?.delta.content
}

// -- Responder --------------------------------------------------------------

#[derive(Clone)]
pub struct OpenAiResponder {
    client: Client,
    api_key: String,
    base_url: String,
    pub model: String,
}

#[derive(Clone)]
pub enum Responder {
    /// Repeats the user's message back word by word.
    Echo { delay: Duration },
    OpenAi(OpenAiResponder),
}

impl Responder {
    pub fn from_config(cfg: &ChatConfig) -> Result<Self> {
        match cfg.responder {
            ResponderKind::Echo => Ok(Responder::Echo {
                delay: Duration::from_millis(cfg.echo_delay_ms),
            }),
            ResponderKind::Openai => {
                let api_key =
                    env::var("OPENAI_API_KEY").map_err(|_| ChatError::MissingApiKey("OPENAI_API_KEY"))?;
                Ok(Responder::OpenAi(OpenAiResponder::new(
                    api_key,
                    &cfg.openai_base_url,
                    cfg.model.clone(),
                )))
            }
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Responder::Echo { .. } => "echo",
            Responder::OpenAi(r) => &r.model,
        }
    }

    /// Stream the reply to `history` into `tx`.
    pub async fn stream(
        &self,
        history: &[ChatMessage],
        tx: mpsc::UnboundedSender<String>,
        cancel: CancellationToken,
    ) -> Result<()> {
        match self {
            Responder::Echo { delay } => stream_echo(history, *delay, tx, cancel).await,
            Responder::OpenAi(r) => r.stream(history, tx, cancel).await,
        }
    }
}

pub fn echo_reply(history: &[ChatMessage]) -> String {
    let last = history
        .iter()
        .rev()
        .find(|m| m.role == "user")
        .map(|m| m.content.as_str())
        .unwrap_or("");
    format!("You said: {}", last)
}

async fn stream_echo(
    history: &[ChatMessage],
    delay: Duration,
    tx: mpsc::UnboundedSender<String>,
    cancel: CancellationToken,
) -> Result<()> {
    let reply = echo_reply(history);
    for word in reply.split_inclusive(' ') {
        tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            _ = tokio::time::sleep(delay) => {}
        }
        if tx.send(word.to_string()).is_err() {
            break;
        }
    }
    Ok(())
}

impl OpenAiResponder {
    pub fn new(api_key: impl Into<String>, base_url: &str, model: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.into(),
        }
    }

    async fn stream(
        &self,
        history: &[ChatMessage],
        tx: mpsc::UnboundedSender<String>,
        cancel: CancellationToken,
    ) -> Result<()> {
        let request = OpenAIChatRequest {
            model: &self.model,
            messages: history,
            stream: true,
            temperature: 0.7,
        };

        let response = tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            r = self
                .client
                .post(format!("{}/chat/completions", self.base_url))
                .bearer_auth(&self.api_key)
                .json(&request)
                .send() => r?,
        };

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(ChatError::Provider(format!("OpenAI API error {}: {}", status, error_text)));
        }

        let mut stream = response.bytes_stream();
        let mut buffer: Vec<u8> = Vec::new();

        loop {
            let chunk = tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::debug!("completion stream abandoned on stop");
                    return Ok(());
                }
                next = stream.next() => match next {
                    Some(chunk) => chunk?,
                    None => break,
                },
            };
            // Chunks may split a multi-byte character; decode whole lines only.
            buffer.extend_from_slice(&chunk);
            while let Some(line_end) = buffer.iter().position(|&b| b == b'\n') {
                let line: Vec<u8> = buffer.drain(..=line_end).collect();
                if let Some(content) = parse_openai_line(&String::from_utf8_lossy(&line)) {
                    if tx.send(content).is_err() {
                        return Ok(());
                    }
                }
            }
        }

        if let Some(content) = parse_openai_line(&String::from_utf8_lossy(&buffer)) {
            let _ = tx.send(content);
        }
        Ok(())
    }
}
