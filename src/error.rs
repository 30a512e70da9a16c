//! Crate-level error type.
//!
//! The coordinator itself never fails; these errors come from the edges
//! (sockets, config files, the reply provider) and are either surfaced by the
//! CLI or folded back into a `TransportFailed` event by the session.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid config {path}: {source}")]
    Config {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid activity file {path}: {source}")]
    Activities {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("{0} not set. Export it or pass via environment.")]
    MissingApiKey(&'static str),

    #[error("provider error: {0}")]
    Provider(String),

    /// The outbound channel is gone; nothing was delivered.
    #[error("transport closed: {0}")]
    Transport(String),
}

pub type Result<T> = std::result::Result<T, ChatError>;
