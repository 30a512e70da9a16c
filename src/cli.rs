use std::path::PathBuf;

use clap::{Parser, Subcommand};
use clap_complete::Shell;

use crate::config::{Config, ResponderKind};
use crate::viz::Theme;

#[derive(Parser)]
#[command(name = "tandarunner")]
#[command(version)]
#[command(about = "Running visualizations and a streaming chat over WebSocket fragment swaps")]
pub struct Args {
    /// Path to a TOML config file (defaults to ./tandarunner.toml if present)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Serve the page and the chat socket
    Serve {
        /// Address to bind
        #[arg(long)]
        host: Option<String>,

        /// Port to bind
        #[arg(long)]
        port: Option<u16>,

        /// Reply source
        #[arg(long, value_enum)]
        responder: Option<ResponderKind>,

        /// Initial chart theme
        #[arg(long, value_enum)]
        theme: Option<Theme>,

        /// JSON activity export to chart instead of the sample log
        #[arg(long)]
        activities: Option<PathBuf>,

        /// Open the page in a browser once bound
        #[arg(long)]
        open: bool,
    },
    /// Chat with a running server from the terminal
    Chat {
        /// WebSocket URL of the chat endpoint
        #[arg(long, default_value = "ws://127.0.0.1:8888/ws/chat/")]
        url: String,
    },
    /// Print shell completions
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Fold `serve` flags over the file config. Flags win.
pub fn apply_serve_overrides(
    mut config: Config,
    host: Option<String>,
    port: Option<u16>,
    responder: Option<ResponderKind>,
    theme: Option<Theme>,
    activities: Option<PathBuf>,
    open: bool,
) -> Config {
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }
    if let Some(responder) = responder {
        config.chat.responder = responder;
    }
    if let Some(theme) = theme {
        config.visualizations.theme = theme;
    }
    if let Some(path) = activities {
        config.visualizations.activities = Some(path);
    }
    config.server.open_browser |= open;
    config
}
