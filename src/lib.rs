pub mod activity;
pub mod cli;
pub mod client;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod fragment;
pub mod page;
pub mod protocol;
pub mod responder;
pub mod server;
pub mod session;
pub mod tanda;
pub mod training;
pub mod viz;

pub use coordinator::{Controls, Effect, Event, GenerationCoordinator, GenerationState, Phase};
pub use error::{ChatError, Result};
pub use fragment::{Continuation, Fragment, FragmentWriter};
pub use session::{ChatSession, ChatView, Disposition, Transport};

/// Install the global tracing subscriber. `RUST_LOG` overrides the default
/// `tandarunner=info` filter.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("tandarunner=info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
