use clap::{CommandFactory, Parser};

use tandarunner::cli::{apply_serve_overrides, Args, Command};
use tandarunner::config::Config;
use tandarunner::{client, server};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    match args.command {
        Command::Completions { shell } => {
            let mut cmd = Args::command();
            clap_complete::generate(shell, &mut cmd, "tandarunner", &mut std::io::stdout());
        }
        Command::Serve {
            host,
            port,
            responder,
            theme,
            activities,
            open,
        } => {
            tandarunner::init_tracing();
            let config = Config::load(args.config.as_deref())?;
            let config = apply_serve_overrides(config, host, port, responder, theme, activities, open);
            server::serve(&config).await?;
        }
        Command::Chat { url } => {
            tandarunner::init_tracing();
            let config = Config::load(args.config.as_deref())?;
            client::run(&url, &config).await?;
            // stdin is read on a blocking thread that would otherwise keep the
            // runtime alive until the next line.
            std::process::exit(0);
        }
    }

    Ok(())
}
