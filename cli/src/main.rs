use clap::Parser;
use tracing_subscriber::EnvFilter;

use molmesh_core::config;

mod commands;
mod error;
mod http;

use commands::cli;
use error::CliError;

#[tokio::main]
async fn main() -> Result<(), CliError> {
    let args = cli::Args::parse();
    let cfg = config::load(args.config.as_deref())?;

    // RUST_LOG wins over the configured level.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cfg.logging.level)),
        )
        .init();

    dispatch(args.command, cfg).await
}

async fn dispatch(cmd: cli::Commands, cfg: config::AppConfig) -> Result<(), CliError> {
    match cmd {
        cli::Commands::Serve(serve_args) => {
            commands::http_server::handle_http_server(serve_args, cfg).await
        }
        cli::Commands::Fetch(fetch_args) => commands::fetch::handle_fetch(fetch_args, &cfg).await,
        cli::Commands::Upload(upload_args) => {
            commands::fetch::handle_upload(upload_args, &cfg).await
        }
        cli::Commands::Config => {
            let text = toml::to_string_pretty(&cfg)
                .map_err(|e| CliError::Command(format!("cannot render config: {e}")))?;
            print!("{text}");
            Ok(())
        }
    }
}
