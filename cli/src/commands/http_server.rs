//! `molmesh serve`

use tokio::sync::broadcast;

use molmesh_core::api::{AppConfig, AppContext};
use molmesh_plugins::PluginServicesFactory;

use crate::commands::cli::ServeArgs;
use crate::error::CliError;
use crate::http::{server, AppState};

pub async fn handle_http_server(args: ServeArgs, mut cfg: AppConfig) -> Result<(), CliError> {
    // Explicit flags win over file and environment.
    if let Some(host) = args.host {
        cfg.server.host = host;
    }
    if let Some(port) = args.port {
        cfg.server.port = port;
    }

    let ctx = AppContext::from_factory(cfg, &PluginServicesFactory)?;
    let (shutdown_tx, _) = broadcast::channel(1);
    let state = AppState::new(ctx, shutdown_tx);

    tracing::info!(
        session_id = %state.session_id,
        renderer = %state.ctx.cfg().renderer.program,
        max_workers = state.ctx.cfg().server.max_workers,
        scratch = %state.ctx.cfg().renderer.scratch_root().display(),
        "starting molmesh server"
    );

    server::start_server(state)
        .await
        .map_err(|e| CliError::Command(e.to_string()))
}
