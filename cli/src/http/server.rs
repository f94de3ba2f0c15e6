//! HTTP server lifecycle

use std::net::SocketAddr;
use std::time::Duration;

use axum::middleware;
use tokio::signal;
use tracing::{info, warn};

use crate::http::{
    middleware::{create_timeout_layer, create_trace_layer, request_logger},
    routes::create_router,
    AppState,
};

pub async fn start_server(state: AppState) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let cfg = state.ctx.cfg().server.clone();
    let addr: SocketAddr = format!("{}:{}", cfg.host, cfg.port).parse()?;
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    serve(listener, state, Duration::from_secs(cfg.request_timeout_secs)).await
}

/// Serves until Ctrl+C, SIGTERM or `POST /api/v1/shutdown`, then sweeps
/// every workspace still registered.
pub async fn serve(
    listener: tokio::net::TcpListener,
    state: AppState,
    request_timeout: Duration,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let app = create_router(state.clone())
        .layer(middleware::from_fn(request_logger))
        .layer(create_timeout_layer(request_timeout))
        .layer(create_trace_layer());

    info!(
        session_id = %state.session_id,
        "HTTP server listening on http://{}",
        listener.local_addr()?
    );

    let mut shutdown_rx = state.shutdown_tx.subscribe();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            tokio::select! {
                _ = signal::ctrl_c() => {
                    info!("Received Ctrl+C signal");
                }
                _ = shutdown_rx.recv() => {
                    info!("Received shutdown signal from API");
                }
                _ = wait_for_sigterm() => {
                    info!("Received SIGTERM signal");
                }
            }
            info!("Starting graceful shutdown...");
        })
        .await?;

    let scheduler = state.ctx.scheduler().clone();
    let swept = tokio::task::spawn_blocking(move || scheduler.run_pending()).await?;
    info!(swept, "Server shutdown complete");
    Ok(())
}

#[cfg(unix)]
async fn wait_for_sigterm() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            sigterm.recv().await;
        }
        Err(e) => {
            warn!(error = %e, "SIGTERM handler unavailable");
            std::future::pending::<()>().await
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_sigterm() {
    std::future::pending::<()>().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use molmesh_core::api::{
        AppConfig, AppContext, CapturedOutput, CommandRunner, CommandSpec, MeshError, Services,
        StructureConverter,
    };
    use std::path::{Path, PathBuf};
    use std::sync::Arc;
    use tokio::sync::broadcast;

    struct OneFileRenderer;

    impl CommandRunner for OneFileRenderer {
        fn run(&self, spec: &CommandSpec) -> Result<CapturedOutput, MeshError> {
            let pos = spec.args.iter().position(|a| a == "--type").unwrap();
            std::fs::write(PathBuf::from(&spec.args[pos - 1]).join("m.usdz"), b"m").unwrap();
            Ok(CapturedOutput::default())
        }
    }

    struct Unused;

    impl StructureConverter for Unused {
        fn legacy_to_canonical(&self, _: &Path, _: &Path) -> Result<(), MeshError> {
            unreachable!()
        }
        fn table_to_legacy(&self, _: &Path, _: &Path) -> Result<(), MeshError> {
            unreachable!()
        }
    }

    #[tokio::test]
    async fn test_server_lifecycle_sweeps_on_shutdown() {
        let scratch = tempfile::tempdir().unwrap();
        let mut cfg = AppConfig::default();
        cfg.renderer.scratch_dir = Some(scratch.path().to_path_buf());
        let ctx = AppContext::new(
            cfg,
            Services {
                runner: Arc::new(OneFileRenderer),
                converter: Arc::new(Unused),
            },
        );
        let (shutdown_tx, _) = broadcast::channel(1);
        let state = AppState::new(ctx, shutdown_tx.clone());

        // A workspace that finished rendering but was never swept.
        let outcome = state
            .ctx
            .pipeline()
            .render(
                molmesh_core::api::RenderInput::Identifier("1x8x".into()),
                Default::default(),
            )
            .await
            .unwrap();
        outcome.ticket.release();
        assert_eq!(state.ctx.scheduler().pending_len(), 1);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let server_handle = tokio::spawn(serve(listener, state.clone(), Duration::from_secs(5)));

        tokio::time::sleep(Duration::from_millis(100)).await;
        let _ = shutdown_tx.send(());

        let result = tokio::time::timeout(Duration::from_secs(5), server_handle).await;
        assert!(result.is_ok(), "Server should shutdown gracefully");
        assert_eq!(state.ctx.scheduler().pending_len(), 0);
        assert_eq!(std::fs::read_dir(scratch.path()).unwrap().count(), 0);
    }
}
