//! HTTP route handlers

use axum::{
    body::{Body, Bytes},
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::{header, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use molmesh_core::api::{
    archive_name, build_archive, select_single, CleanupTicket, DeliveryMode, FrameEncoder,
    MeshError, RenderInput, RenderOptions, RenderOutcome, CHUNK_STREAM_CONTENT_TYPE,
    NO_ARTIFACT_PRODUCED,
};
use tracing::warn;

use crate::http::{models::*, state::AppState};

pub(crate) const X_REQUEST_ID: &str = "x-request-id";
const X_ARTIFACT_COUNT: &str = "x-artifact-count";

pub fn create_router(state: AppState) -> Router {
    let upload_limit = state.ctx.cfg().server.max_upload_bytes;
    Router::new()
        .route("/health", get(health_handler))
        .route(
            "/api/v1/mesh/upload",
            post(upload_handler).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/api/v1/mesh/:id", get(single_handler))
        .route("/api/v1/mesh/:id/batch", get(batch_handler))
        .route("/api/v1/mesh/:id/stream", get(stream_handler))
        .route("/api/v1/shutdown", post(shutdown_handler))
        .with_state(state)
}

/// GET /api/v1/mesh/:id
async fn single_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<RenderQuery>,
) -> Result<Response, HttpServerError> {
    render_identifier(&state, id, &query, DeliveryMode::Single).await
}

/// GET /api/v1/mesh/:id/batch
async fn batch_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<RenderQuery>,
) -> Result<Response, HttpServerError> {
    render_identifier(&state, id, &query, DeliveryMode::Batch).await
}

/// GET /api/v1/mesh/:id/stream
async fn stream_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<RenderQuery>,
) -> Result<Response, HttpServerError> {
    render_identifier(&state, id, &query, DeliveryMode::Stream).await
}

async fn render_identifier(
    state: &AppState,
    id: String,
    query: &RenderQuery,
    mode: DeliveryMode,
) -> Result<Response, HttpServerError> {
    state.stats_mut().increment_request(mode.as_str());
    let options = resolve_options(state, query)?;
    let outcome = render(state, RenderInput::Identifier(id), options).await?;
    deliver(state, outcome, mode).await
}

/// POST /api/v1/mesh/upload
async fn upload_handler(
    State(state): State<AppState>,
    Query(query): Query<RenderQuery>,
    mut multipart: Multipart,
) -> Result<Response, HttpServerError> {
    state.stats_mut().increment_request("upload");
    let options = resolve_options(&state, &query)?;

    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| HttpServerError::BadRequest(e.body_text()))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let file_name = field
            .file_name()
            .map(str::to_string)
            .ok_or_else(|| HttpServerError::BadRequest("file field has no file name".into()))?;
        let data = field
            .bytes()
            .await
            .map_err(|e| HttpServerError::BadRequest(e.body_text()))?;
        upload = Some(RenderInput::Upload { file_name, data });
        break;
    }
    let input = upload
        .ok_or_else(|| HttpServerError::BadRequest("missing multipart field `file`".into()))?;

    let outcome = render(&state, input, options).await?;
    let mode = if query.batch {
        DeliveryMode::Batch
    } else {
        DeliveryMode::Single
    };
    deliver(&state, outcome, mode).await
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let stats = state.stats();
    Json(HealthResponse {
        status: "healthy".into(),
        version: env!("CARGO_PKG_VERSION").into(),
        session_id: state.session_id.clone(),
        started_at: stats.started_at.to_rfc3339(),
        uptime_seconds: stats.uptime_seconds(),
        requests_handled: stats.requests_total,
        errors: stats.errors_total,
        artifacts_sent: stats.artifacts_sent,
        idle_workers: state.ctx.pipeline().idle_workers(),
        pending_cleanup: state.ctx.scheduler().pending_len(),
    })
}

/// POST /api/v1/shutdown
async fn shutdown_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    tracing::info!("Shutdown requested via API");
    let _ = state.shutdown_tx.send(());
    Json(serde_json::json!({
        "success": true,
        "message": "Server shutting down"
    }))
}

fn resolve_options(state: &AppState, query: &RenderQuery) -> Result<RenderOptions, HttpServerError> {
    Ok(query.patch().apply(state.ctx.cfg().renderer.defaults)?)
}

/// Runs the pipeline; on failure the workspace (if any) is already
/// registered, so a sweep clears it right away.
async fn render(
    state: &AppState,
    input: RenderInput,
    options: RenderOptions,
) -> Result<RenderOutcome, HttpServerError> {
    match state.ctx.pipeline().render(input, options).await {
        Ok(outcome) => Ok(outcome),
        Err(e) => {
            state.stats_mut().increment_error();
            state.ctx.scheduler().sweep_in_background();
            Err(e.into())
        }
    }
}

async fn deliver(
    state: &AppState,
    outcome: RenderOutcome,
    mode: DeliveryMode,
) -> Result<Response, HttpServerError> {
    match mode {
        DeliveryMode::Single => single_response(state, outcome),
        DeliveryMode::Batch => batch_response(state, outcome).await,
        DeliveryMode::Stream => Ok(stream_response(state, outcome)),
    }
}

fn single_response(state: &AppState, outcome: RenderOutcome) -> Result<Response, HttpServerError> {
    let RenderOutcome {
        request_id,
        artifacts,
        ticket,
        ..
    } = outcome;
    let Some(artifact) = select_single(artifacts) else {
        ticket.release_and_sweep();
        return Err(MeshError::RenderFailed(NO_ARTIFACT_PRODUCED.into()).into());
    };
    state.stats_mut().artifacts_sent += 1;

    Ok(attachment(
        "application/octet-stream",
        &artifact.name,
        &request_id,
        artifact.data,
        ticket,
    ))
}

async fn batch_response(state: &AppState, outcome: RenderOutcome) -> Result<Response, HttpServerError> {
    let RenderOutcome {
        request_id,
        label,
        artifacts,
        ticket,
    } = outcome;
    let count = artifacts.len() as u64;

    let archive = tokio::task::spawn_blocking(move || build_archive(&artifacts))
        .await
        .map_err(|e| HttpServerError::Internal(format!("archive worker aborted: {e}")))
        .and_then(|r| r.map_err(HttpServerError::from));
    let archive = match archive {
        Ok(archive) => archive,
        Err(e) => {
            state.stats_mut().increment_error();
            ticket.release_and_sweep();
            return Err(e);
        }
    };
    state.stats_mut().artifacts_sent += count;

    Ok(attachment(
        "application/zip",
        &archive_name(&label),
        &request_id,
        Bytes::from(archive),
        ticket,
    ))
}

fn stream_response(state: &AppState, outcome: RenderOutcome) -> Response {
    let RenderOutcome {
        request_id,
        artifacts,
        ticket,
        ..
    } = outcome;
    let count = artifacts.len();
    state.stats_mut().artifacts_sent += count as u64;

    let frames = FrameEncoder::new(artifacts, state.ctx.cfg().transfer.chunk_size);
    let release = ReleaseOnDrop(Some(ticket));
    let rid = request_id.clone();
    let body = async_stream::stream! {
        // Owned by the generator from creation, so an unpolled body still sweeps.
        let _release = release;
        for frame in frames {
            match frame {
                Ok(bytes) => yield Ok::<Bytes, MeshError>(bytes),
                Err(e) => {
                    warn!(request_id = %rid, error = %e, "aborting chunk stream");
                    yield Err(e);
                    break;
                }
            }
        }
    };

    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, HeaderValue::from_static(CHUNK_STREAM_CONTENT_TYPE)),
            (HeaderName::from_static(X_REQUEST_ID), header_value(&request_id)),
            (HeaderName::from_static(X_ARTIFACT_COUNT), HeaderValue::from(count)),
        ],
        Body::from_stream(body),
    )
        .into_response()
}

/// A complete payload whose workspace is released once the body has been
/// handed to the transport, or dropped.
fn attachment(
    content_type: &'static str,
    file_name: &str,
    request_id: &str,
    data: Bytes,
    ticket: CleanupTicket,
) -> Response {
    let len = data.len();
    let release = ReleaseOnDrop(Some(ticket));
    let body = async_stream::stream! {
        let _release = release;
        yield Ok::<Bytes, std::io::Error>(data);
    };

    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, HeaderValue::from_static(content_type)),
            (header::CONTENT_DISPOSITION, content_disposition(file_name)),
            (header::CONTENT_LENGTH, HeaderValue::from(len)),
            (HeaderName::from_static(X_REQUEST_ID), header_value(request_id)),
        ],
        Body::from_stream(body),
    )
        .into_response()
}

struct ReleaseOnDrop(Option<CleanupTicket>);

impl Drop for ReleaseOnDrop {
    fn drop(&mut self) {
        if let Some(ticket) = self.0.take() {
            ticket.release_and_sweep();
        }
    }
}

pub(crate) fn content_disposition(file_name: &str) -> HeaderValue {
    let safe: String = file_name
        .chars()
        .map(|c| match c {
            '"' | '\\' => '_',
            c if c.is_ascii_graphic() || c == ' ' => c,
            _ => '_',
        })
        .collect();
    header_value(&format!("attachment; filename=\"{safe}\""))
}

fn header_value(s: &str) -> HeaderValue {
    HeaderValue::from_str(s).unwrap_or_else(|_| HeaderValue::from_static("invalid"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;
    use molmesh_core::api::{
        collect_artifacts, AppConfig, AppContext, CapturedOutput, CommandRunner, CommandSpec,
        Services, StructureConverter,
    };
    use pretty_assertions::assert_eq;
    use std::io::Read;
    use std::path::{Path as FsPath, PathBuf};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tokio::sync::broadcast;
    use tower::ServiceExt;

    /// Writes fixed files into the renderer output dir, or complains on stderr.
    struct FakeRenderer {
        outputs: Vec<(&'static str, Vec<u8>)>,
        stderr: &'static str,
        calls: Mutex<Vec<CommandSpec>>,
    }

    impl CommandRunner for FakeRenderer {
        fn run(&self, spec: &CommandSpec) -> Result<CapturedOutput, MeshError> {
            self.calls.lock().unwrap().push(spec.clone());
            let pos = spec.args.iter().position(|a| a == "--type").unwrap();
            let dir = PathBuf::from(&spec.args[pos - 1]);
            for (name, data) in &self.outputs {
                std::fs::write(dir.join(name), data).unwrap();
            }
            Ok(CapturedOutput {
                exit_code: 0,
                stdout: Vec::new(),
                stderr: self.stderr.as_bytes().to_vec(),
            })
        }
    }

    struct CopyConverter;

    impl StructureConverter for CopyConverter {
        fn legacy_to_canonical(&self, input: &FsPath, output: &FsPath) -> Result<(), MeshError> {
            std::fs::copy(input, output).unwrap();
            Ok(())
        }
        fn table_to_legacy(&self, input: &FsPath, output: &FsPath) -> Result<(), MeshError> {
            std::fs::copy(input, output).unwrap();
            Ok(())
        }
    }

    struct TestServer {
        scratch: tempfile::TempDir,
        renderer: Arc<FakeRenderer>,
        state: AppState,
    }

    impl TestServer {
        fn new(outputs: Vec<(&'static str, Vec<u8>)>, stderr: &'static str) -> Self {
            let scratch = tempfile::tempdir().unwrap();
            let mut cfg = AppConfig::default();
            cfg.renderer.scratch_dir = Some(scratch.path().to_path_buf());
            cfg.transfer.chunk_size = 1024;

            let renderer = Arc::new(FakeRenderer {
                outputs,
                stderr,
                calls: Mutex::new(Vec::new()),
            });
            let ctx = AppContext::new(
                cfg,
                Services {
                    runner: renderer.clone(),
                    converter: Arc::new(CopyConverter),
                },
            );
            let (shutdown_tx, _) = broadcast::channel(1);
            Self {
                scratch,
                renderer,
                state: AppState::new(ctx, shutdown_tx),
            }
        }

        async fn send(&self, request: Request<Body>) -> Response {
            create_router(self.state.clone())
                .oneshot(request)
                .await
                .unwrap()
        }

        /// Sweeps run on the blocking pool; wait for the scratch root to empty.
        async fn wait_until_clean(&self) {
            for _ in 0..100 {
                if std::fs::read_dir(self.scratch.path()).unwrap().count() == 0 {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
            panic!("workspace was not cleaned up");
        }
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn body_bytes(response: Response) -> Bytes {
        axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap()
    }

    fn disposition(response: &Response) -> &str {
        response.headers()[header::CONTENT_DISPOSITION]
            .to_str()
            .unwrap()
    }

    #[tokio::test]
    async fn single_artifact_is_returned_with_its_file_name() {
        let server = TestServer::new(vec![("1x8x.usdz", b"usdz".to_vec())], "");

        let response = server.send(get("/api/v1/mesh/1X8X")).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(disposition(&response), "attachment; filename=\"1x8x.usdz\"");
        assert_eq!(body_bytes(response).await, Bytes::from_static(b"usdz"));

        let calls = server.renderer.calls.lock().unwrap().clone();
        assert_eq!(
            calls[0].args[4..].to_vec(),
            vec!["--type", "mesh", "--show-branched-sticks"]
        );
        server.wait_until_clean().await;
    }

    #[tokio::test]
    async fn query_overrides_render_options() {
        let server = TestServer::new(vec![("x.usdz", b"x".to_vec())], "");

        let response = server
            .send(get(
                "/api/v1/mesh/1x8x?mode=surface&show_branched_sticks=false&force_bfactor=true",
            ))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        body_bytes(response).await;

        let calls = server.renderer.calls.lock().unwrap().clone();
        assert_eq!(
            calls[0].args[4..].to_vec(),
            vec!["--type", "surface", "--force-bfactor"]
        );
    }

    #[tokio::test]
    async fn unknown_mode_is_rejected_before_rendering() {
        let server = TestServer::new(vec![], "");
        let response = server.send(get("/api/v1/mesh/1x8x?mode=wireframe")).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let err: ErrorResponse = serde_json::from_slice(&body_bytes(response).await).unwrap();
        assert_eq!(err.error_code, "invalid_options");
        assert!(server.renderer.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn batch_returns_zip_named_after_identifier() {
        let server = TestServer::new(
            vec![("4hhb_b.usdz", b"bbb".to_vec()), ("4hhb_a.usdz", b"aa".to_vec())],
            "",
        );

        let response = server.send(get("/api/v1/mesh/4hhb/batch")).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(disposition(&response), "attachment; filename=\"4hhb.zip\"");
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/zip");

        let bytes = body_bytes(response).await;
        let mut zip = zip::ZipArchive::new(std::io::Cursor::new(bytes.to_vec())).unwrap();
        let mut names: Vec<String> = zip.file_names().map(str::to_string).collect();
        names.sort();
        assert_eq!(names, vec!["4hhb_a.usdz", "4hhb_b.usdz"]);
        let mut content = Vec::new();
        zip.by_name("4hhb_b.usdz")
            .unwrap()
            .read_to_end(&mut content)
            .unwrap();
        assert_eq!(content, b"bbb");
        server.wait_until_clean().await;
    }

    #[tokio::test]
    async fn stream_reassembles_on_the_client() {
        let big: Vec<u8> = (0..2560u32).map(|i| (i % 7) as u8).collect();
        let server = TestServer::new(
            vec![("a.usdz", b"abc".to_vec()), ("b.usdz", big.clone())],
            "",
        );

        let response = server.send(get("/api/v1/mesh/1abc/stream")).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            CHUNK_STREAM_CONTENT_TYPE
        );
        assert_eq!(response.headers()[X_ARTIFACT_COUNT], "2");

        let artifacts = collect_artifacts(response.into_body().into_data_stream(), 1 << 20)
            .await
            .unwrap();
        let names: Vec<&str> = artifacts.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["a.usdz", "b.usdz"]);
        assert_eq!(artifacts[1].data.as_ref(), big.as_slice());
        server.wait_until_clean().await;
    }

    #[tokio::test]
    async fn unread_single_download_still_cleans_up() {
        let server = TestServer::new(vec![("1x8x.usdz", b"usdz".to_vec())], "");
        let response = server.send(get("/api/v1/mesh/1x8x")).await;
        assert_eq!(response.status(), StatusCode::OK);
        drop(response);
        server.wait_until_clean().await;
        assert_eq!(server.state.ctx.scheduler().pending_len(), 0);
    }

    #[tokio::test]
    async fn unread_batch_download_still_cleans_up() {
        let server = TestServer::new(vec![("4hhb_a.usdz", b"aa".to_vec())], "");
        let response = server.send(get("/api/v1/mesh/4hhb/batch")).await;
        assert_eq!(response.status(), StatusCode::OK);
        drop(response);
        server.wait_until_clean().await;
        assert_eq!(server.state.ctx.scheduler().pending_len(), 0);
    }

    #[tokio::test]
    async fn abandoned_stream_still_cleans_up() {
        let server = TestServer::new(vec![("a.usdz", vec![1u8; 5000])], "");
        let response = server.send(get("/api/v1/mesh/1abc/stream")).await;
        assert_eq!(response.status(), StatusCode::OK);
        drop(response);
        server.wait_until_clean().await;
    }

    #[tokio::test]
    async fn renderer_diagnostics_map_to_bad_gateway() {
        let server = TestServer::new(vec![("1x8x.usdz", b"x".to_vec())], "unknown id");

        let response = server.send(get("/api/v1/mesh/zzzz")).await;
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        let err: ErrorResponse = serde_json::from_slice(&body_bytes(response).await).unwrap();
        assert!(!err.success);
        assert_eq!(err.error_code, "render_failed");
        assert_eq!(err.error, "render failed: unknown id");
        server.wait_until_clean().await;
        assert_eq!(server.state.stats().errors_total, 1);
    }

    fn multipart(file_name: &str, content: &[u8]) -> (String, Vec<u8>) {
        let boundary = "molmesh-test-boundary";
        let mut body = Vec::new();
        body.extend_from_slice(
            format!(
                "--{boundary}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{file_name}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(content);
        body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
        (format!("multipart/form-data; boundary={boundary}"), body)
    }

    fn upload(uri: &str, file_name: &str, content: &[u8]) -> Request<Body> {
        let (content_type, body) = multipart(file_name, content);
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, content_type)
            .body(Body::from(body))
            .unwrap()
    }

    #[tokio::test]
    async fn upload_renders_the_converted_file() {
        let server = TestServer::new(vec![("ligand.usdz", b"mesh".to_vec())], "");

        let response = server
            .send(upload("/api/v1/mesh/upload", "ligand.pdb", b"ATOM"))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(disposition(&response), "attachment; filename=\"ligand.usdz\"");
        assert_eq!(body_bytes(response).await, Bytes::from_static(b"mesh"));

        let calls = server.renderer.calls.lock().unwrap().clone();
        assert_eq!(calls[0].args[2], "--input");
        assert!(calls[0].args[3].ends_with("structure.cif"));
        assert_eq!(calls[0].args[4], "ligand");
        server.wait_until_clean().await;
    }

    #[tokio::test]
    async fn upload_batch_names_archive_after_file_stem() {
        let server = TestServer::new(vec![("ligand.usdz", b"mesh".to_vec())], "");
        let response = server
            .send(upload("/api/v1/mesh/upload?batch=true", "ligand.cif", b"data_x"))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(disposition(&response), "attachment; filename=\"ligand.zip\"");
        body_bytes(response).await;
    }

    #[tokio::test]
    async fn upload_errors_are_client_errors() {
        let server = TestServer::new(vec![], "");

        let response = server
            .send(upload("/api/v1/mesh/upload", "notes.txt", b"hello"))
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = server
            .send(upload("/api/v1/mesh/upload", "ligand.sdf", b"junk\n$$$$\n"))
            .await;
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let err: ErrorResponse = serde_json::from_slice(&body_bytes(response).await).unwrap();
        assert_eq!(err.error_code, "no_molecule_found");

        assert!(server.renderer.calls.lock().unwrap().is_empty());
        assert_eq!(std::fs::read_dir(server.scratch.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn health_reports_counters() {
        let server = TestServer::new(vec![], "");
        server.state.stats_mut().increment_request("single");

        let response = server.send(get("/health")).await;
        assert_eq!(response.status(), StatusCode::OK);
        let health: HealthResponse = serde_json::from_slice(&body_bytes(response).await).unwrap();
        assert_eq!(health.status, "healthy");
        assert_eq!(health.requests_handled, 1);
        assert_eq!(health.idle_workers, 10);
        assert_eq!(health.pending_cleanup, 0);
        assert_eq!(health.session_id, server.state.session_id);
    }

    #[tokio::test]
    async fn shutdown_signals_the_server() {
        let server = TestServer::new(vec![], "");
        let mut shutdown_rx = server.state.shutdown_tx.subscribe();

        let request = Request::builder()
            .method("POST")
            .uri("/api/v1/shutdown")
            .body(Body::empty())
            .unwrap();
        let response = server.send(request).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(shutdown_rx.try_recv().is_ok());
    }

    #[test]
    fn content_disposition_neutralises_quotes() {
        assert_eq!(
            content_disposition("we\"ird\u{e9}.usdz"),
            "attachment; filename=\"we_ird_.usdz\""
        );
    }
}
