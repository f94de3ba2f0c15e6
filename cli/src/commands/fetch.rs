//! `molmesh fetch` / `molmesh upload`: client side of the HTTP surface.

use std::path::{Path, PathBuf};

use molmesh_core::api::{collect_artifacts, AppConfig, Artifact, DeliveryMode, RenderOptionsPatch};
use reqwest::header::CONTENT_DISPOSITION;
use reqwest::{multipart, Url};
use serde::Serialize;

use crate::commands::cli::{ClientArgs, FetchArgs, UploadArgs};
use crate::error::CliError;

#[derive(Serialize)]
struct Query<'a> {
    #[serde(flatten)]
    options: &'a RenderOptionsPatch,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    batch: bool,
}

pub async fn handle_fetch(args: FetchArgs, cfg: &AppConfig) -> Result<(), CliError> {
    let base = base_url(&args.client, cfg);
    let mode = DeliveryMode::from_flags(args.batch, args.stream);
    let url = mesh_url(&base, &args.id, mode)?;
    let patch = args.render.to_patch();

    tracing::info!(url = %url, "requesting render");
    let response = reqwest::Client::new()
        .get(url)
        .query(&Query {
            options: &patch,
            batch: false,
        })
        .send()
        .await?;
    let response = check_status(response).await?;

    if mode == DeliveryMode::Stream {
        let artifacts = collect_artifacts(
            response.bytes_stream(),
            cfg.transfer.max_receive_message_bytes,
        )
        .await?;
        for artifact in &artifacts {
            save(&args.client.out, artifact)?;
        }
        tracing::info!(count = artifacts.len(), "stream received");
        Ok(())
    } else {
        save_attachment(&args.client.out, response, &args.id).await
    }
}

pub async fn handle_upload(args: UploadArgs, cfg: &AppConfig) -> Result<(), CliError> {
    let base = base_url(&args.client, cfg);
    let file_name = args
        .file
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| CliError::Command(format!("not a file: {}", args.file.display())))?
        .to_string();
    let data = tokio::fs::read(&args.file).await?;
    let patch = args.render.to_patch();

    let form = multipart::Form::new().part("file", multipart::Part::bytes(data).file_name(file_name.clone()));
    let response = reqwest::Client::new()
        .post(format!("{base}/api/v1/mesh/upload"))
        .query(&Query {
            options: &patch,
            batch: args.batch,
        })
        .multipart(form)
        .send()
        .await?;
    let response = check_status(response).await?;
    save_attachment(&args.client.out, response, &file_name).await
}

fn base_url(client: &ClientArgs, cfg: &AppConfig) -> String {
    client
        .server
        .clone()
        .unwrap_or_else(|| format!("http://{}:{}", cfg.server.host, cfg.server.port))
        .trim_end_matches('/')
        .to_string()
}

/// `<base>/api/v1/mesh/<id>[/batch|/stream]`, with the id as one
/// percent-encoded path segment.
fn mesh_url(base: &str, id: &str, mode: DeliveryMode) -> Result<Url, CliError> {
    let mut url =
        Url::parse(base).map_err(|e| CliError::Command(format!("invalid server url {base}: {e}")))?;
    {
        let mut segments = url
            .path_segments_mut()
            .map_err(|_| CliError::Command(format!("server url cannot carry a path: {base}")))?;
        segments.pop_if_empty().extend(["api", "v1", "mesh", id.trim()]);
        if let Some(segment) = mode.route_segment() {
            segments.push(segment);
        }
    }
    Ok(url)
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, CliError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let text = response.text().await.unwrap_or_default();
    let (code, message) = match serde_json::from_str::<serde_json::Value>(&text) {
        Ok(v) => (
            v["error_code"].as_str().unwrap_or("unknown").to_string(),
            v["error"].as_str().unwrap_or(&text).to_string(),
        ),
        Err(_) => ("unknown".to_string(), text),
    };
    Err(CliError::Server {
        status: status.as_u16(),
        code,
        message,
    })
}

async fn save_attachment(
    out: &Path,
    response: reqwest::Response,
    fallback: &str,
) -> Result<(), CliError> {
    let name = response
        .headers()
        .get(CONTENT_DISPOSITION)
        .and_then(|v| v.to_str().ok())
        .and_then(attachment_file_name)
        .unwrap_or_else(|| fallback.to_string());
    let data = response.bytes().await?;
    save(out, &Artifact::new(name, data))?;
    Ok(())
}

/// `attachment; filename="x.usdz"` → `x.usdz`
fn attachment_file_name(header: &str) -> Option<String> {
    header.split(';').map(str::trim).find_map(|part| {
        let value = part.strip_prefix("filename=")?;
        let value = value.trim_matches('"');
        (!value.is_empty()).then(|| value.to_string())
    })
}

/// Writes under `out`, keeping only the final path component of the name.
fn save(out: &Path, artifact: &Artifact) -> Result<PathBuf, CliError> {
    let file_name = Path::new(&artifact.name)
        .file_name()
        .ok_or_else(|| CliError::Command(format!("refusing artifact name {:?}", artifact.name)))?;
    std::fs::create_dir_all(out)?;
    let path = out.join(file_name);
    std::fs::write(&path, &artifact.data)?;
    tracing::info!(path = %path.display(), bytes = artifact.len(), "artifact saved");
    println!("{}", path.display());
    Ok(path)
}
