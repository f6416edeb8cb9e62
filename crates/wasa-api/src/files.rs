use axum::{
    Json,
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode, header},
    response::IntoResponse,
};
use tokio::io::AsyncWriteExt;
use tracing::{debug, error};
use uuid::Uuid;

use wasa_types::api::UploadResponse;

use crate::auth::AppState;
use crate::error::ApiError;

/// 10 MB upload limit for photos
pub const MAX_UPLOAD_SIZE: usize = 10 * 1024 * 1024;

/// Public path prefix uploaded photos are served under.
pub const UPLOAD_ROUTE: &str = "/uploads";

const IMAGE_TYPES: &[(&str, &str)] = &[
    ("image/jpeg", "jpg"),
    ("image/png", "png"),
    ("image/gif", "gif"),
    ("image/webp", "webp"),
];

fn extension_for(content_type: Option<&str>) -> &'static str {
    let essence = content_type
        .and_then(|ct| ct.split(';').next())
        .map(str::trim)
        .unwrap_or_default();
    IMAGE_TYPES
        .iter()
        .find(|(mime, _)| mime.eq_ignore_ascii_case(essence))
        .map(|(_, ext)| *ext)
        .unwrap_or("bin")
}

fn content_type_for(file_name: &str) -> &'static str {
    let ext = file_name.rsplit_once('.').map(|(_, ext)| ext).unwrap_or_default();
    IMAGE_TYPES
        .iter()
        .find(|(_, known)| *known == ext)
        .map(|(mime, _)| *mime)
        .unwrap_or("application/octet-stream")
}

/// Stored names are `<uuid>.<ext>`; anything else never came from `upload`.
fn is_stored_name(file_name: &str) -> bool {
    match file_name.split_once('.') {
        Some((stem, ext)) => {
            stem.parse::<Uuid>().is_ok() && !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric())
        }
        None => false,
    }
}

/// POST /uploads: raw image bytes in, `{ photoUrl }` out. The URL is
/// what clients then put in `photoUrl` of a message, profile or group.
pub async fn upload(
    State(state): State<AppState>,
    headers: HeaderMap,
    bytes: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    if bytes.is_empty() {
        return Err(ApiError::validation("upload body is empty"));
    }

    let content_type = headers.get(header::CONTENT_TYPE).and_then(|v| v.to_str().ok());
    let file_name = format!("{}.{}", Uuid::new_v4(), extension_for(content_type));

    tokio::fs::create_dir_all(&state.upload_dir).await.map_err(|e| {
        error!("Failed to create upload directory {}: {}", state.upload_dir.display(), e);
        anyhow::Error::from(e)
    })?;

    let file_path = state.upload_dir.join(&file_name);
    let mut file = tokio::fs::File::create(&file_path).await.map_err(|e| {
        error!("Failed to create file {}: {}", file_path.display(), e);
        anyhow::Error::from(e)
    })?;
    file.write_all(&bytes).await.map_err(|e| {
        error!("Failed to write file {}: {}", file_path.display(), e);
        anyhow::Error::from(e)
    })?;

    debug!("Stored upload {} ({} bytes)", file_name, bytes.len());

    Ok((
        StatusCode::CREATED,
        Json(UploadResponse {
            photo_url: format!("{}/{}", UPLOAD_ROUTE, file_name),
        }),
    ))
}

/// GET /uploads/{file}
pub async fn serve_upload(
    State(state): State<AppState>,
    Path(file_name): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    if !is_stored_name(&file_name) {
        return Err(ApiError::not_found("file not found"));
    }

    let file_path = state.upload_dir.join(&file_name);
    let bytes = tokio::fs::read(&file_path).await.map_err(|e| {
        debug!("Failed to read upload {}: {}", file_path.display(), e);
        ApiError::not_found("file not found")
    })?;

    Ok(([(header::CONTENT_TYPE, content_type_for(&file_name))], bytes))
}
