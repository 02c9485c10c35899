use axum::{
    Json, Router,
    body::Bytes,
    extract::{DefaultBodyLimit, FromRequest, Multipart, Path, Request, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Serialize;
use tower_http::services::ServeDir;

use crate::error::UploadError;
use crate::pipeline::{ImagePipeline, StoredImage, UploadRequest};

/// Room for multipart boundaries and part headers on top of the file itself.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

const FILE_FIELDS: [&str; 2] = ["image", "file"];

#[derive(Clone)]
pub struct AppState {
    pub pipeline: ImagePipeline,
    pub public_base_url: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UploadResponse {
    #[serde(flatten)]
    image: StoredImage,
    url: String,
}

#[derive(Serialize)]
struct ExistsResponse {
    exists: bool,
}

pub fn router(state: AppState) -> Router {
    // One byte over the limit has to reach the validator so it can report
    // the sizes, hence the slack.
    let body_limit = state
        .pipeline
        .config()
        .max_file_size
        .saturating_add(1)
        .saturating_add(MULTIPART_OVERHEAD);
    let upload_root = state.pipeline.store().root().to_path_buf();

    Router::new()
        .route("/health", get(health))
        .route(
            "/api/wines/{id}/image",
            post(upload_image)
                .delete(delete_image)
                .layer(DefaultBodyLimit::max(body_limit)),
        )
        .route("/api/wines/{id}/image/exists", get(image_exists))
        .nest_service("/uploads", ServeDir::new(upload_root))
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

async fn upload_image(
    State(state): State<AppState>,
    Path(owner_id): Path<String>,
    request: Request,
) -> Result<Response, UploadError> {
    let content_type = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
        .unwrap_or_default();
    let (declared_mime_type, bytes) = if content_type
        .to_ascii_lowercase()
        .starts_with("multipart/form-data")
    {
        let multipart = Multipart::from_request(request, &state)
            .await
            .map_err(|err| UploadError::InvalidRequest(format!("failed to read form: {err}")))?;
        read_file_field(multipart).await?
    } else {
        // Raw body upload: the request's own Content-Type is the declared type.
        let bytes = Bytes::from_request(request, &state)
            .await
            .map_err(|err| UploadError::InvalidRequest(format!("failed to read body: {err}")))?;
        (content_type, bytes)
    };

    let image = state
        .pipeline
        .upload(UploadRequest {
            owner_id,
            bytes: bytes.to_vec(),
            declared_mime_type,
        })
        .await?;
    let url = public_url(&state.public_base_url, &image.file_name);
    Ok((StatusCode::CREATED, Json(UploadResponse { image, url })).into_response())
}

async fn read_file_field(mut multipart: Multipart) -> Result<(String, Bytes), UploadError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| UploadError::InvalidRequest(format!("failed to read form: {err}")))?
    {
        if !field.name().is_some_and(|name| FILE_FIELDS.contains(&name)) {
            continue;
        }
        let declared_mime_type = field
            .content_type()
            .map(str::to_string)
            .unwrap_or_default();
        let bytes = field
            .bytes()
            .await
            .map_err(|err| UploadError::InvalidRequest(format!("failed to read file: {err}")))?;
        return Ok((declared_mime_type, bytes));
    }
    Err(UploadError::InvalidRequest("no image file in request".to_string()))
}

async fn delete_image(
    State(state): State<AppState>,
    Path(owner_id): Path<String>,
) -> Result<StatusCode, UploadError> {
    state.pipeline.delete(&owner_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn image_exists(
    State(state): State<AppState>,
    Path(owner_id): Path<String>,
) -> Result<Json<ExistsResponse>, UploadError> {
    let exists = state.pipeline.exists(&owner_id).await?;
    Ok(Json(ExistsResponse { exists }))
}

fn public_url(base_url: &str, file_name: &str) -> String {
    format!("{}/uploads/{}", base_url.trim_end_matches('/'), file_name)
}
