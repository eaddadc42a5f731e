use axum::{
    Json,
    body::{Body, Bytes},
    extract::{Query, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::Response,
};
use tracing::{error, info};

use crate::{
    context::RequestContext,
    error::AppError,
    models::{ObjectQuery, UploadQuery, UploadedFile, UrlResponse},
    state::AppState,
    storage::{FileName, FileStorage, StorageConfigPatch, accept_files},
    utils::basename,
};

/// Multipart field carrying the uploaded files.
const FILE_FIELD: &str = "file";

/// Upload one or more files using multipart/form-data.
pub async fn upload_file(
    State(state): State<AppState>,
    ctx: RequestContext,
    Query(query): Query<UploadQuery>,
    headers: HeaderMap,
    body: Body,
) -> Result<Json<Vec<UploadedFile>>, AppError> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::BadRequest("Expected multipart/form-data".into()))?;

    let boundary = multer::parse_boundary(content_type).map_err(|e| {
        error!("Error parsing multipart: {}", e);
        AppError::MultipartError(format!("Failed to parse multipart form: {}", e))
    })?;

    // Enforce maximum file size while streaming
    let constraints = multer::Constraints::new()
        .size_limit(multer::SizeLimit::new().per_field(state.config.max_file_size));
    let multipart =
        multer::Multipart::with_constraints(body.into_data_stream(), boundary, constraints);

    let patch = StorageConfigPatch {
        dest: query.dest.map(Into::into),
        provider: query.provider,
        prefix: query.prefix,
        filename: query.filename.map(FileName::Fixed),
    };

    let mut storage = FileStorage::new(state.registry.clone());
    let engine = storage.storage(&ctx, Some(patch))?;

    let files = accept_files(engine.as_ref(), multipart, FILE_FIELD).await?;
    if files.is_empty() {
        return Err(AppError::BadRequest("No file provided".into()));
    }

    for file in &files {
        info!(
            request = %ctx.id,
            provider = %storage.config().provider,
            "File uploaded: {} ({} bytes)", file.key, file.size
        );
    }

    Ok(Json(files))
}

/// Resolve the consumer-facing URL of a stored key.
pub async fn file_url(
    State(state): State<AppState>,
    ctx: RequestContext,
    Query(query): Query<ObjectQuery>,
) -> Result<Json<UrlResponse>, AppError> {
    let provider = FileStorage::new(state.registry.clone()).get_provider(query.provider.as_deref())?;
    let url = provider.url(&ctx, &query.key).await;
    Ok(Json(UrlResponse { url }))
}

/// Download a stored file by key.
pub async fn download_file(
    State(state): State<AppState>,
    ctx: RequestContext,
    Query(query): Query<ObjectQuery>,
) -> Result<Response, AppError> {
    let provider = FileStorage::new(state.registry.clone()).get_provider(query.provider.as_deref())?;

    // Download file contents from storage
    let content = provider.get_file(&ctx, &query.key).await.map_err(|e| {
        error!("Error downloading file {}: {}", query.key, e);
        AppError::from(e)
    })?;

    // Create HTTP response with binary body
    let mut response = Response::new(Body::from(content));

    let mime_type = mime_guess::from_path(&query.key).first_or_octet_stream();
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(mime_type.as_ref())
            .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream")),
    );

    // Set Content-Disposition header to force download
    // and preserve the stored filename
    response.headers_mut().insert(
        header::CONTENT_DISPOSITION,
        HeaderValue::from_str(&format!("attachment; filename=\"{}\"", basename(&query.key)))
            .unwrap_or_else(|_| HeaderValue::from_static("attachment")),
    );

    Ok(response)
}

/// Write the raw request body under a key.
pub async fn put_file(
    State(state): State<AppState>,
    ctx: RequestContext,
    Query(query): Query<ObjectQuery>,
    body: Bytes,
) -> Result<Json<UploadedFile>, AppError> {
    let provider = FileStorage::new(state.registry.clone()).get_provider(query.provider.as_deref())?;
    let file = provider.put_file(&ctx, body, &query.key).await?;

    info!(request = %ctx.id, "File stored: {} ({} bytes)", file.key, file.size);
    Ok(Json(file))
}

/// Delete a stored file by key.
pub async fn delete_file(
    State(state): State<AppState>,
    ctx: RequestContext,
    Query(query): Query<ObjectQuery>,
) -> Result<StatusCode, AppError> {
    let provider = FileStorage::new(state.registry.clone()).get_provider(query.provider.as_deref())?;
    provider.delete_file(&ctx, &query.key).await?;

    info!(request = %ctx.id, "File Deleted: {}", query.key);

    // 204 No Content indicates successful deletion with no response body
    Ok(StatusCode::NO_CONTENT)
}

pub async fn health_check() -> &'static str {
    "OK"
}
