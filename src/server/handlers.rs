//! HTTP request handlers.

use axum::{
    Json,
    extract::{Multipart, Path as UrlPath, State},
    http::header,
    response::{Html, IntoResponse},
};

use crate::{
    csv_out::save_tables_as_csv,
    extract::Extraction,
    format::{ImageResponse, PdfResponse, UploadResponse},
    pdf::PdfMode,
    prelude::*,
    upload::{UploadWriter, allowed_file, secure_filename, tables_csv_filename},
};

use super::{ServerState, error::ApiError};

/// Our upload form.
const INDEX_HTML: &str = include_str!("templates/index.html");

/// Health check response.
#[derive(Debug, Deserialize, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// GET /
pub async fn index_handler() -> Html<&'static str> {
    Html(INDEX_HTML)
}

/// GET /health
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_owned(),
        version: env!("CARGO_PKG_VERSION").to_owned(),
    })
}

/// An upload that has been validated and streamed to a temporary file, but
/// not yet stored under its own name.
struct StagedUpload {
    original_name: String,
    filename: String,
    writer: UploadWriter,
}

/// POST /upload
///
/// Accepts multipart form data with:
///
/// - `file`: the image or PDF to extract text from.
/// - `mode` (optional): `layers` or `rasterize`, overriding the server's
///   default for PDFs.
///
/// Images get their OCRed text back as text, JSON and CSV. PDFs get their
/// text back, and any tables are written to a CSV file in the upload
/// directory, whose name we return.
#[instrument(level = "debug", skip_all)]
pub async fn upload_handler(
    State(state): State<ServerState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    let mut upload = None;
    let mut mode = None;

    while let Some(mut field) = multipart.next_field().await? {
        let name = field.name().map(str::to_owned);
        match name.as_deref() {
            Some("file") => {
                // A `file` field without a filename is a plain form value, not
                // a file part.
                let Some(original_name) = field.file_name().map(str::to_owned) else {
                    continue;
                };
                if upload.is_some() {
                    debug!(filename = %original_name, "ignoring extra file part");
                    continue;
                }
                if original_name.is_empty() {
                    return Err(ApiError::bad_request("No selected file"));
                }
                if !allowed_file(&original_name) {
                    return Err(ApiError::bad_request("Invalid file type"));
                }
                let filename = secure_filename(&original_name);
                if filename.is_empty() {
                    return Err(ApiError::bad_request("Invalid file name"));
                }

                let mut writer = state.uploads.create_file(&filename).await?;
                while let Some(chunk) = field.chunk().await? {
                    writer.write_chunk(&chunk).await?;
                }
                upload = Some(StagedUpload {
                    original_name,
                    filename,
                    writer,
                });
            }
            Some("mode") => {
                let value = field.text().await?;
                mode = Some(
                    value
                        .parse::<PdfMode>()
                        .map_err(|err| ApiError::bad_request(format!("Invalid mode: {err}")))?,
                );
            }
            _ => {}
        }
    }

    // Nothing replaces an earlier upload until the whole request is valid.
    let StagedUpload {
        original_name,
        filename,
        writer,
    } = upload.ok_or_else(|| ApiError::bad_request("No file part"))?;
    let path = writer.finish().await?;
    info!(original_name = %original_name, filename = %filename, "Received upload");

    let response = match state.extractor.extract_file(&path, &filename, mode).await {
        Extraction::Pdf(extraction) => {
            let csv_filename = tables_csv_filename(&filename);
            let csv_path = state.uploads.path_for(&csv_filename);
            if let Err(err) = save_tables_as_csv(&extraction.tables, &csv_path).await {
                error!(path = %csv_path.display(), "could not save tables: {:#}", err);
            }
            UploadResponse::Pdf(PdfResponse {
                text: extraction.text,
                csv: csv_filename,
            })
        }
        Extraction::Image { text } => UploadResponse::Image(ImageResponse::new(text)?),
    };
    Ok(Json(response))
}

/// GET /uploads/{name}
///
/// Download a stored upload, or a file derived from one, like a tables CSV.
#[instrument(level = "debug", skip_all)]
pub async fn download_handler(
    State(state): State<ServerState>,
    UrlPath(name): UrlPath<String>,
) -> Result<impl IntoResponse, ApiError> {
    debug!(name = %name, "Download requested");
    let not_found = || ApiError::NotFound("File not found".to_owned());

    // Only names we could have created ourselves.
    if name.is_empty() || secure_filename(&name) != name {
        return Err(not_found());
    }
    let path = state.uploads.path_for(&name);
    let data = match tokio::fs::read(&path).await {
        Ok(data) => data,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Err(not_found()),
        Err(err) => {
            return Err(anyhow::Error::new(err)
                .context(format!("failed to read {:?}", path.display()))
                .into());
        }
    };
    let content_type = mime_guess::from_path(&path)
        .first_or_octet_stream()
        .to_string();
    Ok(([(header::CONTENT_TYPE, content_type)], data))
}
