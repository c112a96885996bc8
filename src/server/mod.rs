//! HTTP server for uploading files and getting their text back.
//!
//! # Endpoints
//!
//! - `GET /` - Upload form
//! - `POST /upload` - Extract text from an uploaded file (multipart form data)
//! - `GET /uploads/{name}` - Download a stored file, such as a tables CSV
//! - `GET /health` - Health check
//!
//! # cURL Examples
//!
//! ```bash
//! curl -F "file=@scan.png" http://localhost:5000/upload
//! curl -F "file=@report.pdf" -F "mode=rasterize" http://localhost:5000/upload
//! curl -O http://localhost:5000/uploads/report_tables.csv
//! ```

use std::sync::Arc;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use tokio::net::TcpListener;
use tower_http::{limit::RequestBodyLimitLayer, trace::TraceLayer};

use crate::{extract::Extractor, prelude::*, upload::UploadDir};

mod error;
mod handlers;

/// Shared state for all our handlers.
#[derive(Clone)]
pub struct ServerState {
    pub extractor: Arc<Extractor>,
    pub uploads: UploadDir,
}

/// Build our router.
pub fn create_router(state: ServerState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/", get(handlers::index_handler))
        .route("/upload", post(handlers::upload_handler))
        .route("/uploads/{name}", get(handlers::download_handler))
        .route("/health", get(handlers::health_handler))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(RequestBodyLimitLayer::new(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve `router` on `listener` until we receive Ctrl-C.
pub async fn serve(listener: TcpListener, router: Router) -> Result<()> {
    let addr = listener.local_addr().context("cannot get listening address")?;
    info!(%addr, "Listening");
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server failed")
}

/// Wait for Ctrl-C.
async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutting down"),
        Err(err) => error!("cannot listen for Ctrl-C: {}", err),
    }
}

#[cfg(test)]
mod tests {
    use axum::{
        body::{Body, to_bytes},
        http::{Request, StatusCode},
    };
    use image::ImageFormat;
    use tower::ServiceExt as _;

    use super::*;
    use crate::{
        extract::ExtractOpts,
        ocr::tests::{FakeOcrEngine, sample_image},
    };

    const BOUNDARY: &str = "X-BOUNDARY";

    /// A router storing uploads in a temporary directory.
    async fn test_router() -> Result<(Router, tempfile::TempDir)> {
        let tmpdir = tempfile::TempDir::with_prefix("server")?;
        let uploads = UploadDir::create(&tmpdir.path().join("uploads")).await?;
        let extractor = Extractor::with_engine(ExtractOpts::default(), Arc::new(FakeOcrEngine));
        let state = ServerState {
            extractor: Arc::new(extractor),
            uploads,
        };
        Ok((create_router(state, 5 * 1024 * 1024), tmpdir))
    }

    /// One part of a multipart body.
    enum Part<'a> {
        File {
            name: &'a str,
            filename: &'a str,
            data: &'a [u8],
        },
        Text {
            name: &'a str,
            value: &'a str,
        },
    }

    fn multipart_body(parts: &[Part<'_>]) -> Vec<u8> {
        let mut body = Vec::new();
        for part in parts {
            body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
            match part {
                Part::File {
                    name,
                    filename,
                    data,
                } => {
                    body.extend_from_slice(
                        format!(
                            "Content-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\n\
                             Content-Type: application/octet-stream\r\n\r\n"
                        )
                        .as_bytes(),
                    );
                    body.extend_from_slice(data);
                }
                Part::Text { name, value } => {
                    body.extend_from_slice(
                        format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}")
                            .as_bytes(),
                    );
                }
            }
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    async fn post_upload(router: Router, parts: &[Part<'_>]) -> Result<(StatusCode, Value)> {
        post_upload_body(router, multipart_body(parts)).await
    }

    async fn post_upload_body(router: Router, body: Vec<u8>) -> Result<(StatusCode, Value)> {
        let request = Request::builder()
            .method("POST")
            .uri("/upload")
            .header(
                "content-type",
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))?;
        let response = router.oneshot(request).await?;
        let status = response.status();
        let bytes = to_bytes(response.into_body(), 1_000_000).await?;
        Ok((status, serde_json::from_slice(&bytes)?))
    }

    async fn get(router: Router, uri: &str) -> Result<(StatusCode, Vec<u8>)> {
        let request = Request::builder().uri(uri).body(Body::empty())?;
        let response = router.oneshot(request).await?;
        let status = response.status();
        let bytes = to_bytes(response.into_body(), 1_000_000).await?;
        Ok((status, bytes.to_vec()))
    }

    #[tokio::test]
    async fn index_serves_upload_form() -> Result<()> {
        let (router, _tmpdir) = test_router().await?;
        let (status, body) = get(router, "/").await?;
        assert_eq!(status, StatusCode::OK);
        assert!(String::from_utf8(body)?.contains("action=\"/upload\""));
        Ok(())
    }

    #[tokio::test]
    async fn health_reports_version() -> Result<()> {
        let (router, _tmpdir) = test_router().await?;
        let (status, body) = get(router, "/health").await?;
        assert_eq!(status, StatusCode::OK);
        let body: Value = serde_json::from_slice(&body)?;
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
        Ok(())
    }

    #[tokio::test]
    async fn missing_file_part_is_rejected() -> Result<()> {
        let (router, _tmpdir) = test_router().await?;
        let (status, body) = post_upload(
            router,
            &[Part::Text {
                name: "mode",
                value: "layers",
            }],
        )
        .await?;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, serde_json::json!({ "error": "No file part" }));
        Ok(())
    }

    #[tokio::test]
    async fn empty_filename_is_rejected() -> Result<()> {
        let (router, _tmpdir) = test_router().await?;
        let (status, body) = post_upload(
            router,
            &[Part::File {
                name: "file",
                filename: "",
                data: b"",
            }],
        )
        .await?;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "No selected file");
        Ok(())
    }

    #[tokio::test]
    async fn disallowed_extension_is_rejected() -> Result<()> {
        let (router, tmpdir) = test_router().await?;
        let (status, body) = post_upload(
            router,
            &[Part::File {
                name: "file",
                filename: "notes.txt",
                data: b"hello",
            }],
        )
        .await?;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Invalid file type");
        assert!(!tmpdir.path().join("uploads/notes.txt").exists());
        Ok(())
    }

    #[tokio::test]
    async fn non_ascii_filenames_are_reduced_to_safe_names() -> Result<()> {
        let (router, tmpdir) = test_router().await?;
        let image = sample_image(ImageFormat::Png);
        let (status, body) = post_upload(
            router,
            &[Part::File {
                name: "file",
                filename: "日本.png",
                data: &image,
            }],
        )
        .await?;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["text"], "image/png 4x3");
        assert!(tmpdir.path().join("uploads/png").exists());
        Ok(())
    }

    #[tokio::test]
    async fn bad_mode_is_rejected() -> Result<()> {
        let (router, _tmpdir) = test_router().await?;
        let (status, body) = post_upload(
            router,
            &[Part::Text {
                name: "mode",
                value: "guess",
            }],
        )
        .await?;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().starts_with("Invalid mode:"));
        Ok(())
    }

    #[tokio::test]
    async fn image_upload_returns_text_json_and_csv() -> Result<()> {
        let (router, tmpdir) = test_router().await?;
        let image = sample_image(ImageFormat::Png);
        let (status, body) = post_upload(
            router,
            &[Part::File {
                name: "file",
                filename: "../My Scan.PNG",
                data: &image,
            }],
        )
        .await?;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            serde_json::json!({
                "text": "image/png 4x3",
                "json": "{\n    \"text\": \"image/png 4x3\"\n}",
                "csv": "text\nimage/png 4x3",
            })
        );
        let stored = tmpdir.path().join("uploads/My_Scan.PNG");
        assert_eq!(std::fs::read(stored)?, image);
        Ok(())
    }

    #[tokio::test]
    async fn unreadable_image_reports_error_as_text() -> Result<()> {
        let (router, _tmpdir) = test_router().await?;
        let (status, body) = post_upload(
            router,
            &[Part::File {
                name: "file",
                filename: "scan.webp",
                data: b"garbage",
            }],
        )
        .await?;
        assert_eq!(status, StatusCode::OK);
        assert!(body["text"].as_str().unwrap().starts_with("cannot decode image"));
        Ok(())
    }

    #[tokio::test]
    async fn pdf_upload_writes_tables_csv() -> Result<()> {
        let (router, tmpdir) = test_router().await?;
        let (status, body) = post_upload(
            router.clone(),
            &[
                Part::Text {
                    name: "mode",
                    value: "rasterize",
                },
                Part::File {
                    name: "file",
                    filename: "report.pdf",
                    data: b"not actually a PDF",
                },
            ],
        )
        .await?;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["csv"], "report_tables.csv");
        assert!(!body["text"].as_str().unwrap().is_empty());
        let csv_path = tmpdir.path().join("uploads/report_tables.csv");
        assert_eq!(std::fs::read(csv_path)?, b"");

        let (status, _) = get(router, "/uploads/report_tables.csv").await?;
        assert_eq!(status, StatusCode::OK);
        Ok(())
    }

    #[tokio::test]
    async fn downloads_only_existing_safe_names() -> Result<()> {
        let (router, tmpdir) = test_router().await?;
        std::fs::write(tmpdir.path().join("uploads/a_tables.csv"), b"x,y\r\n\r\n")?;

        let (status, body) = get(router.clone(), "/uploads/a_tables.csv").await?;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, b"x,y\r\n\r\n");

        let (status, _) = get(router.clone(), "/uploads/missing.csv").await?;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = get(router, "/uploads/..%2Fsecret.txt").await?;
        assert_eq!(status, StatusCode::NOT_FOUND);
        Ok(())
    }

    #[tokio::test]
    async fn truncated_upload_keeps_previous_file() -> Result<()> {
        let (router, tmpdir) = test_router().await?;
        let stored = tmpdir.path().join("uploads/scan.png");
        std::fs::write(&stored, b"earlier upload")?;

        let mut body = multipart_body(&[Part::File {
            name: "file",
            filename: "scan.png",
            data: b"only the first part of the",
        }]);
        let closing = format!("\r\n--{BOUNDARY}--\r\n");
        body.truncate(body.len() - closing.len());

        let (status, _body) = post_upload_body(router, body).await?;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(std::fs::read(&stored)?, b"earlier upload");
        assert_eq!(std::fs::read_dir(tmpdir.path().join("uploads"))?.count(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn bad_mode_after_file_stores_nothing() -> Result<()> {
        let (router, tmpdir) = test_router().await?;
        let image = sample_image(ImageFormat::Png);
        let (status, body) = post_upload(
            router,
            &[
                Part::File {
                    name: "file",
                    filename: "scan.png",
                    data: &image,
                },
                Part::Text {
                    name: "mode",
                    value: "guess",
                },
            ],
        )
        .await?;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().starts_with("Invalid mode:"));
        assert_eq!(std::fs::read_dir(tmpdir.path().join("uploads"))?.count(), 0);
        Ok(())
    }

    #[tokio::test]
    #[ignore = "Requires poppler-utils to be installed"]
    async fn pdf_upload_extracts_text_layers() -> Result<()> {
        let (router, tmpdir) = test_router().await?;
        let pdf = std::fs::read("tests/fixtures/two_pages.pdf")?;
        let (status, body) = post_upload(
            router,
            &[Part::File {
                name: "file",
                filename: "two_pages.pdf",
                data: &pdf,
            }],
        )
        .await?;
        assert_eq!(status, StatusCode::OK);
        let text = body["text"].as_str().unwrap();
        assert!(text.starts_with("--- pdftotext Extraction ---\n"));
        assert!(text.contains("--- Word Layout Extraction ---\n"));
        let csv = std::fs::read_to_string(tmpdir.path().join("uploads/two_pages_tables.csv"))?;
        assert!(csv.starts_with("Item,Quantity,Price\r\n"), "got {csv:?}");
        Ok(())
    }
}
