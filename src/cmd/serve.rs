//! The `serve` subcommand.

use std::sync::Arc;

use clap::Args;
use tokio::net::TcpListener;

use crate::{
    extract::{ExtractOpts, Extractor},
    prelude::*,
    server::{ServerState, create_router, serve},
    upload::UploadDir,
};

/// Server command line arguments.
#[derive(Debug, Args)]
pub struct ServeOpts {
    /// The address to listen on.
    #[clap(long, env = "UPLOAD_OCR_HOST", default_value = "127.0.0.1")]
    pub host: String,

    /// The port to listen on.
    #[clap(long, env = "UPLOAD_OCR_PORT", default_value_t = 5000)]
    pub port: u16,

    /// Where to store uploads and the CSV files we generate.
    #[clap(long, env = "UPLOAD_OCR_UPLOAD_DIR", default_value = "uploads")]
    pub upload_dir: PathBuf,

    /// Largest request body we accept, in megabytes.
    #[clap(long, env = "UPLOAD_OCR_MAX_UPLOAD_MB", default_value_t = 100)]
    pub max_upload_mb: usize,

    #[clap(flatten)]
    pub extract_opts: ExtractOpts,
}

/// The `serve` subcommand.
#[instrument(level = "debug", skip_all, fields(host = %opts.host, port = opts.port))]
pub async fn cmd_serve(opts: &ServeOpts) -> Result<()> {
    let uploads = UploadDir::create(&opts.upload_dir).await?;
    let extractor = Extractor::new(opts.extract_opts.clone());
    info!(
        upload_dir = %uploads.root().display(),
        pdf_mode = %extractor.default_pdf_mode(),
        "Storing uploads"
    );

    let state = ServerState {
        extractor: Arc::new(extractor),
        uploads,
    };
    let max_upload_bytes = opts.max_upload_mb.saturating_mul(1024 * 1024);
    let router = create_router(state, max_upload_bytes);

    let listener = TcpListener::bind((opts.host.as_str(), opts.port))
        .await
        .with_context(|| format!("cannot listen on {}:{}", opts.host, opts.port))?;
    serve(listener, router).await
}
