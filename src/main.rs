use std::str::FromStr;

use clap::{Parser, Subcommand};
use tracing_subscriber::{
    EnvFilter, Layer as _, filter::Directive, fmt::format::FmtSpan, layer::SubscriberExt,
    util::SubscriberInitExt as _,
};

use self::prelude::*;

mod async_utils;
mod cmd;
mod cpu_limit;
mod csv_out;
mod extract;
mod format;
mod ocr;
mod page_iter;
mod pdf;
mod prelude;
mod server;
mod tables;
mod upload;

/// Extract text and tables from uploaded images and PDFs.
#[derive(Debug, Parser)]
#[clap(
    version,
    author,
    after_help = r#"
External Tools:
  - tesseract: OCR for images and rasterized PDF pages.
  - pdftotext, pdfinfo, pdftocairo (poppler-utils): PDF text
    layers, page counts and rasterization.

Environment Variables:
  Every option can also be set using the `UPLOAD_OCR_*` variable
  shown in its help. RUST_LOG controls logging.

  These variables may be set in a standard `.env` file.
"#
)]
struct Opts {
    #[clap(subcommand)]
    subcmd: Cmd,
}

/// The subcommands we support.
#[derive(Debug, Subcommand)]
enum Cmd {
    /// Run the upload server.
    Serve(cmd::serve::ServeOpts),
    /// Extract text (and tables from PDFs) from a local file.
    Extract(cmd::extract::ExtractCmdOpts),
    /// Print schemas for our JSON responses.
    Schema(cmd::schema::SchemaOpts),
}

/// Our entry point, which can return an error. [`anyhow::Result`] will
/// automatically print a nice error message with optional backtrace.
#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing.
    let directive =
        Directive::from_str("info").expect("built-in directive should be valid");
    let env_filter = EnvFilter::builder()
        .with_default_directive(directive)
        .from_env_lossy();

    let subscriber = tracing_subscriber::fmt::layer()
        .with_span_events(FmtSpan::NEW | FmtSpan::CLOSE)
        .with_writer(std::io::stderr)
        .with_filter(env_filter);

    // We can stack multiple layers here if we need to.
    tracing_subscriber::registry().with(subscriber).init();

    // Call our real `main` function now that logging is set up.
    real_main().await
}

/// Our real entry point.
#[instrument(level = "debug", name = "main", skip_all)]
async fn real_main() -> Result<()> {
    // Load environment variables from a `.env` file, if it exists.
    dotenvy::dotenv().ok();

    // Parse command-line arguments.
    let opts = Opts::parse();
    debug!("Parsed options: {:?}", opts);

    // Run the appropriate subcommand.
    match &opts.subcmd {
        Cmd::Serve(serve_opts) => {
            cmd::serve::cmd_serve(serve_opts).await?;
        }
        Cmd::Extract(extract_opts) => {
            cmd::extract::cmd_extract(extract_opts).await?;
        }
        Cmd::Schema(schema_opts) => {
            cmd::schema::cmd_schema(schema_opts).await?;
        }
    }
    Ok(())
}
