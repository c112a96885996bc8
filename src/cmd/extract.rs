//! The `extract` subcommand, which runs the upload pipeline on a local file.

use clap::Args;

use crate::{
    csv_out::save_tables_as_csv,
    extract::{ExtractOpts, Extraction, Extractor},
    pdf::PdfMode,
    prelude::*,
    upload::{allowed_file, tables_csv_filename},
};

use super::write_output;

/// Extract command line arguments.
#[derive(Debug, Args)]
pub struct ExtractCmdOpts {
    /// The image or PDF to extract text from.
    pub path: PathBuf,

    /// How to handle a PDF. Defaults to `--pdf-mode`.
    #[clap(long, value_enum)]
    pub mode: Option<PdfMode>,

    /// Where to write the text. Defaults to standard output.
    #[clap(short = 'o', long = "out")]
    pub output_path: Option<PathBuf>,

    /// Where to write tables found in a PDF. Defaults to `NAME_tables.csv`
    /// next to the input.
    #[clap(long = "tables-csv")]
    pub tables_csv_path: Option<PathBuf>,

    #[clap(flatten)]
    pub extract_opts: ExtractOpts,
}

/// The `extract` subcommand.
#[instrument(level = "debug", skip_all, fields(path = %opts.path.display()))]
pub async fn cmd_extract(opts: &ExtractCmdOpts) -> Result<()> {
    let filename = opts
        .path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| anyhow!("cannot get file name of {:?}", opts.path.display()))?;
    if !allowed_file(filename) {
        return Err(anyhow!(
            "unsupported file type {:?} (expected an image or PDF)",
            filename
        ));
    }
    if !tokio::fs::try_exists(&opts.path)
        .await
        .with_context(|| format!("cannot access {:?}", opts.path.display()))?
    {
        return Err(anyhow!("file not found: {:?}", opts.path.display()));
    }

    let extractor = Extractor::new(opts.extract_opts.clone());
    let mut text = match extractor.extract_file(&opts.path, filename, opts.mode).await {
        Extraction::Image { text } => text,
        Extraction::Pdf(extraction) => {
            let csv_path = match &opts.tables_csv_path {
                Some(path) => path.to_owned(),
                None => opts.path.with_file_name(tables_csv_filename(filename)),
            };
            save_tables_as_csv(&extraction.tables, &csv_path).await?;
            info!(
                path = %csv_path.display(),
                table_count = extraction.tables.len(),
                "Saved tables"
            );
            extraction.text
        }
    };

    if !text.ends_with('\n') {
        text.push('\n');
    }
    write_output(opts.output_path.as_deref(), text.as_bytes()).await
}
