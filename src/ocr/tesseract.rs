//! Tesseract OCR engine.

use clap::Args;
use tokio::process::Command;

use crate::{
    async_utils::check_for_command_failure, cpu_limit::with_cpu_semaphore,
    page_iter::Page, prelude::*,
};

use super::OcrEngine;

/// Options for the `tesseract` CLI.
#[derive(Args, Clone, Debug)]
pub struct TesseractOptions {
    /// Tesseract language(s) to recognize, such as "eng" or "eng+fra".
    #[clap(long = "lang", env = "UPLOAD_OCR_LANG", default_value = "eng")]
    pub language: String,

    /// Tesseract page segmentation mode. Tesseract's default is fully
    /// automatic page segmentation.
    #[clap(long, env = "UPLOAD_OCR_PSM")]
    pub psm: Option<u8>,
}

impl Default for TesseractOptions {
    fn default() -> Self {
        Self {
            language: "eng".to_owned(),
            psm: None,
        }
    }
}

/// OCR engine wrapping the `tesseract` CLI tool.
pub struct TesseractOcrEngine {
    options: TesseractOptions,
}

impl TesseractOcrEngine {
    /// Create a new `tesseract` engine.
    pub fn new(options: TesseractOptions) -> Self {
        Self { options }
    }

    /// Build the command line for OCRing `input_path`, writing text to
    /// standard output.
    fn command(&self, input_path: &Path) -> Command {
        let mut cmd = Command::new("tesseract");
        cmd.arg(input_path)
            .arg("stdout")
            .arg("-l")
            .arg(&self.options.language);
        if let Some(psm) = self.options.psm {
            cmd.arg("--psm").arg(psm.to_string());
        }
        cmd
    }
}

#[async_trait]
impl OcrEngine for TesseractOcrEngine {
    #[instrument(level = "debug", skip_all, fields(mime_type = %page.mime_type, bytes = page.data.len()))]
    async fn ocr_page(&self, page: Page) -> Result<String> {
        let extension = mime_guess::get_mime_extensions_str(&page.mime_type)
            .and_then(|exts| exts.first())
            .ok_or_else(|| anyhow!("cannot determine extension for {}", page.mime_type))?;

        let tmpdir = tempfile::TempDir::with_prefix("tesseract")?;
        let input_path = tmpdir.path().join(format!("input.{}", extension));
        tokio::fs::write(&input_path, &page.data)
            .await
            .context("cannot write tesseract input file")?;

        let mut cmd = self.command(&input_path);
        let output = with_cpu_semaphore(|| async {
            cmd.output().await.context("cannot run tesseract")
        })
        .await?;
        check_for_command_failure("tesseract", &output, None)?;

        let text = String::from_utf8(output.stdout)
            .context("tesseract output was not valid UTF-8")?;
        debug!(chars = text.len(), "Recognized text");
        Ok(text)
    }
}
