//! Extracting text (and sometimes tables) from PDFs.
//!
//! There are two ways to do this:
//!
//! - [`PdfMode::Layers`] reads the text the PDF already contains, in two
//!   independent passes, and also finds tables.
//! - [`PdfMode::Rasterize`] renders each page and OCRs it, which also works
//!   for scanned documents with no text layer.

use std::{fmt, process::Output, str::FromStr};

use clap::ValueEnum;
use schemars::JsonSchema;

use crate::{async_utils::check_for_command_failure, prelude::*, tables::Table};

pub mod layers;
pub mod raster;
pub mod text_layer;
pub mod word_layout;

/// How should we get text out of a PDF?
#[derive(
    Clone, Copy, Debug, Default, Deserialize, Eq, JsonSchema, PartialEq, Serialize, ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum PdfMode {
    /// Read the embedded text layer, and look for tables.
    #[default]
    Layers,
    /// Render every page to an image and OCR it.
    Rasterize,
}

impl fmt::Display for PdfMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PdfMode::Layers => write!(f, "layers"),
            PdfMode::Rasterize => write!(f, "rasterize"),
        }
    }
}

impl FromStr for PdfMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "layers" => Ok(PdfMode::Layers),
            "rasterize" => Ok(PdfMode::Rasterize),
            other => Err(anyhow!(
                "unknown PDF mode {:?} (expected \"layers\" or \"rasterize\")",
                other
            )),
        }
    }
}

/// Text and tables extracted from a PDF.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PdfExtraction {
    /// All the text we found, with a header for each pass or page.
    pub text: String,
    /// Any tables we found, in page order.
    pub tables: Vec<Table>,
}

/// Join per-page text the same way for every pass: each page that has any
/// text at all, followed by a newline.
fn join_pages<I, S>(pages: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut text = String::new();
    for page in pages {
        let page = page.as_ref();
        if !page.is_empty() {
            text.push_str(page);
            text.push('\n');
        }
    }
    text
}

/// Check how `pdftotext` exited.
///
/// Only the exit status counts. Poppler complains about damaged PDFs on
/// standard error while still extracting their text, so those lines are
/// logged as warnings.
fn check_pdftotext_output(path: &Path, output: &Output) -> Result<()> {
    check_for_command_failure("pdftotext", output, None)?;
    let stderr = String::from_utf8_lossy(&output.stderr);
    for line in stderr.lines().map(str::trim).filter(|line| !line.is_empty()) {
        warn!(path = %path.display(), "pdftotext: {}", line);
    }
    Ok(())
}
