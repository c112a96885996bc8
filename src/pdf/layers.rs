//! Text layer extraction: two independent passes over the same PDF, reported
//! side by side.

use crate::{prelude::*, tables::TableSettings};

use super::{
    PdfExtraction,
    text_layer::extract_text_pdftotext,
    word_layout::{self, WordLayoutExtraction},
};

/// Header for the `pdftotext -layout` pass.
const TEXT_LAYER_HEADER: &str = "--- pdftotext Extraction ---";

/// Header for the word layout pass.
const WORD_LAYOUT_HEADER: &str = "--- Word Layout Extraction ---";

/// Extract text from a PDF with both passes, and tables from the word layout
/// pass.
///
/// A pass that fails reports its error in place of its text. The other pass
/// is not affected.
#[instrument(level = "debug", skip_all, fields(path = %path.display()))]
pub async fn extract_text_from_pdf(path: &Path, settings: &TableSettings) -> PdfExtraction {
    let (text_layer, word_layout) = tokio::join!(
        extract_text_pdftotext(path),
        word_layout::extract_text_and_tables(path, settings),
    );

    combine_pass_results(path, text_layer, word_layout)
}

/// Combine the results of both passes. A pass that failed reports its error
/// in place of its text, and the other pass is kept as-is.
fn combine_pass_results(
    path: &Path,
    text_layer: Result<String>,
    word_layout: Result<WordLayoutExtraction>,
) -> PdfExtraction {
    let text_layer = text_layer.unwrap_or_else(|err| {
        warn!(path = %path.display(), "pdftotext pass failed: {:#}", err);
        format!("Error extracting text with pdftotext: {:#}", err)
    });
    let (word_text, tables) = match word_layout {
        Ok(extraction) => (extraction.text, extraction.tables),
        Err(err) => {
            warn!(path = %path.display(), "word layout pass failed: {:#}", err);
            (
                format!("Error extracting text and tables from word layout: {:#}", err),
                vec![],
            )
        }
    };

    PdfExtraction {
        text: combine_passes(&text_layer, &word_text),
        tables,
    }
}

/// Put the output of both passes under their headers.
fn combine_passes(text_layer: &str, word_layout: &str) -> String {
    format!(
        "{}\n{}\n\n{}\n{}",
        TEXT_LAYER_HEADER,
        text_layer.trim(),
        WORD_LAYOUT_HEADER,
        word_layout.trim()
    )
}
