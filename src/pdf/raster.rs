//! OCR of rasterized PDF pages.

use std::sync::Arc;

use futures::StreamExt as _;

use crate::{
    async_utils::blocking_iter_streams::BlockingIterStream,
    ocr::{OcrEngine, ocr_page_or_error},
    page_iter::{PageIter, PageIterOptions},
    prelude::*,
};

/// Render every page of a PDF and OCR it, returning the text of each page
/// under a `--- Page N ---` header.
///
/// Pages are OCRed up to `concurrency_limit` at a time, but always reported
/// in page order. A page which cannot be OCRed reports its error as its text.
#[instrument(level = "debug", skip_all, fields(path = %path.display()))]
pub async fn ocr_rasterized_pdf(
    path: &Path,
    page_iter_opts: &PageIterOptions,
    concurrency_limit: usize,
    engine: Arc<dyn OcrEngine>,
) -> Result<String> {
    let page_iter = PageIter::from_path(path, page_iter_opts)
        .await
        .with_context(|| format!("failed to rasterize {:?}", path.display()))?;
    let total_pages = page_iter.total_pages();
    let truncated_to = page_iter.truncated_to();
    for warning in page_iter.warnings() {
        warn!(path = %path.display(), "pdftocairo: {}", warning);
    }

    let page_texts = BlockingIterStream::new(page_iter)
        .map(move |page| {
            let engine = engine.clone();
            async move {
                match page {
                    Ok(page) => ocr_page_or_error(engine.as_ref(), page).await,
                    Err(err) => format!("{:#}", err),
                }
            }
        })
        .buffered(concurrency_limit.max(1))
        .collect::<Vec<_>>()
        .await;

    let mut text = format_pages(&page_texts);
    if let Some(processed) = truncated_to {
        text.push_str(&format!(
            "[Only {}/{} pages processed]\n",
            processed, total_pages
        ));
    }
    Ok(text)
}

/// Put each page's text under a 1-based page header.
fn format_pages(page_texts: &[String]) -> String {
    page_texts
        .iter()
        .enumerate()
        .map(|(idx, text)| format!("--- Page {} ---\n{}\n", idx + 1, text))
        .collect()
}
