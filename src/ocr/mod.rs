//! Optical character recognition of page images.
//!
//! Standalone image uploads and rasterized PDF pages both come through here,
//! so they are recognized exactly the same way.

use std::io::Cursor;

use image::ImageFormat;

use crate::{
    async_utils::spawn_blocking_propagating_panics, page_iter::Page, prelude::*,
};

pub mod tesseract;

/// Interface to an OCR engine.
#[async_trait]
pub trait OcrEngine: Send + Sync + 'static {
    /// Recognize the text on a single page image.
    async fn ocr_page(&self, page: Page) -> Result<String>;
}

/// OCR an image file, returning either its text or a description of what
/// went wrong.
///
/// Failures here are part of the normal output rather than errors, because
/// the caller always answers with whatever "text" we produced.
#[instrument(level = "debug", skip_all, fields(path = %path.display()))]
pub async fn extract_text_from_image(engine: &dyn OcrEngine, path: &Path) -> String {
    match ocr_image_file(engine, path).await {
        Ok(text) => text,
        Err(err) => {
            warn!(path = %path.display(), "could not OCR image: {:#}", err);
            format!("{:#}", err)
        }
    }
}

/// OCR a page, turning failures into text the same way as
/// [`extract_text_from_image`].
pub async fn ocr_page_or_error(engine: &dyn OcrEngine, page: Page) -> String {
    match engine.ocr_page(page).await {
        Ok(text) => text,
        Err(err) => {
            warn!("could not OCR page: {:#}", err);
            format!("{:#}", err)
        }
    }
}

/// Decode an image file and OCR it.
async fn ocr_image_file(engine: &dyn OcrEngine, path: &Path) -> Result<String> {
    let data = tokio::fs::read(path)
        .await
        .with_context(|| format!("cannot open image {:?}", path.display()))?;
    let page = spawn_blocking_propagating_panics(move || normalize_image(&data)).await?;
    engine.ocr_page(page).await
}

/// Decode any image format we accept and re-encode it as PNG.
///
/// This catches corrupt uploads early with a readable error, and means the
/// OCR engine only ever sees one format.
pub fn normalize_image(data: &[u8]) -> Result<Page> {
    let image = image::load_from_memory(data).context("cannot decode image")?;
    let mut png = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
        .context("cannot encode image as PNG")?;
    Ok(Page {
        mime_type: "image/png".to_owned(),
        data: png,
    })
}
