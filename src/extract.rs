//! Choosing how to extract text from a stored file, and doing it.

use std::sync::Arc;

use clap::Args;

use crate::{
    ocr::{
        OcrEngine, extract_text_from_image,
        tesseract::{TesseractOcrEngine, TesseractOptions},
    },
    page_iter::PageIterOptions,
    pdf::{PdfExtraction, PdfMode, layers::extract_text_from_pdf, raster::ocr_rasterized_pdf},
    prelude::*,
    tables::TableSettings,
    upload::is_pdf_filename,
};

/// Options shared by everything that extracts text.
#[derive(Args, Clone, Debug)]
pub struct ExtractOpts {
    /// How to extract text from PDFs when the request does not say.
    #[clap(long, env = "UPLOAD_OCR_PDF_MODE", value_enum, default_value_t = PdfMode::Layers)]
    pub pdf_mode: PdfMode,

    /// Max number of PDF pages to OCR at a time.
    #[clap(short = 'j', long = "jobs", env = "UPLOAD_OCR_JOBS", default_value_t = num_cpus::get())]
    pub job_count: usize,

    #[clap(flatten)]
    pub page_iter_opts: PageIterOptions,

    #[clap(flatten)]
    pub tesseract_opts: TesseractOptions,
}

impl Default for ExtractOpts {
    fn default() -> Self {
        Self {
            pdf_mode: PdfMode::default(),
            job_count: num_cpus::get(),
            page_iter_opts: PageIterOptions::default(),
            tesseract_opts: TesseractOptions::default(),
        }
    }
}

/// What we got out of a file.
#[derive(Clone, Debug, PartialEq)]
pub enum Extraction {
    /// OCRed text of an image.
    Image { text: String },
    /// Text and tables from a PDF.
    Pdf(PdfExtraction),
}

/// Extracts text from images and PDFs.
pub struct Extractor {
    opts: ExtractOpts,
    engine: Arc<dyn OcrEngine>,
    table_settings: TableSettings,
}

impl Extractor {
    /// Create an extractor which OCRs with `tesseract`.
    pub fn new(opts: ExtractOpts) -> Self {
        let engine = Arc::new(TesseractOcrEngine::new(opts.tesseract_opts.clone()));
        Self::with_engine(opts, engine)
    }

    /// Create an extractor using a specific OCR engine.
    pub fn with_engine(opts: ExtractOpts, engine: Arc<dyn OcrEngine>) -> Self {
        Self {
            opts,
            engine,
            table_settings: TableSettings::default(),
        }
    }

    /// The PDF mode used when none is requested.
    pub fn default_pdf_mode(&self) -> PdfMode {
        self.opts.pdf_mode
    }

    /// OCR an image file. Failures are reported as the text.
    pub async fn extract_image(&self, path: &Path) -> String {
        extract_text_from_image(self.engine.as_ref(), path).await
    }

    /// Extract text, and maybe tables, from a PDF file.
    #[instrument(level = "debug", skip_all, fields(path = %path.display(), mode = %mode))]
    pub async fn extract_pdf(&self, path: &Path, mode: PdfMode) -> PdfExtraction {
        match mode {
            PdfMode::Layers => extract_text_from_pdf(path, &self.table_settings).await,
            PdfMode::Rasterize => {
                let result = ocr_rasterized_pdf(
                    path,
                    &self.opts.page_iter_opts,
                    self.opts.job_count,
                    self.engine.clone(),
                )
                .await;
                let text = result.unwrap_or_else(|err| {
                    warn!(path = %path.display(), "could not OCR PDF: {:#}", err);
                    format!("{:#}", err)
                });
                PdfExtraction {
                    text,
                    tables: vec![],
                }
            }
        }
    }

    /// Extract whatever we can from `path`, treating it as a PDF if `filename`
    /// says so and as an image otherwise.
    pub async fn extract_file(
        &self,
        path: &Path,
        filename: &str,
        mode: Option<PdfMode>,
    ) -> Extraction {
        if is_pdf_filename(filename) {
            let mode = mode.unwrap_or(self.opts.pdf_mode);
            Extraction::Pdf(self.extract_pdf(path, mode).await)
        } else {
            Extraction::Image {
                text: self.extract_image(path).await,
            }
        }
    }
}
