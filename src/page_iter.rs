//! Iterate over "pages" of an uploaded file, as images ready for OCR.

use std::{collections::BTreeMap, fs, process::Output, sync::LazyLock, vec};

use clap::Args;
use regex::Regex;
use tokio::process::Command;

use crate::{
    async_utils::check_for_command_failure, cpu_limit::with_cpu_semaphore, prelude::*,
};

/// MIME type of PDF files.
pub const PDF_MIME_TYPE: &str = "application/pdf";

/// Image types we can hand to the OCR engine.
const SUPPORTED_IMAGE_TYPES: &[&str] = &[
    "image/png",
    "image/jpeg",
    "image/tiff",
    "image/webp",
    "image/bmp",
];

/// Poppler reports most real problems as lines containing "error".
static ERROR_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)error").expect("failed to compile regex"));

/// ...but it also reports repaired xref tables that way, and those are fine.
static DOWNGRADE_TO_WARNING_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)error: xref num").expect("failed to compile regex")
});

/// Does this line of poppler output contain an error?
pub fn is_error_line(line: &str) -> bool {
    ERROR_REGEX.is_match(line) && !DOWNGRADE_TO_WARNING_REGEX.is_match(line)
}

/// A single page image.
#[derive(Debug)]
pub struct Page {
    /// The MIME type of our data. One of [`SUPPORTED_IMAGE_TYPES`].
    pub mime_type: String,
    /// The encoded image.
    pub data: Vec<u8>,
}

/// Options controlling how PDFs are turned into page images.
#[derive(Args, Clone, Debug)]
pub struct PageIterOptions {
    /// The DPI to use when rasterizing PDF pages.
    #[clap(long, env = "UPLOAD_OCR_RASTERIZE_DPI", default_value = "300")]
    pub rasterize_dpi: u32,

    /// The maximum number of PDF pages to rasterize. Later pages are skipped
    /// and reported in the output.
    #[clap(long, env = "UPLOAD_OCR_MAX_PAGES")]
    pub max_pages: Option<usize>,
}

impl Default for PageIterOptions {
    fn default() -> Self {
        Self {
            rasterize_dpi: 300,
            max_pages: None,
        }
    }
}

/// An iterator over the page images of a document.
///
/// Images are a single page. PDFs are rasterized with Poppler's `pdftocairo`
/// into a temporary directory, and the pages are read back one at a time.
pub struct PageIter {
    /// Holds rasterized pages, if we have any. Released by [`Drop`].
    tmpdir: Option<tempfile::TempDir>,
    /// The MIME type of our outputs.
    mime_type: String,
    /// The page files, in page order.
    dir_iter: vec::IntoIter<PathBuf>,
    /// Number of pages in the document.
    total_pages: usize,
    /// The maximum number of pages we are allowed to process.
    max_pages: Option<usize>,
    /// Anything the rasterizer complained about without failing.
    warnings: Vec<String>,
}

impl PageIter {
    /// Create a new [`PageIter`] from a path, based on the detected MIME type.
    #[instrument(level = "debug", skip_all, fields(path = %path.display()))]
    pub async fn from_path(path: &Path, options: &PageIterOptions) -> Result<Self> {
        let mime_type = get_mime_type(path)?;
        if SUPPORTED_IMAGE_TYPES.contains(&mime_type.as_str()) {
            Ok(Self {
                tmpdir: None,
                mime_type,
                dir_iter: vec![path.to_owned()].into_iter(),
                total_pages: 1,
                max_pages: None,
                warnings: vec![],
            })
        } else if mime_type == PDF_MIME_TYPE {
            Self::from_rasterized_pdf(path, options).await
        } else {
            Err(anyhow!(
                "unsupported MIME type {} for {:?} (supported: PNG, JPEG, TIFF, WebP, BMP, PDF)",
                mime_type,
                path.display()
            ))
        }
    }

    /// Rasterize every page of a PDF to PNG.
    #[instrument(level = "debug", skip_all, fields(path = %path.display(), dpi = options.rasterize_dpi))]
    async fn from_rasterized_pdf(path: &Path, options: &PageIterOptions) -> Result<Self> {
        let total_pages = get_pdf_page_count(path).await?;

        let tmpdir = tempfile::TempDir::with_prefix("pages")?;
        // pdftocairo appends "-<page number>.png" to this, zero-padded to the
        // same width for every page, so a lexical sort gives page order.
        let out_root = tmpdir.path().join("page");

        let mut cmd = Command::new("pdftocairo");
        cmd.arg("-png")
            .arg("-r")
            .arg(options.rasterize_dpi.to_string());
        if let Some(last_page) = last_page_to_process(options.max_pages, total_pages) {
            cmd.arg("-l").arg(last_page.to_string());
        }
        let output = with_cpu_semaphore(|| async {
            cmd.arg(path).arg(&out_root).output().await.with_context(|| {
                format!("failed to run pdftocairo on {:?}", path.display())
            })
        })
        .await?;
        check_for_command_failure("pdftocairo", &output, Some(&is_error_line))?;

        Self::from_tempdir(options, tmpdir, total_pages, &output)
    }

    /// Collect the pages `pdftocairo` left in `tmpdir`.
    fn from_tempdir(
        options: &PageIterOptions,
        tmpdir: tempfile::TempDir,
        total_pages: usize,
        output: &Output,
    ) -> Result<Self> {
        let tmpdir_path = tmpdir.path();
        let mut dir_paths = tmpdir_path
            .read_dir()
            .with_context(|| {
                format!(
                    "failed to read temporary directory {:?}",
                    tmpdir_path.display()
                )
            })?
            .map(|entry| Ok(entry?.path()))
            .collect::<Result<Vec<_>>>()?;
        dir_paths.sort();

        let warnings = String::from_utf8_lossy(&output.stderr)
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_owned)
            .collect();

        Ok(Self {
            tmpdir: Some(tmpdir),
            mime_type: "image/png".to_owned(),
            dir_iter: dir_paths.into_iter(),
            total_pages,
            max_pages: options.max_pages,
            warnings,
        })
    }

    /// Number of pages in the whole document.
    pub fn total_pages(&self) -> usize {
        self.total_pages
    }

    /// Any warnings that occurred while processing the document.
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// If `max_pages` cut this document short, how many pages will we return?
    pub fn truncated_to(&self) -> Option<usize> {
        match self.max_pages {
            Some(max_pages) if self.total_pages > max_pages => Some(max_pages),
            _ => None,
        }
    }
}

impl Drop for PageIter {
    fn drop(&mut self) {
        if let Some(tmpdir) = self.tmpdir.take() {
            let tmpdir_path = tmpdir.path().to_owned();
            if let Err(err) = tmpdir.close() {
                error!(
                    directory = ?tmpdir_path.display(),
                    "failed to delete temporary directory: {}",
                    err
                );
            }
        }
    }
}

impl Iterator for PageIter {
    type Item = Result<Page>;

    fn next(&mut self) -> Option<Self::Item> {
        let path = self.dir_iter.next()?;
        let bytes = match fs::read(&path)
            .with_context(|| format!("failed to read file {:?}", path.display()))
        {
            Ok(bytes) => bytes,
            Err(err) => return Some(Err(err)),
        };

        // Rasterized pages are ours, so recover the space early.
        if self.tmpdir.is_some()
            && let Err(err) = fs::remove_file(&path)
        {
            warn!(path = %path.display(), "failed to delete page image: {}", err);
        }

        Some(Ok(Page {
            mime_type: self.mime_type.clone(),
            data: bytes,
        }))
    }
}

/// Get the number of pages in a PDF file.
#[instrument(level = "debug", skip_all, fields(path = %path.display()))]
pub async fn get_pdf_page_count(path: &Path) -> Result<usize> {
    let output = Command::new("pdfinfo")
        .arg(path)
        .output()
        .await
        .with_context(|| format!("failed to run pdfinfo on {:?}", path.display()))?;
    check_for_command_failure("pdfinfo", &output, None)?;

    let output =
        String::from_utf8(output.stdout).context("pdfinfo output was not valid UTF-8")?;
    parse_pdfinfo_page_count(&output).with_context(|| {
        format!(
            "failed to get page count for {:?} from pdfinfo output",
            path.display()
        )
    })
}

/// Pull the `Pages:` property out of `pdfinfo` output.
fn parse_pdfinfo_page_count(output: &str) -> Result<usize> {
    let properties = output
        .lines()
        .filter_map(|line| line.split_once(':'))
        .map(|(key, value)| (key.trim(), value.trim()))
        .collect::<BTreeMap<_, _>>();
    let page_count = properties
        .get("Pages")
        .ok_or_else(|| anyhow!("no \"Pages\" line in pdfinfo output"))?;
    page_count
        .parse::<usize>()
        .with_context(|| format!("invalid page count {:?}", page_count))
}

/// The last (1-based, inclusive) page to pass to Poppler's `-l`, if
/// `max_pages` requires one.
fn last_page_to_process(max_pages: Option<usize>, total_pages: usize) -> Option<usize> {
    max_pages.filter(|&max_pages| total_pages > max_pages)
}

/// Get the MIME type of a file by sniffing its contents.
pub fn get_mime_type(path: &Path) -> Result<String> {
    Ok(infer::get_from_path(path)
        .with_context(|| format!("failed to get MIME type for {:?}", path.display()))?
        .ok_or_else(|| anyhow!("unknown MIME type for {:?}", path.display()))?
        .mime_type()
        .to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    static TEST_PDF_PATH: &str = "tests/fixtures/two_pages.pdf";

    #[test]
    fn is_error_line_works() {
        assert!(is_error_line("error: something went wrong"));
        assert!(is_error_line("Syntax Error: Couldn't read xref table"));
        assert!(!is_error_line("Warning: something is odd"));
        assert!(!is_error_line(
            "Internal Error: xref num 1234 not found but needed, document has changes, reconstruct aborted"
        ));
    }

    #[test]
    fn parses_pdfinfo_page_count() -> Result<()> {
        let output = "Producer:       hand-written\nTagged:         no\nPages:          12\nPage size:      612 x 792 pts (letter)\n";
        assert_eq!(parse_pdfinfo_page_count(output)?, 12);
        assert!(parse_pdfinfo_page_count("Producer: nobody\n").is_err());
        assert!(parse_pdfinfo_page_count("Pages: many\n").is_err());
        Ok(())
    }

    #[test]
    fn last_page_only_set_when_truncating() {
        assert_eq!(last_page_to_process(None, 10), None);
        assert_eq!(last_page_to_process(Some(10), 10), None);
        assert_eq!(last_page_to_process(Some(3), 10), Some(3));
    }

    #[test]
    fn sniffs_pdf_mime_type() -> Result<()> {
        assert_eq!(get_mime_type(Path::new(TEST_PDF_PATH))?, PDF_MIME_TYPE);
        Ok(())
    }

    #[tokio::test]
    async fn rejects_unsupported_files() -> Result<()> {
        let tmpdir = tempfile::TempDir::with_prefix("page-iter")?;
        let path = tmpdir.path().join("archive.zip");
        fs::write(&path, b"PK\x03\x04not really a zip file")?;
        assert!(PageIter::from_path(&path, &PageIterOptions::default()).await.is_err());
        Ok(())
    }

    #[tokio::test]
    #[ignore = "Requires poppler-utils to be installed"]
    async fn page_count_returns_correct_number_of_pages() -> Result<()> {
        let page_count = get_pdf_page_count(Path::new(TEST_PDF_PATH)).await?;
        assert_eq!(page_count, 2);
        Ok(())
    }

    #[tokio::test]
    #[ignore = "Requires poppler-utils to be installed"]
    async fn page_iter_returns_correct_number_of_pages() -> Result<()> {
        let page_iter =
            PageIter::from_path(Path::new(TEST_PDF_PATH), &PageIterOptions::default())
                .await?;
        assert_eq!(page_iter.truncated_to(), None);
        let pages = page_iter.collect::<Result<Vec<_>, _>>()?;
        assert_eq!(pages.len(), 2);
        for page in &pages {
            assert_eq!(page.mime_type, "image/png");
        }
        Ok(())
    }

    #[tokio::test]
    #[ignore = "Requires poppler-utils to be installed"]
    async fn page_iter_obeys_max_pages() -> Result<()> {
        let page_iter = PageIter::from_path(
            Path::new(TEST_PDF_PATH),
            &PageIterOptions {
                rasterize_dpi: 72,
                max_pages: Some(1),
            },
        )
        .await?;
        assert_eq!(page_iter.truncated_to(), Some(1));
        assert_eq!(page_iter.total_pages(), 2);
        let pages = page_iter.collect::<Result<Vec<_>, _>>()?;
        assert_eq!(pages.len(), 1);
        Ok(())
    }
}
