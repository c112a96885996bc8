//! Validating, naming and storing uploaded files.

use std::sync::LazyLock;

use regex::Regex;
use tempfile::TempPath;
use tokio::{fs, io::AsyncWriteExt as _};
use unicode_normalization::UnicodeNormalization as _;

use crate::{async_utils::spawn_blocking_propagating_panics, prelude::*};

/// File extensions we accept, lowercase and without the leading dot.
pub const ALLOWED_EXTENSIONS: &[&str] =
    &["png", "jpg", "jpeg", "tiff", "jfif", "webp", "bmp", "pdf"];

/// Device names that Windows treats specially, whatever their extension.
const WINDOWS_DEVICE_NAMES: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6",
    "COM7", "COM8", "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7",
    "LPT8", "LPT9",
];

/// Characters that survive sanitizing.
static UNSAFE_CHARS_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^A-Za-z0-9_.-]").expect("failed to compile regex"));

/// Does `filename` have one of our [`ALLOWED_EXTENSIONS`]?
///
/// Only the text after the last `.` counts, compared case-insensitively.
pub fn allowed_file(filename: &str) -> bool {
    match filename.rsplit_once('.') {
        Some((_, ext)) => ALLOWED_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()),
        None => false,
    }
}

/// Is this (already sanitized) file name a PDF?
pub fn is_pdf_filename(filename: &str) -> bool {
    filename.to_ascii_lowercase().ends_with(".pdf")
}

/// Turn a client-supplied file name into one that is safe to use as a single
/// path component in our upload directory.
///
/// The result is plain ASCII, contains no path separators, and may be empty
/// if nothing usable was left.
pub fn secure_filename(filename: &str) -> String {
    let ascii = filename
        .nfkd()
        .filter(char::is_ascii)
        .map(|c| if c == '/' || c == '\\' { ' ' } else { c })
        .collect::<String>();
    let joined = ascii.split_whitespace().collect::<Vec<_>>().join("_");
    let cleaned = UNSAFE_CHARS_REGEX.replace_all(&joined, "");
    let trimmed = cleaned.trim_matches(|c: char| c == '.' || c == '_');

    let stem = trimmed.split('.').next().unwrap_or_default();
    if WINDOWS_DEVICE_NAMES
        .iter()
        .any(|name| name.eq_ignore_ascii_case(stem))
    {
        format!("_{trimmed}")
    } else {
        trimmed.to_owned()
    }
}

/// The name of the CSV file holding tables extracted from `filename`.
pub fn tables_csv_filename(filename: &str) -> String {
    let stem = Path::new(filename)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    format!("{stem}_tables.csv")
}

/// The directory where we keep uploads and the files we derive from them.
#[derive(Clone, Debug)]
pub struct UploadDir {
    root: PathBuf,
}

impl UploadDir {
    /// Use `root` as our upload directory, creating it if necessary.
    #[instrument(level = "debug", skip_all, fields(root = %root.display()))]
    pub async fn create(root: &Path) -> Result<Self> {
        fs::create_dir_all(root).await.with_context(|| {
            format!("failed to create upload directory {:?}", root.display())
        })?;
        Ok(Self {
            root: root.to_owned(),
        })
    }

    /// The directory itself.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Where a file with the sanitized name `filename` lives.
    pub fn path_for(&self, filename: &str) -> PathBuf {
        self.root.join(filename)
    }

    /// Start writing an upload that will be stored as `filename`.
    ///
    /// Data goes to a temporary file in the upload directory, and only
    /// replaces any existing file named `filename` once
    /// [`UploadWriter::finish`] succeeds. Dropping the writer discards it.
    pub async fn create_file(&self, filename: &str) -> Result<UploadWriter> {
        let path = self.path_for(filename);
        let root = self.root.clone();
        let temp = spawn_blocking_propagating_panics(move || {
            tempfile::Builder::new()
                .prefix(".upload-")
                .tempfile_in(&root)
                .with_context(|| {
                    format!("failed to create temporary file in {:?}", root.display())
                })
        })
        .await?;
        let (file, temp_path) = temp.into_parts();
        Ok(UploadWriter {
            path,
            file: fs::File::from_std(file),
            temp_path,
            bytes_written: 0,
        })
    }
}

/// An upload being written to disk, one chunk at a time.
pub struct UploadWriter {
    /// Final location of the upload.
    path: PathBuf,
    file: fs::File,
    /// Deleted on drop unless persisted.
    temp_path: TempPath,
    bytes_written: usize,
}

impl UploadWriter {
    /// Append a chunk of the upload.
    pub async fn write_chunk(&mut self, chunk: &[u8]) -> Result<()> {
        self.file
            .write_all(chunk)
            .await
            .with_context(|| format!("failed to write {:?}", self.temp_path.display()))?;
        self.bytes_written += chunk.len();
        Ok(())
    }

    /// Flush the upload, move it to its final name, and return its path.
    pub async fn finish(mut self) -> Result<PathBuf> {
        self.file
            .flush()
            .await
            .with_context(|| format!("failed to flush {:?}", self.temp_path.display()))?;
        let UploadWriter {
            path,
            file,
            temp_path,
            bytes_written,
        } = self;
        drop(file);
        let path = spawn_blocking_propagating_panics(move || {
            temp_path
                .persist(&path)
                .map(|()| path)
                .map_err(|err| anyhow::Error::new(err.error))
        })
        .await
        .context("failed to store upload")?;
        debug!(path = %path.display(), bytes = bytes_written, "Stored upload");
        Ok(path)
    }
}
