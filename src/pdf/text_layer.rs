//! Text layer extraction with `pdftotext -layout`.

use tokio::process::Command;

use std::process::Output;

use crate::{cpu_limit::with_cpu_semaphore, prelude::*};

use super::{check_pdftotext_output, join_pages};

/// Extract the embedded text of a PDF, keeping its physical layout.
///
/// This misses any text which is only present as an image, but it's fast and
/// preserves column alignment well.
#[instrument(level = "debug", skip_all, fields(path = %path.display()))]
pub async fn extract_text_pdftotext(path: &Path) -> Result<String> {
    let output = with_cpu_semaphore(|| async {
        Command::new("pdftotext")
            .arg("-layout")
            .args(["-enc", "UTF-8"])
            .arg(path)
            .arg("-")
            .output()
            .await
            .with_context(|| format!("failed to run pdftotext on {:?}", path.display()))
    })
    .await?;
    text_from_output(path, &output)
}

/// Get the text from a finished `pdftotext -layout` run.
fn text_from_output(path: &Path, output: &Output) -> Result<String> {
    check_pdftotext_output(path, output)?;
    let text = String::from_utf8_lossy(&output.stdout);
    Ok(pages_to_text(&text))
}

/// `pdftotext` ends every page with a form feed.
fn pages_to_text(output: &str) -> String {
    join_pages(output.split('\x0C'))
}
