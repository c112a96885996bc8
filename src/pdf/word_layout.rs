//! Word-level extraction with `pdftotext -tsv`, which gives us a bounding box
//! for every word. We rebuild lines of text from it, and look for tables.

use std::process::Output;

use tokio::process::Command;

use crate::{
    cpu_limit::with_cpu_semaphore,
    prelude::*,
    tables::{Table, TableSettings, Word, find_tables},
};

use super::{check_pdftotext_output, join_pages};

/// `level` of TSV rows which describe a single word.
const WORD_LEVEL: u8 = 5;

/// One row of `pdftotext -tsv` output. Rows for pages, flows and lines carry
/// placeholder text like `###PAGE###`, and are ignored.
#[derive(Debug, Deserialize)]
struct TsvRow {
    level: u8,
    page_num: usize,
    par_num: usize,
    block_num: usize,
    line_num: usize,
    left: f64,
    top: f64,
    width: f64,
    height: f64,
    #[serde(default)]
    text: String,
}

/// Identifies the line a word belongs to.
type LineKey = (usize, usize, usize);

/// The words found on one page.
#[derive(Debug, Default)]
pub struct PageWords {
    /// 1-based page number.
    pub page_num: usize,
    /// Words in reading order, with the line they belong to.
    words: Vec<(LineKey, Word)>,
}

impl PageWords {
    /// The text of this page, one output line per text line.
    pub fn text(&self) -> String {
        let mut text = String::new();
        let mut current_line = None;
        for (line, word) in &self.words {
            if current_line == Some(line) {
                text.push(' ');
            } else if current_line.is_some() {
                text.push('\n');
            }
            text.push_str(&word.text);
            current_line = Some(line);
        }
        text
    }

    /// Find the tables on this page.
    pub fn tables(&self, settings: &TableSettings) -> Vec<Table> {
        let words = self
            .words
            .iter()
            .map(|(_, word)| word.clone())
            .collect::<Vec<_>>();
        find_tables(&words, settings)
    }
}

/// Text and tables found by word-level extraction.
#[derive(Debug, Default, PartialEq)]
pub struct WordLayoutExtraction {
    pub text: String,
    pub tables: Vec<Table>,
}

/// Extract text and tables from a PDF using word bounding boxes.
#[instrument(level = "debug", skip_all, fields(path = %path.display()))]
pub async fn extract_text_and_tables(
    path: &Path,
    settings: &TableSettings,
) -> Result<WordLayoutExtraction> {
    let output = with_cpu_semaphore(|| async {
        Command::new("pdftotext")
            .arg("-tsv")
            .args(["-enc", "UTF-8"])
            .arg(path)
            .arg("-")
            .output()
            .await
            .with_context(|| format!("failed to run pdftotext on {:?}", path.display()))
    })
    .await?;
    extraction_from_output(path, &output, settings)
}

/// Get the text and tables from a finished `pdftotext -tsv` run.
fn extraction_from_output(
    path: &Path,
    output: &Output,
    settings: &TableSettings,
) -> Result<WordLayoutExtraction> {
    check_pdftotext_output(path, output)?;
    let pages = parse_tsv(&output.stdout)?;
    let extraction = WordLayoutExtraction {
        text: join_pages(pages.iter().map(PageWords::text)),
        tables: pages.iter().flat_map(|page| page.tables(settings)).collect(),
    };
    debug!(
        pages = pages.len(),
        tables = extraction.tables.len(),
        "Extracted word layout"
    );
    Ok(extraction)
}

/// Parse `pdftotext -tsv` output into pages of words.
fn parse_tsv(tsv: &[u8]) -> Result<Vec<PageWords>> {
    let mut rdr = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .quoting(false)
        .flexible(true)
        .from_reader(tsv);

    let mut pages: Vec<PageWords> = vec![];
    for row in rdr.deserialize::<TsvRow>() {
        let row = row.context("failed to parse pdftotext TSV output")?;
        if pages.last().map(|page| page.page_num) != Some(row.page_num) {
            pages.push(PageWords {
                page_num: row.page_num,
                words: vec![],
            });
        }
        if row.level != WORD_LEVEL || row.text.trim().is_empty() {
            continue;
        }
        let page = pages
            .last_mut()
            .ok_or_else(|| anyhow!("word outside of any page"))?;
        page.words.push((
            (row.par_num, row.block_num, row.line_num),
            Word {
                left: row.left,
                top: row.top,
                width: row.width,
                height: row.height,
                text: row.text,
            },
        ));
    }
    Ok(pages)
}
