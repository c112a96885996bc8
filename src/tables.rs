//! Finding tables in the positioned words of a page.
//!
//! We have no ruling lines to work with, only word boxes, so a table is
//! a run of consecutive text rows that split into the same number of
//! horizontally aligned cells.

use std::cmp::Ordering;

/// A word and its bounding box, in page coordinates with `top` growing
/// downwards.
#[derive(Clone, Debug, PartialEq)]
pub struct Word {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
    pub text: String,
}

impl Word {
    fn right(&self) -> f64 {
        self.left + self.width
    }

    fn bottom(&self) -> f64 {
        self.top + self.height
    }

    fn center_y(&self) -> f64 {
        self.top + self.height / 2.0
    }
}

/// A table, as rows of cell text.
pub type Table = Vec<Vec<String>>;

/// Tuning knobs for [`find_tables`]. All distances are relative to the
/// height of the rows involved, so they work at any font size.
#[derive(Clone, Debug)]
pub struct TableSettings {
    /// Horizontal gap between words, in row heights, that separates cells.
    pub cell_gap_factor: f64,
    /// Largest vertical gap between rows of the same table, in row heights.
    pub row_gap_factor: f64,
    /// Fewest rows that make a table.
    pub min_rows: usize,
}

impl Default for TableSettings {
    fn default() -> Self {
        Self {
            cell_gap_factor: 1.0,
            row_gap_factor: 1.5,
            min_rows: 2,
        }
    }
}

/// A cell under construction.
#[derive(Debug)]
struct Cell {
    left: f64,
    right: f64,
    text: String,
}

impl Cell {
    fn overlaps(&self, other: &Cell) -> bool {
        self.left <= other.right && other.left <= self.right
    }
}

/// A line of words sharing a baseline.
#[derive(Debug)]
struct Row<'a> {
    top: f64,
    bottom: f64,
    words: Vec<&'a Word>,
}

impl Row<'_> {
    fn height(&self) -> f64 {
        self.bottom - self.top
    }

    fn center_y(&self) -> f64 {
        (self.top + self.bottom) / 2.0
    }

    fn cells(&self, settings: &TableSettings) -> Vec<Cell> {
        let max_gap = settings.cell_gap_factor * self.height();
        let mut words = self.words.clone();
        words.sort_by(|a, b| a.left.total_cmp(&b.left));

        let mut cells: Vec<Cell> = vec![];
        for word in words {
            match cells.last_mut() {
                Some(cell) if word.left - cell.right <= max_gap => {
                    cell.text.push(' ');
                    cell.text.push_str(&word.text);
                    cell.right = cell.right.max(word.right());
                }
                _ => cells.push(Cell {
                    left: word.left,
                    right: word.right(),
                    text: word.text.clone(),
                }),
            }
        }
        cells
    }
}

/// Group words into rows, top to bottom.
fn group_rows(words: &[Word]) -> Vec<Row<'_>> {
    let mut sorted = words.iter().collect::<Vec<_>>();
    sorted.sort_by(|a, b| match a.top.total_cmp(&b.top) {
        Ordering::Equal => a.left.total_cmp(&b.left),
        other => other,
    });

    let mut rows: Vec<Row<'_>> = vec![];
    for word in sorted {
        match rows.last_mut() {
            Some(row)
                if (word.center_y() - row.center_y()).abs()
                    <= row.height().max(word.height) / 2.0 =>
            {
                row.top = row.top.min(word.top);
                row.bottom = row.bottom.max(word.bottom());
                row.words.push(word);
            }
            _ => rows.push(Row {
                top: word.top,
                bottom: word.bottom(),
                words: vec![word],
            }),
        }
    }
    rows
}

/// Find all the tables on a page.
pub fn find_tables(words: &[Word], settings: &TableSettings) -> Vec<Table> {
    let mut tables = vec![];
    let mut run: Vec<(&Row<'_>, Vec<Cell>)> = vec![];

    let rows = group_rows(words);
    for row in &rows {
        let cells = row.cells(settings);
        let continues_run = match run.last() {
            Some((prev_row, prev_cells)) => {
                let gap = row.top - prev_row.bottom;
                let max_gap =
                    settings.row_gap_factor * prev_row.height().max(row.height());
                cells.len() == prev_cells.len()
                    && gap <= max_gap
                    && cells.iter().zip(prev_cells).all(|(c, p)| c.overlaps(p))
            }
            None => false,
        };

        if !continues_run {
            flush_run(&mut run, &mut tables, settings);
        }
        if cells.len() >= 2 {
            run.push((row, cells));
        }
    }
    flush_run(&mut run, &mut tables, settings);
    tables
}

/// Turn the current run of rows into a table if it is long enough.
fn flush_run(
    run: &mut Vec<(&Row<'_>, Vec<Cell>)>,
    tables: &mut Vec<Table>,
    settings: &TableSettings,
) {
    if run.len() >= settings.min_rows {
        tables.push(
            run.drain(..)
                .map(|(_, cells)| cells.into_iter().map(|c| c.text).collect())
                .collect(),
        );
    } else {
        run.clear();
    }
}
