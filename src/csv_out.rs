//! Writing extracted tables as CSV.

use crate::{prelude::*, tables::Table};

/// Serialize `tables` as CSV, with a blank line after each table.
///
/// Rows may have different lengths. Records end in `\r\n`, which is what
/// spreadsheet software expects.
pub fn tables_to_csv(tables: &[Table]) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    for table in tables {
        let mut wtr = csv::WriterBuilder::new()
            .flexible(true)
            .terminator(csv::Terminator::CRLF)
            .from_writer(&mut out);
        for row in table {
            wtr.write_record(row).context("failed to write CSV row")?;
        }
        wtr.flush().context("failed to flush CSV")?;
        drop(wtr);
        out.extend_from_slice(b"\r\n");
    }
    Ok(out)
}

/// Write `tables` to a CSV file at `path`, replacing any existing file.
#[instrument(level = "debug", skip_all, fields(path = %path.display(), tables = tables.len()))]
pub async fn save_tables_as_csv(tables: &[Table], path: &Path) -> Result<()> {
    let csv = tables_to_csv(tables)?;
    tokio::fs::write(path, csv)
        .await
        .with_context(|| format!("failed to write tables to {:?}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(rows: &[&[&str]]) -> Table {
        rows.iter()
            .map(|row| row.iter().map(|cell| cell.to_string()).collect())
            .collect()
    }

    #[test]
    fn separates_tables_with_blank_lines() -> Result<()> {
        let tables = vec![
            table(&[&["Name", "Qty"], &["Apple", "3"]]),
            table(&[&["Total", "3"]]),
        ];
        let csv = String::from_utf8(tables_to_csv(&tables)?)?;
        assert_eq!(csv, "Name,Qty\r\nApple,3\r\n\r\nTotal,3\r\n\r\n");
        Ok(())
    }

    #[test]
    fn quotes_awkward_cells_and_allows_ragged_rows() -> Result<()> {
        let tables = vec![table(&[&["a,b", "say \"hi\""], &["only one"]])];
        let csv = String::from_utf8(tables_to_csv(&tables)?)?;
        assert_eq!(csv, "\"a,b\",\"say \"\"hi\"\"\"\r\nonly one\r\n\r\n");
        Ok(())
    }

    #[test]
    fn no_tables_is_empty() -> Result<()> {
        assert!(tables_to_csv(&[])?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn saves_to_disk() -> Result<()> {
        let tmpdir = tempfile::TempDir::with_prefix("csv")?;
        let path = tmpdir.path().join("report_tables.csv");
        save_tables_as_csv(&[table(&[&["x", "y"]])], &path).await?;
        assert_eq!(std::fs::read_to_string(&path)?, "x,y\r\n\r\n");
        Ok(())
    }
}
