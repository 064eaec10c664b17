//! CSV interchange for the projected tables.
//!
//! The header table is written without a header row, one field pair per line.
//! The line-item table gets a single header row naming the configured columns.
//! Rows are written as projected, so a row that lost blank cells is shorter
//! than the header. Reading these files back gives us the typed tables again,
//! which is how `resume` picks up a run.

use csv::{QuoteStyle, ReaderBuilder, WriterBuilder};

use crate::{
    config::ColumnSpec,
    prelude::*,
    projection::{HeaderRecord, LineItemRecord, RowId},
};

/// Write the header table as CSV.
pub fn header_to_csv(records: &[HeaderRecord]) -> Result<String> {
    let mut wtr = WriterBuilder::new()
        .has_headers(false)
        .quote_style(QuoteStyle::Necessary)
        .from_writer(vec![]);
    for record in records {
        wtr.write_record([&record.original_text])
            .with_context(|| format!("Failed to write header row {}", record.row_id))?;
    }
    finish(wtr)
}

/// Read the header table from CSV. Row IDs are assigned by position.
pub fn header_from_csv(data: &str) -> Result<Vec<HeaderRecord>> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(false)
        .flexible(false)
        .from_reader(data.as_bytes());
    let mut records = Vec::new();
    for (position, row) in rdr.records().enumerate() {
        let row = row.with_context(|| format!("Failed to read header row {}", position + 1))?;
        let text = row.get(0).unwrap_or_default();
        records.push(HeaderRecord::new(RowId::from_position(position), text));
    }
    Ok(records)
}

/// Write the line-item table as CSV, with a header row of column names.
pub fn line_items_to_csv(
    columns: &[ColumnSpec],
    records: &[LineItemRecord],
) -> Result<String> {
    let mut wtr = WriterBuilder::new()
        .has_headers(false)
        .flexible(true)
        .quote_style(QuoteStyle::Necessary)
        .from_writer(vec![]);
    wtr.write_record(columns.iter().map(|column| &column.name))
        .context("Failed to write line item header")?;
    for record in records {
        wtr.write_record(&record.cells)
            .with_context(|| format!("Failed to write line item row {}", record.row_id))?;
    }
    finish(wtr)
}

/// Read the line-item table from CSV.
///
/// The header row must match `columns`, so that we never merge corrections
/// into a table that was written with a different column layout.
pub fn line_items_from_csv(
    columns: &[ColumnSpec],
    data: &str,
) -> Result<Vec<LineItemRecord>> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(data.as_bytes());
    let headers = rdr
        .headers()
        .context("Failed to read line item header")?
        .iter()
        .map(str::to_owned)
        .collect::<Vec<_>>();
    let expected = columns
        .iter()
        .map(|column| column.name.clone())
        .collect::<Vec<_>>();
    if headers != expected {
        return Err(anyhow!(
            "line item columns {:?} do not match configured columns {:?}",
            headers,
            expected
        ));
    }

    let mut records = Vec::new();
    for (position, row) in rdr.records().enumerate() {
        let row =
            row.with_context(|| format!("Failed to read line item row {}", position + 1))?;
        // A row that lost all its cells comes back as a single empty field.
        let cells = row
            .iter()
            .filter(|cell| !cell.is_empty())
            .map(str::to_owned)
            .collect();
        records.push(LineItemRecord::new(RowId::from_position(position), cells));
    }
    Ok(records)
}

/// Flush a CSV writer and return its contents.
fn finish(wtr: csv::Writer<Vec<u8>>) -> Result<String> {
    let bytes = wtr
        .into_inner()
        .map_err(|err| anyhow!("Failed to flush CSV: {}", err.error()))?;
    String::from_utf8(bytes).context("CSV output was not UTF-8")
}
