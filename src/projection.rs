//! Projecting an analysis result into the header and line-item tables.

use std::fmt;

use schemars::JsonSchema;

use crate::{
    analysis::{DetectedTable, DocumentAnalysisResult},
    config::{ColumnSpec, LineItemsConfig},
    error::PipelineError,
    prelude::*,
};

/// A 1-based row ordinal. This is the join key between the records we send
/// for review, the answer fields the reviewer fills in, and the merge.
#[derive(
    Clone,
    Copy,
    Debug,
    Deserialize,
    Eq,
    Hash,
    JsonSchema,
    Ord,
    PartialEq,
    PartialOrd,
    Serialize,
)]
#[serde(transparent)]
pub struct RowId(u32);

impl RowId {
    /// The row ID for a 0-based position.
    pub fn from_position(position: usize) -> Self {
        RowId(u32::try_from(position + 1).expect("too many rows"))
    }

    /// The answer field name for this row, e.g. `TrueEmpName2`.
    pub fn answer_key(self, field: &str) -> String {
        format!("{field}{}", self.0)
    }
}

impl fmt::Display for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One detected field pair, plus the reviewer's corrections.
#[derive(Clone, Debug, Deserialize, JsonSchema, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub struct HeaderRecord {
    /// Row identifier.
    pub row_id: RowId,
    /// Key and value text, separated by a single space.
    pub original_text: String,
    /// Corrected text, if the reviewer supplied any.
    pub corrected_text: Option<String>,
    /// The reviewer's comment, if any.
    pub comment: Option<String>,
}

impl HeaderRecord {
    /// Create an unreviewed header record.
    pub fn new(row_id: RowId, original_text: impl Into<String>) -> Self {
        Self {
            row_id,
            original_text: original_text.into(),
            corrected_text: None,
            comment: None,
        }
    }
}

/// One table row, plus the reviewer's corrections.
#[derive(Clone, Debug, Deserialize, JsonSchema, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub struct LineItemRecord {
    /// Row identifier.
    pub row_id: RowId,
    /// Non-empty cell text, in column order. Empty cells are dropped, so if
    /// a row had blanks, these no longer line up with the columns.
    pub cells: Vec<String>,
    /// Corrected values, one per configured column. Empty until merged.
    #[serde(default)]
    pub corrected: Vec<Option<String>>,
    /// The reviewer's comment on this row, if any.
    #[serde(default)]
    pub change_comment: Option<String>,
}

impl LineItemRecord {
    /// Create an unreviewed line item.
    pub fn new(row_id: RowId, cells: Vec<String>) -> Self {
        Self {
            row_id,
            cells,
            corrected: Vec::new(),
            change_comment: None,
        }
    }

    /// Original value for a column index. `None` if the row is short.
    pub fn cell(&self, column: usize) -> Option<&str> {
        self.cells.get(column).map(String::as_str)
    }

    /// Corrected value for a column index.
    pub fn corrected(&self, column: usize) -> Option<&str> {
        self.corrected.get(column).and_then(|value| value.as_deref())
    }
}

/// Which detected table becomes the line-item table.
#[derive(Clone, Copy, Debug, Default, Deserialize, JsonSchema, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TableSelection {
    /// Require exactly one table.
    Only,
    /// The first table detected.
    First,
    /// The last table detected.
    #[default]
    Last,
    /// A specific table, counting from 0.
    Index(usize),
}

impl TableSelection {
    /// Pick a table.
    pub fn select<'a>(
        &self,
        tables: &'a [DetectedTable],
    ) -> Result<&'a DetectedTable, PipelineError> {
        if tables.is_empty() {
            return Err(PipelineError::projection("no tables detected"));
        }
        let selected = match self {
            TableSelection::Only if tables.len() == 1 => tables.first(),
            TableSelection::Only => {
                return Err(PipelineError::projection(format!(
                    "expected exactly one table, found {}",
                    tables.len()
                )));
            }
            TableSelection::First => tables.first(),
            TableSelection::Last => tables.last(),
            TableSelection::Index(idx) => tables.get(*idx),
        };
        selected.ok_or_else(|| {
            PipelineError::projection(format!(
                "table selection {self:?} out of range ({} tables detected)",
                tables.len()
            ))
        })
    }
}

/// One header record per field pair, in detection order.
pub fn project_header(result: &DocumentAnalysisResult) -> Vec<HeaderRecord> {
    result
        .field_pairs
        .iter()
        .enumerate()
        .map(|(position, pair)| {
            HeaderRecord::new(
                RowId::from_position(position),
                format!("{} {}", pair.key, pair.value),
            )
        })
        .collect()
}

/// One line item per row of the selected table.
///
/// Cell text has trailing whitespace trimmed, and cells that are then empty
/// are dropped from the row.
pub fn project_line_items(
    result: &DocumentAnalysisResult,
    config: &LineItemsConfig,
) -> Result<Vec<LineItemRecord>, PipelineError> {
    let table = config.table_selection.select(&result.tables)?;
    let mut rows = table.rows.iter().peekable();
    if config.skip_header_row
        && rows
            .peek()
            .is_some_and(|row| is_column_header(row, &config.columns))
    {
        debug!("Skipping table header row");
        rows.next();
    }
    let records = rows
        .enumerate()
        .map(|(position, row)| {
            let cells = row
                .iter()
                .map(|cell| cell.trim_end())
                .filter(|cell| !cell.is_empty())
                .map(str::to_owned)
                .collect();
            LineItemRecord::new(RowId::from_position(position), cells)
        })
        .collect();
    Ok(records)
}

/// Does this row just repeat our column names?
fn is_column_header(row: &[String], columns: &[ColumnSpec]) -> bool {
    row.len() == columns.len()
        && row
            .iter()
            .zip(columns)
            .all(|(cell, column)| cell.trim().eq_ignore_ascii_case(column.name.trim()))
}

/// Check that every line item has exactly one cell per column.
///
/// Rows with blank cells lose those cells during projection, which would
/// silently shift values into the wrong columns. Unless `allow_ragged_rows` is
/// set, we refuse to go any further.
pub fn validate_line_items(
    records: &[LineItemRecord],
    config: &LineItemsConfig,
) -> Result<(), PipelineError> {
    if config.allow_ragged_rows {
        return Ok(());
    }
    let expected = config.columns.len();
    for record in records {
        if record.cells.len() != expected {
            return Err(PipelineError::projection(format!(
                "line item row {} has {} non-empty cells, expected {} ({})",
                record.row_id,
                record.cells.len(),
                expected,
                config
                    .columns
                    .iter()
                    .map(|c| c.name.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            )));
        }
    }
    Ok(())
}
