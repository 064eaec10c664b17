//! Merging reviewer corrections back into the projected tables.

use std::collections::BTreeMap;

use crate::{
    config::{ColumnSpec, ReviewConfig},
    projection::{HeaderRecord, LineItemRecord},
    records::{LINE_NR, PersistedRecord},
    review::answer::CorrectionAnswer,
};

/// Attribute holding the extracted header text.
pub const HEADER_TEXT: &str = "header_text";
/// Attribute holding the corrected header text.
pub const HEADER_CORRECTED: &str = "header_corrected";
/// Attribute holding the reviewer's header comment.
pub const HEADER_COMMENT: &str = "header_comment";
/// Attribute holding the reviewer's line item comment.
pub const CHANGE_COMMENT: &str = "change_comment";

/// Attribute names written for every row regardless of columns.
pub const FIXED_ATTRIBUTES: &[&str] =
    &[LINE_NR, HEADER_TEXT, HEADER_CORRECTED, HEADER_COMMENT, CHANGE_COMMENT];

/// The corrected-value attribute for a column key.
pub fn corrected_attribute(key: &str) -> String {
    format!("{key}_corrected")
}

/// Fill in the corrected fields of every header record. Total: rows without
/// an answer get `None`.
pub fn merge_header(
    records: &mut [HeaderRecord],
    answer: &CorrectionAnswer,
    review: &ReviewConfig,
) {
    for record in records {
        record.corrected_text = answer.get(&review.header_answer_field, record.row_id);
        record.comment = answer.get(&review.header_comment_field, record.row_id);
    }
}

/// Fill in the corrected fields of every line item, one per column. Total:
/// missing answers and short rows never cause an error.
pub fn merge_line_items(
    records: &mut [LineItemRecord],
    answer: &CorrectionAnswer,
    review: &ReviewConfig,
    columns: &[ColumnSpec],
) {
    for record in records {
        record.corrected = columns
            .iter()
            .map(|column| answer.get(&column.answer_field, record.row_id))
            .collect();
        record.change_comment = answer.get(&review.change_comment_field, record.row_id);
    }
}

/// One row of the joined table: header row `i` next to line item `i`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MergedRow {
    /// The header record at this position, if there is one.
    pub header: Option<HeaderRecord>,
    /// The line item at this position, if there is one.
    pub line_item: Option<LineItemRecord>,
}

/// The two reviewed tables, joined side by side.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MergedRecordSet {
    /// Merged rows, as long as the longer of the two tables.
    pub rows: Vec<MergedRow>,
}

impl MergedRecordSet {
    /// Merge corrections into both tables and join them by position.
    pub fn merge(
        mut header: Vec<HeaderRecord>,
        mut line_items: Vec<LineItemRecord>,
        answer: &CorrectionAnswer,
        review: &ReviewConfig,
        columns: &[ColumnSpec],
    ) -> Self {
        merge_header(&mut header, answer, review);
        merge_line_items(&mut line_items, answer, review, columns);

        let len = header.len().max(line_items.len());
        let mut header = header.into_iter();
        let mut line_items = line_items.into_iter();
        let rows = (0..len)
            .map(|_| MergedRow {
                header: header.next(),
                line_item: line_items.next(),
            })
            .collect();
        Self { rows }
    }

    /// Flatten into datastore records, keyed by row position from 0.
    ///
    /// Every record has the same attribute names. Anything absent is null.
    pub fn to_persisted(&self, columns: &[ColumnSpec]) -> Vec<PersistedRecord> {
        self.rows
            .iter()
            .enumerate()
            .map(|(position, row)| {
                let mut attributes = BTreeMap::new();
                let header = row.header.as_ref();
                attributes.insert(
                    HEADER_TEXT.to_owned(),
                    header.map(|h| h.original_text.clone()),
                );
                attributes.insert(
                    HEADER_CORRECTED.to_owned(),
                    header.and_then(|h| h.corrected_text.clone()),
                );
                attributes.insert(
                    HEADER_COMMENT.to_owned(),
                    header.and_then(|h| h.comment.clone()),
                );

                let item = row.line_item.as_ref();
                for (idx, column) in columns.iter().enumerate() {
                    attributes.insert(
                        column.key.clone(),
                        item.and_then(|i| i.cell(idx)).map(str::to_owned),
                    );
                    attributes.insert(
                        corrected_attribute(&column.key),
                        item.and_then(|i| i.corrected(idx)).map(str::to_owned),
                    );
                }
                attributes.insert(
                    CHANGE_COMMENT.to_owned(),
                    item.and_then(|i| i.change_comment.clone()),
                );

                PersistedRecord {
                    line_nr: position as u64,
                    attributes,
                }
            })
            .collect()
    }
}
