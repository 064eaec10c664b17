//! Persisting merged records to a keyed datastore.
//!
//! Every run creates a brand new table. Nothing is upserted and nothing is
//! rolled back: if a write fails halfway, the table keeps the rows that made
//! it.

use std::{collections::BTreeMap, sync::Arc};

use schemars::JsonSchema;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::{
    config::TableConfig,
    error::{PipelineError, Stage},
    poll::{PollError, Probe, poll_until},
    prelude::*,
    ui::{ProgressConfig, Ui},
};

pub mod dynamodb;

/// The name of our key attribute.
pub const LINE_NR: &str = "line_nr";

/// One merged row, as written to the datastore.
#[derive(Clone, Debug, Deserialize, JsonSchema, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub struct PersistedRecord {
    /// 0-based position in the merged record set. Unique within a table.
    pub line_nr: u64,
    /// Every other attribute, as a string or null.
    pub attributes: BTreeMap<String, Option<String>>,
}

/// Whether a table is ready for writes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TableState {
    /// Ready.
    Active,
    /// Not ready yet. Holds the service's status name.
    Pending(String),
}

/// A keyed datastore.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Create a table keyed by an integer [`LINE_NR`].
    async fn create_table(&self, name: &str) -> Result<(), PipelineError>;

    /// Check whether a table is ready.
    async fn table_state(&self, name: &str) -> Result<TableState, PipelineError>;

    /// Write one record.
    async fn put_item(
        &self,
        table: &str,
        record: &PersistedRecord,
    ) -> Result<(), PipelineError>;

    /// Read one record back.
    async fn get_item(
        &self,
        table: &str,
        line_nr: u64,
    ) -> Result<Option<PersistedRecord>, PipelineError>;
}

/// Writes merged records into a fresh table.
pub struct PersistenceWriter {
    store: Arc<dyn RecordStore>,
    config: TableConfig,
}

impl PersistenceWriter {
    /// Create a new writer.
    pub fn new(store: Arc<dyn RecordStore>, config: TableConfig) -> Self {
        Self { store, config }
    }

    /// A table name no earlier run has used.
    pub fn new_table_name(&self) -> String {
        format!("{}-{}", self.config.name_prefix, Uuid::new_v4())
    }

    /// Create a new table and write every record to it. Returns the table
    /// name.
    #[instrument(level = "debug", skip_all, fields(records = records.len()))]
    pub async fn write(
        &self,
        records: &[PersistedRecord],
        ui: &Ui,
        cancel: &CancellationToken,
    ) -> Result<String, PipelineError> {
        let table = self.new_table_name();
        self.store.create_table(&table).await?;
        info!(%table, "Created table");
        self.wait_for_table(&table, cancel).await?;

        let pb = ui.new_progress_bar(
            &ProgressConfig {
                emoji: "💾",
                msg: "Writing records",
                done_msg: "Wrote records",
            },
            records.len() as u64,
        );
        for record in records {
            self.store.put_item(&table, record).await?;
            trace!(%table, line_nr = record.line_nr, "Wrote record");
            pb.inc(1);
        }
        pb.finish();
        info!(%table, count = records.len(), "Wrote records");
        Ok(table)
    }

    /// Wait for a new table to become active.
    async fn wait_for_table(
        &self,
        table: &str,
        cancel: &CancellationToken,
    ) -> Result<(), PipelineError> {
        let policy = self.config.activation.to_policy();
        let store = &self.store;
        let result = poll_until("table", &policy, cancel, |_| async move {
            match store.table_state(table).await? {
                TableState::Active => Ok(Probe::Ready(())),
                TableState::Pending(status) => Ok(Probe::Pending(status)),
            }
        })
        .await;
        match result {
            Ok(()) => Ok(()),
            Err(PollError::Exhausted {
                attempts,
                last_status,
            }) => Err(PipelineError::Service {
                stage: Stage::Persistence,
                message: format!(
                    "table {table} not active after {attempts} attempts ({last_status})"
                ),
            }),
            Err(PollError::Cancelled { .. }) => Err(PipelineError::Cancelled {
                waiting_for: format!("table {table}"),
            }),
            Err(PollError::Failed(err)) => Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeRecordStore;

    fn record(line_nr: u64, text: &str) -> PersistedRecord {
        PersistedRecord {
            line_nr,
            attributes: BTreeMap::from([("header_text".to_owned(), Some(text.to_owned()))]),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_each_write_creates_a_new_table() {
        let store = Arc::new(FakeRecordStore::default());
        let writer = PersistenceWriter::new(store.clone(), TableConfig::default());
        let ui = Ui::init_for_tests();
        let cancel = CancellationToken::new();

        let records = vec![record(0, "Name John"), record(1, "Phone 555-0100")];
        let first = writer.write(&records, &ui, &cancel).await.unwrap();
        let second = writer.write(&records, &ui, &cancel).await.unwrap();
        assert_ne!(first, second);
        assert!(first.starts_with("form-review-"));

        let stored = store.get_item(&second, 1).await.unwrap().unwrap();
        assert_eq!(stored, records[1]);
        assert_eq!(store.table_names().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_waits_for_table_to_become_active() {
        let store = Arc::new(FakeRecordStore::with_pending_checks(2));
        let writer = PersistenceWriter::new(store.clone(), TableConfig::default());
        let table = writer
            .write(&[record(0, "x")], &Ui::init_for_tests(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(store.state_checks(), 3);
        assert!(store.get_item(&table, 0).await.unwrap().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_table_that_never_activates_is_an_error() {
        let store = Arc::new(FakeRecordStore::with_pending_checks(u32::MAX));
        let config = TableConfig {
            activation: crate::config::PollConfig {
                max_attempts: 3,
                interval_secs: 1,
            },
            ..TableConfig::default()
        };
        let writer = PersistenceWriter::new(store.clone(), config);
        let err = writer
            .write(&[record(0, "x")], &Ui::init_for_tests(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Service { stage: Stage::Persistence, .. }));
        assert_eq!(store.put_count(), 0);
    }
}
