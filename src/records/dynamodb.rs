//! DynamoDB record store.

use std::collections::{BTreeMap, HashMap};

use aws_sdk_dynamodb::types::{
    AttributeDefinition, AttributeValue, BillingMode, KeySchemaElement, KeyType,
    ScalarAttributeType, TableStatus,
};

use crate::{
    aws::AwsContext,
    error::{PipelineError, ServiceResultExt as _, Stage},
    prelude::*,
};

use super::{LINE_NR, PersistedRecord, RecordStore, TableState};

/// Record store backed by DynamoDB.
pub struct DynamoDbRecordStore {
    client: aws_sdk_dynamodb::Client,
}

impl DynamoDbRecordStore {
    /// Create a new DynamoDB store.
    pub fn new(aws: &AwsContext) -> Self {
        Self {
            client: aws_sdk_dynamodb::Client::new(aws.sdk_config()),
        }
    }
}

#[async_trait]
impl RecordStore for DynamoDbRecordStore {
    #[instrument(level = "debug", skip(self))]
    async fn create_table(&self, name: &str) -> Result<(), PipelineError> {
        let key = KeySchemaElement::builder()
            .attribute_name(LINE_NR)
            .key_type(KeyType::Hash)
            .build()
            .map_err(|err| PipelineError::service(Stage::Persistence, err))?;
        let attribute = AttributeDefinition::builder()
            .attribute_name(LINE_NR)
            .attribute_type(ScalarAttributeType::N)
            .build()
            .map_err(|err| PipelineError::service(Stage::Persistence, err))?;
        self.client
            .create_table()
            .table_name(name)
            .key_schema(key)
            .attribute_definitions(attribute)
            .billing_mode(BillingMode::PayPerRequest)
            .send()
            .await
            .for_stage(Stage::Persistence)?;
        Ok(())
    }

    #[instrument(level = "trace", skip(self))]
    async fn table_state(&self, name: &str) -> Result<TableState, PipelineError> {
        let output = self
            .client
            .describe_table()
            .table_name(name)
            .send()
            .await
            .for_stage(Stage::Persistence)?;
        let status = output.table().and_then(|table| table.table_status());
        Ok(match status {
            Some(TableStatus::Active) => TableState::Active,
            Some(other) => TableState::Pending(other.as_str().to_owned()),
            None => TableState::Pending("UNKNOWN".to_owned()),
        })
    }

    #[instrument(level = "trace", skip(self, record), fields(line_nr = record.line_nr))]
    async fn put_item(
        &self,
        table: &str,
        record: &PersistedRecord,
    ) -> Result<(), PipelineError> {
        self.client
            .put_item()
            .table_name(table)
            .set_item(Some(to_item(record)))
            .send()
            .await
            .for_stage(Stage::Persistence)?;
        Ok(())
    }

    #[instrument(level = "debug", skip(self))]
    async fn get_item(
        &self,
        table: &str,
        line_nr: u64,
    ) -> Result<Option<PersistedRecord>, PipelineError> {
        let output = self
            .client
            .get_item()
            .table_name(table)
            .key(LINE_NR, AttributeValue::N(line_nr.to_string()))
            .send()
            .await
            .for_stage(Stage::Persistence)?;
        output.item().map(from_item).transpose()
    }
}

/// Convert a record to a DynamoDB item. Nulls become `NULL` attributes, so
/// that every row has the same attribute names.
fn to_item(record: &PersistedRecord) -> HashMap<String, AttributeValue> {
    let mut item = HashMap::with_capacity(record.attributes.len() + 1);
    item.insert(
        LINE_NR.to_owned(),
        AttributeValue::N(record.line_nr.to_string()),
    );
    for (name, value) in &record.attributes {
        let value = match value {
            Some(value) => AttributeValue::S(value.clone()),
            None => AttributeValue::Null(true),
        };
        item.insert(name.clone(), value);
    }
    item
}

/// Convert a DynamoDB item back into a record.
fn from_item(
    item: &HashMap<String, AttributeValue>,
) -> Result<PersistedRecord, PipelineError> {
    let line_nr = match item.get(LINE_NR) {
        Some(AttributeValue::N(n)) => n.parse::<u64>().map_err(|_| {
            PipelineError::projection(format!("invalid {LINE_NR} value {n:?}"))
        })?,
        _ => {
            return Err(PipelineError::projection(format!(
                "item has no numeric {LINE_NR}"
            )));
        }
    };
    let mut attributes = BTreeMap::new();
    for (name, value) in item {
        if name == LINE_NR {
            continue;
        }
        let value = match value {
            AttributeValue::S(s) => Some(s.clone()),
            AttributeValue::Null(_) => None,
            other => {
                return Err(PipelineError::projection(format!(
                    "attribute {name} has unexpected type {other:?}"
                )));
            }
        };
        attributes.insert(name.clone(), value);
    }
    Ok(PersistedRecord {
        line_nr,
        attributes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_conversion() {
        let record = PersistedRecord {
            line_nr: 3,
            attributes: BTreeMap::from([
                ("header_text".to_owned(), Some("Name John".to_owned())),
                ("header_corrected".to_owned(), None),
            ]),
        };
        let item = to_item(&record);
        assert_eq!(item.get(LINE_NR), Some(&AttributeValue::N("3".to_owned())));
        assert_eq!(item.get("header_corrected"), Some(&AttributeValue::Null(true)));
        assert_eq!(from_item(&item).unwrap(), record);
    }

    #[test]
    fn test_item_without_key_rejected() {
        let item = HashMap::from([(
            "header_text".to_owned(),
            AttributeValue::S("x".to_owned()),
        )]);
        assert!(from_item(&item).is_err());
    }
}
