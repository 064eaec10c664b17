//! Human review: flow definitions, human loops, and the task payload.

use std::fmt;

use schemars::JsonSchema;

use crate::{
    config::{ColumnSpec, ReviewConfig},
    error::PipelineError,
    prelude::*,
    projection::{HeaderRecord, LineItemRecord, RowId},
};

pub mod answer;
pub mod dispatch;
pub mod sagemaker;
pub mod template;

/// Status of a flow definition.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FlowStatus {
    /// Still being created.
    Initializing,
    /// Ready to accept human loops.
    Active,
    /// Creation failed.
    Failed(Option<String>),
    /// Being deleted.
    Deleting,
    /// Anything the service adds later.
    Other(String),
}

impl fmt::Display for FlowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlowStatus::Initializing => write!(f, "Initializing"),
            FlowStatus::Active => write!(f, "Active"),
            FlowStatus::Failed(Some(reason)) => write!(f, "Failed ({reason})"),
            FlowStatus::Failed(None) => write!(f, "Failed"),
            FlowStatus::Deleting => write!(f, "Deleting"),
            FlowStatus::Other(status) => write!(f, "{status}"),
        }
    }
}

/// Status of a human loop.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HumanLoopStatus {
    /// Waiting for, or being worked on by, a reviewer.
    InProgress,
    /// Being stopped.
    Stopping,
    /// A reviewer submitted answers.
    Completed,
    /// Stopped before completion.
    Stopped,
    /// The service gave up.
    Failed,
    /// Anything the service adds later.
    Other(String),
}

impl fmt::Display for HumanLoopStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HumanLoopStatus::InProgress => write!(f, "InProgress"),
            HumanLoopStatus::Stopping => write!(f, "Stopping"),
            HumanLoopStatus::Completed => write!(f, "Completed"),
            HumanLoopStatus::Stopped => write!(f, "Stopped"),
            HumanLoopStatus::Failed => write!(f, "Failed"),
            HumanLoopStatus::Other(status) => write!(f, "{status}"),
        }
    }
}

/// What the service tells us about a human loop.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HumanLoopState {
    /// Current status.
    pub status: HumanLoopStatus,
    /// Where the answers were written, once completed.
    pub output_uri: Option<String>,
    /// Why the loop failed, if it did.
    pub failure_reason: Option<String>,
}

/// A started human loop.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct HumanLoopHandle {
    /// Loop name. This is all we need to resume.
    pub name: String,
    /// Loop ARN, if the service returned one.
    #[serde(default)]
    pub arn: Option<String>,
}

/// Everything needed to create a flow definition.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FlowDefinitionRequest {
    /// Flow definition name.
    pub name: String,
    /// IAM role.
    pub role_arn: String,
    /// Work team.
    pub workforce_arn: String,
    /// Task UI.
    pub task_ui_arn: String,
    /// Workers per task.
    pub task_count: i32,
    /// Title shown to workers.
    pub title: String,
    /// Description shown to workers.
    pub description: String,
    /// `s3://` path for answers.
    pub output_path: String,
}

/// A human-loop service.
#[async_trait]
pub trait HumanReviewService: Send + Sync {
    /// Create a task UI from template markup, returning its ARN.
    async fn create_task_ui(
        &self,
        name: &str,
        template: &str,
    ) -> Result<String, PipelineError>;

    /// Create a flow definition, returning its ARN.
    async fn create_flow_definition(
        &self,
        request: &FlowDefinitionRequest,
    ) -> Result<String, PipelineError>;

    /// Look up a flow definition, returning its ARN and status.
    async fn describe_flow_definition(
        &self,
        name: &str,
    ) -> Result<(String, FlowStatus), PipelineError>;

    /// Start a human loop with JSON input.
    async fn start_human_loop(
        &self,
        name: &str,
        flow_arn: &str,
        input: &str,
    ) -> Result<HumanLoopHandle, PipelineError>;

    /// Look up a human loop.
    async fn describe_human_loop(
        &self,
        name: &str,
    ) -> Result<HumanLoopState, PipelineError>;
}

/// The input content of a human loop.
///
/// The task UI template iterates over exactly these rows, and names each input
/// `<answer_field><row_id>`. Because both the template loops and the answer
/// names are driven by this payload, the template can never disagree with the
/// payload about how many rows there are.
#[derive(Clone, Debug, Deserialize, JsonSchema, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub struct ReviewTask {
    /// Where the reviewer can see the scanned image.
    pub image_uri: String,
    /// Answer field for corrected header text.
    pub header_answer_field: String,
    /// Answer field for header comments.
    pub header_comment_field: String,
    /// Answer field for line item comments.
    pub change_comment_field: String,
    /// Line item columns.
    pub columns: Vec<ReviewColumn>,
    /// Header rows.
    pub header: Vec<ReviewHeaderRow>,
    /// Line item rows.
    pub line_items: Vec<ReviewLineItemRow>,
}

/// A line item column, as shown to the reviewer.
#[derive(Clone, Debug, Deserialize, JsonSchema, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub struct ReviewColumn {
    /// Column name.
    pub name: String,
    /// Answer field, without row suffix.
    pub answer_field: String,
}

/// A header row, as shown to the reviewer.
#[derive(Clone, Debug, Deserialize, JsonSchema, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub struct ReviewHeaderRow {
    /// Row identifier.
    pub row_id: RowId,
    /// Extracted text.
    pub text: String,
}

/// A line item row, as shown to the reviewer.
#[derive(Clone, Debug, Deserialize, JsonSchema, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub struct ReviewLineItemRow {
    /// Row identifier.
    pub row_id: RowId,
    /// One field per column.
    pub fields: Vec<ReviewField>,
}

/// One cell of a line item row.
#[derive(Clone, Debug, Deserialize, JsonSchema, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub struct ReviewField {
    /// Answer field, without row suffix.
    pub answer_field: String,
    /// Extracted value. Empty if the row was short.
    pub original: String,
}

impl ReviewTask {
    /// Build a review task from the projected tables.
    pub fn new(
        image_uri: String,
        review: &ReviewConfig,
        columns: &[ColumnSpec],
        header: &[HeaderRecord],
        line_items: &[LineItemRecord],
    ) -> Self {
        Self {
            image_uri,
            header_answer_field: review.header_answer_field.clone(),
            header_comment_field: review.header_comment_field.clone(),
            change_comment_field: review.change_comment_field.clone(),
            columns: columns
                .iter()
                .map(|column| ReviewColumn {
                    name: column.name.clone(),
                    answer_field: column.answer_field.clone(),
                })
                .collect(),
            header: header
                .iter()
                .map(|record| ReviewHeaderRow {
                    row_id: record.row_id,
                    text: record.original_text.clone(),
                })
                .collect(),
            line_items: line_items
                .iter()
                .map(|record| ReviewLineItemRow {
                    row_id: record.row_id,
                    fields: columns
                        .iter()
                        .enumerate()
                        .map(|(idx, column)| ReviewField {
                            answer_field: column.answer_field.clone(),
                            original: record.cell(idx).unwrap_or_default().to_owned(),
                        })
                        .collect(),
                })
                .collect(),
        }
    }

    /// Every answer key the reviewer can fill in, in display order.
    pub fn answer_keys(&self) -> Vec<String> {
        let mut keys = Vec::new();
        for row in &self.header {
            keys.push(row.row_id.answer_key(&self.header_answer_field));
            keys.push(row.row_id.answer_key(&self.header_comment_field));
        }
        for row in &self.line_items {
            for field in &row.fields {
                keys.push(row.row_id.answer_key(&field.answer_field));
            }
            keys.push(row.row_id.answer_key(&self.change_comment_field));
        }
        keys
    }

    /// Serialize as human loop input content.
    pub fn to_input_content(&self) -> Result<String> {
        serde_json::to_string(self).context("Failed to serialize review task")
    }
}
