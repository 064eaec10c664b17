//! Pipeline configuration.
//!
//! Everything that used to be an inline constant (bucket names, workforce
//! ARNs, column names) lives here, and is passed explicitly to each stage.

use std::{collections::HashSet, time::Duration};

use schemars::JsonSchema;

use crate::{
    io::read_json_or_toml,
    merge::{FIXED_ATTRIBUTES, corrected_attribute},
    poll::PollPolicy,
    prelude::*,
    projection::TableSelection,
};

/// Top-level configuration file.
#[derive(Clone, Debug, Default, Deserialize, JsonSchema, Serialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub struct Config {
    /// AWS region to use. Defaults to the standard AWS configuration chain.
    #[serde(default)]
    pub region: Option<String>,

    /// Where we publish images and read review output.
    pub storage: StorageConfig,

    /// Human review settings.
    pub review: ReviewConfig,

    /// How to turn the detected table into line items.
    #[serde(default)]
    pub line_items: LineItemsConfig,

    /// Where merged records are persisted.
    #[serde(default)]
    pub table: TableConfig,
}

impl Config {
    /// Load a config file in either TOML or JSON format.
    pub async fn load(path: &Path) -> Result<Self> {
        let config = read_json_or_toml::<Config>(path).await?;
        config
            .validate()
            .with_context(|| format!("Invalid config in {}", path.display()))?;
        Ok(config)
    }

    /// Check the invariants serde can't check for us.
    pub fn validate(&self) -> Result<()> {
        if self.storage.bucket.is_empty() {
            return Err(anyhow!("storage.bucket must not be empty"));
        }
        if self.line_items.columns.is_empty() {
            return Err(anyhow!("line_items.columns must not be empty"));
        }
        self.validate_column_keys()?;
        let mut seen = HashSet::new();
        for column in &self.line_items.columns {
            if !seen.insert(column.answer_field.as_str()) {
                return Err(anyhow!(
                    "duplicate answer_field {:?} in line_items.columns",
                    column.answer_field
                ));
            }
        }
        let reserved = [
            &self.review.header_answer_field,
            &self.review.header_comment_field,
            &self.review.change_comment_field,
        ];
        if let Some(clash) = reserved.iter().find(|f| seen.contains(f.as_str())) {
            return Err(anyhow!(
                "answer field {clash:?} is used by both a column and a review field"
            ));
        }
        if self.review.task_count < 1 {
            return Err(anyhow!("review.task_count must be at least 1"));
        }
        Ok(())
    }

    /// Every column becomes two persisted attributes, `<key>` and
    /// `<key>_corrected`. None of these may collide with each other or with
    /// the attributes every row gets.
    fn validate_column_keys(&self) -> Result<()> {
        let mut attributes = FIXED_ATTRIBUTES
            .iter()
            .map(|name| (*name).to_owned())
            .collect::<HashSet<_>>();
        for column in &self.line_items.columns {
            if column.key.trim().is_empty() {
                return Err(anyhow!(
                    "column {:?} in line_items.columns has an empty key",
                    column.name
                ));
            }
            for attribute in [column.key.clone(), corrected_attribute(&column.key)] {
                if !attributes.insert(attribute.clone()) {
                    return Err(anyhow!(
                        "column key {:?} in line_items.columns would write attribute \
                         {attribute:?}, which is already used",
                        column.key
                    ));
                }
            }
        }
        Ok(())
    }
}

/// S3 locations.
#[derive(Clone, Debug, Default, Deserialize, JsonSchema, Serialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub struct StorageConfig {
    /// Bucket for both input images and review output.
    pub bucket: String,

    /// Key prefix for published images.
    #[serde(default = "default_input_prefix")]
    pub input_prefix: String,

    /// Key prefix the flow definition writes review output under.
    #[serde(default = "default_output_prefix")]
    pub output_prefix: String,
}

fn default_input_prefix() -> String {
    "form-review/input/".to_owned()
}

fn default_output_prefix() -> String {
    "form-review/output/".to_owned()
}

impl StorageConfig {
    /// The `s3://` path the flow definition writes output to.
    pub fn output_path(&self) -> String {
        format!(
            "s3://{}/{}",
            self.bucket,
            self.output_prefix.trim_end_matches('/')
        )
    }
}

/// Human review settings.
#[derive(Clone, Debug, Deserialize, JsonSchema, Serialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub struct ReviewConfig {
    /// The private workforce (work team) ARN.
    pub workforce_arn: String,

    /// IAM role the flow definition runs as.
    pub role_arn: String,

    /// Name of the flow definition.
    #[serde(default = "default_flow_definition_name")]
    pub flow_definition_name: String,

    /// Name of the human task UI.
    #[serde(default = "default_task_ui_name")]
    pub task_ui_name: String,

    /// Title shown to workers.
    #[serde(default = "default_task_title")]
    pub task_title: String,

    /// Description shown to workers.
    #[serde(default = "default_task_description")]
    pub task_description: String,

    /// How many workers review each task.
    #[serde(default = "default_task_count")]
    pub task_count: i32,

    /// Prefix for generated human loop names.
    #[serde(default = "default_human_loop_prefix")]
    pub human_loop_prefix: String,

    /// Answer field holding corrected header text.
    #[serde(default = "default_header_answer_field")]
    pub header_answer_field: String,

    /// Answer field holding the reviewer's comment on a header row.
    #[serde(default = "default_header_comment_field")]
    pub header_comment_field: String,

    /// Answer field holding the reviewer's comment on a line item.
    #[serde(default = "default_change_comment_field")]
    pub change_comment_field: String,

    /// How long to wait for a new flow definition to become active.
    #[serde(default = "default_flow_activation")]
    pub flow_activation: PollConfig,

    /// How long to wait for a reviewer.
    #[serde(default = "default_completion")]
    pub completion: PollConfig,
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            workforce_arn: String::new(),
            role_arn: String::new(),
            flow_definition_name: default_flow_definition_name(),
            task_ui_name: default_task_ui_name(),
            task_title: default_task_title(),
            task_description: default_task_description(),
            task_count: default_task_count(),
            human_loop_prefix: default_human_loop_prefix(),
            header_answer_field: default_header_answer_field(),
            header_comment_field: default_header_comment_field(),
            change_comment_field: default_change_comment_field(),
            flow_activation: default_flow_activation(),
            completion: default_completion(),
        }
    }
}

fn default_flow_definition_name() -> String {
    "form-review".to_owned()
}

fn default_task_ui_name() -> String {
    "form-review-ui".to_owned()
}

fn default_task_title() -> String {
    "Review the extracted form fields and table rows".to_owned()
}

fn default_task_description() -> String {
    "Compare each extracted value with the scanned image and correct any mistakes"
        .to_owned()
}

fn default_task_count() -> i32 {
    1
}

fn default_human_loop_prefix() -> String {
    "form-review".to_owned()
}

fn default_header_answer_field() -> String {
    "TrueHeaderText".to_owned()
}

fn default_header_comment_field() -> String {
    "HeaderComment".to_owned()
}

fn default_change_comment_field() -> String {
    "ChangeComment".to_owned()
}

fn default_flow_activation() -> PollConfig {
    PollConfig {
        max_attempts: 60,
        interval_secs: 2,
    }
}

fn default_completion() -> PollConfig {
    PollConfig {
        max_attempts: 120,
        interval_secs: 30,
    }
}

/// Bounded, fixed-interval polling.
#[derive(Clone, Copy, Debug, Deserialize, JsonSchema, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub struct PollConfig {
    /// Maximum number of status checks.
    pub max_attempts: u32,

    /// Seconds to sleep between status checks.
    pub interval_secs: u64,
}

impl PollConfig {
    /// Convert to a [`PollPolicy`].
    pub fn to_policy(self) -> PollPolicy {
        PollPolicy::new(self.max_attempts, Duration::from_secs(self.interval_secs))
    }
}

/// How we turn the detected table into line items.
#[derive(Clone, Debug, Deserialize, JsonSchema, Serialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub struct LineItemsConfig {
    /// Which detected table to use.
    #[serde(default)]
    pub table_selection: TableSelection,

    /// Accept rows whose cell count doesn't match `columns`. Missing cells are
    /// treated as null.
    #[serde(default)]
    pub allow_ragged_rows: bool,

    /// Skip the table's first row if it just repeats the column names.
    #[serde(default = "default_true")]
    pub skip_header_row: bool,

    /// The columns we expect, in order.
    #[serde(default = "default_columns")]
    pub columns: Vec<ColumnSpec>,
}

impl Default for LineItemsConfig {
    fn default() -> Self {
        Self {
            table_selection: TableSelection::default(),
            allow_ragged_rows: false,
            skip_header_row: true,
            columns: default_columns(),
        }
    }
}

fn default_true() -> bool {
    true
}

/// A single reviewed column.
#[derive(Clone, Debug, Deserialize, JsonSchema, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub struct ColumnSpec {
    /// Human-readable column name. Used as the CSV header.
    pub name: String,

    /// Attribute name used when persisting.
    pub key: String,

    /// Answer field name, without the row suffix.
    pub answer_field: String,
}

impl ColumnSpec {
    /// Create a new column.
    pub fn new(name: &str, key: &str, answer_field: &str) -> Self {
        Self {
            name: name.to_owned(),
            key: key.to_owned(),
            answer_field: answer_field.to_owned(),
        }
    }
}

fn default_columns() -> Vec<ColumnSpec> {
    vec![
        ColumnSpec::new("Start Date", "start_date", "TrueStartDate"),
        ColumnSpec::new("End Date", "end_date", "TrueEndDate"),
        ColumnSpec::new("Employer Name", "employer_name", "TrueEmpName"),
        ColumnSpec::new("Position Held", "position_held", "TruePosition"),
        ColumnSpec::new(
            "Reason for Leaving",
            "reason_for_leaving",
            "TrueReasonForLeaving",
        ),
    ]
}

/// Where merged records go.
#[derive(Clone, Debug, Deserialize, JsonSchema, Serialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub struct TableConfig {
    /// Prefix for generated table names. Each run creates a new table.
    #[serde(default = "default_table_prefix")]
    pub name_prefix: String,

    /// How long to wait for a new table to become active.
    #[serde(default = "default_table_activation")]
    pub activation: PollConfig,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            name_prefix: default_table_prefix(),
            activation: default_table_activation(),
        }
    }
}

fn default_table_prefix() -> String {
    "form-review".to_owned()
}

fn default_table_activation() -> PollConfig {
    PollConfig {
        max_attempts: 30,
        interval_secs: 2,
    }
}
