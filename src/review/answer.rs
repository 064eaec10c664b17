//! Parsing the answers a reviewer submitted.

use std::collections::HashMap;

use serde_json::Map;

use crate::{error::PipelineError, prelude::*, projection::RowId};

/// The output document the review service writes when a loop completes.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HumanLoopOutputDocument {
    /// One entry per worker.
    #[serde(default)]
    human_answers: Vec<HumanAnswer>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HumanAnswer {
    #[serde(default)]
    answer_content: Map<String, Value>,
    #[serde(default)]
    worker_id: Option<String>,
}

/// The corrected values a reviewer submitted, keyed by answer field name plus
/// row ID (for example `TrueEmpName2`).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CorrectionAnswer {
    values: HashMap<String, String>,
}

impl CorrectionAnswer {
    /// Build an answer directly from key/value pairs.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            values: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Parse the review service's output document.
    ///
    /// If more than one worker answered, we use the first answer, like the
    /// service's own consoles do.
    pub fn from_output_json(data: &[u8]) -> Result<Self, PipelineError> {
        let doc: HumanLoopOutputDocument = serde_json::from_slice(data).map_err(|err| {
            PipelineError::projection(format!("could not parse review output: {err}"))
        })?;
        let answer_count = doc.human_answers.len();
        let Some(answer) = doc.human_answers.into_iter().next() else {
            return Err(PipelineError::projection(
                "review output contains no human answers",
            ));
        };
        if answer_count > 1 {
            warn!(answer_count, "Multiple reviewers answered; using the first");
        }
        debug!(worker_id = ?answer.worker_id, "Parsed review answer");

        let values = answer
            .answer_content
            .into_iter()
            .filter_map(|(key, value)| {
                let value = match value {
                    Value::Null => return None,
                    Value::String(s) => s,
                    other => other.to_string(),
                };
                Some((key, value))
            })
            .collect();
        Ok(Self { values })
    }

    /// Look up the value for a field and row. Missing or blank answers are
    /// `None`, never an error.
    pub fn get(&self, field: &str, row_id: RowId) -> Option<String> {
        self.values
            .get(&row_id.answer_key(field))
            .filter(|value| !value.trim().is_empty())
            .cloned()
    }

    /// Number of raw answer values.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Did the reviewer submit nothing at all?
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
