//! Document analysis: turning a scanned form into tables and field pairs.

use std::fmt;

use schemars::JsonSchema;

use crate::{error::PipelineError, prelude::*};

pub mod textract;

/// What we ask the analysis service to detect.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AnalysisFeature {
    /// Tables, as rows of cells.
    Tables,
    /// Key/value field pairs.
    Forms,
}

impl AnalysisFeature {
    /// Everything the pipeline needs.
    pub const ALL: &'static [AnalysisFeature] =
        &[AnalysisFeature::Tables, AnalysisFeature::Forms];
}

/// A detected key/value association, like "Name: John".
#[derive(Clone, Debug, Deserialize, JsonSchema, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub struct FieldPair {
    /// The key text, with words joined by single spaces.
    pub key: String,
    /// The value text, with words joined by single spaces.
    pub value: String,
}

impl FieldPair {
    /// Create a new field pair.
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// A detected table. Every row has one entry per detected column, and empty
/// cells are present as empty strings.
#[derive(Clone, Debug, Default, Deserialize, JsonSchema, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub struct DetectedTable {
    /// Rows of cell text, top to bottom, left to right.
    pub rows: Vec<Vec<String>>,
}

impl DetectedTable {
    /// Build a table from string slices. Mostly useful for tests.
    pub fn from_rows<R, C>(rows: R) -> Self
    where
        R: IntoIterator<Item = C>,
        C: IntoIterator,
        C::Item: Into<String>,
    {
        Self {
            rows: rows
                .into_iter()
                .map(|row| row.into_iter().map(Into::into).collect())
                .collect(),
        }
    }
}

/// Everything the analysis service told us about a document.
#[derive(Clone, Debug, Default, Deserialize, JsonSchema, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub struct DocumentAnalysisResult {
    /// Lines of text, in reading order.
    #[serde(default)]
    pub lines: Vec<String>,

    /// Tables, in detection order.
    #[serde(default)]
    pub tables: Vec<DetectedTable>,

    /// Field pairs, in detection order.
    #[serde(default)]
    pub field_pairs: Vec<FieldPair>,
}

/// A remote document analysis service.
#[async_trait]
pub trait DocumentAnalyzer: Send + Sync {
    /// Analyze a single image. This makes at most one remote call.
    async fn analyze(
        &self,
        image: &InputImage,
        features: &[AnalysisFeature],
    ) -> Result<DocumentAnalysisResult, PipelineError>;
}

/// Image formats the analysis service accepts.
const SUPPORTED_MIME_TYPES: &[&str] =
    &["image/png", "image/jpeg", "image/tiff", "application/pdf"];

/// An input image, loaded into memory.
#[derive(Clone)]
pub struct InputImage {
    /// The file name, used when publishing the image.
    pub file_name: String,
    /// The detected MIME type.
    pub mime_type: String,
    /// The raw bytes.
    pub data: Vec<u8>,
}

impl fmt::Debug for InputImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InputImage")
            .field("file_name", &self.file_name)
            .field("mime_type", &self.mime_type)
            .field("len", &self.data.len())
            .finish()
    }
}

impl InputImage {
    /// Load an image from disk.
    #[instrument(level = "debug", skip_all, fields(path = %path.display()))]
    pub async fn load(path: &Path) -> Result<Self> {
        let data = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read image {:?}", path))?;
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "image".to_owned());
        Self::from_bytes(file_name, data)
    }

    /// Wrap raw bytes, checking that they're in a supported format.
    ///
    /// We trust the magic bytes over the file extension, but fall back to the
    /// extension when the bytes are unrecognizable.
    pub fn from_bytes(file_name: String, data: Vec<u8>) -> Result<Self> {
        let mime_type = match infer::get(&data) {
            Some(kind) => kind.mime_type().to_owned(),
            None => mime_guess::from_path(&file_name)
                .first_raw()
                .unwrap_or("application/octet-stream")
                .to_owned(),
        };
        if !SUPPORTED_MIME_TYPES.contains(&mime_type.as_str()) {
            return Err(anyhow!(
                "{file_name:?} is {mime_type}, but document analysis only supports {}",
                SUPPORTED_MIME_TYPES.join(", ")
            ));
        }
        debug!(%file_name, %mime_type, len = data.len(), "Loaded image");
        Ok(Self {
            file_name,
            mime_type,
            data,
        })
    }
}
