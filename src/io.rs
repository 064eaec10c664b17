//! I/O utilities.
//!
//! This module is responsible for reading JSON and TOML files, and for the
//! small files we leave in a run directory so that a run can be resumed.

use tokio::{
    fs::{self, File},
    io::{AsyncWrite, AsyncWriteExt as _},
};

use crate::prelude::*;

/// Read TOML or JSON from a file. The format is chosen by file extension, with
/// anything other than `.json` treated as TOML.
pub async fn read_json_or_toml<T>(path: &Path) -> Result<T>
where
    T: serde::de::DeserializeOwned,
{
    let data = fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read file at path: {:?}", path))?;
    let is_json = path.extension().is_some_and(|ext| ext == "json");
    if is_json {
        serde_json::from_str(&data).with_context(|| {
            format!("Failed to parse JSON from file at path: {:?}", path)
        })
    } else {
        toml::from_str(&data).with_context(|| {
            format!("Failed to parse TOML from file at path: {:?}", path)
        })
    }
}

/// Create an [`AsyncWrite`] for a file or stdout.
pub async fn create_writer(
    path: Option<&Path>,
) -> Result<Box<dyn AsyncWrite + Unpin + Send + Sync + 'static>> {
    match path {
        Some(path) => {
            let file = File::create(path)
                .await
                .with_context(|| format!("Failed to create file at path: {:?}", path))?;
            Ok(Box::new(file))
        }
        None => Ok(Box::new(tokio::io::stdout())),
    }
}

/// Write a string to a file or stdout.
pub async fn write_text(path: Option<&Path>, text: &str) -> Result<()> {
    let mut wtr = create_writer(path).await?;
    wtr.write_all(text.as_bytes())
        .await
        .context("Failed to write output")?;
    wtr.flush().await.context("Failed to flush output")?;
    Ok(())
}

/// Write pretty-printed JSON to a file or stdout.
pub async fn write_json<T: Serialize>(path: Option<&Path>, value: &T) -> Result<()> {
    let mut json =
        serde_json::to_string_pretty(value).context("Failed to serialize JSON")?;
    json.push('\n');
    write_text(path, &json).await
}

/// A directory holding the intermediate files of one pipeline run.
#[derive(Clone, Debug)]
pub struct RunDir {
    root: PathBuf,
}

impl RunDir {
    /// The raw analysis result.
    pub const ANALYSIS: &'static str = "analysis.json";
    /// The header table, as CSV.
    pub const HEADER_CSV: &'static str = "header.csv";
    /// The line-item table, as CSV.
    pub const LINE_ITEMS_CSV: &'static str = "line_items.csv";
    /// Information about the dispatched review.
    pub const RUN_INFO: &'static str = "run.json";

    /// Open (and create, if necessary) a run directory.
    pub async fn create(root: &Path) -> Result<Self> {
        fs::create_dir_all(root)
            .await
            .with_context(|| format!("Failed to create run directory {:?}", root))?;
        Ok(Self {
            root: root.to_owned(),
        })
    }

    /// Open an existing run directory.
    pub fn open(root: &Path) -> Result<Self> {
        if !root.is_dir() {
            return Err(anyhow!("Run directory {:?} does not exist", root));
        }
        Ok(Self {
            root: root.to_owned(),
        })
    }

    /// Path of a file inside this run directory.
    pub fn path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    /// Write a text file into the run directory.
    pub async fn write(&self, name: &str, text: &str) -> Result<()> {
        let path = self.path(name);
        debug!(path = %path.display(), "Writing run file");
        write_text(Some(&path), text).await
    }

    /// Read a text file from the run directory.
    pub async fn read(&self, name: &str) -> Result<String> {
        let path = self.path(name);
        fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read {:?}", path))
    }

    /// Write a JSON file into the run directory.
    pub async fn write_json<T: Serialize>(&self, name: &str, value: &T) -> Result<()> {
        write_json(Some(&self.path(name)), value).await
    }

    /// Read a JSON file from the run directory.
    pub async fn read_json<T: serde::de::DeserializeOwned>(&self, name: &str) -> Result<T> {
        read_json_or_toml(&self.path(name)).await
    }
}
