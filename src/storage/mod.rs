//! Object storage, used to publish images for reviewers and to read back the
//! reviewers' answers.

use std::{fmt, str::FromStr, sync::LazyLock};

use regex::Regex;

use crate::{error::PipelineError, prelude::*};

pub mod s3;

/// Regex for parsing an `s3://` URI.
static S3_URI_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^s3://(?P<bucket>[^/]+)/(?P<key>.+)$").expect("failed to compile regex")
});

/// A bucket and key.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct S3Uri {
    /// Bucket name.
    pub bucket: String,
    /// Object key.
    pub key: String,
}

impl S3Uri {
    /// Create a new URI.
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }
}

impl fmt::Display for S3Uri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s3://{}/{}", self.bucket, self.key)
    }
}

impl FromStr for S3Uri {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let caps = S3_URI_RE
            .captures(s)
            .ok_or_else(|| anyhow!("Not an s3:// URI: {:?}", s))?;
        Ok(Self::new(&caps["bucket"], &caps["key"]))
    }
}

/// A place to put and get objects.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store an object.
    async fn put(
        &self,
        uri: &S3Uri,
        data: Vec<u8>,
        content_type: &str,
    ) -> Result<(), PipelineError>;

    /// Fetch an object.
    async fn get(&self, uri: &S3Uri) -> Result<Vec<u8>, PipelineError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display() {
        let uri: S3Uri = "s3://forms/form-review/output/2024/01/02/output.json"
            .parse()
            .unwrap();
        assert_eq!(uri.bucket, "forms");
        assert_eq!(uri.key, "form-review/output/2024/01/02/output.json");
        assert_eq!(
            uri.to_string(),
            "s3://forms/form-review/output/2024/01/02/output.json"
        );
    }

    #[test]
    fn test_rejects_non_s3() {
        assert!("https://forms.s3.amazonaws.com/a".parse::<S3Uri>().is_err());
        assert!("s3://bucket-only".parse::<S3Uri>().is_err());
    }
}
