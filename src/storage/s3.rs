//! S3 object storage.

use aws_sdk_s3::primitives::ByteStream;

use crate::{
    aws::AwsContext,
    error::{PipelineError, ServiceResultExt as _, Stage},
    prelude::*,
};

use super::{ObjectStore, S3Uri};

/// Object storage backed by S3.
pub struct S3ObjectStore {
    client: aws_sdk_s3::Client,
}

impl S3ObjectStore {
    /// Create a new S3 store.
    pub fn new(aws: &AwsContext) -> Self {
        Self {
            client: aws_sdk_s3::Client::new(aws.sdk_config()),
        }
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    #[instrument(level = "debug", skip(self, data), fields(len = data.len()))]
    async fn put(
        &self,
        uri: &S3Uri,
        data: Vec<u8>,
        content_type: &str,
    ) -> Result<(), PipelineError> {
        self.client
            .put_object()
            .bucket(&uri.bucket)
            .key(&uri.key)
            .content_type(content_type)
            .body(ByteStream::from(data))
            .send()
            .await
            .for_stage(Stage::Storage)?;
        debug!(%uri, "Stored object");
        Ok(())
    }

    #[instrument(level = "debug", skip(self))]
    async fn get(&self, uri: &S3Uri) -> Result<Vec<u8>, PipelineError> {
        let response = self
            .client
            .get_object()
            .bucket(&uri.bucket)
            .key(&uri.key)
            .send()
            .await
            .for_stage(Stage::Storage)?;
        let bytes = response
            .body
            .collect()
            .await
            .map_err(|err| PipelineError::service(Stage::Storage, err))?;
        Ok(bytes.to_vec())
    }
}
