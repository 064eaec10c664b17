//! AWS-related code shared by different modules.

use aws_config::{BehaviorVersion, Region};

use crate::prelude::*;

/// Shared AWS configuration. Every service client is built from this.
#[derive(Clone, Debug)]
pub struct AwsContext {
    config: aws_config::SdkConfig,
}

impl AwsContext {
    /// Load the user's AWS configuration using standard conventions,
    /// optionally overriding the region.
    pub async fn load(region: Option<&str>) -> Result<Self> {
        let mut loader = aws_config::defaults(BehaviorVersion::v2025_01_17());
        if let Some(region) = region {
            loader = loader.region(Region::new(region.to_owned()));
        }
        let config = loader.load().await;
        debug!(region = ?config.region(), "Loaded AWS configuration");
        Ok(Self { config })
    }

    /// The underlying SDK configuration.
    pub fn sdk_config(&self) -> &aws_config::SdkConfig {
        &self.config
    }
}
