// ai
//! 🪣📡 S3 Store: the real bucket, the real network, the real latency.
//!
//! COLD OPEN. EXT. us-east-1, 3:47 AM
//!
//! Somewhere, a CDN has been writing gzipped access logs into a bucket for
//! three years. Nobody has read them. Nobody was going to. Then a load tester
//! asked "what do real users actually request?" and the bucket sighed.
//!
//! This module implements [`ObjectStore`] on top of the AWS SDK:
//! - `list_objects` → `ListObjectsV2`, one page per call, continuation token passed through
//! - `get_object` → `GetObject`, body collected into memory (log objects are small-ish)
//!
//! 🧠 Knowledge graph:
//! - `S3StoreConfig`: region, optional endpoint override (LocalStack, MinIO, wiremock), path style
//! - Credentials come from the usual chain: env vars → ~/.aws/config → IAM role → hope
//! - No retries added here beyond the SDK's own defaults. Fatal-or-not is the scheduler's call.

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::error::DisplayErrorContext;
use serde::Deserialize;
use tracing::trace;

use crate::backends::{ListPage, ObjectStore};

/// 🔧 Where the bucket lives and how to talk to it.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct S3StoreConfig {
    /// 🌎 AWS region: defaults to "us-east-1" because that's where data goes to retire
    #[serde(default = "default_s3_region")]
    pub region: String,
    /// 🔀 Optional endpoint override, for S3-compatible stores and local testing
    #[serde(default)]
    pub endpoint_url: Option<String>,
    /// 🛣️ `http://host/bucket/key` instead of `http://bucket.host/key`. MinIO says hi.
    #[serde(default)]
    pub force_path_style: bool,
}

impl Default for S3StoreConfig {
    fn default() -> Self {
        Self {
            region: default_s3_region(),
            endpoint_url: None,
            force_path_style: false,
        }
    }
}

/// 🌎 us-east-1. The Florida of AWS regions. Everyone ends up there eventually.
fn default_s3_region() -> String {
    "us-east-1".to_string()
}

/// 🪣 The production store. One SDK client, cloned cheaply, shared by every refill.
#[derive(Debug, Clone)]
pub struct S3Store {
    client: aws_sdk_s3::Client,
}

impl S3Store {
    /// 🚀 Build the SDK client from the environment plus our config overrides.
    ///
    /// Nothing is contacted here. The first sign of bad credentials is the first
    /// listing call, which the reader turns into a fatal `Listing` error.
    pub async fn new(config: &S3StoreConfig) -> Self {
        let the_aws_config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .load()
            .await;

        let mut the_builder = aws_sdk_s3::config::Builder::from(&the_aws_config)
            .force_path_style(config.force_path_style);
        if let Some(the_endpoint) = &config.endpoint_url {
            the_builder = the_builder.endpoint_url(the_endpoint);
        }

        Self::from_client(aws_sdk_s3::Client::from_conf(the_builder.build()))
    }

    /// 🔌 Wrap an already-configured client. Tests point one at a mock server.
    pub fn from_client(client: aws_sdk_s3::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
        continuation: Option<String>,
    ) -> Result<ListPage> {
        let mut the_request = self.client.list_objects_v2().bucket(bucket).prefix(prefix);
        if let Some(the_token) = continuation {
            the_request = the_request.continuation_token(the_token);
        }

        let the_response = the_request
            .send()
            .await
            .map_err(|e| anyhow!("{}", DisplayErrorContext(&e)))
            .with_context(|| {
                format!(
                    "💀 ListObjectsV2 failed for s3://{bucket}/{prefix}. \
                     Check: bucket name, region, credentials, s3:ListBucket permission."
                )
            })?;

        let keys: Vec<String> = the_response
            .contents()
            .iter()
            .filter_map(|object| object.key())
            .map(str::to_string)
            .collect();

        // 🔎 S3 may hand back a token on the last page too. Only truncation means "more".
        let next_token = if the_response.is_truncated().unwrap_or(false) {
            the_response.next_continuation_token().map(str::to_string)
        } else {
            None
        };

        trace!(
            "📋 listed {} keys from s3://{}/{} (more pages: {})",
            keys.len(),
            bucket,
            prefix,
            next_token.is_some()
        );
        Ok(ListPage { keys, next_token })
    }

    async fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>> {
        let the_response = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| anyhow!("{}", DisplayErrorContext(&e)))
            .with_context(|| {
                format!(
                    "💀 GetObject failed for s3://{bucket}/{key}. \
                     Check: IAM permissions, bucket policy, KMS key access."
                )
            })?;

        let the_body = the_response
            .body
            .collect()
            .await
            .with_context(|| format!("💀 body of s3://{bucket}/{key} stopped streaming halfway"))?;

        let the_bytes = the_body.into_bytes().to_vec();
        trace!("🪣 hauled {} bytes from s3://{}/{}", the_bytes.len(), bucket, key);
        Ok(the_bytes)
    }
}
