//! 📋 Log Listing Cache: list the bucket once, remember it forever.
//!
//! The first refill walks every page under the prefix. Everyone after that gets
//! the cached keys. New objects that land upstream later are never seen by this
//! reader. That staleness is accepted: the whole point is to not hammer
//! `ListObjects` on every refill.
//!
//! Concurrent first callers share one listing pass (`tokio::sync::OnceCell`).
//! A failed pass leaves the cell empty and the error goes back to the caller.

use std::sync::Arc;

use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::backends::ObjectStore;
use crate::error::{LogTapError, Result};

/// 📋 The set of known log object keys for one bucket/prefix.
#[derive(Debug)]
pub struct ListingCache<S> {
    store: Arc<S>,
    bucket: String,
    prefix: String,
    keys: OnceCell<Vec<String>>,
}

impl<S: ObjectStore> ListingCache<S> {
    pub fn new(store: Arc<S>, bucket: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self {
            store,
            bucket: bucket.into(),
            prefix: prefix.into(),
            keys: OnceCell::new(),
        }
    }

    /// 🚀 The listing, fetched on first call and cached after.
    pub async fn ensure_listed(&self) -> Result<&[String]> {
        let the_keys = self.keys.get_or_try_init(|| self.list_all()).await?;
        Ok(the_keys.as_slice())
    }

    /// ✅ Has a listing pass completed?
    pub fn is_listed(&self) -> bool {
        self.keys.initialized()
    }

    /// 🔄 Walk every page, following continuation tokens until there are none.
    async fn list_all(&self) -> Result<Vec<String>> {
        let mut the_keys = Vec::new();
        let mut the_token: Option<String> = None;
        let mut the_page_count = 0usize;

        loop {
            let the_page = self
                .store
                .list_objects(&self.bucket, &self.prefix, the_token.take())
                .await
                .map_err(|e| LogTapError::Listing {
                    bucket: self.bucket.clone(),
                    prefix: self.prefix.clone(),
                    message: format!("{e:#}"),
                })?;

            the_page_count += 1;
            debug!(
                "📄 listing page {} for s3://{}/{}: {} keys",
                the_page_count,
                self.bucket,
                self.prefix,
                the_page.keys.len()
            );
            the_keys.extend(the_page.keys);

            match the_page.next_token {
                Some(next) => the_token = Some(next),
                None => break,
            }
        }

        info!(
            "📋 listed {} log objects under s3://{}/{} in {} page(s)",
            the_keys.len(),
            self.bucket,
            self.prefix,
            the_page_count
        );
        Ok(the_keys)
    }
}
