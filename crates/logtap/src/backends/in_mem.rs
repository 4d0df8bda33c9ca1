//! # Previously, on Logtap...
//!
//! 🎬 The bucket was far away. Across an ocean of TLS handshakes and IAM
//! policies. The test suite could not reach it, and frankly should not try.
//! Someone had to pretend to be S3. Someone had to be a BTreeMap in a trench coat.
//!
//! That someone was this module.
//!
//! [`InMemoryStore`] implements [`ObjectStore`] over a sorted map of
//! key → bytes. It paginates (so the listing cache actually follows tokens),
//! counts every call (so tests can prove "listed once", "fetched once"), can
//! hold fetches hostage behind a semaphore (so tests can freeze a refill
//! mid-flight), and can be told to fail its listing on purpose.
//!
//! ⚠️ This is NOT for production. This is for tests and local dry runs.
//! The bucket name is accepted and ignored. One map, every bucket. Vibes.

use std::collections::BTreeMap;
use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use flate2::Compression;
use flate2::write::GzEncoder;
use tokio::sync::{RwLock, Semaphore};

use crate::backends::{ListPage, ObjectStore};

/// 📦 A store that lives entirely in RAM, gone the moment you blink.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    /// 🗂️ key → raw (still compressed) bytes. BTreeMap so listings come out sorted, like S3's do.
    objects: RwLock<BTreeMap<String, Vec<u8>>>,
    /// 📄 keys per listing page. 0 = everything in one page.
    page_size: usize,
    /// 🔢 how many times `list_objects` was called (one per page)
    list_calls: AtomicUsize,
    /// 🔢 how many times `get_object` was called
    fetch_calls: AtomicUsize,
    /// 🚧 when set, every fetch waits for one permit. Tests hand out permits to release it.
    fetch_gate: Option<Arc<Semaphore>>,
    /// 💀 when set, listing fails with this message
    listing_failure: Option<String>,
}

impl InMemoryStore {
    /// 🚀 An empty store. Lists nothing, fetches nothing, judges nothing.
    pub fn new() -> Self {
        Self::default()
    }

    /// 📥 Add an object with raw bytes, builder style.
    pub fn with_object(mut self, key: impl Into<String>, bytes: Vec<u8>) -> Self {
        self.objects.get_mut().insert(key.into(), bytes);
        self
    }

    /// 🫁 Add an object whose body is `text`, gzipped on the way in.
    pub fn with_gzipped_log(self, key: impl Into<String>, text: &str) -> Result<Self> {
        let the_bytes = gzip_bytes(text.as_bytes())?;
        Ok(self.with_object(key, the_bytes))
    }

    /// 📄 Paginate listings at `page_size` keys per page.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    /// 🚧 Park every fetch behind `gate` until a permit shows up.
    pub fn with_fetch_gate(mut self, gate: Arc<Semaphore>) -> Self {
        self.fetch_gate = Some(gate);
        self
    }

    /// 💀 Make every listing call fail with `message`.
    pub fn with_listing_failure(mut self, message: impl Into<String>) -> Self {
        self.listing_failure = Some(message.into());
        self
    }

    /// 📥 Insert an object after construction. Visible to fetches immediately,
    /// but a listing that already completed will never notice. That's the deal.
    pub async fn insert_object(&self, key: impl Into<String>, bytes: Vec<u8>) {
        self.objects.write().await.insert(key.into(), bytes);
    }

    /// 🗑️ Pull an object out from under a completed listing. Next fetch of it fails.
    pub async fn remove_object(&self, key: &str) -> Option<Vec<u8>> {
        self.objects.write().await.remove(key)
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ObjectStore for InMemoryStore {
    /// 📋 Keys under `prefix`, in key order, `page_size` at a time.
    /// The continuation token is the last key of the previous page (start-after semantics).
    async fn list_objects(
        &self,
        _bucket: &str,
        prefix: &str,
        continuation: Option<String>,
    ) -> Result<ListPage> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(the_reason) = &self.listing_failure {
            return Err(anyhow!("{the_reason}"));
        }

        let the_objects = self.objects.read().await;
        let the_matching_keys = the_objects
            .keys()
            .filter(|key| key.starts_with(prefix))
            .filter(|key| match &continuation {
                Some(after) => key.as_str() > after.as_str(),
                None => true,
            });

        let keys: Vec<String> = if self.page_size == 0 {
            the_matching_keys.cloned().collect()
        } else {
            the_matching_keys.take(self.page_size).cloned().collect()
        };

        // 🔎 is there anything past the last key on this page?
        let next_token = match keys.last() {
            Some(last) if self.page_size > 0 => {
                let is_truncated = the_objects
                    .keys()
                    .any(|key| key.starts_with(prefix) && key.as_str() > last.as_str());
                is_truncated.then(|| last.clone())
            }
            _ => None,
        };

        Ok(ListPage { keys, next_token })
    }

    async fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.fetch_gate {
            // 🚧 wait for the test to wave us through
            gate.acquire()
                .await
                .context("💀 fetch gate closed while a fetch was parked")?
                .forget();
        }

        self.objects
            .read()
            .await
            .get(key)
            .cloned()
            .ok_or_else(|| anyhow!("NoSuchKey: s3://{bucket}/{key} is not in the in-memory store"))
    }
}

/// 🫁 Gzip `data` into a fresh buffer. The inverse of what the parser does.
pub fn gzip_bytes(data: &[u8]) -> Result<Vec<u8>> {
    let mut the_encoder = GzEncoder::new(Vec::new(), Compression::default());
    the_encoder
        .write_all(data)
        .context("💀 gzip encoder refused the bytes")?;
    the_encoder
        .finish()
        .context("💀 gzip encoder could not finish. It had so much left to say.")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn the_usual_suspects() -> InMemoryStore {
        InMemoryStore::new()
            .with_object("logs/a.gz", b"a".to_vec())
            .with_object("logs/b.gz", b"b".to_vec())
            .with_object("logs/c.gz", b"c".to_vec())
            .with_object("other/d.gz", b"d".to_vec())
    }

    #[tokio::test]
    async fn the_one_where_listing_respects_the_prefix() {
        let the_store = the_usual_suspects();
        let the_page = the_store
            .list_objects("bucket", "logs/", None)
            .await
            .expect("💀 in-memory listing should not fail");

        assert_eq!(the_page.keys, vec!["logs/a.gz", "logs/b.gz", "logs/c.gz"]);
        assert_eq!(the_page.next_token, None);
        assert_eq!(the_store.list_calls(), 1);
    }

    #[tokio::test]
    async fn the_one_where_pages_hand_off_the_baton() {
        let the_store = the_usual_suspects().with_page_size(2);

        let the_first = the_store
            .list_objects("bucket", "logs/", None)
            .await
            .expect("💀 first page");
        assert_eq!(the_first.keys, vec!["logs/a.gz", "logs/b.gz"]);
        assert_eq!(the_first.next_token.as_deref(), Some("logs/b.gz"));

        let the_second = the_store
            .list_objects("bucket", "logs/", the_first.next_token)
            .await
            .expect("💀 second page");
        assert_eq!(the_second.keys, vec!["logs/c.gz"]);
        assert_eq!(the_second.next_token, None);
    }

    #[tokio::test]
    async fn the_one_where_exact_page_boundaries_do_not_leave_a_dangling_token() {
        let the_store = InMemoryStore::new()
            .with_object("k1", vec![])
            .with_object("k2", vec![])
            .with_page_size(2);

        let the_page = the_store
            .list_objects("bucket", "", None)
            .await
            .expect("💀 listing");
        assert_eq!(the_page.keys.len(), 2);
        assert_eq!(the_page.next_token, None);
    }

    #[tokio::test]
    async fn the_one_where_missing_keys_are_an_error_not_a_shrug() {
        let the_store = the_usual_suspects();
        let the_result = the_store.get_object("bucket", "logs/zzz.gz").await;
        assert!(the_result.is_err());
        assert_eq!(the_store.fetch_calls(), 1);
    }

    #[tokio::test]
    async fn the_one_where_listing_failure_is_on_purpose() {
        let the_store = InMemoryStore::new().with_listing_failure("AccessDenied");
        let the_error = the_store
            .list_objects("bucket", "", None)
            .await
            .expect_err("listing should fail when told to");
        assert!(the_error.to_string().contains("AccessDenied"));
    }
}
