//! 🔌 Backends: where the real I/O happens.
//!
//! 🪣 An object store does exactly two things for us: it lists keys under a
//! prefix, one page at a time, and it hands over the raw bytes of one key.
//! Decompression is NOT its job. The parser owns gunzip.
//!
//! 🎭 This module is the casting agency. Real S3? `S3Store`. A BTreeMap
//! pretending to be S3 for the test suite? `InMemoryStore`. The reader is
//! generic over [`ObjectStore`] and does not care which one showed up.
//!
//! 🦆 The duck is here because every file must have one. This is law.

use anyhow::Result;
use async_trait::async_trait;

pub mod in_mem;
pub mod s3;

pub use in_mem::InMemoryStore;
pub use s3::{S3Store, S3StoreConfig};

/// 📄 One page of a listing: the keys on this page plus the token for the next one.
///
/// `next_token == None` means the store has nothing further. The listing is complete.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListPage {
    pub keys: Vec<String>,
    pub next_token: Option<String>,
}

/// 🪣 The store contract the sampler consumes.
///
/// # Contract
/// - `list_objects` returns one page. Callers follow `next_token` until it is `None`.
/// - `get_object` returns the object's bytes exactly as stored (still gzipped).
/// - Errors are `anyhow` so backends can pile on `.context(...)`. The scheduler
///   decides which typed, fatal error they become.
#[async_trait]
pub trait ObjectStore: std::fmt::Debug + Send + Sync {
    /// 📋 List one page of keys under `prefix` in `bucket`.
    async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
        continuation: Option<String>,
    ) -> Result<ListPage>;

    /// 📡 Fetch one object's raw bytes.
    async fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>>;
}
