//! 🎬 *[a queue runs low. somewhere, a bucket waits.]*
//!
//! 🔄 The Fetch Scheduler: one refill at a time, no exceptions, no encores.
//!
//! A refill cycle, start to finish:
//! 1. make sure the listing exists (first cycle lists, everyone after reuses it)
//! 2. empty listing? clear the flag, ring the bell, go home. Not an error.
//! 3. pick one key uniformly at random
//! 4. fetch it (retries only if configured)
//! 5. gunzip + parse on a blocking thread, with the configured pattern
//! 6. append every path, in order
//! 7. clear the in-flight flag
//! 8. ring the bell so parked readers wake up
//!
//! 🔒 The in-flight flag is an `AtomicBool` flipped with compare-and-swap.
//! Any number of readers can call `maybe_refill` at once; exactly one wins.
//!
//! 💀 Failure is fatal. Listing, fetch, decompression: the first error is latched,
//! every reader is woken to hear about it, and the flag is left set so nothing
//! ever refills again. A corrupt object is NOT retried with a different sample.
//! A store call that panics counts as a fetch failure.
//! A hung store call hangs the cycle forever. There is no timeout. Known gap.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use futures::FutureExt;
use rand::Rng;
use regex::Regex;
use tokio::task::JoinHandle;
use tracing::{debug, error};

use crate::app_config::SamplerConfig;
use crate::backends::ObjectStore;
use crate::error::{LogTapError, Result};
use crate::listing::ListingCache;
use crate::parser::{LineFormat, ParseOutcome, parse_log};
use crate::queue::PathQueue;
use crate::retry::{RetryConfig, with_retry};
use crate::stats::SamplerStats;

/// 🔄 Owns the refill path: listing, sampling, fetching, parsing, appending.
#[derive(Debug)]
pub struct FetchScheduler<S> {
    store: Arc<S>,
    listing: ListingCache<S>,
    queue: Arc<PathQueue>,
    stats: Arc<SamplerStats>,
    bucket: String,
    pattern: Option<Regex>,
    format: LineFormat,
    retry: RetryConfig,
    in_flight: AtomicBool,
    fatal: OnceLock<Arc<LogTapError>>,
}

impl<S: ObjectStore + 'static> FetchScheduler<S> {
    /// 🏗️ Wire a scheduler to its store and queue. Fails only on a bad pattern.
    pub fn new(
        config: &SamplerConfig,
        store: Arc<S>,
        queue: Arc<PathQueue>,
        stats: Arc<SamplerStats>,
    ) -> Result<Self> {
        let pattern = config
            .pattern
            .as_deref()
            .map(|the_pattern| {
                Regex::new(the_pattern).map_err(|e| LogTapError::Pattern {
                    pattern: the_pattern.to_string(),
                    message: e.to_string(),
                })
            })
            .transpose()?;

        Ok(Self {
            listing: ListingCache::new(Arc::clone(&store), config.bucket.clone(), config.prefix.clone()),
            store,
            queue,
            stats,
            bucket: config.bucket.clone(),
            pattern,
            format: config.format,
            retry: config.retry.clone(),
            in_flight: AtomicBool::new(false),
            fatal: OnceLock::new(),
        })
    }

    /// 🚦 Start a refill cycle in the background, unless one is already running
    /// (or a previous one died). The handle resolves when the cycle is over.
    pub fn maybe_refill(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        if self.fatal.get().is_some() {
            return None;
        }
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return None;
        }

        let the_scheduler = Arc::clone(self);
        Some(tokio::spawn(async move {
            the_scheduler.run_refill_cycle().await;
        }))
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// 💀 The latched failure, ready to hand to a reader. `None` while healthy.
    pub fn fatal_error(&self) -> Option<LogTapError> {
        self.fatal.get().map(LogTapError::replay)
    }

    pub fn listing(&self) -> &ListingCache<S> {
        &self.listing
    }

    /// 🔄 One cycle, flag handling included. Only ever entered by the CAS winner.
    /// A panic anywhere in the cycle (a store future included) is latched like any
    /// other fetch failure, so parked readers hear about it.
    async fn run_refill_cycle(&self) {
        let the_outcome = AssertUnwindSafe(self.refill_once())
            .catch_unwind()
            .await
            .unwrap_or_else(|the_panic| {
                Err(LogTapError::Fetch {
                    bucket: self.bucket.clone(),
                    key: "<refill cycle>".to_string(),
                    message: format!("refill cycle panicked: {}", panic_message(the_panic.as_ref())),
                })
            });

        match the_outcome {
            Ok(the_appended) => {
                self.in_flight.store(false, Ordering::Release);
                debug!("✅ refill cycle done: {} paths queued, {} total", the_appended, self.queue.size());
            }
            Err(the_error) => {
                error!("💀 refill cycle failed, sampler halted for good: {}", the_error);
                // -- first failure wins; the flag stays set so nobody refills again
                let _ = self.fatal.set(Arc::new(the_error));
            }
        }
        self.queue.wake_all();
    }

    /// 🎲 List (once), sample, fetch, parse, append. Returns how many paths were appended.
    async fn refill_once(&self) -> Result<usize> {
        let the_keys = self.listing.ensure_listed().await?;
        if the_keys.is_empty() {
            debug!("🫥 listing for s3://{} is empty, nothing to sample this cycle", self.bucket);
            self.stats.record_empty_cycle();
            return Ok(0);
        }

        let the_index = rand::rng().random_range(0..the_keys.len());
        let the_key = the_keys[the_index].clone();
        debug!("🎲 sampled {} of {}: {}", the_index, the_keys.len(), the_key);

        let the_raw = self.fetch(&the_key).await?;
        self.stats.record_fetch(the_raw.len());

        let the_outcome = self.parse(the_key, the_raw).await?;
        let the_count = the_outcome.paths.len();
        self.stats
            .record_parse(the_outcome.lines_seen, the_outcome.lines_dropped, the_count);
        self.queue.append(the_outcome.paths);
        Ok(the_count)
    }

    async fn fetch(&self, key: &str) -> Result<Vec<u8>> {
        let the_store: &S = &self.store;
        let the_bucket: &str = &self.bucket;
        with_retry(&self.retry, "get_object", move || the_store.get_object(the_bucket, key))
            .await
            .map_err(|e| LogTapError::Fetch {
                bucket: self.bucket.clone(),
                key: key.to_string(),
                message: format!("{e:#}"),
            })
    }

    /// 🫁 Gunzip + parse off the async workers. Pure function, owned inputs.
    async fn parse(&self, key: String, raw: Vec<u8>) -> Result<ParseOutcome> {
        let the_pattern = self.pattern.clone();
        let the_format = self.format;
        let the_key_for_errors = key.clone();

        tokio::task::spawn_blocking(move || parse_log(&key, &raw, the_pattern.as_ref(), &the_format))
            .await
            .map_err(|e| LogTapError::Decompression {
                key: the_key_for_errors,
                message: format!("parser task died: {e}"),
            })?
    }
}

/// 🧯 Best-effort text out of a panic payload.
fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(the_message) = payload.downcast_ref::<&str>() {
        the_message
    } else if let Some(the_message) = payload.downcast_ref::<String>() {
        the_message.as_str()
    } else {
        "non-string panic payload"
    }
}
