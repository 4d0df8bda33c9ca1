//! 📖 The Read Coordinator: one path per call, as fast as the queue allows.
//!
//! 🎬 COLD OPEN: a reader asks for a path. The queue is empty. The bucket hasn't
//! even been listed yet. Nobody panics. (Well. Nobody calls `panic!`.)
//!
//! Every `read()`:
//! 1. pops one path right away, if there is one
//! 2. if the queue is at or below the low-water mark, nudges the scheduler for a
//!    background refill (it ignores the nudge if one is already running)
//! 3. returns the popped path, or parks until a path shows up
//!
//! 🅿️ A parked reader wakes on the queue's doorbell (any append, any cycle end)
//! and, failing that, re-checks every `poll_interval`. When a whole interval
//! passes with the queue still low, it nudges the scheduler again, so a cycle
//! that sampled an object with zero matching paths is followed by another
//! sample instead of silence. At most one nudge per interval per reader, and the
//! in-flight flag still keeps it to one cycle at a time.
//!
//! 🧊 The queue never drains below one path once it has held one: the last path
//! is handed out again and again until a refill lands. Readers never starve on a
//! non-empty queue, but they may see that last path repeated.
//!
//! 💀 After a fatal refill failure every `read()` returns the latched error,
//! including reads that were already parked when it happened.

use std::sync::Arc;
use std::time::Duration;

use futures::Stream;
use tokio::time::sleep;
use tracing::trace;

use crate::app_config::SamplerConfig;
use crate::backends::ObjectStore;
use crate::error::Result;
use crate::queue::PathQueue;
use crate::scheduler::FetchScheduler;
use crate::stats::{SamplerStats, StatsSnapshot};

/// 📖 Hands out sampled paths one at a time. Cheap to share behind an `Arc`.
#[derive(Debug)]
pub struct PathReader<S> {
    queue: Arc<PathQueue>,
    scheduler: Arc<FetchScheduler<S>>,
    stats: Arc<SamplerStats>,
    poll_interval: Duration,
}

impl<S: ObjectStore + 'static> PathReader<S> {
    /// 🏗️ Build a reader. Nothing is listed or fetched until the first `read()`.
    ///
    /// Fails only if `config.pattern` is not a valid regex.
    pub fn new(config: SamplerConfig, store: Arc<S>) -> Result<Self> {
        let queue = Arc::new(PathQueue::new(config.low_watermark));
        let stats = Arc::new(SamplerStats::default());
        let scheduler = FetchScheduler::new(&config, store, Arc::clone(&queue), Arc::clone(&stats))?;

        Ok(Self {
            queue,
            scheduler: Arc::new(scheduler),
            stats,
            poll_interval: config.poll_interval(),
        })
    }

    /// 📖 The next path. Immediate when the queue has one, otherwise waits for a refill.
    pub async fn read(&self) -> Result<String> {
        if let Some(the_error) = self.scheduler.fatal_error() {
            return Err(the_error);
        }

        let the_immediate = self.queue.pop_one();
        if self.queue.is_low() {
            // -- detached on purpose; the doorbell tells us when it lands
            let _ = self.scheduler.maybe_refill();
        }

        match the_immediate {
            Some(the_path) => Ok(self.serve(the_path)),
            None => self.wait_for_path().await,
        }
    }

    /// 🌊 An endless stream of `read()` results. Ends never; errors repeat forever
    /// once latched, so callers should stop at the first `Err`.
    pub fn paths(&self) -> impl Stream<Item = Result<String>> + '_ {
        futures::stream::unfold(self, |the_reader| async move {
            Some((the_reader.read().await, the_reader))
        })
    }

    /// 📬 The queue itself. Anyone may `append` to it; parked readers wake up.
    pub fn queue(&self) -> &Arc<PathQueue> {
        &self.queue
    }

    pub fn is_refilling(&self) -> bool {
        self.scheduler.is_in_flight()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// 🍽️ The stats table, ready for stderr.
    pub fn stats_table(&self) -> String {
        self.stats.snapshot().render_table()
    }

    /// 🅿️ Park until the queue yields a path or the scheduler dies.
    async fn wait_for_path(&self) -> Result<String> {
        loop {
            // -- register for the doorbell BEFORE looking, so an append in between is not missed
            let the_doorbell = self.queue.appended();
            tokio::pin!(the_doorbell);
            the_doorbell.as_mut().enable();

            if let Some(the_path) = self.queue.pop_one() {
                return Ok(self.serve(the_path));
            }
            if let Some(the_error) = self.scheduler.fatal_error() {
                return Err(the_error);
            }

            let the_interval_elapsed = tokio::select! {
                _ = the_doorbell.as_mut() => {
                    trace!("🔔 queue doorbell rang");
                    false
                }
                _ = sleep(self.poll_interval) => {
                    trace!("⏱️ poll interval elapsed, re-checking the queue");
                    true
                }
            };
            if the_interval_elapsed && self.queue.is_low() {
                let _ = self.scheduler.maybe_refill();
            }
        }
    }

    fn serve(&self, path: String) -> String {
        self.stats.record_served();
        path
    }
}
