//! 🪣 logtap: an endless stream of real URL paths, sampled from gzip access logs in S3.
//!
//! 🎬 *[a bucket full of CloudFront logs. a load generator, hungry for realistic traffic.]*
//!
//! Build a [`PathReader`] over any [`ObjectStore`], call `read()`, get a path.
//! Behind the curtain: the bucket is listed once, one log object is picked at
//! random whenever the queue runs low, it is gunzipped and parsed off the async
//! workers, and its paths land in a shared queue. At most one refill runs at a time.
//!
//! ```no_run
//! # async fn demo() -> anyhow::Result<()> {
//! use std::sync::Arc;
//! use logtap::{PathReader, S3Store, S3StoreConfig, SamplerConfig};
//!
//! let the_store = Arc::new(S3Store::new(&S3StoreConfig::default()).await);
//! let the_reader = PathReader::new(SamplerConfig::new("my-cdn-logs", "cf/E123/"), the_store)?;
//! let the_path = the_reader.read().await?;
//! # Ok(())
//! # }
//! ```

use std::io::ErrorKind;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter};
use tracing::info;

pub mod app_config;
pub mod backends;
pub mod error;
pub mod listing;
pub mod parser;
pub mod queue;
pub mod reader;
pub mod retry;
pub mod scheduler;
pub mod stats;

pub use app_config::{AppConfig, RuntimeConfig, SamplerConfig, load_config};
pub use backends::{InMemoryStore, ListPage, ObjectStore, S3Store, S3StoreConfig};
pub use error::LogTapError;
pub use parser::LineFormat;
pub use queue::PathQueue;
pub use reader::PathReader;
pub use retry::RetryConfig;
pub use stats::StatsSnapshot;

/// 🚀 The whole show: connect to S3, stream `runtime.count` paths to stdout
/// (forever if 0), then print the stats table to stderr.
pub async fn run(app_config: AppConfig) -> Result<()> {
    let the_store = Arc::new(S3Store::new(&app_config.store).await);
    let the_reader = PathReader::new(app_config.sampler.clone(), the_store)
        .context("💀 could not build the path reader")?;

    info!(
        "🪣 sampling s3://{}/{} (low watermark {}, count {})",
        app_config.sampler.bucket,
        app_config.sampler.prefix,
        app_config.sampler.low_watermark,
        app_config.runtime.count
    );

    let the_result = pump(&the_reader, app_config.runtime.count, tokio::io::stdout()).await;
    eprintln!("{}", the_reader.stats_table());

    let the_written = the_result?;
    info!("✅ done: {} paths written", the_written);
    Ok(())
}

/// 🚰 Read paths and write one per line to `out`. Stops after `count` paths
/// (never, if 0), at the first reader error, or quietly when `out` hangs up.
pub async fn pump<S, W>(reader: &PathReader<S>, count: u64, out: W) -> Result<u64>
where
    S: ObjectStore + 'static,
    W: AsyncWrite + Unpin,
{
    let mut the_out = BufWriter::new(out);
    let mut the_written = 0u64;

    while count == 0 || the_written < count {
        let the_path = reader.read().await.context("💀 the reader gave up")?;
        let the_write = async {
            the_out.write_all(the_path.as_bytes()).await?;
            the_out.write_all(b"\n").await
        };
        match the_write.await {
            Ok(()) => the_written += 1,
            // -- 🚪 `| head` closed the pipe. that's a goodbye, not an error.
            Err(e) if e.kind() == ErrorKind::BrokenPipe => return Ok(the_written),
            Err(e) => return Err(e).context("💀 failed writing a path to the output"),
        }
    }

    match the_out.flush().await {
        Err(e) if e.kind() == ErrorKind::BrokenPipe => Ok(the_written),
        other => other
            .map(|()| the_written)
            .context("💀 failed flushing the output"),
    }
}
