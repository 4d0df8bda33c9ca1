//! 🔧 App Configuration: the sacred TOML-to-struct pipeline.
//!
//! 📡 "Config not found: We looked everywhere. Under the couch. Behind the fridge.
//! In the junk drawer. Nothing." (every developer at 3am) 🦆
//!
//! 🏗️ Powered by Figment: `LOGTAP_*` environment variables as the base layer
//! (`__` separates nesting, so `LOGTAP_SAMPLER__BUCKET` is `sampler.bucket`),
//! an optional TOML file on top. TOML wins on conflicts.
//!
//! ```toml
//! [sampler]
//! bucket = "my-cdn-logs"
//! prefix = "cloudfront/E123/"
//! pattern = "^/static/"
//! low_watermark = 50000
//! poll_interval_ms = 100
//!
//! [sampler.retry]
//! max_retries = 0
//!
//! [store]
//! region = "us-east-1"
//!
//! [runtime]
//! count = 1000
//! ```

use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use serde::Deserialize;
use tracing::info;

use crate::backends::S3StoreConfig;
use crate::parser::LineFormat;
use crate::retry::RetryConfig;

/// 📉 Refill when the queue holds this many paths or fewer. Big enough to ride out a slow bucket.
pub const DEFAULT_LOW_WATERMARK: usize = 50_000;

/// ⏱️ Upper bound on how long a parked reader goes without re-checking the queue.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 100;

/// 📦 The whole app: what to sample, where it lives, how long to run.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct AppConfig {
    pub sampler: SamplerConfig,
    #[serde(default)]
    pub store: S3StoreConfig,
    #[serde(default)]
    pub runtime: RuntimeConfig,
}

/// 🎯 What to sample. Immutable once the reader is built.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct SamplerConfig {
    /// 🪣 the bucket holding the access logs
    pub bucket: String,
    /// 📁 key prefix to list under. Empty = the whole bucket, brave choice.
    #[serde(default)]
    pub prefix: String,
    /// 🧩 optional regex; only paths it matches are kept
    #[serde(default)]
    pub pattern: Option<String>,
    #[serde(default = "default_low_watermark")]
    pub low_watermark: usize,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// 📐 where the path and query live in a line
    #[serde(default)]
    pub format: LineFormat,
    /// 🔁 store-call retries. Default: none, fail fast.
    #[serde(default)]
    pub retry: RetryConfig,
}

fn default_low_watermark() -> usize {
    DEFAULT_LOW_WATERMARK
}

fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

impl SamplerConfig {
    /// 🚀 Bucket + prefix, everything else at its default.
    pub fn new(bucket: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            prefix: prefix.into(),
            pattern: None,
            low_watermark: DEFAULT_LOW_WATERMARK,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            format: LineFormat::default(),
            retry: RetryConfig::default(),
        }
    }

    pub fn with_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = Some(pattern.into());
        self
    }

    pub fn with_low_watermark(mut self, low_watermark: usize) -> Self {
        self.low_watermark = low_watermark;
        self
    }

    pub fn with_poll_interval_ms(mut self, poll_interval_ms: u64) -> Self {
        self.poll_interval_ms = poll_interval_ms;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// ⚙️ How the CLI drives the reader.
#[derive(Debug, Deserialize, Clone, PartialEq, Default)]
pub struct RuntimeConfig {
    /// 🔢 paths to emit before exiting. 0 = until someone hits Ctrl-C.
    #[serde(default)]
    pub count: u64,
}

/// 🚀 Load the config: env vars first, then the TOML file if one was given.
///
/// - `None` → env vars only. No file. No assumptions.
/// - `Some(path)` → env vars + TOML, merged. TOML wins.
pub fn load_config(config_file_name: Option<&Path>) -> anyhow::Result<AppConfig> {
    info!(
        "🔧 Loading configuration: {:#?}",
        config_file_name.unwrap_or(Path::new(""))
    );

    let config = Figment::new().merge(Env::prefixed("LOGTAP_").split("__"));
    let config = match config_file_name {
        Some(file_name) => config.merge(Toml::file(file_name)),
        None => config,
    };

    let context_msg = match config_file_name {
        Some(path) => format!(
            "💀 Failed to parse configuration from file '{}' and environment variables (LOGTAP_*). \
             At minimum we need `[sampler] bucket = \"...\"`.",
            path.display()
        ),
        None => "💀 Failed to parse configuration from environment variables (LOGTAP_*). \
                 No file was provided, so LOGTAP_SAMPLER__BUCKET has to be set."
            .to_string(),
    };

    config.extract().context(context_msg)
}
