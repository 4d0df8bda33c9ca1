//! 💀 Errors: the five ways a sampling run can end in tears.
//!
//! 🧠 Knowledge graph:
//! - Store backends speak `anyhow` (same as every backend in this crate), the
//!   scheduler translates their failures into a [`LogTapError`] variant here.
//! - `Listing`, `Fetch`, `Decompression` are fatal. No retry unless the
//!   `[sampler.retry]` knobs say so, and even then only the last attempt counts.
//! - `Fatal` is what every later `read()` gets once the latch has tripped.
//!   It carries the original message so the 3am reader knows what broke first.
//!
//! Malformed log lines are NOT here. They get dropped and counted, not reported. 🦆

use std::sync::Arc;

use thiserror::Error;

/// 📦 Result alias for the library surface.
pub type Result<T> = std::result::Result<T, LogTapError>;

/// 💀 Everything that can go wrong between the bucket and the consumer.
#[derive(Debug, Error, Clone)]
pub enum LogTapError {
    /// 📋 the paginated listing call failed. The bucket ghosted us.
    #[error("💀 listing s3://{bucket}/{prefix} failed: {message}")]
    Listing {
        bucket: String,
        prefix: String,
        message: String,
    },

    /// 📡 fetching one sampled log object failed
    #[error("💀 fetching s3://{bucket}/{key} failed: {message}")]
    Fetch {
        bucket: String,
        key: String,
        message: String,
    },

    /// 🫁 the object was not valid gzip. Or it was, and then it stopped being.
    #[error("💀 decompressing '{key}' failed: {message}")]
    Decompression { key: String, message: String },

    /// 🧩 the configured pattern does not compile
    #[error("💀 invalid path pattern '{pattern}': {message}")]
    Pattern { pattern: String, message: String },

    /// 🔒 a previous refill cycle died and the reader is done for good
    #[error("💀 sampler halted by an earlier failure: {0}")]
    Fatal(Arc<LogTapError>),
}

impl LogTapError {
    /// 🔁 Wrap a latched error for replay. Already-wrapped errors are not double-boxed.
    pub(crate) fn replay(latched: &Arc<LogTapError>) -> Self {
        match latched.as_ref() {
            LogTapError::Fatal(inner) => LogTapError::Fatal(Arc::clone(inner)),
            _ => LogTapError::Fatal(Arc::clone(latched)),
        }
    }

    /// 🎯 The error that actually started it all, peeling any `Fatal` wrapper.
    pub fn root(&self) -> &LogTapError {
        match self {
            LogTapError::Fatal(inner) => inner.root(),
            other => other,
        }
    }
}
