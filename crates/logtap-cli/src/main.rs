//! 🚀 logtap-cli: the front door. Loads config, sets up logging, then lets the
//! library pour paths onto stdout until told to stop.
//!
//! 🎬 *[narrator voice]* "It all started with a simple main() function..."
//!
//! Paths go to stdout, one per line. Logs and the closing stats table go to
//! stderr, so `logtap-cli | my-load-generator` stays clean. 🦆

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

/// 🪣 Stream sampled URL paths from gzip access logs in S3.
#[derive(Debug, Parser)]
#[command(name = "logtap-cli", version, about)]
struct Cli {
    /// 📋 TOML config file. If it does not exist, LOGTAP_* env vars have to carry everything.
    #[arg(default_value = "logtap.toml")]
    config: PathBuf,

    /// 🔢 Paths to emit before exiting (0 = forever). Overrides `[runtime] count`.
    #[arg(short, long, env = "LOGTAP_COUNT")]
    count: Option<u64>,
}

/// 🚀 main(): init tracing, parse args, load config, run, cry if needed.
#[tokio::main]
async fn main() -> Result<()> {
    // 📡 stderr only. stdout belongs to the paths.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let the_cli = Cli::parse();

    // 🔒 a missing file is fine (env vars only); an unreadable path is not
    let the_config_file = the_cli.config.as_path();
    let the_config_file_which_exists = match the_config_file.try_exists().context(format!(
        "💀 Couldn't even check whether the config file exists. Permissions? Was checking here: '{}'",
        the_config_file.display()
    ))? {
        true => Some(the_config_file),
        false => None,
    };

    let mut app_config = logtap::load_config(the_config_file_which_exists)
        .context("💀 In logtap-cli, main, we couldn't load the config. Check the TOML and the LOGTAP_* env vars.")?;
    if let Some(the_count) = the_cli.count {
        app_config.runtime.count = the_count;
    }

    let result = logtap::run(app_config).await;

    if let Err(err) = result {
        error!("💀 error: {}", err);
        // -- 🧅 peel the onion of sadness, one layer at a time
        let mut the_vibes_are_giving_credential_issues = false;
        for cause in err.chain().skip(1) {
            error!("⚠️  cause: {}", cause);
            let cause_str = cause.to_string();
            if cause_str.contains("AccessDenied")
                || cause_str.contains("InvalidAccessKeyId")
                || cause_str.contains("SignatureDoesNotMatch")
                || cause_str.contains("ExpiredToken")
                || cause_str.contains("no providers in chain")
            {
                the_vibes_are_giving_credential_issues = true;
            }
        }

        if the_vibes_are_giving_credential_issues {
            error!(
                "🔧 hint: this smells like credentials. Check AWS_PROFILE / AWS_ACCESS_KEY_ID, \
                 the region in `[store]`, and that the role can s3:ListBucket and s3:GetObject \
                 on the bucket and prefix. ☕"
            );
        }

        std::process::exit(1);
    }

    Ok(())
}
