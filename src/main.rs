use clap::Parser;
use std::path::{Path, PathBuf};

use skin_price_collector::{install_crypto_provider, run, Config, Shutdown};

const DEFAULT_CONFIG_FILE: &str = "config.json";

/// Rate-limited marketplace price collector with resumable checkpoints
#[derive(Parser, Debug)]
#[command(name = "skin-price-collector")]
#[command(version, about, long_about = None)]
struct Args {
    /// JSON configuration file (default: ./config.json when present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Catalog file to expand into work units
    #[arg(long)]
    catalog: Option<PathBuf>,

    /// Checkpoint file
    #[arg(long)]
    checkpoint: Option<PathBuf>,

    /// Process at most N units in this run (0 = unlimited)
    #[arg(short, long)]
    limit: Option<usize>,

    /// Ignore (and overwrite) any existing checkpoint
    #[arg(long, default_value_t = false)]
    no_resume: bool,

    /// Skip StatTrak variants
    #[arg(long = "ignore-stattrak", default_value_t = false)]
    ignore_stat_trak: bool,

    /// Only look up units without a Found price
    #[arg(long, default_value_t = false)]
    missing_only: bool,

    /// Route requests through the proxy pool
    #[arg(long, default_value_t = false)]
    use_proxies: bool,

    /// Newline-separated proxy list file (implies --use-proxies)
    #[arg(long)]
    proxy_file: Option<PathBuf>,

    /// Requests allowed per rate-limit window
    #[arg(long)]
    rate_limit_count: Option<usize>,

    /// Rate-limit window in seconds
    #[arg(long)]
    rate_limit_window: Option<u64>,

    /// Consecutive failures before a proxy is marked dead
    #[arg(long)]
    proxy_max_failures: Option<u32>,

    /// Seconds between proxy health checks
    #[arg(long)]
    proxy_health_check_interval: Option<u64>,

    /// Per-request timeout in seconds
    #[arg(long)]
    request_timeout: Option<u64>,
}

impl Args {
    /// Loads the config file (if any) and applies flag overrides.
    fn into_config(self) -> anyhow::Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::from_file(path)?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                Config::from_file(Path::new(DEFAULT_CONFIG_FILE))?
            }
            None => Config::default(),
        };

        if let Some(v) = self.catalog {
            config.catalog_path = v;
        }
        if let Some(v) = self.checkpoint {
            config.checkpoint_path = v;
        }
        if let Some(v) = self.limit {
            config.limit = Some(v);
        }
        if self.no_resume {
            config.resume = false;
        }
        if self.ignore_stat_trak {
            config.ignore_stat_trak = true;
        }
        if self.missing_only {
            config.missing_only = true;
        }
        if self.use_proxies {
            config.use_proxies = true;
        }
        if let Some(v) = self.proxy_file {
            config.proxy_file = Some(v);
            config.use_proxies = true;
        }
        if let Some(v) = self.rate_limit_count {
            config.rate_limit_count = v;
        }
        if let Some(v) = self.rate_limit_window {
            config.rate_limit_window_seconds = v;
        }
        if let Some(v) = self.proxy_max_failures {
            config.proxy_max_failures = v;
        }
        if let Some(v) = self.proxy_health_check_interval {
            config.proxy_health_check_interval_seconds = v;
        }
        if let Some(v) = self.request_timeout {
            config.request_timeout_seconds = v;
        }

        config.validate()?;
        Ok(config)
    }
}

// ------------------------------------------------------------
// Application entry point
// ------------------------------------------------------------
//
// Responsibilities:
// - Initialize cryptography backend (rustls) and logging
// - Build the configuration (file + flags)
// - Wire Ctrl-C to the shutdown signal
// - Run one collection pass
//
// Exit code 0 on completion or a graceful interrupt, non-zero on
// startup failures (bad catalog, corrupt checkpoint, bad config).
//
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // rustls >= 0.23 requires an explicit CryptoProvider,
    // installed once before any HTTP client exists.
    install_crypto_provider();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Args::parse().into_config()?;
    log::info!(
        "Starting price collection (catalog {}, checkpoint {})",
        config.catalog_path.display(),
        config.checkpoint_path.display()
    );

    let shutdown = Shutdown::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                log::warn!("Interrupt received, stopping after the current unit...");
                shutdown.trigger();
            }
            // A second Ctrl-C gives up on a clean stop
            if tokio::signal::ctrl_c().await.is_ok() {
                log::error!("Second interrupt, exiting without final save");
                std::process::exit(130);
            }
        });
    }

    let summary = run(config, shutdown).await?;

    if summary.interrupted {
        log::info!("Progress saved, rerun to resume");
    }
    Ok(())
}
