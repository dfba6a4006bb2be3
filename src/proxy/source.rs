// ------------------------------------------------------------
// Proxy list loading
// ------------------------------------------------------------
//
// Proxies come from three places, merged in this order:
// static config entries, a local list file, a remote list.
// None of them is allowed to abort startup: an unreadable file
// or an unreachable list URL only shrinks the pool, and an empty
// pool means direct connections.
//

use rand::seq::SliceRandom;
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use super::record::ProxyRecord;
use crate::config::Config;

const REMOTE_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Parses a newline-separated proxy list.
///
/// Blank lines, `#` comments and "Format:" header lines are skipped,
/// invalid entries are logged and dropped.
pub fn parse_list(text: &str) -> Vec<ProxyRecord> {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#') && !l.contains("Format:"))
        .filter_map(|l| match ProxyRecord::parse(l) {
            Ok(p) => Some(p),
            Err(e) => {
                log::warn!("Skipping proxy entry: {}", e);
                None
            }
        })
        .collect()
}

async fn load_file(path: &Path) -> Vec<ProxyRecord> {
    match tokio::fs::read_to_string(path).await {
        Ok(text) => {
            let proxies = parse_list(&text);
            log::info!("Loaded {} proxies from {}", proxies.len(), path.display());
            proxies
        }
        Err(e) => {
            log::warn!("Cannot read proxy file {}: {}", path.display(), e);
            Vec::new()
        }
    }
}

async fn fetch_remote(url: &str, user_agent: &str) -> Vec<ProxyRecord> {
    log::info!("Fetching proxy list from {}", url);
    crate::install_crypto_provider();

    let result: Result<String, reqwest::Error> = async {
        let response = reqwest::Client::builder()
            .timeout(REMOTE_FETCH_TIMEOUT)
            .user_agent(user_agent)
            .build()?
            .get(url)
            .send()
            .await?
            .error_for_status()?;
        response.text().await
    }
    .await;

    match result {
        Ok(text) => {
            let proxies = parse_list(&text);
            log::info!("Fetched {} proxies from remote list", proxies.len());
            proxies
        }
        Err(e) => {
            log::warn!("Failed to fetch proxy list, continuing without it: {}", e);
            Vec::new()
        }
    }
}

/// Loads, deduplicates, shuffles and caps the configured proxies.
pub async fn load_proxies(config: &Config) -> Vec<ProxyRecord> {
    let mut proxies: Vec<ProxyRecord> = parse_list(&config.proxies.join("\n"));

    if let Some(path) = &config.proxy_file {
        proxies.extend(load_file(path).await);
    }
    if let Some(url) = &config.proxy_list_url {
        proxies.extend(fetch_remote(url, &config.user_agent).await);
    }

    let mut seen = HashSet::new();
    proxies.retain(|p| seen.insert(p.address()));

    proxies.shuffle(&mut rand::rng());

    if let Some(max) = config.proxy_max_count {
        proxies.truncate(max);
    }

    if proxies.is_empty() {
        log::warn!("No proxies available, using direct connections");
    } else {
        log::info!("Proxy pool loaded with {} proxies", proxies.len());
    }
    proxies
}
