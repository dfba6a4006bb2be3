// ------------------------------------------------------------
// Market adapter registry and price lookup client
// ------------------------------------------------------------
//
// This module provides:
// - The `MarketAdapter` trait (request shape + response parsing)
// - Concrete adapters (currently the Steam Community Market)
// - `MarketClient`, which runs every lookup through the rate
//   limiter and, optionally, the proxy pool
//

pub mod adapter;
pub mod client;
pub mod steam;

use std::sync::Arc;

pub use adapter::{MarketAdapter, PriceQuote};
pub use client::{ClientSettings, MarketClient};

use crate::config::Config;

/// Returns a market adapter instance by name.
///
/// CONTRACT:
/// - `name` matches the `marketAdapter` config key
/// - Returns `None` for unknown adapters
///
pub fn get_adapter(name: &str, config: &Config) -> Option<Arc<dyn MarketAdapter>> {
    match name {
        "steam" => Some(Arc::new(steam::SteamAdapter::new(
            config.market_endpoint.clone(),
            config.currency_code,
        ))),
        _ => None,
    }
}
