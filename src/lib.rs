// ------------------------------------------------------------
// Module declarations
// ------------------------------------------------------------
//
// Each module represents a well-defined responsibility:
//
// - config:     Configuration struct loaded from JSON + CLI overrides
// - schema:     Work units, wear conditions, price results
// - util:       Price / date parsing and formatting helpers
// - catalog:    Catalog loading and work-set expansion
// - limiter:    Sliding-window rate limiter
// - proxy:      Proxy loading, health tracking and selection
// - market:     Market adapters and the price lookup client
// - checkpoint: Durable, atomically replaced progress record
// - collector:  Run context and the collection driver
//
pub mod catalog;
pub mod checkpoint;
pub mod collector;
pub mod config;
pub mod error;
pub mod limiter;
pub mod market;
pub mod metrics;
pub mod proxy;
pub mod schema;
pub mod shutdown;
pub mod util;

pub use collector::{run, CollectorContext, RunSummary};
pub use config::Config;
pub use error::{CollectorError, Result};
pub use shutdown::Shutdown;

use rustls::crypto::{ring, CryptoProvider};

/// Installs the `ring` rustls provider for this process.
///
/// rustls >= 0.23 needs a process-wide CryptoProvider before the
/// first HTTP client is built. Returns `false` if one was already
/// installed, which is harmless.
pub fn install_crypto_provider() -> bool {
    CryptoProvider::install_default(ring::default_provider()).is_ok()
}
