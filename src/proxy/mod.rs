// ------------------------------------------------------------
// Egress proxy rotation
// ------------------------------------------------------------
//
// - `record`: proxy entries, parsing and health state
// - `pool`:   selection, failure reporting, health checks
// - `probe`:  reachability checks used by the pool
// - `source`: loading proxy lists from config, file and remote URL
//
// The whole module is optional at runtime: with `useProxies`
// disabled, or an empty pool, every request goes out directly.
//

mod pool;
mod probe;
mod record;
mod source;

pub use pool::{PoolSettings, PoolStats, ProxyOutcome, ProxyPool, ProxyStat};
pub use probe::{HttpProbe, ProxyProbe};
pub use record::{ProxyCredentials, ProxyHealth, ProxyRecord};
pub use source::{load_proxies, parse_list};
