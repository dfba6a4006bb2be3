use rust_decimal::Decimal;

/// Interpreted body of a successful (HTTP 200) price lookup.
#[derive(Debug, Clone, PartialEq)]
pub enum PriceQuote {
    /// At least one price was published
    Listed {
        price: Decimal,
        median: Option<Decimal>,
        volume: Option<u64>,
    },

    /// The market answered but has no listings for the item
    NoListings,
}

/// MarketAdapter is the abstraction layer between:
/// - The generic market client (rate limiting, proxies, retries)
/// - One marketplace's price lookup API
///
/// Each implementation must:
/// - Define the lookup endpoint and query parameters
/// - Interpret the response body
///
/// HTTP status handling (429, 5xx, timeouts) is NOT adapter
/// business; the client classifies those uniformly.
///
/// THREAD SAFETY:
/// - Must be Send + Sync
/// - One adapter instance is shared by every request
///
pub trait MarketAdapter: Send + Sync {
    /// Canonical adapter name, as used in `marketAdapter`.
    fn name(&self) -> &'static str;

    /// Full URL of the price lookup endpoint, without query string.
    fn endpoint(&self) -> &str;

    /// Query parameters for one lookup.
    ///
    /// MUST NOT:
    /// - Perform network I/O
    /// - Percent-encode values (the client does)
    fn build_query(&self, market_hash_name: &str) -> Vec<(&'static str, String)>;

    /// Interprets an HTTP 200 body.
    ///
    /// OUTPUT:
    /// - Some(Listed) when a price could be extracted
    /// - Some(NoListings) for an explicit "nothing listed" answer
    /// - None for bodies that cannot be understood; the client
    ///   treats those as transient failures
    ///
    /// This function must NEVER panic.
    fn parse_response(&self, raw: &str) -> Option<PriceQuote>;
}
