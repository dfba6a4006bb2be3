use rust_decimal::Decimal;
use serde::Deserialize;

use super::adapter::{MarketAdapter, PriceQuote};
use crate::util;

/// Steam application id of Counter-Strike 2.
pub const APP_ID: u32 = 730;

/// Steam Community Market "priceoverview" adapter.
///
/// Response shape:
/// `{"success":true,"lowest_price":"$1.23","volume":"1,234","median_price":"$1.10"}`
///
/// Items without listings come back either with `success: false`
/// or with `success: true` and no price fields.
pub struct SteamAdapter {
    endpoint: String,
    currency_code: u32,
}

#[derive(Debug, Deserialize)]
struct PriceOverview {
    success: bool,
    #[serde(default)]
    lowest_price: Option<String>,
    #[serde(default)]
    median_price: Option<String>,
    #[serde(default)]
    volume: Option<String>,
}

impl SteamAdapter {
    pub fn new(endpoint: impl Into<String>, currency_code: u32) -> Self {
        Self {
            endpoint: endpoint.into(),
            currency_code,
        }
    }
}

impl MarketAdapter for SteamAdapter {
    fn name(&self) -> &'static str {
        "steam"
    }

    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn build_query(&self, market_hash_name: &str) -> Vec<(&'static str, String)> {
        vec![
            ("appid", APP_ID.to_string()),
            ("currency", self.currency_code.to_string()),
            ("market_hash_name", market_hash_name.to_string()),
        ]
    }

    fn parse_response(&self, raw: &str) -> Option<PriceQuote> {
        let overview: PriceOverview = serde_json::from_str(raw).ok()?;

        if !overview.success {
            return Some(PriceQuote::NoListings);
        }

        let positive = |s: &Option<String>| {
            s.as_deref()
                .and_then(util::parse_price)
                .filter(|p| *p > Decimal::ZERO)
        };
        let lowest = positive(&overview.lowest_price);
        let median = positive(&overview.median_price);

        // lowest listing first, median as fallback
        match lowest.or(median) {
            Some(price) => Some(PriceQuote::Listed {
                price,
                median,
                volume: overview.volume.as_deref().and_then(util::parse_volume),
            }),
            None => Some(PriceQuote::NoListings),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn adapter() -> SteamAdapter {
        SteamAdapter::new("https://example.invalid/priceoverview/", 1)
    }

    #[test]
    fn builds_lookup_query() {
        let q = adapter().build_query("AK-47 | Redline (Field-Tested)");
        assert_eq!(q[0], ("appid", "730".to_string()));
        assert_eq!(q[1], ("currency", "1".to_string()));
        assert_eq!(q[2].1, "AK-47 | Redline (Field-Tested)");
    }

    #[test]
    fn parses_listed_item() {
        let raw = r#"{"success":true,"lowest_price":"$12.34","volume":"1,024","median_price":"$11.90"}"#;
        assert_eq!(
            adapter().parse_response(raw),
            Some(PriceQuote::Listed {
                price: dec!(12.34),
                median: Some(dec!(11.90)),
                volume: Some(1024),
            })
        );
    }

    #[test]
    fn falls_back_to_median_price() {
        let raw = r#"{"success":true,"median_price":"$3.00"}"#;
        match adapter().parse_response(raw) {
            Some(PriceQuote::Listed { price, volume, .. }) => {
                assert_eq!(price, dec!(3.00));
                assert_eq!(volume, None);
            }
            other => panic!("expected listed quote, got {:?}", other),
        }
    }

    #[test]
    fn recognises_no_listings() {
        assert_eq!(
            adapter().parse_response(r#"{"success":false}"#),
            Some(PriceQuote::NoListings)
        );
        assert_eq!(
            adapter().parse_response(r#"{"success":true}"#),
            Some(PriceQuote::NoListings)
        );
    }

    #[test]
    fn garbage_body_is_not_understood() {
        assert_eq!(adapter().parse_response("<html>busy</html>"), None);
        assert_eq!(adapter().parse_response(r#"{"lowest_price":"$1"}"#), None);
    }
}
