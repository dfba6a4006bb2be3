/// Utility helpers shared by the market adapters and the catalog.
///
/// This module contains:
/// - Price / volume string parsing
/// - Catalog date parsing
/// - Small formatting helpers for log output
///
/// No network or file access happens here.
///
use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::str::FromStr;
use std::time::Duration;

/// Parse a market price string into a decimal amount.
///
/// Examples:
/// - "$1,234.56"  -> 1234.56
/// - "1,23€"      -> 1.23
/// - "12,--€"     -> 12.00
/// - "CDN$ 0.03"  -> 0.03
///
/// When both separators occur, the last one is the decimal
/// separator. A lone comma followed by one or two digits is a
/// decimal comma; otherwise commas group thousands.
///
/// Returns `None` when no number can be recovered.
pub fn parse_price(raw: &str) -> Option<Decimal> {
    let cleaned: String = raw
        .replace("--", "00")
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == ',')
        .collect();

    let cleaned = cleaned.trim_matches(|c| c == '.' || c == ',');
    if cleaned.is_empty() {
        return None;
    }

    let normalized = match (cleaned.rfind('.'), cleaned.rfind(',')) {
        (Some(dot), Some(comma)) if comma > dot => cleaned.replace('.', "").replace(',', "."),
        (Some(_), Some(_)) => cleaned.replace(',', ""),
        (None, Some(comma)) => {
            let decimals = cleaned.len() - comma - 1;
            if decimals <= 2 && cleaned.matches(',').count() == 1 {
                cleaned.replace(',', ".")
            } else {
                cleaned.replace(',', "")
            }
        }
        _ => cleaned.to_string(),
    };

    Decimal::from_str(&normalized).ok()
}

/// Parse a volume string such as "1,234" into a count.
pub fn parse_volume(raw: &str) -> Option<u64> {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}

const DATE_FORMATS: [&str; 5] = ["%Y-%m-%d", "%d-%m-%Y", "%m/%d/%Y", "%Y/%m/%d", "%B %d, %Y"];

/// Parse a catalog "introduced" date.
///
/// "Unknown", empty strings and unrecognised formats yield `None`.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() || raw.eq_ignore_ascii_case("unknown") {
        return None;
    }

    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
}

/// Render a duration as `1h02m03s` for progress lines.
pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if h > 0 {
        format!("{}h{:02}m{:02}s", h, m, s)
    } else if m > 0 {
        format!("{}m{:02}s", m, s)
    } else {
        format!("{}s", s)
    }
}
