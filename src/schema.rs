use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Prefix the market uses for StatTrak variants.
pub const STATTRAK_PREFIX: &str = "StatTrak™ ";

// ------------------------------------------------------------
// Wear condition
// ------------------------------------------------------------
//
// The five exterior grades an item can be listed in.
//
// Serialized with the exact labels the market uses inside
// hash names ("Field-Tested", ...). Compact identifiers
// ("FieldTested") are accepted on input.
//
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum WearCondition {
    #[serde(rename = "Factory New", alias = "FactoryNew")]
    FactoryNew,
    #[serde(rename = "Minimal Wear", alias = "MinimalWear")]
    MinimalWear,
    #[serde(rename = "Field-Tested", alias = "FieldTested")]
    FieldTested,
    #[serde(rename = "Well-Worn", alias = "WellWorn")]
    WellWorn,
    #[serde(rename = "Battle-Scarred", alias = "BattleScarred")]
    BattleScarred,
}

impl WearCondition {
    /// All conditions, best to worst.
    pub const ALL: [WearCondition; 5] = [
        WearCondition::FactoryNew,
        WearCondition::MinimalWear,
        WearCondition::FieldTested,
        WearCondition::WellWorn,
        WearCondition::BattleScarred,
    ];

    /// Label used by the market in hash names.
    pub fn label(self) -> &'static str {
        match self {
            WearCondition::FactoryNew => "Factory New",
            WearCondition::MinimalWear => "Minimal Wear",
            WearCondition::FieldTested => "Field-Tested",
            WearCondition::WellWorn => "Well-Worn",
            WearCondition::BattleScarred => "Battle-Scarred",
        }
    }
}

impl fmt::Display for WearCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// ------------------------------------------------------------
// Work unit identity
// ------------------------------------------------------------
//
// The market hash name doubles as the identity of a unit:
// it is unique per (item name, wear, StatTrak flag) and is
// exactly what the lookup call is keyed by.
//
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkUnitId(String);

impl WorkUnitId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WorkUnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for WorkUnitId {
    fn from(s: &str) -> Self {
        WorkUnitId(s.to_string())
    }
}

/// One priceable (item, wear condition, StatTrak flag) combination.
///
/// Derived once from the catalog and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkUnit {
    /// "Weapon | Skin", e.g. "AK-47 | Redline"
    pub item_name: String,
    pub weapon_category: String,
    pub wear: WearCondition,
    pub stat_trak: bool,
}

impl WorkUnit {
    pub fn new(
        item_name: impl Into<String>,
        weapon_category: impl Into<String>,
        wear: WearCondition,
        stat_trak: bool,
    ) -> Self {
        Self {
            item_name: item_name.into(),
            weapon_category: weapon_category.into(),
            wear,
            stat_trak,
        }
    }

    /// Market hash name, e.g. "StatTrak™ AK-47 | Redline (Field-Tested)".
    pub fn market_hash_name(&self) -> String {
        let prefix = if self.stat_trak { STATTRAK_PREFIX } else { "" };
        format!("{}{} ({})", prefix, self.item_name, self.wear.label())
    }

    pub fn id(&self) -> WorkUnitId {
        WorkUnitId(self.market_hash_name())
    }
}

// ------------------------------------------------------------
// Price result
// ------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PriceStatus {
    /// A price was returned
    Found,
    /// The market answered, but there are no listings
    NotFound,
    /// No usable answer after the retry budget was spent
    Unavailable,
}

/// Outcome of one price lookup.
///
/// Created by the market client, owned by the checkpoint store
/// once recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceResult {
    pub work_unit_id: WorkUnitId,

    /// Lowest listing price, falling back to the median
    pub price: Option<Decimal>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub median_price: Option<Decimal>,

    /// Units sold in the last 24h as reported by the market
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<u64>,

    pub currency: String,
    pub fetched_at: DateTime<Utc>,
    pub status: PriceStatus,
}

impl PriceResult {
    pub fn found(
        id: WorkUnitId,
        price: Decimal,
        median_price: Option<Decimal>,
        volume: Option<u64>,
        currency: &str,
    ) -> Self {
        Self {
            work_unit_id: id,
            price: Some(price),
            median_price,
            volume,
            currency: currency.to_string(),
            fetched_at: Utc::now(),
            status: PriceStatus::Found,
        }
    }

    pub fn not_found(id: WorkUnitId, currency: &str) -> Self {
        Self::empty(id, currency, PriceStatus::NotFound)
    }

    /// Placeholder recorded when a unit permanently failed.
    pub fn unavailable(id: WorkUnitId, currency: &str) -> Self {
        Self::empty(id, currency, PriceStatus::Unavailable)
    }

    fn empty(id: WorkUnitId, currency: &str, status: PriceStatus) -> Self {
        Self {
            work_unit_id: id,
            price: None,
            median_price: None,
            volume: None,
            currency: currency.to_string(),
            fetched_at: Utc::now(),
            status,
        }
    }
}
