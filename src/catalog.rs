// ------------------------------------------------------------
// Item catalog loading and work-set expansion
// ------------------------------------------------------------
//
// The catalog is a static JSON document describing every skin:
//
//   { "skins": [ { "id": 1, "weapon": "AK-47", "skin_name": "Redline",
//                  "category": "Rifle", "introduced": "2013-12-18",
//                  "wears": ["Field-Tested", "Well-Worn"], "stattrak": true } ] }
//
// It is read once at startup and never written back.
//

use serde::Deserialize;
use std::cmp::Reverse;
use std::path::Path;

use crate::error::{CollectorError, Result};
use crate::schema::{WearCondition, WorkUnit};
use crate::util;

/// Per-wear availability, as found in exported databases.
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogVariant {
    pub wear: WearCondition,
    #[serde(default)]
    pub stattrak_available: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CatalogItem {
    #[serde(default)]
    pub id: Option<serde_json::Value>,
    pub weapon: String,
    #[serde(alias = "name")]
    pub skin_name: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub collection: Option<String>,
    #[serde(default)]
    pub rarity: Option<String>,
    #[serde(default)]
    pub introduced: Option<String>,
    /// Wears the skin exists in; all five when absent
    #[serde(default)]
    pub wears: Option<Vec<WearCondition>>,
    #[serde(default)]
    pub stattrak: bool,
    /// Alternative to `wears` + `stattrak`, one entry per wear
    #[serde(default)]
    pub variants: Option<Vec<CatalogVariant>>,
}

impl CatalogItem {
    /// "Weapon | Skin"
    pub fn item_name(&self) -> String {
        format!("{} | {}", self.weapon, self.skin_name)
    }

    /// (wear, StatTrak available) pairs in canonical wear order.
    fn variants(&self) -> Vec<(WearCondition, bool)> {
        let mut out: Vec<(WearCondition, bool)> = match (&self.variants, &self.wears) {
            (Some(variants), _) => variants
                .iter()
                .map(|v| (v.wear, v.stattrak_available || self.stattrak))
                .collect(),
            (None, Some(wears)) => wears.iter().map(|w| (*w, self.stattrak)).collect(),
            (None, None) => WearCondition::ALL.iter().map(|w| (*w, self.stattrak)).collect(),
        };
        out.sort_by_key(|(w, _)| *w);
        out.dedup_by_key(|(w, _)| *w);
        out
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Catalog {
    #[serde(alias = "items")]
    pub skins: Vec<CatalogItem>,
}

impl Catalog {
    /// Reads and parses the catalog file.
    ///
    /// A missing, unparsable or empty catalog is fatal.
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path).map_err(|source| CollectorError::CatalogIo {
            path: path.to_path_buf(),
            source,
        })?;

        let catalog: Catalog =
            serde_json::from_str(&data).map_err(|source| CollectorError::CatalogParse {
                path: path.to_path_buf(),
                source,
            })?;

        if catalog.skins.is_empty() {
            return Err(CollectorError::EmptyCatalog(path.to_path_buf()));
        }

        log::info!("Loaded {} skins from {}", catalog.skins.len(), path.display());
        Ok(catalog)
    }

    /// Expands the catalog into the ordered work set.
    ///
    /// ORDER:
    /// - Items newest first by `introduced`; unknown dates last,
    ///   ties keep file order
    /// - Per item, wears in canonical order
    /// - Per wear, Normal then StatTrak
    ///
    /// StatTrak units are omitted entirely when `ignore_stat_trak` is set,
    /// so indices always refer to the filtered list.
    pub fn work_units(&self, ignore_stat_trak: bool) -> Vec<WorkUnit> {
        let mut items: Vec<&CatalogItem> = self.skins.iter().collect();
        // stable sort: ties keep file order
        items.sort_by_key(|item| {
            let date = item.introduced.as_deref().and_then(util::parse_date);
            (date.is_none(), Reverse(date))
        });

        let mut units = Vec::new();
        for item in items {
            let name = item.item_name();
            let category = item.category.clone().unwrap_or_else(|| item.weapon.clone());

            for (wear, stat_trak_available) in item.variants() {
                units.push(WorkUnit::new(&name, &category, wear, false));
                if stat_trak_available && !ignore_stat_trak {
                    units.push(WorkUnit::new(&name, &category, wear, true));
                }
            }
        }
        units
    }
}
