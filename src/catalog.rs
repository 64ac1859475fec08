use std::{
    collections::BTreeMap,
    fs::{create_dir_all, read_to_string, write},
};

use anyhow::{Context, Result};
use geo::Point;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use ureq::{Agent, AgentBuilder};

use crate::{
    config::{Catalog, Region},
    model::{CatalogEntry, CatalogId},
};

pub fn agent() -> Agent {
    AgentBuilder::new()
        .user_agent("parking-crossref (+https://github.com/azoom/parking-crossref)")
        .build()
}

/// Fetches the known catalog rows for a region's city ids. The raw response
/// is cached as JSON so reruns don't hit the catalog again.
pub fn fetch(agent: &Agent, catalog: &Catalog, region: &Region) -> Result<Vec<CatalogEntry>> {
    let path = catalog.cache.join(format!("catalog-{}.json", region.slug));
    let raw: Vec<RawEntry> = if path.exists() {
        serde_json::from_str(&read_to_string(&path)?)
            .with_context(|| format!("failed to parse cache: {}", path.display()))?
    } else {
        eprintln!("Fetching catalog entries for {}...", region.sheet);
        let ids = region.city_ids.iter().join(",");
        let raw: Vec<RawEntry> = agent
            .get(&format!("{}?city_ids={ids}", catalog.url))
            .call()
            .with_context(|| format!("catalog request failed for {}", region.slug))?
            .into_json()?;

        create_dir_all(&catalog.cache)?;
        let mut json = serde_json::to_string_pretty(&raw)?;
        json.push('\n');
        write(&path, json)?;
        raw
    };

    Ok(raw.into_iter().map(RawEntry::refine).collect())
}

#[derive(Serialize, Deserialize)]
struct RawEntry {
    id: u32,
    city_id: u32,
    lat: f64,
    lng: f64,
    #[serde(flatten)]
    attrs: BTreeMap<String, Value>,
}

impl RawEntry {
    fn refine(self) -> CatalogEntry {
        CatalogEntry {
            id: CatalogId(self.id),
            city: self.city_id,
            point: Point::new(self.lng, self.lat),
            attrs: self.attrs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_entries_keep_the_opaque_payload() {
        let raw: RawEntry = serde_json::from_str(
            r#"{"id": 8, "city_id": 27102, "lat": 34.69, "lng": 135.50, "name": "北区第1", "capacity": 12}"#,
        )
        .unwrap();
        let entry = raw.refine();
        assert_eq!(entry.id, CatalogId(8));
        assert_eq!(entry.city, 27102);
        assert_eq!(entry.point.y(), 34.69);
        assert_eq!(entry.point.x(), 135.50);
        assert_eq!(entry.attrs["name"], "北区第1");
        assert_eq!(entry.attrs["capacity"], 12);
    }
}
