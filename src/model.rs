use std::collections::BTreeMap;

use geo::Point;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Id of a crawled listing on the source site.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CrawlId(pub u32);

impl CrawlId {
    pub fn link(&self) -> String {
        format!("https://p-king.jp/detail/{}", self.0)
    }
}

/// Id of an existing row in the admin catalog.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CatalogId(pub u32);

impl CatalogId {
    pub fn link(&self) -> String {
        format!(
            "https://admin-hs.carparking.jp/admin/search/edit.php?p_id={}",
            self.0
        )
    }
}

/// One normalized crawled row. Immutable once built.
#[derive(Clone, Debug)]
pub struct Observation {
    pub row: u32,
    pub id: CrawlId,
    pub point: Point,
    pub attrs: BTreeMap<String, String>,
}

/// One known location from the catalog, read-only for the whole run.
#[derive(Clone, Debug)]
pub struct CatalogEntry {
    pub id: CatalogId,
    pub city: u32,
    pub point: Point,
    pub attrs: BTreeMap<String, Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_render_detail_and_admin_links() {
        assert_eq!(CrawlId(42).link(), "https://p-king.jp/detail/42");
        assert_eq!(
            CatalogId(7).link(),
            "https://admin-hs.carparking.jp/admin/search/edit.php?p_id=7"
        );
    }
}
