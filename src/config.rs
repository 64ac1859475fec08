use std::{
    collections::BTreeMap,
    fs::read_to_string,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use serde::Deserialize;
use typed_floats::tf64::NonNaN;

use crate::{classify::Bands, normalize::ColumnRule};

#[derive(Debug, Deserialize)]
pub struct Config {
    /// Source workbook with one sheet per region.
    pub source: PathBuf,
    /// Report workbook written by either mode.
    pub output: PathBuf,
    /// Directory for the insertion-ready record files (format mode).
    #[serde(default = "default_records")]
    pub records: PathBuf,
    pub catalog: Catalog,
    #[serde(default)]
    pub bands: Bands,
    /// Minimum clearance from every catalog entry (format mode), metres.
    #[serde(default = "default_min_separation")]
    pub min_separation: NonNaN,
    /// Baseline attribute values, cloned into every row before rules apply.
    #[serde(default)]
    pub defaults: BTreeMap<String, String>,
    pub rules: Vec<ColumnRule>,
    pub regions: Vec<Region>,
}

#[derive(Debug, Deserialize)]
pub struct Catalog {
    pub url: String,
    #[serde(default = "default_cache")]
    pub cache: PathBuf,
}

#[derive(Debug, Deserialize)]
pub struct Region {
    pub sheet: String,
    pub slug: String,
    pub city_ids: Vec<u32>,
    /// Accept a row in format mode only when its address contains this text.
    #[serde(default)]
    pub address_contains: Option<String>,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = read_to_string(path)
            .with_context(|| format!("failed to read config: {}", path.display()))?;
        serde_yaml::from_str(&raw)
            .with_context(|| format!("failed to parse config: {}", path.display()))
    }
}

fn default_records() -> PathBuf {
    PathBuf::from("data")
}

fn default_cache() -> PathBuf {
    PathBuf::from("cache")
}

fn default_min_separation() -> NonNaN {
    NonNaN::new(30.0).unwrap()
}
