use std::collections::BTreeMap;

use anyhow::{bail, Context, Result};
use geo::Point;
use serde::Deserialize;

use crate::{
    model::{CrawlId, Observation},
    workbook::RawRow,
};

/// Spreadsheet column addressed by letter (`B`, `D`, `AA`), held as a
/// zero-based index. Validated when the config is parsed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub struct Column(pub usize);

impl TryFrom<String> for Column {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self> {
        let mut index = 0;
        for c in value.trim().chars() {
            if !c.is_ascii_alphabetic() {
                bail!("invalid column letter: {value}");
            }
            index = index * 26 + (c.to_ascii_uppercase() as usize - 'A' as usize + 1);
        }
        if index == 0 {
            bail!("empty column");
        }

        Ok(Column(index - 1))
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct ColumnRule {
    pub column: Column,
    #[serde(flatten)]
    pub kind: RuleKind,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(tag = "rule", rename_all = "kebab-case")]
pub enum RuleKind {
    /// Crawled listing id; an unparsable cell degrades to id 0.
    Id,
    /// Required `"lat,lng"` cell. The only rule whose failure fails the row.
    Location,
    Text {
        key: String,
    },
    Number {
        key: String,
    },
    Class {
        key: String,
        classes: BTreeMap<String, String>,
        #[serde(default = "default_fallback")]
        fallback: String,
    },
}

impl RuleKind {
    pub fn key(&self) -> Option<&str> {
        match self {
            Self::Id | Self::Location => None,
            Self::Text { key } | Self::Number { key } => Some(key),
            Self::Class { key, .. } => Some(key),
        }
    }
}

fn default_fallback() -> String {
    "unknown".to_string()
}

pub fn observation(
    row: &RawRow,
    rules: &[ColumnRule],
    defaults: &BTreeMap<String, String>,
) -> Result<Observation> {
    // the shared defaults are cloned per row, never mutated in place
    let mut attrs = defaults.clone();
    let mut id = None;
    let mut point = None;

    for rule in rules {
        let cell = row.cell(rule.column.0).trim();
        match &rule.kind {
            RuleKind::Id => id = cell.parse().ok().map(CrawlId),
            RuleKind::Location => point = parse_location(cell),
            RuleKind::Text { key } => {
                if !cell.is_empty() {
                    attrs.insert(key.clone(), cell.to_string());
                }
            }
            RuleKind::Number { key } => {
                if let Ok(x) = cell.parse::<f64>() {
                    attrs.insert(key.clone(), x.to_string());
                } else if !attrs.contains_key(key) {
                    attrs.insert(key.clone(), "0".to_string());
                }
            }
            RuleKind::Class {
                key,
                classes,
                fallback,
            } => {
                let value = classes.get(cell).cloned().unwrap_or_else(|| fallback.clone());
                attrs.insert(key.clone(), value);
            }
        }
    }

    let point = point
        .with_context(|| format!("row {}: missing or malformed coordinate cell", row.number))?;

    Ok(Observation {
        row: row.number,
        id: id.unwrap_or(CrawlId(0)),
        point,
        attrs,
    })
}

fn parse_location(cell: &str) -> Option<Point> {
    let (lat, lng) = cell.split_once(',')?;
    let lat: f64 = lat.trim().parse().ok()?;
    let lng: f64 = lng.trim().parse().ok()?;
    Some(Point::new(lng, lat))
}
