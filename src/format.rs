use std::{
    collections::{BTreeMap, BTreeSet},
    fs::{create_dir_all, write},
};

use anyhow::Result;
use geo::Point;
use itertools::Itertools;
use rust_xlsxwriter::Workbook;
use serde::Serialize;
use ureq::Agent;

use crate::{
    catalog, classify,
    config::{Config, Region},
    model::{CrawlId, Observation},
    normalize, workbook,
};

/// One insertion-ready parking record. Primary fields are fixed by the first
/// observation with this id; later observations only ever add spaces.
#[derive(Debug, Serialize)]
pub struct ParkingRecord {
    pub id: CrawlId,
    #[serde(flatten)]
    pub point: Point,
    pub attrs: BTreeMap<String, String>,
    pub spaces: Vec<Space>,
}

#[derive(Debug, Serialize)]
pub struct Space {
    pub name: String,
    pub visible: bool,
}

/// Format mode: drop near-duplicates of the catalog, then emit the surviving
/// listings as a deduplicated record set (sheet + JSON file per region).
pub fn run(config: &Config) -> Result<()> {
    let agent = catalog::agent();
    let mut out = Workbook::new();

    for region in &config.regions {
        if let Err(e) = run_region(config, region, &agent, &mut out) {
            eprintln!("{}: region failed: {e:#}", region.sheet);
        }
    }

    out.save(&config.output)?;
    Ok(())
}

fn run_region(
    config: &Config,
    region: &Region,
    agent: &Agent,
    out: &mut Workbook,
) -> Result<()> {
    let rows = workbook::read_rows(&config.source, &region.sheet)?;

    let mut observations = Vec::new();
    let mut skipped = 0;
    for row in &rows {
        match normalize::observation(row, &config.rules, &config.defaults) {
            Ok(x) => observations.push(x),
            Err(e) => {
                skipped += 1;
                eprintln!("{}: skipped: {e:#}", region.sheet);
            }
        }
    }

    let candidates = catalog::fetch(agent, &config.catalog, region)?;
    let min = f64::from(config.min_separation);
    let total = observations.len();
    observations.retain(|x| classify::separated(&x.point, &candidates, min));

    let records = records(&observations, region.address_contains.as_deref());

    let keys = attribute_keys(config);
    let name = if config.regions.len() == 1 {
        "new".to_string()
    } else {
        format!("{} new", region.sheet)
    };
    workbook::write_sheet(out, &name, &sheet_rows(&records, &keys))?;

    create_dir_all(&config.records)?;
    let path = config.records.join(format!("records-{}.json", region.slug));
    let mut json = serde_json::to_string_pretty(&records)?;
    json.push('\n');
    write(path, json)?;

    println!("# {}", region.sheet);
    println!("- {} rows, {} skipped", rows.len(), skipped);
    println!("- {} candidates", candidates.len());
    println!(
        "- {} of {total} kept by the {min}m separation filter",
        observations.len()
    );
    println!("- {} records", records.len());
    println!();

    Ok(())
}

/// Groups observations by crawl id in row order. The first occurrence owns
/// the primary record and the visible `p1` space; every later occurrence
/// appends the next sequential space, not visible.
pub fn records(observations: &[Observation], address_contains: Option<&str>) -> Vec<ParkingRecord> {
    let mut records: Vec<ParkingRecord> = Vec::new();
    for observation in observations {
        if let Some(needle) = address_contains {
            let address = observation.attrs.get("address");
            if !address.is_some_and(|x| x.contains(needle)) {
                continue;
            }
        }

        if let Some(record) = records.iter_mut().find(|x| x.id == observation.id) {
            let name = format!("p{}", record.spaces.len() + 1);
            record.spaces.push(Space {
                name,
                visible: false,
            });
        } else {
            records.push(ParkingRecord {
                id: observation.id,
                point: observation.point,
                attrs: observation.attrs.clone(),
                spaces: vec![Space {
                    name: "p1".to_string(),
                    visible: true,
                }],
            });
        }
    }

    records
}

fn attribute_keys(config: &Config) -> Vec<String> {
    let mut keys: BTreeSet<String> = config.defaults.keys().cloned().collect();
    for rule in &config.rules {
        if let Some(key) = rule.kind.key() {
            keys.insert(key.to_string());
        }
    }
    keys.into_iter().collect()
}

fn sheet_rows(records: &[ParkingRecord], keys: &[String]) -> Vec<Vec<String>> {
    let mut header = vec!["id".to_string()];
    header.extend(keys.iter().cloned());
    header.push("spaces".to_string());

    let mut rows = vec![header];
    for record in records {
        let mut row = vec![record.id.0.to_string()];
        for key in keys {
            row.push(record.attrs.get(key).cloned().unwrap_or_default());
        }
        row.push(record.spaces.iter().map(|x| &*x.name).join("\n"));
        rows.push(row);
    }

    rows
}
