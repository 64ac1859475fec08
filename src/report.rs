use std::collections::BTreeMap;

use anyhow::Result;
use itertools::Itertools;
use rust_xlsxwriter::Workbook;
use ureq::Agent;

use crate::{
    catalog,
    classify::{self, ClassificationResult},
    config::{Config, Region},
    normalize,
    workbook::{self, RawRow},
};

/// Classify mode: one report workbook, one sheet per non-empty tier.
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
    let groups = classify::classify_batch(&observations, &candidates, &config.bands);

    let by_number: BTreeMap<u32, &RawRow> = rows.iter().map(|x| (x.number, x)).collect();
    for (tier, results) in groups.iter().rev() {
        let label = config.bands.label(*tier);
        let name = if config.regions.len() == 1 {
            label
        } else {
            format!("{} {label}", region.sheet)
        };
        let rows: Vec<Vec<String>> = results
            .iter()
            .map(|x| report_row(by_number[&x.row], x))
            .collect();
        workbook::write_sheet(out, &name, &rows)?;
    }

    println!("# {}", region.sheet);
    println!("- {} rows, {} skipped", rows.len(), skipped);
    println!("- {} candidates", candidates.len());
    for (tier, results) in groups.iter().rev() {
        println!("- {}: {}", config.bands.label(*tier), results.len());
    }
    println!();

    Ok(())
}

/// Original cells plus the listing link, the matched admin links and the
/// matched distances, multi-match cells newline-joined.
fn report_row(row: &RawRow, result: &ClassificationResult) -> Vec<String> {
    let mut cells = row.cells.clone();
    cells.push(result.id.link());
    cells.push(result.matches.iter().map(|x| x.catalog.link()).join("\n"));
    cells.push(
        result
            .matches
            .iter()
            .map(|x| format!("{:.1}m", x.distance))
            .join("\n"),
    );
    cells
}

#[cfg(test)]
mod tests {
    use crate::{
        classify::{Match, Tier},
        model::{CatalogId, CrawlId},
    };

    use super::*;

    #[test]
    fn report_rows_append_links_and_distances() {
        let row = RawRow {
            number: 2,
            cells: vec!["".to_string(), "1042".to_string()],
        };
        let result = ClassificationResult {
            row: 2,
            id: CrawlId(1042),
            tier: Tier::Exist,
            matches: vec![
                Match {
                    catalog: CatalogId(7),
                    distance: 3.25,
                },
                Match {
                    catalog: CatalogId(9),
                    distance: 8.5,
                },
            ],
        };

        let cells = report_row(&row, &result);
        assert_eq!(cells[2], "https://p-king.jp/detail/1042");
        assert_eq!(
            cells[3],
            "https://admin-hs.carparking.jp/admin/search/edit.php?p_id=7\n\
             https://admin-hs.carparking.jp/admin/search/edit.php?p_id=9"
        );
        assert_eq!(cells[4], "3.2m\n8.5m");
    }
}
