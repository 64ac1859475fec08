use std::path::Path;

use anyhow::{Context, Result};
use calamine::{open_workbook_auto, DataType, Reader};
use rust_xlsxwriter::Workbook;

/// One raw sheet row: absolute 1-based row number, cells aligned to column A.
pub struct RawRow {
    pub number: u32,
    pub cells: Vec<String>,
}

impl RawRow {
    pub fn cell(&self, index: usize) -> &str {
        self.cells.get(index).map(String::as_str).unwrap_or("")
    }
}

/// Reads one sheet's data rows. Row 1 is the header and is skipped by its
/// position, never by its contents; fully empty rows are dropped.
pub fn read_rows(path: &Path, sheet: &str) -> Result<Vec<RawRow>> {
    let mut book = open_workbook_auto(path)
        .with_context(|| format!("failed to open workbook: {}", path.display()))?;
    let range = book
        .worksheet_range(sheet)
        .with_context(|| format!("sheet not found: {sheet}"))?
        .with_context(|| format!("failed to read sheet: {sheet}"))?;

    let Some((start_row, start_col)) = range.start() else {
        return Ok(Vec::new());
    };

    let mut rows = Vec::new();
    for (i, row) in range.rows().enumerate() {
        let number = start_row + i as u32 + 1;
        if number == 1 {
            continue;
        }

        // pad so rule columns address absolute positions
        let mut cells = vec![String::new(); start_col as usize];
        cells.extend(row.iter().map(cell_text));
        if cells.iter().all(|x| x.is_empty()) {
            continue;
        }

        rows.push(RawRow { number, cells });
    }

    Ok(rows)
}

fn cell_text(cell: &DataType) -> String {
    match cell {
        DataType::Empty => String::new(),
        _ => cell.to_string().trim().to_string(),
    }
}

pub fn write_sheet(book: &mut Workbook, name: &str, rows: &[Vec<String>]) -> Result<()> {
    let sheet = book.add_worksheet();
    sheet
        .set_name(name)
        .with_context(|| format!("invalid sheet name: {name}"))?;

    for (r, row) in rows.iter().enumerate() {
        for (c, value) in row.iter().enumerate() {
            sheet.write_string(r as u32, c as u16, value)?;
        }
    }

    Ok(())
}
