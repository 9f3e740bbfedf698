//! Spreadsheet import/export. Export writes a single "Dados" sheet with one
//! row per leaf metric series; import accepts `.xlsx`/`.xls` and tolerates
//! malformed rows by skipping them (the codec re-validates the domain).

use std::path::Path;

use calamine::{open_workbook_auto, Data, Reader};
use rust_xlsxwriter::Workbook;
use tracing::{debug, info};

use crate::codec::{encode, SheetRow};
use crate::errors::{AppError, AppResult};
use crate::model::{AppState, WEEKS_PER_MONTH};
use crate::numeric;

pub const SHEET_NAME: &str = "Dados";

pub const HEADERS: [&str; 12] = [
    "Segmento",
    "Ano",
    "Mês (Index)",
    "Categoria",
    "SubCategoria",
    "Item",
    "Métrica",
    "Sem 1",
    "Sem 2",
    "Sem 3",
    "Sem 4",
    "Sem 5",
];

const KEY_COLUMNS: usize = 7;

pub fn write_workbook(state: &AppState, path: &Path) -> AppResult<()> {
    let rows = encode(state);
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    sheet.set_name(SHEET_NAME)?;

    for (col, header) in HEADERS.iter().enumerate() {
        sheet.write_string(0, col as u16, *header)?;
    }
    for (index, row) in rows.iter().enumerate() {
        let excel_row = (index + 1) as u32;
        sheet.write_string(excel_row, 0, row.segment.as_str())?;
        sheet.write_number(excel_row, 1, row.year as f64)?;
        sheet.write_number(excel_row, 2, row.month as f64)?;
        sheet.write_string(excel_row, 3, row.category.as_str())?;
        sheet.write_string(excel_row, 4, row.subcategory.as_str())?;
        sheet.write_string(excel_row, 5, row.item.as_str())?;
        sheet.write_string(excel_row, 6, row.metric.as_str())?;
        for (week, value) in row.weeks.iter().enumerate() {
            sheet.write_number(excel_row, (KEY_COLUMNS + week) as u16, *value)?;
        }
    }

    workbook.save(path)?;
    info!(target: "workbook", rows = rows.len(), path = %path.display(), "exported workbook");
    Ok(())
}

/// Reads the first sheet into flat rows. The header row and rows with too
/// few columns or unreadable keys are skipped.
pub fn read_workbook(path: &Path) -> AppResult<Vec<SheetRow>> {
    let mut workbook = open_workbook_auto(path)?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| AppError::Import("workbook has no sheets".into()))??;

    let mut rows = Vec::new();
    for (index, cells) in range.rows().enumerate() {
        if index == 0 {
            continue;
        }
        match parse_row(cells) {
            Some(row) => rows.push(row),
            None => debug!(target: "workbook", row = index, "skipping malformed row"),
        }
    }
    info!(target: "workbook", rows = rows.len(), path = %path.display(), "imported workbook");
    Ok(rows)
}

fn parse_row(cells: &[Data]) -> Option<SheetRow> {
    if cells.len() < 8 {
        return None;
    }
    let segment = cell_text(&cells[0])?;
    let year = cell_integer(&cells[1])?;
    let month = cell_integer(&cells[2])?;
    let category = cell_text(&cells[3]).unwrap_or_default();
    let subcategory = cell_text(&cells[4]).unwrap_or_default();
    let item = cell_text(&cells[5]).unwrap_or_default();
    let metric = cell_text(&cells[6]).unwrap_or_default();

    let mut weeks = [0.0; WEEKS_PER_MONTH];
    for (week, slot) in weeks.iter_mut().enumerate() {
        if let Some(cell) = cells.get(KEY_COLUMNS + week) {
            *slot = cell_number(cell);
        }
    }

    Some(SheetRow {
        segment,
        year,
        month,
        category,
        subcategory,
        item,
        metric,
        weeks,
    })
}

fn cell_text(cell: &Data) -> Option<String> {
    match cell {
        Data::String(text) => {
            let trimmed = text.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        }
        Data::Int(value) => Some(value.to_string()),
        Data::Float(value) => Some(trim_float(*value)),
        _ => None,
    }
}

fn cell_integer(cell: &Data) -> Option<i64> {
    match cell {
        Data::Int(value) => Some(*value),
        Data::Float(value) => Some(*value as i64),
        Data::String(text) => text.trim().parse::<i64>().ok(),
        _ => None,
    }
}

/// Week cells may arrive as numbers or locale-formatted text; garbage
/// coerces to 0 like everywhere else.
fn cell_number(cell: &Data) -> f64 {
    match cell {
        Data::Int(value) => *value as f64,
        Data::Float(value) => *value,
        Data::String(text) => numeric::parse_text(text),
        _ => 0.0,
    }
}

fn trim_float(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}
