//! Novelty export workbook for credit notes that could not be resolved.
//!
//! The workbook keeps one sheet. Rows already present are read back and
//! kept; a note is written once per `(NIT, Nota credito)`, its latest
//! result replacing the previous one.

use std::path::Path;

use rust_xlsxwriter::{Format, Workbook};
use tracing::info;

use crate::core::values::format_decimal;
use crate::core::{CxpError, InvoiceHeader};
use crate::masters::{SheetSelector, Table};

pub const EXPORT_SHEET: &str = "Novedades NC";

pub const EXPORT_COLUMNS: [&str; 8] = [
    "ID",
    "NIT",
    "Nota credito",
    "Factura referenciada",
    "Fecha emision",
    "Valor",
    "Resultado",
    "Observacion",
];

const NIT_COLUMN: usize = 1;
const NOTE_COLUMN: usize = 2;

fn export_row(note: &InvoiceHeader) -> Vec<String> {
    vec![
        note.id.to_string(),
        note.supplier_tax_id.trim().to_string(),
        note.invoice_number.trim().to_string(),
        note.referenced_invoice.clone().unwrap_or_default(),
        note.issue_date.map(|d| d.to_string()).unwrap_or_default(),
        note.amount_to_pay.map(format_decimal).unwrap_or_default(),
        note.final_result_pre_events.clone().unwrap_or_default(),
        note.phase4_observation.clone().unwrap_or_default(),
    ]
}

fn same_note(a: &[String], b: &[String]) -> bool {
    let cell = |row: &[String], i: usize| row.get(i).map(|c| c.trim().to_string());
    cell(a, NIT_COLUMN) == cell(b, NIT_COLUMN) && cell(a, NOTE_COLUMN) == cell(b, NOTE_COLUMN)
}

/// Rows of an existing export, reordered to [`EXPORT_COLUMNS`].
pub fn read_export(path: &Path) -> Result<Vec<Vec<String>>, CxpError> {
    if !path.is_file() {
        return Ok(Vec::new());
    }
    let table = Table::read(path, SheetSelector::Named(EXPORT_SHEET), &EXPORT_COLUMNS)
        .map_err(|e| CxpError::Export(e.to_string()))?;
    let columns = EXPORT_COLUMNS
        .iter()
        .map(|c| table.require(c))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| CxpError::Export(e.to_string()))?;
    Ok(table
        .rows()
        .iter()
        .map(|row| {
            columns
                .iter()
                .map(|&i| row.get(i).cloned().unwrap_or_default())
                .collect()
        })
        .collect())
}

/// Merge `notes` into the workbook at `path`, creating it when missing.
/// Returns the number of data rows written.
pub fn append_unresolved(path: &Path, notes: &[InvoiceHeader]) -> Result<usize, CxpError> {
    let mut rows = read_export(path)?;
    for note in notes {
        let row = export_row(note);
        match rows.iter_mut().find(|r| same_note(r, &row)) {
            Some(existing) => *existing = row,
            None => rows.push(row),
        }
    }

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let mut workbook = Workbook::new();
    let bold = Format::new().set_bold();
    let sheet = workbook.add_worksheet();
    sheet.set_name(EXPORT_SHEET)?;
    for (col, title) in EXPORT_COLUMNS.iter().enumerate() {
        sheet.write_string_with_format(0, col as u16, *title, &bold)?;
    }
    for (r, row) in rows.iter().enumerate() {
        for (col, value) in row.iter().enumerate() {
            sheet.write_string(r as u32 + 1, col as u16, value)?;
        }
    }
    workbook.save(path)?;
    info!(path = %path.display(), rows = rows.len(), added = notes.len(), "novelty export written");
    Ok(rows.len())
}
