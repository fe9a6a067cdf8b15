//! Excel master files.
//!
//! The engine only reads these workbooks. Each one is loaded once per
//! battery into an immutable in-memory table; a missing file, sheet or
//! column is a fatal [`CxpError::Master`].

mod asociacion;
mod impuestos;
mod maestro;

use std::path::Path;

use calamine::{Data, Reader, open_workbook_auto};
use rust_decimal::Decimal;

use crate::core::CxpError;
use crate::core::values::compact_key;

pub use asociacion::{AsociacionCuentaIndicador, AsociacionRow};
pub use impuestos::ImpuestosEspeciales;
pub use maestro::{MaestroComercializados, MaestroRow};

/// Rows scanned when looking for the header row.
const HEADER_SCAN_ROWS: usize = 10;

/// Which sheet of a workbook to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SheetSelector<'a> {
    /// The first sheet.
    First,
    /// Sheet whose normalized name equals the given one.
    Named(&'a str),
    /// First sheet whose normalized name contains the given fragment.
    Containing(&'a str),
}

impl SheetSelector<'_> {
    fn pick(&self, names: &[String]) -> Option<String> {
        match self {
            Self::First => names.first().cloned(),
            Self::Named(wanted) => {
                let wanted = compact_key(wanted);
                names.iter().find(|n| compact_key(n) == wanted).cloned()
            }
            Self::Containing(fragment) => {
                let fragment = compact_key(fragment);
                names.iter().find(|n| compact_key(n).contains(&fragment)).cloned()
            }
        }
    }
}

/// A sheet as text cells, with its header row located.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Table {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Table {
    /// Build from raw rows, taking the first row within the scan window
    /// that contains every `required` column as the header.
    pub fn from_rows(raw: Vec<Vec<String>>, required: &[&str]) -> Result<Self, CxpError> {
        let wanted: Vec<String> = required.iter().map(|c| compact_key(c)).collect();
        let header_at = raw.iter().take(HEADER_SCAN_ROWS).position(|row| {
            let keys: Vec<String> = row.iter().map(|c| compact_key(c)).collect();
            wanted.iter().all(|w| keys.contains(w))
        });
        let Some(header_at) = header_at else {
            let found = raw.first().map(|r| r.join(", ")).unwrap_or_default();
            return Err(CxpError::Master(format!(
                "missing columns {required:?} (first row: {found})"
            )));
        };
        let mut rows = raw;
        let headers = rows.remove(header_at);
        rows.drain(..header_at);
        rows.retain(|r| r.iter().any(|c| !c.trim().is_empty()));
        Ok(Self {
            headers: headers.into_iter().map(|h| h.trim().to_string()).collect(),
            rows,
        })
    }

    /// Read one sheet of a workbook.
    pub fn read(
        path: &Path,
        sheet: SheetSelector<'_>,
        required: &[&str],
    ) -> Result<Self, CxpError> {
        if !path.is_file() {
            return Err(CxpError::Master(format!("{} does not exist", path.display())));
        }
        let mut workbook = open_workbook_auto(path)?;
        let names = workbook.sheet_names();
        let name = sheet.pick(&names).ok_or_else(|| {
            CxpError::Master(format!(
                "{}: no sheet matching {sheet:?} (sheets: {})",
                path.display(),
                names.join(", ")
            ))
        })?;
        let range = workbook.worksheet_range(&name)?;
        let raw: Vec<Vec<String>> = range
            .rows()
            .map(|row| row.iter().map(cell_text).collect())
            .collect();
        Self::from_rows(raw, required)
            .map_err(|e| CxpError::Master(format!("{} [{name}]: {e}", path.display())))
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    /// Index of a column, matched ignoring case, diacritics and punctuation.
    pub fn column(&self, name: &str) -> Option<usize> {
        let wanted = compact_key(name);
        self.headers.iter().position(|h| compact_key(h) == wanted)
    }

    pub fn require(&self, name: &str) -> Result<usize, CxpError> {
        self.column(name)
            .ok_or_else(|| CxpError::Master(format!("missing column '{name}'")))
    }
}

/// Text of a cell; integral floats lose their `.0`.
pub fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.trim().to_string(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", *f as i64),
        Data::Float(f) => Decimal::try_from(*f)
            .map(|d| d.normalize().to_string())
            .unwrap_or_else(|_| f.to_string()),
        Data::Bool(b) => b.to_string(),
        Data::DateTimeIso(s) | Data::DurationIso(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Cell of `row` at `col`, empty when the row is short.
pub(crate) fn cell(row: &[String], col: usize) -> &str {
    row.get(col).map(|s| s.trim()).unwrap_or_default()
}
