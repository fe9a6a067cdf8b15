use std::path::Path;

use rust_decimal::Decimal;

use super::{SheetSelector, Table, cell};
use crate::core::values::parse_decimal;
use crate::core::CxpError;

const COL_OC: &str = "OC";
const COL_FACTURA: &str = "FACTURA";
const COL_VALOR_TOTAL: &str = "VALOR TOTAL OC";
const COL_POSICION: &str = "POSICION";
const COL_UNITARIO: &str = "POR CALCULAR (VALOR UNITARIO)";
const COL_ME: &str = "POR CALCULAR (ME)";

const COLUMNS: &[&str] = &[
    COL_OC,
    COL_FACTURA,
    COL_VALOR_TOTAL,
    COL_POSICION,
    COL_UNITARIO,
    COL_ME,
];

/// One row of the Maestro de Comercializados.
#[derive(Debug, Clone, PartialEq)]
pub struct MaestroRow {
    pub oc: String,
    pub factura: String,
    pub valor_total_oc: Option<Decimal>,
    pub posicion: String,
    pub por_calcular_unitario: Option<Decimal>,
    pub por_calcular_me: Option<Decimal>,
}

impl MaestroRow {
    /// Whether the foreign-currency amount is the one to compare.
    pub fn uses_me(&self) -> bool {
        self.por_calcular_me.is_some_and(|me| me > Decimal::ZERO)
    }

    /// ME when positive, otherwise the unit amount.
    pub fn chosen_amount(&self) -> Decimal {
        if self.uses_me() {
            self.por_calcular_me.unwrap_or_default()
        } else {
            self.por_calcular_unitario.unwrap_or_default()
        }
    }
}

/// Maestro de Comercializados, indexed by `(OC, FACTURA)`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MaestroComercializados {
    rows: Vec<MaestroRow>,
}

impl MaestroComercializados {
    pub fn load(path: &Path) -> Result<Self, CxpError> {
        Self::from_table(&Table::read(path, SheetSelector::First, COLUMNS)?)
    }

    pub fn from_table(table: &Table) -> Result<Self, CxpError> {
        let oc = table.require(COL_OC)?;
        let factura = table.require(COL_FACTURA)?;
        let total = table.require(COL_VALOR_TOTAL)?;
        let posicion = table.require(COL_POSICION)?;
        let unit = table.require(COL_UNITARIO)?;
        let me = table.require(COL_ME)?;
        let rows = table
            .rows()
            .iter()
            .filter(|r| !cell(r, oc).is_empty())
            .map(|r| MaestroRow {
                oc: cell(r, oc).to_string(),
                factura: cell(r, factura).to_string(),
                valor_total_oc: parse_decimal(cell(r, total)),
                posicion: cell(r, posicion).to_string(),
                por_calcular_unitario: parse_decimal(cell(r, unit)),
                por_calcular_me: parse_decimal(cell(r, me)),
            })
            .collect();
        Ok(Self { rows })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows of `(oc, factura)`, in sheet order.
    pub fn lookup(&self, oc: &str, factura: &str) -> Vec<&MaestroRow> {
        let (oc, factura) = (oc.trim(), factura.trim());
        self.rows
            .iter()
            .filter(|r| r.oc.eq_ignore_ascii_case(oc) && r.factura.eq_ignore_ascii_case(factura))
            .collect()
    }
}
