use std::path::Path;

use super::{SheetSelector, Table, cell};
use crate::core::values::only_digits;
use crate::core::CxpError;

/// Fragment of the sheet name holding the association table.
pub const SHEET_FRAGMENT: &str = "grupo cuentas agrupacion provee";

const COL_CTA_MAYOR: &str = "CTA MAYOR";
const COL_NOMBRE_CUENTA: &str = "NOMBRE CUENTA";
const COL_TIPO_RET: &str = "TIPO RET.";
const COL_IND_RETENCION: &str = "IND.RETENCION";
const COL_DESCRIPCION: &str = "DESCRIPCION IND.RET.";
const COL_AGRUPACION: &str = "AGRUPACION CODIGO";
const COL_NOMBRE_CODIGO: &str = "NOMBRE CODIGO";

const COLUMNS: &[&str] = &[
    COL_CTA_MAYOR,
    COL_NOMBRE_CUENTA,
    COL_TIPO_RET,
    COL_IND_RETENCION,
    COL_DESCRIPCION,
    COL_AGRUPACION,
    COL_NOMBRE_CODIGO,
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AsociacionRow {
    pub cta_mayor: String,
    pub nombre_cuenta: String,
    pub tipo_ret: String,
    pub ind_retencion: String,
    pub descripcion_ind_ret: String,
    pub agrupacion_codigo: String,
    pub nombre_codigo: String,
}

/// Account / withholding-indicator association table.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AsociacionCuentaIndicador {
    rows: Vec<AsociacionRow>,
}

impl AsociacionCuentaIndicador {
    pub fn load(path: &Path) -> Result<Self, CxpError> {
        Self::from_table(&Table::read(
            path,
            SheetSelector::Containing(SHEET_FRAGMENT),
            COLUMNS,
        )?)
    }

    pub fn from_table(table: &Table) -> Result<Self, CxpError> {
        let idx: Vec<usize> = COLUMNS
            .iter()
            .map(|c| table.require(c))
            .collect::<Result<_, _>>()?;
        let rows = table
            .rows()
            .iter()
            .filter(|r| !cell(r, idx[0]).is_empty())
            .map(|r| AsociacionRow {
                cta_mayor: cell(r, idx[0]).to_string(),
                nombre_cuenta: cell(r, idx[1]).to_string(),
                tipo_ret: cell(r, idx[2]).to_string(),
                ind_retencion: cell(r, idx[3]).to_string(),
                descripcion_ind_ret: cell(r, idx[4]).to_string(),
                agrupacion_codigo: cell(r, idx[5]).to_string(),
                nombre_codigo: cell(r, idx[6]).to_string(),
            })
            .collect();
        Ok(Self { rows })
    }

    pub fn rows(&self) -> &[AsociacionRow] {
        &self.rows
    }

    /// Rows whose ledger account matches `account`, compared on digits.
    pub fn for_account(&self, account: &str) -> Vec<&AsociacionRow> {
        let wanted = only_digits(account);
        if wanted.is_empty() {
            return Vec::new();
        }
        self.rows
            .iter()
            .filter(|r| only_digits(&r.cta_mayor) == wanted)
            .collect()
    }

    pub fn contains_account(&self, account: &str) -> bool {
        !self.for_account(account).is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headers_match_without_punctuation() {
        let rows = vec![
            vec!["Cta Mayor", "Nombre cuenta", "TIPO RET", "IND RETENCION", "Descripcion ind ret", "Agrupacion codigo", "Nombre codigo"],
            vec!["1435050100", "Mercancias", "R1", "01", "Compras", "A1", "Compras generales"],
        ];
        let rows: Vec<Vec<String>> = rows
            .into_iter()
            .map(|r| r.into_iter().map(String::from).collect())
            .collect();
        let table = Table::from_rows(rows, COLUMNS).unwrap();
        let assoc = AsociacionCuentaIndicador::from_table(&table).unwrap();
        assert!(assoc.contains_account("1435050100"));
        assert!(assoc.contains_account(" 1435-050100 "));
        assert!(!assoc.contains_account("2695950020"));
        assert!(!assoc.contains_account(""));
    }
}
