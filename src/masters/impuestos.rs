use std::collections::HashMap;
use std::path::Path;

use super::{SheetSelector, Table, cell};
use crate::core::values::only_digits;
use crate::core::CxpError;

pub const SHEET_NAME: &str = "IVA CECO";

const COL_CECO: &str = "CECO";
const COL_INDICADORES: &str = "Codigo Ind. Iva aplicable";

/// `IVA CECO` sheet: allowed VAT indicators per cost center.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ImpuestosEspeciales {
    by_ceco: HashMap<String, Vec<String>>,
}

fn ceco_key(raw: &str) -> String {
    let digits = only_digits(raw);
    let trimmed = digits.trim_start_matches('0');
    if trimmed.is_empty() && !digits.is_empty() {
        "0".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Split `H4-H5` style sets; a single code is a one-element set.
fn split_indicators(raw: &str) -> Vec<String> {
    raw.split('-')
        .map(|c| c.trim().to_ascii_uppercase())
        .filter(|c| !c.is_empty())
        .collect()
}

impl ImpuestosEspeciales {
    pub fn load(path: &Path) -> Result<Self, CxpError> {
        Self::from_table(&Table::read(
            path,
            SheetSelector::Named(SHEET_NAME),
            &[COL_CECO, COL_INDICADORES],
        )?)
    }

    pub fn from_table(table: &Table) -> Result<Self, CxpError> {
        let ceco = table.require(COL_CECO)?;
        let indicators = table.require(COL_INDICADORES)?;
        let mut by_ceco: HashMap<String, Vec<String>> = HashMap::new();
        for row in table.rows() {
            let key = ceco_key(cell(row, ceco));
            if key.is_empty() {
                continue;
            }
            let entry = by_ceco.entry(key).or_default();
            for code in split_indicators(cell(row, indicators)) {
                if !entry.contains(&code) {
                    entry.push(code);
                }
            }
        }
        Ok(Self { by_ceco })
    }

    /// Allowed indicators of a cost center, `None` when it is not listed.
    pub fn allowed_indicators(&self, cost_center: &str) -> Option<&[String]> {
        self.by_ceco.get(&ceco_key(cost_center)).map(Vec::as_slice)
    }

    pub fn allows(&self, cost_center: &str, indicator: &str) -> bool {
        let indicator = indicator.trim().to_ascii_uppercase();
        self.allowed_indicators(cost_center)
            .is_some_and(|set| set.contains(&indicator))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn impuestos() -> ImpuestosEspeciales {
        let rows: Vec<Vec<String>> = [["CECO", "Código Ind. Iva aplicable"], ["10010", "H4-H5"], ["20020", "VP"]]
            .iter()
            .map(|r| r.iter().map(|c| c.to_string()).collect())
            .collect();
        let table = Table::from_rows(rows, &[COL_CECO, COL_INDICADORES]).unwrap();
        ImpuestosEspeciales::from_table(&table).unwrap()
    }

    #[test]
    fn dash_separated_sets() {
        let imp = impuestos();
        assert!(imp.allows("10010", "h5"));
        assert!(imp.allows("0010010", "H4"));
        assert!(!imp.allows("10010", "VP"));
        assert!(imp.allows("20020", "VP"));
        assert_eq!(imp.allowed_indicators("99999"), None);
    }
}
