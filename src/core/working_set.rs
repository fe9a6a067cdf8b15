use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::values::format_decimal;

/// Origin of a working-set column, kept as a suffix on the column name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Provenance {
    /// Invoice header (`_dp`).
    Header,
    /// Invoice detail (`_ddp`).
    Detail,
    /// Purchase-order history (`_hoc`).
    History,
}

impl Provenance {
    pub fn suffix(&self) -> &'static str {
        match self {
            Self::Header => "_dp",
            Self::Detail => "_ddp",
            Self::History => "_hoc",
        }
    }

    pub fn from_suffix(suffix: &str) -> Option<Self> {
        match suffix {
            "_dp" => Some(Self::Header),
            "_ddp" => Some(Self::Detail),
            "_hoc" => Some(Self::History),
            _ => None,
        }
    }
}

/// Typed value of a working-set column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FieldValue {
    Null,
    Text(String),
    Amount(Decimal),
    Integer(i64),
}

impl FieldValue {
    pub fn text(value: Option<&str>) -> Self {
        match value {
            Some(v) => Self::Text(v.to_string()),
            None => Self::Null,
        }
    }

    pub fn amount(value: Option<Decimal>) -> Self {
        value.map_or(Self::Null, Self::Amount)
    }

    /// Stringified form written at the persistence boundary.
    pub fn render(&self) -> Option<String> {
        match self {
            Self::Null => None,
            Self::Text(s) => Some(s.clone()),
            Self::Amount(d) => Some(format_decimal(*d)),
            Self::Integer(i) => Some(i.to_string()),
        }
    }
}

/// One column of a candidate row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateField {
    pub name: String,
    pub provenance: Provenance,
    pub value: FieldValue,
}

impl CandidateField {
    pub fn new(name: impl Into<String>, provenance: Provenance, value: FieldValue) -> Self {
        Self {
            name: name.into(),
            provenance,
            value,
        }
    }

    /// Column name with its provenance suffix (`Factura_dp`).
    pub fn column(&self) -> String {
        format!("{}{}", self.name, self.provenance.suffix())
    }
}

/// A row of `CandidatesForValidation` as persisted each run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateRecord {
    pub id_registro: i64,
    pub nit: String,
    pub factura: String,
    pub fields: Vec<CandidateField>,
}

impl CandidateRecord {
    /// Value of a column by suffixed name.
    pub fn get(&self, column: &str) -> Option<&FieldValue> {
        self.fields
            .iter()
            .find(|f| f.column() == column)
            .map(|f| &f.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn columns_carry_provenance() {
        let field = CandidateField::new("PorCalcular", Provenance::History, FieldValue::Text("500|500".into()));
        assert_eq!(field.column(), "PorCalcular_hoc");
        let record = CandidateRecord {
            id_registro: 1,
            nit: "800111".into(),
            factura: "F1".into(),
            fields: vec![field],
        };
        assert_eq!(
            record.get("PorCalcular_hoc").and_then(FieldValue::render).as_deref(),
            Some("500|500")
        );
        assert!(record.get("PorCalcular_dp").is_none());
    }

    #[test]
    fn amounts_render_without_trailing_zeros() {
        assert_eq!(FieldValue::Amount(dec!(1000.00)).render().as_deref(), Some("1000"));
        assert_eq!(FieldValue::Null.render(), None);
    }
}
