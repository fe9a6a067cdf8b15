//! Decoding of multi-position SAP fields.
//!
//! SAP history stores one row per purchase order; every per-position field is
//! a parallel array joined with `|` (some code fields use `,`). A field with a
//! single value applies to every position.

use rust_decimal::Decimal;

use super::error::CxpError;
use super::types::{HistoryRow, MARK_PROCESSED, PoPosition};
use super::values::{format_decimal, parse_decimal};

/// Separator used when stringifying per-position values.
pub const POSITION_SEPARATOR: char = '|';

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FieldKind {
    /// Amounts split on `|` only: `,` is the decimal separator.
    Amount,
    /// Codes split on `|`, or on `,` when no pipe is present.
    Code,
    /// Free text split on `|` only.
    Text,
}

fn split_field(raw: &str, kind: FieldKind) -> Vec<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Vec::new();
    }
    let parts: Vec<&str> = if raw.contains(POSITION_SEPARATOR) {
        raw.split(POSITION_SEPARATOR).collect()
    } else if kind == FieldKind::Code && raw.contains(',') {
        raw.split(',').collect()
    } else {
        vec![raw]
    };
    parts.into_iter().map(|p| p.trim().to_string()).collect()
}

/// Per-position value; a lone value is shared by every position.
fn value_at(values: &[String], index: usize) -> Option<String> {
    let value = if values.len() == 1 {
        values.first()
    } else {
        values.get(index)
    };
    value.filter(|v| !v.is_empty()).cloned()
}

/// Per-position slot without broadcasting: a lone value belongs to the
/// first position only.
fn slot_at(values: &[String], index: usize) -> Option<String> {
    values.get(index).filter(|v| !v.is_empty()).cloned()
}

fn amount_at(values: &[String], index: usize, field: &str) -> Result<Option<Decimal>, CxpError> {
    match value_at(values, index) {
        None => Ok(None),
        Some(raw) => parse_decimal(&raw).map(Some).ok_or_else(|| {
            CxpError::Data(format!("{field} position {index}: '{raw}' is not a number"))
        }),
    }
}

/// Expand one SAP history row into its positions, in stored order.
///
/// The position count comes from the position field, or from the amount
/// field when positions are blank. Every position needs a `por_calcular`.
pub fn expand_positions(row: &HistoryRow) -> Result<Vec<PoPosition>, CxpError> {
    let indices = split_field(&row.positions, FieldKind::Code);
    let amounts = split_field(&row.por_calcular, FieldKind::Amount);
    let count = if indices.is_empty() {
        amounts.len()
    } else {
        indices.len()
    };

    let trm = split_field(&row.trm, FieldKind::Amount);
    let quantity = split_field(&row.quantity, FieldKind::Amount);
    let unit_price = split_field(&row.unit_price, FieldKind::Amount);
    let supplier_name = split_field(&row.supplier_name, FieldKind::Text);
    let creditor_id = split_field(&row.creditor_id, FieldKind::Code);
    let doc_date = split_field(&row.doc_date, FieldKind::Text);
    let reg_date = split_field(&row.reg_date, FieldKind::Text);
    let tax_indicator = split_field(&row.tax_indicator, FieldKind::Code);
    let account = split_field(&row.account, FieldKind::Code);
    let order_class = split_field(&row.order_class, FieldKind::Code);
    let currency = split_field(&row.currency, FieldKind::Code);
    let fixed_asset = split_field(&row.fixed_asset, FieldKind::Code);
    let capitalized_on = split_field(&row.capitalized_on, FieldKind::Text);
    let criterion_2 = split_field(&row.criterion_2, FieldKind::Code);
    let city = split_field(&row.city, FieldKind::Text);
    let fi_doc = split_field(&row.fi_doc, FieldKind::Code);
    let cost_center = split_field(&row.cost_center, FieldKind::Code);
    let pep_element = split_field(&row.pep_element, FieldKind::Code);
    let order = split_field(&row.order, FieldKind::Code);
    let order_class_code = split_field(&row.order_class_code, FieldKind::Code);
    let site = split_field(&row.site, FieldKind::Code);
    let mark = split_field(&row.mark, FieldKind::Code);

    let mut positions = Vec::with_capacity(count);
    for i in 0..count {
        let por_calcular = amount_at(&amounts, i, "por_calcular")?.ok_or_else(|| {
            CxpError::Data(format!(
                "purchase order {} position {i}: missing por_calcular",
                row.purchase_order
            ))
        })?;
        positions.push(PoPosition {
            supplier_tax_id: row.supplier_tax_id.trim().to_string(),
            purchase_order: row.purchase_order.trim().to_string(),
            position_index: value_at(&indices, i).unwrap_or_else(|| (i + 1).to_string()),
            por_calcular,
            trm: amount_at(&trm, i, "trm")?,
            supplier_name: value_at(&supplier_name, i),
            creditor_id: value_at(&creditor_id, i),
            doc_date: value_at(&doc_date, i),
            reg_date: value_at(&reg_date, i),
            tax_indicator: value_at(&tax_indicator, i),
            account: value_at(&account, i),
            order_class: value_at(&order_class, i),
            currency: value_at(&currency, i),
            fixed_asset: value_at(&fixed_asset, i),
            capitalized_on: value_at(&capitalized_on, i),
            criterion_2: value_at(&criterion_2, i),
            city: value_at(&city, i),
            fi_doc: value_at(&fi_doc, i),
            cost_center: value_at(&cost_center, i),
            pep_element: value_at(&pep_element, i),
            order: value_at(&order, i),
            order_class_code: value_at(&order_class_code, i),
            site: value_at(&site, i),
            quantity: amount_at(&quantity, i, "quantity")?,
            unit_price: amount_at(&unit_price, i, "unit_price")?,
            mark: slot_at(&mark, i),
        });
    }
    Ok(positions)
}

/// Join per-position values with `|`; missing values become empty slots.
pub fn join_field<I, S>(values: I) -> String
where
    I: IntoIterator<Item = Option<S>>,
    S: AsRef<str>,
{
    values
        .into_iter()
        .map(|v| v.map(|s| s.as_ref().to_string()).unwrap_or_default())
        .collect::<Vec<_>>()
        .join(&POSITION_SEPARATOR.to_string())
}

fn join_amounts<'a>(values: impl Iterator<Item = Option<&'a Decimal>>) -> String {
    join_field(values.map(|v| v.map(|d| format_decimal(*d))))
}

/// Collapse positions of one purchase order back into a history row.
///
/// Inverse of [`expand_positions`] for positions sharing `(nit, PO)`.
pub fn collapse_positions(positions: &[PoPosition]) -> HistoryRow {
    let first = positions.first();
    HistoryRow {
        supplier_tax_id: first.map(|p| p.supplier_tax_id.clone()).unwrap_or_default(),
        purchase_order: first.map(|p| p.purchase_order.clone()).unwrap_or_default(),
        positions: join_field(positions.iter().map(|p| Some(&p.position_index))),
        por_calcular: join_amounts(positions.iter().map(|p| Some(&p.por_calcular))),
        trm: join_amounts(positions.iter().map(|p| p.trm.as_ref())),
        supplier_name: join_field(positions.iter().map(|p| p.supplier_name.as_ref())),
        creditor_id: join_field(positions.iter().map(|p| p.creditor_id.as_ref())),
        doc_date: join_field(positions.iter().map(|p| p.doc_date.as_ref())),
        reg_date: join_field(positions.iter().map(|p| p.reg_date.as_ref())),
        tax_indicator: join_field(positions.iter().map(|p| p.tax_indicator.as_ref())),
        account: join_field(positions.iter().map(|p| p.account.as_ref())),
        order_class: join_field(positions.iter().map(|p| p.order_class.as_ref())),
        currency: join_field(positions.iter().map(|p| p.currency.as_ref())),
        fixed_asset: join_field(positions.iter().map(|p| p.fixed_asset.as_ref())),
        capitalized_on: join_field(positions.iter().map(|p| p.capitalized_on.as_ref())),
        criterion_2: join_field(positions.iter().map(|p| p.criterion_2.as_ref())),
        city: join_field(positions.iter().map(|p| p.city.as_ref())),
        fi_doc: join_field(positions.iter().map(|p| p.fi_doc.as_ref())),
        cost_center: join_field(positions.iter().map(|p| p.cost_center.as_ref())),
        pep_element: join_field(positions.iter().map(|p| p.pep_element.as_ref())),
        order: join_field(positions.iter().map(|p| p.order.as_ref())),
        order_class_code: join_field(positions.iter().map(|p| p.order_class_code.as_ref())),
        site: join_field(positions.iter().map(|p| p.site.as_ref())),
        quantity: join_amounts(positions.iter().map(|p| p.quantity.as_ref())),
        unit_price: join_amounts(positions.iter().map(|p| p.unit_price.as_ref())),
        mark: join_field(positions.iter().map(|p| p.mark.as_ref())),
    }
}

/// Set the mark of the named positions to `PROCESADO`, keeping other slots.
/// Returns how many positions were marked.
pub fn mark_row_positions(row: &mut HistoryRow, positions: &[String]) -> usize {
    let indices = split_field(&row.positions, FieldKind::Code);
    let count = if indices.is_empty() {
        split_field(&row.por_calcular, FieldKind::Amount).len()
    } else {
        indices.len()
    };
    let current = split_field(&row.mark, FieldKind::Code);

    let mut marked = 0;
    let marks: Vec<Option<String>> = (0..count)
        .map(|i| {
            let index = value_at(&indices, i).unwrap_or_else(|| (i + 1).to_string());
            if positions.iter().any(|p| p.trim() == index) {
                marked += 1;
                Some(MARK_PROCESSED.to_string())
            } else {
                slot_at(&current, i)
            }
        })
        .collect();
    row.mark = join_field(marks);
    marked
}

/// Whether every position of the row carries the `PROCESADO` mark.
pub fn is_fully_processed(row: &HistoryRow) -> bool {
    match expand_positions(row) {
        Ok(positions) => !positions.is_empty() && positions.iter().all(PoPosition::is_processed),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn row() -> HistoryRow {
        HistoryRow {
            supplier_tax_id: "800111".into(),
            purchase_order: "4500000001".into(),
            positions: "10|20|30".into(),
            por_calcular: "500,50|1.200,00|300".into(),
            tax_indicator: "H4,H5,VP".into(),
            account: "2695950020".into(),
            supplier_name: "ACME, S.A.S".into(),
            order_class: "ZPAF".into(),
            mark: "||PROCESADO".into(),
            ..Default::default()
        }
    }

    #[test]
    fn expands_parallel_arrays() {
        let positions = expand_positions(&row()).unwrap();
        assert_eq!(positions.len(), 3);
        assert_eq!(positions[0].position_index, "10");
        assert_eq!(positions[0].por_calcular, dec!(500.50));
        assert_eq!(positions[1].por_calcular, dec!(1200));
        assert_eq!(positions[2].tax_indicator.as_deref(), Some("VP"));
        assert!(positions[2].is_processed());
        assert!(!positions[0].is_processed());
    }

    #[test]
    fn scalar_fields_broadcast() {
        let positions = expand_positions(&row()).unwrap();
        assert!(positions
            .iter()
            .all(|p| p.account.as_deref() == Some("2695950020")));
        // Text is never split on commas.
        assert_eq!(positions[1].supplier_name.as_deref(), Some("ACME, S.A.S"));
    }

    #[test]
    fn missing_amount_is_data_error() {
        let mut r = row();
        r.por_calcular = "1|2".into();
        let err = expand_positions(&r).unwrap_err();
        assert!(matches!(err, CxpError::Data(_)));
    }

    #[test]
    fn collapse_restores_arrays() {
        let positions = expand_positions(&row()).unwrap();
        let collapsed = collapse_positions(&positions);
        assert_eq!(collapsed.positions, "10|20|30");
        assert_eq!(collapsed.por_calcular, "500.5|1200|300");
        assert_eq!(collapsed.tax_indicator, "H4|H5|VP");
        assert_eq!(collapsed.mark, "||PROCESADO");
        assert_eq!(expand_positions(&collapsed).unwrap(), positions);
    }

    #[test]
    fn lone_mark_belongs_to_first_position() {
        let mut r = row();
        r.mark = "PROCESADO".into();
        let positions = expand_positions(&r).unwrap();
        assert!(positions[0].is_processed());
        assert!(!positions[1].is_processed());
        assert!(!positions[2].is_processed());
        assert!(!is_fully_processed(&r));

        assert_eq!(mark_row_positions(&mut r, &["30".to_string()]), 1);
        assert_eq!(r.mark, "PROCESADO||PROCESADO");
    }

    #[test]
    fn marks_only_named_positions() {
        let mut r = row();
        r.mark = String::new();
        assert_eq!(mark_row_positions(&mut r, &["20".to_string()]), 1);
        assert_eq!(r.mark, "|PROCESADO|");
        assert!(!is_fully_processed(&r));
        mark_row_positions(&mut r, &["10".to_string(), "30".to_string()]);
        assert_eq!(r.mark, "PROCESADO|PROCESADO|PROCESADO");
        assert!(is_fully_processed(&r));
    }
}
