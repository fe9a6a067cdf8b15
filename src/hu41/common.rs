//! Checks shared by more than one battery.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use super::{RuleContext, items};
use crate::core::values::{format_decimal, non_blank, only_digits};
use crate::core::{Approval, supplier_names_match, within_tolerance};
use crate::ledger::LedgerEntry;
use crate::rules::Check;

/// Tolerance of exchange-rate comparisons against SAP.
pub(crate) const TRM_EPSILON: Decimal = dec!(0.01);

pub(crate) fn amount(value: Decimal) -> String {
    format_decimal(value)
}

pub(crate) fn maybe_amount(value: Option<Decimal>) -> Option<String> {
    value.map(format_decimal)
}

pub(crate) fn text(value: Option<&str>) -> Option<String> {
    non_blank(value).map(str::to_string)
}

/// Trimmed, upper-cased code; `None` when blank.
pub(crate) fn code(value: Option<&str>) -> Option<String> {
    non_blank(value).map(|v| v.to_ascii_uppercase())
}

/// Ordinal of the `i`-th position or line in the ledger.
pub(crate) fn ordinal(i: usize) -> u32 {
    u32::try_from(i + 1).unwrap_or(u32::MAX)
}

pub(crate) fn digits(value: Option<&str>) -> String {
    value.map(only_digits).unwrap_or_default()
}

/// `Σ por_calcular` of the positions against `target`.
pub(crate) fn amount_check(ctx: &RuleContext<'_>, target: Decimal, tolerance: Decimal) -> Check {
    let sap = ctx.positions_total();
    let entry = LedgerEntry::new(items::AMOUNT).xml(amount(target)).order(amount(sap));
    Check::from_bool(within_tolerance(target, sap, tolerance), vec![entry])
        .with_detail(format!("(factura {}, orden {})", amount(target), amount(sap)))
}

/// Invoice TRM against the first position's TRM.
///
/// Only compared when `foreign` is set; otherwise the row is written as
/// approved with whatever both sides hold.
pub(crate) fn trm_check(ctx: &RuleContext<'_>, foreign: bool, tolerance: Decimal) -> Check {
    let invoice = ctx.header().trm;
    let sap = ctx.first_position().and_then(|p| p.trm);
    let entry = LedgerEntry::new(items::TRM)
        .maybe_xml(maybe_amount(invoice))
        .maybe_order(maybe_amount(sap));
    if !foreign {
        return Check::pass(vec![entry]);
    }
    let ok = matches!((invoice, sap), (Some(a), Some(b)) if within_tolerance(a, b, tolerance));
    Check::from_bool(ok, vec![entry])
}

/// Invoice supplier name against the first position's name, word order
/// and legal form ignored.
pub(crate) fn supplier_name_check(ctx: &RuleContext<'_>) -> Check {
    let invoice = text(ctx.header().supplier_name.as_deref());
    let sap = ctx.first_position().and_then(|p| text(p.supplier_name.as_deref()));
    let ok = match (&invoice, &sap) {
        (Some(a), Some(b)) => supplier_names_match(a, b),
        _ => false,
    };
    let entry = LedgerEntry::new(items::SUPPLIER_NAME)
        .maybe_xml(invoice)
        .maybe_order(sap);
    Check::from_bool(ok, vec![entry])
}

/// Detail line `i` against chosen position `i`: quantity and unit price
/// within `tolerance`. With a `guard`, a line whose `quantity × unit price`
/// exceeds its own subtotal by more than the guard also fails.
pub(crate) fn quantity_price_check(
    ctx: &RuleContext<'_>,
    tolerance: Decimal,
    guard: Option<Decimal>,
) -> Check {
    let details = ctx.details();
    let positions = ctx.positions();
    let mut entries = Vec::new();
    let mut failed_lines = Vec::new();
    for i in 0..details.len().max(positions.len()) {
        let line = details.get(i);
        let position = positions.get(i);
        let invoice_qty = line.and_then(|l| l.quantity);
        let invoice_price = line.and_then(|l| l.unit_price);
        let sap_qty = position.and_then(|p| p.quantity);
        let sap_price = position.and_then(|p| p.unit_price);

        let qty_ok = matches!((invoice_qty, sap_qty), (Some(a), Some(b)) if within_tolerance(a, b, tolerance));
        let mut price_ok =
            matches!((invoice_price, sap_price), (Some(a), Some(b)) if within_tolerance(a, b, tolerance));
        if let (Some(guard), Some(line), Some(q), Some(p)) = (guard, line, invoice_qty, invoice_price) {
            let ceiling = line.line_extension_amount.saturating_add(guard);
            if q.checked_mul(p).is_none_or(|total| total > ceiling) {
                price_ok = false;
            }
        }
        if !(qty_ok && price_ok) {
            failed_lines.push((i + 1).to_string());
        }
        entries.push(
            LedgerEntry::new(items::QUANTITY)
                .ordinal(ordinal(i))
                .maybe_xml(maybe_amount(invoice_qty))
                .maybe_order(maybe_amount(sap_qty))
                .approved(Approval::from_bool(qty_ok)),
        );
        entries.push(
            LedgerEntry::new(items::UNIT_PRICE)
                .ordinal(ordinal(i))
                .maybe_xml(maybe_amount(invoice_price))
                .maybe_order(maybe_amount(sap_price))
                .approved(Approval::from_bool(price_ok)),
        );
    }
    if entries.is_empty() {
        return Check::not_applicable();
    }
    let check = Check::from_entries(entries);
    if failed_lines.is_empty() {
        check
    } else {
        check.with_detail(format!("(lineas {})", failed_lines.join(", ")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{InvoiceDetail, InvoiceHeader, PoPosition, RunConfigBuilder};
    use crate::hu41::Candidate;
    use crate::rules::Verdict;

    fn candidate(details: Vec<InvoiceDetail>, positions: Vec<PoPosition>) -> Candidate {
        Candidate {
            header: InvoiceHeader {
                supplier_name: Some("ACME S.A.S.".into()),
                trm: Some(dec!(4000)),
                ..Default::default()
            },
            details,
            selected: (0..positions.len()).collect(),
            positions,
        }
    }

    fn line(qty: Decimal, price: Decimal) -> InvoiceDetail {
        InvoiceDetail {
            quantity: Some(qty),
            unit_price: Some(price),
            line_extension_amount: qty * price,
            ..Default::default()
        }
    }

    fn position(qty: Decimal, price: Decimal) -> PoPosition {
        PoPosition {
            quantity: Some(qty),
            unit_price: Some(price),
            supplier_name: Some("acme sas".into()),
            trm: Some(dec!(4000.004)),
            ..Default::default()
        }
    }

    #[test]
    fn lines_pair_with_positions_by_order() {
        let config = RunConfigBuilder::new("s", "d").build();
        let c = candidate(
            vec![line(dec!(2), dec!(100)), line(dec!(1), dec!(50))],
            vec![position(dec!(2), dec!(100.5)), position(dec!(3), dec!(50))],
        );
        let check = quantity_price_check(&RuleContext::new(&c, &config), dec!(1), None);
        assert_eq!(check.verdict, Verdict::Fail);
        assert_eq!(check.detail.as_deref(), Some("(lineas 2)"));
        assert_eq!(check.entries.len(), 4);
    }

    #[test]
    fn sanity_guard_rejects_inflated_lines() {
        let config = RunConfigBuilder::new("s", "d").build();
        let mut inflated = line(dec!(10), dec!(100));
        inflated.line_extension_amount = dec!(100);
        let c = candidate(vec![inflated], vec![position(dec!(10), dec!(100))]);
        let ctx = RuleContext::new(&c, &config);
        assert_eq!(quantity_price_check(&ctx, dec!(1), None).verdict, Verdict::Pass);
        assert_eq!(
            quantity_price_check(&ctx, dec!(1), Some(dec!(500))).verdict,
            Verdict::Fail
        );
    }

    #[test]
    fn guard_fails_lines_too_large_to_multiply() {
        let config = RunConfigBuilder::new("s", "d").build();
        let huge = InvoiceDetail {
            quantity: Some(Decimal::MAX),
            unit_price: Some(dec!(2)),
            line_extension_amount: Decimal::MAX,
            ..Default::default()
        };
        let c = candidate(vec![huge], vec![position(Decimal::MAX, dec!(2))]);
        let ctx = RuleContext::new(&c, &config);
        assert_eq!(
            quantity_price_check(&ctx, dec!(1), Some(dec!(500))).verdict,
            Verdict::Fail
        );
    }

    #[test]
    fn trm_and_name() {
        let config = RunConfigBuilder::new("s", "d").build();
        let c = candidate(vec![], vec![position(dec!(1), dec!(1))]);
        let ctx = RuleContext::new(&c, &config);
        assert_eq!(trm_check(&ctx, true, TRM_EPSILON).verdict, Verdict::Pass);
        assert_eq!(supplier_name_check(&ctx).verdict, Verdict::Pass);
    }
}
