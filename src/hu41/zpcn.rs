//! ZPCN / ZPPA / 42: general orders.
//!
//! Each chosen position goes through exactly one branch, picked by the first
//! discriminant it carries: fixed asset, PEP element, internal order, and
//! otherwise the general (cost center) branch.

use super::common::{amount, code, digits, ordinal, text};
use super::{RuleContext, items};
use crate::core::{Approval, PoPosition, STATE_NOVELTY, within_tolerance};
use crate::ledger::LedgerEntry;
use crate::masters::ImpuestosEspeciales;
use crate::rules::{Check, Rule};

pub const ASSET_ACCOUNT: &str = "2695950020";
pub const INVESTMENT_ACCOUNT: &str = "5199150001";
pub const OTHER_ORDER_ACCOUNT: &str = "5299150099";

const DEFERRED_INDICATORS: &[&str] = &["C1", "FA", "VP", "CO", "CR"];
const BOND_INDICATORS: &[&str] = &["C1", "VP", "CO", "CR"];
const INVESTMENT_INDICATORS: &[&str] = &["H4", "H5", "H6", "H7", "VP", "CO", "IC", "CR"];

pub struct ZpcnContext<'a> {
    pub base: RuleContext<'a>,
    pub impuestos: &'a ImpuestosEspeciales,
}

impl<'a> ZpcnContext<'a> {
    pub fn new(base: RuleContext<'a>, impuestos: &'a ImpuestosEspeciales) -> Self {
        Self { base, impuestos }
    }
}

/// Which set of checks a position goes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Branch {
    /// Asset of 10 digits starting with `2000`.
    Deferred,
    /// Asset of 9 digits starting with `8000`.
    Bonds,
    /// Any other asset value: the position is not validated.
    Skipped,
    Pep,
    /// Internal order of 9 digits starting with `15`.
    Order15,
    /// Internal order of 8 digits starting with `53`.
    Order53,
    /// Any other 8-digit internal order.
    OrderOther,
    General,
}

impl Branch {
    pub fn of(position: &PoPosition) -> Self {
        if text(position.fixed_asset.as_deref()).is_some() {
            let asset = digits(position.fixed_asset.as_deref());
            return match (asset.len(), asset.as_str()) {
                (10, a) if a.starts_with("2000") => Self::Deferred,
                (9, a) if a.starts_with("8000") => Self::Bonds,
                _ => Self::Skipped,
            };
        }
        if text(position.pep_element.as_deref()).is_some() {
            return Self::Pep;
        }
        let order = digits(position.order.as_deref());
        match (order.len(), order.as_str()) {
            (9, o) if o.starts_with("15") => Self::Order15,
            (8, o) if o.starts_with("53") => Self::Order53,
            (8, _) => Self::OrderOther,
            _ => Self::General,
        }
    }
}

pub fn rules<'a>() -> [Rule<ZpcnContext<'a>>; 6] {
    [
        Rule {
            id: "zpcn.amount",
            items: &[items::AMOUNT],
            observation: "No se encuentra coincidencia del Valor a pagar",
            fail_state: STATE_NOVELTY,
            check: amount_rule,
        },
        Rule {
            id: "zpcn.fixed_asset",
            items: &[items::TAX_INDICATOR, items::COST_CENTER, items::ACCOUNT],
            observation: "Posicion de activo fijo con Indicador impuestos, Centro de coste o Cuenta no validos",
            fail_state: STATE_NOVELTY,
            check: fixed_asset,
        },
        Rule {
            id: "zpcn.pep",
            items: &[items::TAX_INDICATOR, items::COST_CENTER, items::ACCOUNT, items::SITE],
            observation: "Posicion con Elemento PEP con Indicador impuestos, Centro de coste, Cuenta o Emplazamiento no validos",
            fail_state: STATE_NOVELTY,
            check: pep,
        },
        Rule {
            id: "zpcn.order_15",
            items: &[items::TAX_INDICATOR, items::COST_CENTER, items::ACCOUNT, items::ORDER_CLASS],
            observation: "Posicion con Orden 15 con Indicador impuestos, Centro de coste, Cuenta o Clase orden no validos",
            fail_state: STATE_NOVELTY,
            check: order_15,
        },
        Rule {
            id: "zpcn.order",
            items: &[items::COST_CENTER, items::ACCOUNT],
            observation: "Posicion con Orden con Centro de coste o Cuenta no validos",
            fail_state: STATE_NOVELTY,
            check: order,
        },
        Rule {
            id: "zpcn.general",
            items: &[items::ACCOUNT, items::TAX_INDICATOR, items::COST_CENTER],
            observation: "Posicion general con Cuenta, Indicador impuestos o Centro de coste no validos",
            fail_state: STATE_NOVELTY,
            check: general,
        },
    ]
}

fn amount_rule(ctx: &ZpcnContext<'_>) -> Check {
    let header = ctx.base.header();
    if header.currency_code() != "COP" {
        return Check::not_applicable();
    }
    let invoice = ctx.base.subtotal();
    let sap = ctx.base.positions_total();
    let entry = LedgerEntry::new(items::AMOUNT)
        .xml(amount(invoice))
        .order(amount(sap));
    Check::from_bool(within_tolerance(invoice, sap, ctx.base.tolerance()), vec![entry])
}

/// Positions of `wanted` branches with their ordinal among all positions.
fn positions_in<'a>(
    ctx: &ZpcnContext<'a>,
    wanted: &[Branch],
) -> Vec<(u32, Branch, &'a PoPosition)> {
    ctx.base
        .positions()
        .iter()
        .enumerate()
        .filter_map(|(i, p)| {
            let branch = Branch::of(p);
            wanted.contains(&branch).then_some((ordinal(i), branch, p))
        })
        .collect()
}

fn entry(item: &str, ordinal: u32, value: Option<String>, ok: bool) -> LedgerEntry {
    LedgerEntry::new(item)
        .ordinal(ordinal)
        .maybe_order(value)
        .approved(Approval::from_bool(ok))
}

fn indicator_entry(ordinal: u32, p: &PoPosition, allowed: &[&str]) -> LedgerEntry {
    let indicator = code(p.tax_indicator.as_deref());
    let ok = indicator.as_deref().is_some_and(|i| allowed.contains(&i));
    entry(items::TAX_INDICATOR, ordinal, indicator, ok)
}

fn cost_center_entry(ordinal: u32, p: &PoPosition, present: bool) -> LedgerEntry {
    let cost_center = text(p.cost_center.as_deref());
    let ok = cost_center.is_some() == present;
    entry(items::COST_CENTER, ordinal, cost_center, ok)
}

fn account_entry(ordinal: u32, p: &PoPosition, ok: impl Fn(&str) -> bool) -> LedgerEntry {
    let account = text(p.account.as_deref());
    let valid = ok(&digits(account.as_deref()));
    entry(items::ACCOUNT, ordinal, account, valid)
}

/// Entries for every position of `branches`; not applicable when none.
fn branch_check(
    ctx: &ZpcnContext<'_>,
    branches: &[Branch],
    build: impl Fn(u32, Branch, &PoPosition) -> Vec<LedgerEntry>,
) -> Check {
    let positions = positions_in(ctx, branches);
    if positions.is_empty() {
        return Check::not_applicable();
    }
    let entries = positions
        .into_iter()
        .flat_map(|(ordinal, branch, p)| build(ordinal, branch, p))
        .collect();
    Check::from_entries(entries)
}

fn fixed_asset(ctx: &ZpcnContext<'_>) -> Check {
    branch_check(ctx, &[Branch::Deferred, Branch::Bonds], |n, branch, p| {
        let allowed = if branch == Branch::Deferred {
            DEFERRED_INDICATORS
        } else {
            BOND_INDICATORS
        };
        vec![
            indicator_entry(n, p, allowed),
            cost_center_entry(n, p, false),
            account_entry(n, p, |a| a == ASSET_ACCOUNT),
        ]
    })
}

/// Sites or order classes accepted for an indicator.
fn by_indicator(indicator: &str, for_h4_h5: &'static str, for_h6_h7: &'static str) -> Vec<&'static str> {
    match indicator {
        "H4" | "H5" => vec![for_h4_h5],
        "H6" | "H7" => vec![for_h6_h7],
        "VP" | "CO" | "CR" | "IC" => vec![for_h4_h5, for_h6_h7],
        _ => Vec::new(),
    }
}

fn pep(ctx: &ZpcnContext<'_>) -> Check {
    branch_check(ctx, &[Branch::Pep], |n, _, p| {
        let indicator = code(p.tax_indicator.as_deref()).unwrap_or_default();
        let site = code(p.site.as_deref());
        let site_ok = site
            .as_deref()
            .is_some_and(|s| by_indicator(&indicator, "DCTO_01", "GTO_02").contains(&s));
        vec![
            indicator_entry(n, p, INVESTMENT_INDICATORS),
            cost_center_entry(n, p, false),
            account_entry(n, p, |a| a == INVESTMENT_ACCOUNT),
            entry(items::SITE, n, site, site_ok),
        ]
    })
}

fn order_15(ctx: &ZpcnContext<'_>) -> Check {
    branch_check(ctx, &[Branch::Order15], |n, _, p| {
        let indicator = code(p.tax_indicator.as_deref()).unwrap_or_default();
        let class = code(p.order_class_code.as_deref());
        let class_ok = class
            .as_deref()
            .is_some_and(|c| by_indicator(&indicator, "ZINV", "ZADM").contains(&c));
        vec![
            indicator_entry(n, p, INVESTMENT_INDICATORS),
            cost_center_entry(n, p, false),
            account_entry(n, p, |a| a == INVESTMENT_ACCOUNT),
            entry(items::ORDER_CLASS, n, class, class_ok),
        ]
    })
}

fn order(ctx: &ZpcnContext<'_>) -> Check {
    branch_check(ctx, &[Branch::Order53, Branch::OrderOther], |n, branch, p| {
        if branch == Branch::Order53 {
            vec![cost_center_entry(n, p, true)]
        } else {
            vec![
                cost_center_entry(n, p, false),
                account_entry(n, p, |a| {
                    a == OTHER_ORDER_ACCOUNT || (a.len() == 10 && a.starts_with("73"))
                }),
            ]
        }
    })
}

fn general(ctx: &ZpcnContext<'_>) -> Check {
    branch_check(ctx, &[Branch::General], |n, _, p| {
        let cost_center = text(p.cost_center.as_deref());
        let indicator = code(p.tax_indicator.as_deref());
        let allowed = cost_center
            .as_deref()
            .and_then(|cc| ctx.impuestos.allowed_indicators(cc));
        let indicator_ok = match (&indicator, allowed) {
            (Some(i), Some(set)) => set.iter().any(|a| a == i),
            _ => false,
        };
        vec![
            account_entry(n, p, |a| !a.is_empty()),
            entry(items::TAX_INDICATOR, n, indicator, indicator_ok),
            entry(items::COST_CENTER, n, cost_center, allowed.is_some()),
        ]
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{InvoiceDetail, InvoiceHeader, RunConfigBuilder};
    use crate::hu41::Candidate;
    use crate::masters::Table;
    use crate::rules::Verdict;
    use rust_decimal_macros::dec;

    fn impuestos() -> ImpuestosEspeciales {
        let raw: Vec<Vec<String>> = vec![
            vec!["CECO".into(), "Codigo Ind. Iva aplicable".into()],
            vec!["10010".into(), "H4-H5".into()],
        ];
        let table = Table::from_rows(raw, &["CECO", "Codigo Ind. Iva aplicable"]).unwrap();
        ImpuestosEspeciales::from_table(&table).unwrap()
    }

    fn candidate(positions: Vec<PoPosition>) -> Candidate {
        Candidate {
            header: InvoiceHeader::default(),
            details: vec![InvoiceDetail {
                line_extension_amount: positions.iter().map(|p| p.por_calcular).sum(),
                ..Default::default()
            }],
            selected: (0..positions.len()).collect(),
            positions,
        }
    }

    fn run(check: fn(&ZpcnContext<'_>) -> Check, positions: Vec<PoPosition>) -> Check {
        let config = RunConfigBuilder::new("s", "d").build();
        let imp = impuestos();
        let c = candidate(positions);
        check(&ZpcnContext::new(RuleContext::new(&c, &config), &imp))
    }

    #[test]
    fn branches_follow_discriminants() {
        let asset = |a: &str| PoPosition {
            fixed_asset: Some(a.into()),
            pep_element: Some("PEP-1".into()),
            ..Default::default()
        };
        assert_eq!(Branch::of(&asset("2000123456")), Branch::Deferred);
        assert_eq!(Branch::of(&asset("800012345")), Branch::Bonds);
        assert_eq!(Branch::of(&asset("12345")), Branch::Skipped);
        let order = |o: &str| PoPosition {
            order: Some(o.into()),
            ..Default::default()
        };
        assert_eq!(Branch::of(&order("150000001")), Branch::Order15);
        assert_eq!(Branch::of(&order("53000001")), Branch::Order53);
        assert_eq!(Branch::of(&order("41000001")), Branch::OrderOther);
        assert_eq!(Branch::of(&order("")), Branch::General);
        assert_eq!(
            Branch::of(&PoPosition {
                pep_element: Some("PEP-1".into()),
                ..Default::default()
            }),
            Branch::Pep
        );
    }

    #[test]
    fn bonds_reject_fa_indicator() {
        let bond = PoPosition {
            fixed_asset: Some("800012345".into()),
            tax_indicator: Some("FA".into()),
            account: Some(ASSET_ACCOUNT.into()),
            ..Default::default()
        };
        assert_eq!(run(fixed_asset, vec![bond.clone()]).verdict, Verdict::Fail);
        let deferred = PoPosition {
            fixed_asset: Some("2000123456".into()),
            ..bond
        };
        assert_eq!(run(fixed_asset, vec![deferred]).verdict, Verdict::Pass);
    }

    #[test]
    fn pep_site_follows_indicator() {
        let p = PoPosition {
            pep_element: Some("PEP-1".into()),
            tax_indicator: Some("H6".into()),
            account: Some(INVESTMENT_ACCOUNT.into()),
            site: Some("GTO_02".into()),
            ..Default::default()
        };
        assert_eq!(run(pep, vec![p.clone()]).verdict, Verdict::Pass);
        let wrong = PoPosition {
            site: Some("DCTO_01".into()),
            ..p
        };
        assert_eq!(run(pep, vec![wrong]).verdict, Verdict::Fail);
        assert_eq!(run(pep, vec![PoPosition::default()]).verdict, Verdict::NotApplicable);
    }

    #[test]
    fn order_15_class_follows_indicator() {
        let p = PoPosition {
            order: Some("150000001".into()),
            tax_indicator: Some("VP".into()),
            account: Some(INVESTMENT_ACCOUNT.into()),
            order_class_code: Some("ZADM".into()),
            ..Default::default()
        };
        assert_eq!(run(order_15, vec![p.clone()]).verdict, Verdict::Pass);
        let h4 = PoPosition {
            tax_indicator: Some("H4".into()),
            ..p
        };
        assert_eq!(run(order_15, vec![h4]).verdict, Verdict::Fail);
    }

    #[test]
    fn other_orders_accept_73_accounts() {
        let p = PoPosition {
            order: Some("41000001".into()),
            account: Some("7300000001".into()),
            ..Default::default()
        };
        assert_eq!(run(order, vec![p.clone()]).verdict, Verdict::Pass);
        let with_cc = PoPosition {
            cost_center: Some("10010".into()),
            ..p
        };
        assert_eq!(run(order, vec![with_cc]).verdict, Verdict::Fail);
    }

    #[test]
    fn general_positions_use_iva_ceco() {
        let p = PoPosition {
            account: Some("5105050000".into()),
            tax_indicator: Some("H5".into()),
            cost_center: Some("0010010".into()),
            por_calcular: dec!(100),
            ..Default::default()
        };
        assert_eq!(run(general, vec![p.clone()]).verdict, Verdict::Pass);
        assert_eq!(run(amount_rule, vec![p.clone()]).verdict, Verdict::Pass);
        let vp = PoPosition {
            tax_indicator: Some("VP".into()),
            ..p
        };
        assert_eq!(run(general, vec![vp]).verdict, Verdict::Fail);
    }
}
