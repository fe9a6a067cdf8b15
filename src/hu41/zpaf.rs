//! ZPAF / 41: fixed-asset purchase orders.

use super::common::{
    TRM_EPSILON, amount_check, code, digits, ordinal, supplier_name_check, text, trm_check,
};
use super::{RuleContext, items};
use crate::core::{Approval, PoPosition, STATE_NOVELTY};
use crate::ledger::LedgerEntry;
use crate::rules::{Check, Rule};

/// Ledger account every fixed-asset position must carry.
pub const ASSET_ACCOUNT: &str = "2695950020";

const ASSET_DIGITS: usize = 9;
const INDICATORS: &[&str] = &["H4", "H5", "H6", "H7", "VP"];
const GROUP_1: &[&str] = &["H4", "H5"];
const GROUP_2: &[&str] = &["H6", "H7"];

pub fn rules<'a>() -> [Rule<RuleContext<'a>>; 8] {
    [
        Rule {
            id: "zpaf.amount",
            items: &[items::AMOUNT],
            observation: "No se encuentra coincidencia del Valor a pagar",
            fail_state: STATE_NOVELTY,
            check: amount,
        },
        Rule {
            id: "zpaf.trm",
            items: &[items::TRM],
            observation: "No se encuentra coincidencia de la TRM",
            fail_state: STATE_NOVELTY,
            check: trm,
        },
        Rule {
            id: "zpaf.supplier_name",
            items: &[items::SUPPLIER_NAME],
            observation: "No se encuentra coincidencia del Nombre del emisor",
            fail_state: STATE_NOVELTY,
            check: supplier_name_check,
        },
        Rule {
            id: "zpaf.fixed_asset",
            items: &[items::FIXED_ASSET],
            observation: "Activo fijo sin 9 digitos",
            fail_state: STATE_NOVELTY,
            check: fixed_asset,
        },
        Rule {
            id: "zpaf.capitalized_on",
            items: &[items::CAPITALIZED_ON],
            observation: "Campo Capitalizado el diligenciado",
            fail_state: STATE_NOVELTY,
            check: capitalized_on,
        },
        Rule {
            id: "zpaf.tax_indicator",
            items: &[items::TAX_INDICATOR],
            observation: "Indicador impuestos no valido o con grupos incompatibles",
            fail_state: STATE_NOVELTY,
            check: tax_indicator,
        },
        Rule {
            id: "zpaf.criterion_2",
            items: &[items::CRITERION_2],
            observation: "Criterio clasif. 2 no corresponde al Indicador impuestos",
            fail_state: STATE_NOVELTY,
            check: criterion_2,
        },
        Rule {
            id: "zpaf.account",
            items: &[items::ACCOUNT],
            observation: "Cuenta no corresponde a activos fijos",
            fail_state: STATE_NOVELTY,
            check: account,
        },
    ]
}

fn amount(ctx: &RuleContext<'_>) -> Check {
    let header = ctx.header();
    let target = if header.is_usd() {
        header.amount_to_pay_cop.unwrap_or_default()
    } else {
        ctx.subtotal()
    };
    amount_check(ctx, target, ctx.tolerance())
}

fn trm(ctx: &RuleContext<'_>) -> Check {
    trm_check(ctx, ctx.header().is_usd(), TRM_EPSILON)
}

/// One entry per chosen position, approved by `ok`.
fn per_position(
    ctx: &RuleContext<'_>,
    item: &str,
    value: impl Fn(&PoPosition) -> Option<String>,
    ok: impl Fn(Option<&str>) -> bool,
) -> Check {
    let entries = ctx
        .positions()
        .iter()
        .enumerate()
        .map(|(i, p)| {
            let v = value(p);
            let approved = Approval::from_bool(ok(v.as_deref()));
            LedgerEntry::new(item)
                .ordinal(ordinal(i))
                .maybe_order(v)
                .approved(approved)
        })
        .collect();
    Check::from_entries(entries)
}

fn fixed_asset(ctx: &RuleContext<'_>) -> Check {
    per_position(
        ctx,
        items::FIXED_ASSET,
        |p| text(p.fixed_asset.as_deref()),
        |v| digits(v).len() == ASSET_DIGITS,
    )
}

fn capitalized_on(ctx: &RuleContext<'_>) -> Check {
    per_position(
        ctx,
        items::CAPITALIZED_ON,
        |p| text(p.capitalized_on.as_deref()),
        |v| v.is_none(),
    )
}

fn tax_indicator(ctx: &RuleContext<'_>) -> Check {
    let codes: Vec<Option<String>> = ctx
        .positions()
        .iter()
        .map(|p| code(p.tax_indicator.as_deref()))
        .collect();
    let has = |group: &[&str]| codes.iter().flatten().any(|c| group.contains(&c.as_str()));
    let mixed = has(GROUP_1) && has(GROUP_2);
    let entries = codes
        .iter()
        .enumerate()
        .map(|(i, c)| {
            let valid = c.as_deref().is_some_and(|c| INDICATORS.contains(&c));
            LedgerEntry::new(items::TAX_INDICATOR)
                .ordinal(ordinal(i))
                .maybe_order(c.clone())
                .approved(Approval::from_bool(valid && !mixed))
        })
        .collect();
    let check = Check::from_entries(entries);
    if mixed {
        check.with_detail("(H4/H5 y H6/H7 en la misma factura)")
    } else {
        check
    }
}

/// Expected `Criterio clasif. 2` for an indicator.
fn criteria_for(indicator: &str) -> &'static [&'static str] {
    match indicator {
        "H4" | "H5" => &["0001"],
        "H6" | "H7" => &["0000"],
        "VP" => &["0001", "0000"],
        _ => &[],
    }
}

fn criterion_2(ctx: &RuleContext<'_>) -> Check {
    let entries = ctx
        .positions()
        .iter()
        .enumerate()
        .map(|(i, p)| {
            let indicator = code(p.tax_indicator.as_deref()).unwrap_or_default();
            let criterion = text(p.criterion_2.as_deref());
            let ok = criterion
                .as_deref()
                .is_some_and(|c| criteria_for(&indicator).contains(&c));
            LedgerEntry::new(items::CRITERION_2)
                .ordinal(ordinal(i))
                .xml(indicator)
                .maybe_order(criterion)
                .approved(Approval::from_bool(ok))
        })
        .collect();
    Check::from_entries(entries)
}

fn account(ctx: &RuleContext<'_>) -> Check {
    per_position(
        ctx,
        items::ACCOUNT,
        |p| text(p.account.as_deref()),
        |v| digits(v) == ASSET_ACCOUNT,
    )
}
