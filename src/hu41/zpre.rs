//! ZPRE / 45: service receptions.

use super::common::{amount_check, quantity_price_check, supplier_name_check, trm_check};
use super::{RuleContext, items};
use crate::core::STATE_NOVELTY;
use crate::rules::{Check, Rule};

pub fn rules<'a>() -> [Rule<RuleContext<'a>>; 4] {
    [
        Rule {
            id: "zpre.quantity_price",
            items: &[items::QUANTITY, items::UNIT_PRICE],
            observation: "No se encuentra coincidencia de Cantidad y Precio unitario",
            fail_state: STATE_NOVELTY,
            check: quantity_price,
        },
        Rule {
            id: "zpre.trm",
            items: &[items::TRM],
            observation: "No se encuentra coincidencia de la TRM",
            fail_state: STATE_NOVELTY,
            check: trm,
        },
        Rule {
            id: "zpre.amount",
            items: &[items::AMOUNT],
            observation: "No se encuentra coincidencia del Valor a pagar",
            fail_state: STATE_NOVELTY,
            check: amount,
        },
        Rule {
            id: "zpre.supplier_name",
            items: &[items::SUPPLIER_NAME],
            observation: "No se encuentra coincidencia del Nombre del emisor",
            fail_state: STATE_NOVELTY,
            check: supplier_name_check,
        },
    ]
}

fn quantity_price(ctx: &RuleContext<'_>) -> Check {
    quantity_price_check(ctx, ctx.tolerance(), None)
}

fn trm(ctx: &RuleContext<'_>) -> Check {
    if !ctx.header().is_usd() {
        return Check::not_applicable();
    }
    trm_check(ctx, true, ctx.config.trm_tolerance)
}

/// USD invoices compare against the COP amount to pay, the rest against the
/// line subtotal.
fn amount(ctx: &RuleContext<'_>) -> Check {
    let header = ctx.header();
    let target = if header.is_usd() {
        header.amount_to_pay_cop.unwrap_or_default()
    } else {
        ctx.subtotal()
    };
    amount_check(ctx, target, ctx.tolerance())
}
