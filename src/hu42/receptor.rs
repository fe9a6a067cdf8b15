//! Receptor checks shared by credit and debit notes.
//!
//! Every NC and ND must be addressed to the company: legal name, NIT,
//! identification type, verification digit and at least one of the fiscal
//! responsibilities the company holds.

use crate::core::values::{non_blank, only_digits};
use crate::core::{Approval, InvoiceHeader, STATE_NOVELTY, supplier_names_match};
use crate::ledger::LedgerEntry;
use crate::rules::{Check, Rule};

/// Legal names the receptor may carry.
pub const RECEPTOR_NAMES: &[&str] = &["DIANA CORPORACION SAS", "DICORP SAS"];
pub const RECEPTOR_NIT: &str = "860031606";
/// DIAN identification type for a NIT.
pub const RECEPTOR_PERSON_TYPE: &str = "31";
pub const RECEPTOR_CHECK_DIGIT: &str = "6";
pub const TAX_LEVEL_CODES: &[&str] = &["O-13", "O-15", "O-23", "O-47", "R-99-PN"];

pub mod items {
    pub const RECEPTOR_NAME: &str = "Nombre receptor";
    pub const RECEPTOR_NIT: &str = "NIT receptor";
    pub const RECEPTOR_PERSON_TYPE: &str = "Tipo persona receptor";
    pub const RECEPTOR_CHECK_DIGIT: &str = "Digito verificacion receptor";
    pub const RECEPTOR_TAX_LEVEL: &str = "Responsabilidad fiscal receptor";
    pub const REFERENCE: &str = "Factura referenciada";
    pub const NC_AMOUNT: &str = "Valor nota credito";
    pub const INVOICE_AMOUNT: &str = "Valor factura referenciada";
}

pub const RECEPTOR_RULES: &[Rule<InvoiceHeader>] = &[
    Rule {
        id: "receptor.name",
        items: &[items::RECEPTOR_NAME],
        observation: "Nombre del receptor no corresponde",
        fail_state: STATE_NOVELTY,
        check: name,
    },
    Rule {
        id: "receptor.nit",
        items: &[items::RECEPTOR_NIT],
        observation: "NIT del receptor no corresponde",
        fail_state: STATE_NOVELTY,
        check: nit,
    },
    Rule {
        id: "receptor.person_type",
        items: &[items::RECEPTOR_PERSON_TYPE],
        observation: "Tipo de persona del receptor no corresponde",
        fail_state: STATE_NOVELTY,
        check: person_type,
    },
    Rule {
        id: "receptor.check_digit",
        items: &[items::RECEPTOR_CHECK_DIGIT],
        observation: "Digito de verificacion del receptor no corresponde",
        fail_state: STATE_NOVELTY,
        check: check_digit,
    },
    Rule {
        id: "receptor.tax_level",
        items: &[items::RECEPTOR_TAX_LEVEL],
        observation: "Responsabilidad fiscal del receptor no corresponde",
        fail_state: STATE_NOVELTY,
        check: tax_level,
    },
];

fn single(item: &str, found: Option<&str>, expected: &str, ok: bool) -> Check {
    let entry = LedgerEntry::new(item)
        .maybe_xml(found.map(str::to_string))
        .order(expected)
        .approved(Approval::from_bool(ok));
    Check::from_bool(ok, vec![entry])
}

fn name(header: &InvoiceHeader) -> Check {
    let found = non_blank(header.receptor_name.as_deref());
    let ok = found.is_some_and(|n| RECEPTOR_NAMES.iter().any(|r| supplier_names_match(n, r)));
    single(items::RECEPTOR_NAME, found, RECEPTOR_NAMES[0], ok)
}

/// Digits before the verification-digit dash, when one is written.
fn nit(header: &InvoiceHeader) -> Check {
    let found = non_blank(header.receptor_tax_id.as_deref());
    let ok = found.is_some_and(|n| {
        let body = n.split('-').next().unwrap_or_default();
        only_digits(body) == RECEPTOR_NIT
    });
    single(items::RECEPTOR_NIT, found, RECEPTOR_NIT, ok)
}

fn person_type(header: &InvoiceHeader) -> Check {
    let found = non_blank(header.receptor_person_type.as_deref());
    let ok = found == Some(RECEPTOR_PERSON_TYPE);
    single(items::RECEPTOR_PERSON_TYPE, found, RECEPTOR_PERSON_TYPE, ok)
}

fn check_digit(header: &InvoiceHeader) -> Check {
    let found = non_blank(header.receptor_check_digit.as_deref());
    let ok = found == Some(RECEPTOR_CHECK_DIGIT);
    single(items::RECEPTOR_CHECK_DIGIT, found, RECEPTOR_CHECK_DIGIT, ok)
}

fn tax_level(header: &InvoiceHeader) -> Check {
    let found = non_blank(header.receptor_tax_level_code.as_deref());
    let ok = found.is_some_and(|codes| {
        codes
            .split([';', ',', ' ', '|'])
            .map(str::trim)
            .any(|c| TAX_LEVEL_CODES.iter().any(|t| t.eq_ignore_ascii_case(c)))
    });
    single(items::RECEPTOR_TAX_LEVEL, found, &TAX_LEVEL_CODES.join(";"), ok)
}
