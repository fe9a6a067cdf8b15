//! ZVEN / 50: commercialized goods.
//!
//! A candidate first needs its rows in the Maestro de Comercializados. When
//! they are missing the document waits (`EN ESPERA - COMERCIALIZADOS`) and
//! its electronic-document bundle is copied to the `INSUMO` folder of the
//! configured destination, so the commercial team can fill the Maestro.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::{info, warn};

use super::common::{
    TRM_EPSILON, amount, digits, ordinal, quantity_price_check, supplier_name_check, text,
    trm_check,
};
use super::{Candidate, RuleContext, items};
use crate::core::{
    Approval, CxpError, RunConfig, STATE_NOVELTY, STATE_NOVELTY_COMMERCIALIZED,
    STATE_WAITING_COMMERCIALIZED, saturating_sum, within_tolerance,
};
use crate::ledger::LedgerEntry;
use crate::masters::{AsociacionCuentaIndicador, MaestroComercializados, MaestroRow};
use crate::rules::{Check, Rule, RuleEngine, Settlement};
use crate::store::Store;

/// Folder under the destination that receives waiting bundles.
pub const BUNDLE_FOLDER: &str = "INSUMO";

const MAESTRO_EPSILON: Decimal = dec!(0.01);
const LINE_TOLERANCE: Decimal = dec!(1);

pub struct ZvenContext<'a> {
    pub base: RuleContext<'a>,
    /// Maestro rows of `(OC, FACTURA)`, in sheet order.
    pub maestro_rows: Vec<&'a MaestroRow>,
    pub asociacion: &'a AsociacionCuentaIndicador,
}

impl<'a> ZvenContext<'a> {
    pub fn new(
        base: RuleContext<'a>,
        maestro: &'a MaestroComercializados,
        asociacion: &'a AsociacionCuentaIndicador,
    ) -> Self {
        let header = base.header();
        Self {
            maestro_rows: maestro.lookup(base.candidate.purchase_order(), &header.invoice_number),
            base,
            asociacion,
        }
    }

    pub fn in_maestro(&self) -> bool {
        !self.maestro_rows.is_empty()
    }
}

pub fn rules<'a>() -> [Rule<ZvenContext<'a>>; 6] {
    [
        Rule {
            id: "zven.maestro_values",
            items: &[items::MAESTRO_VALUE],
            observation: "Valores del Maestro de comercializados no coinciden con la orden de compra",
            fail_state: STATE_NOVELTY_COMMERCIALIZED,
            check: maestro_values,
        },
        Rule {
            id: "zven.maestro_totals",
            items: &[items::MAESTRO_TOTAL, items::MAESTRO_ME_TOTAL],
            observation: "Suma del Maestro de comercializados no coincide con la factura",
            fail_state: STATE_NOVELTY_COMMERCIALIZED,
            check: maestro_totals,
        },
        Rule {
            id: "zven.trm",
            items: &[items::TRM],
            observation: "No se encuentra coincidencia de la TRM",
            fail_state: STATE_NOVELTY,
            check: trm,
        },
        Rule {
            id: "zven.quantity_price",
            items: &[items::QUANTITY, items::UNIT_PRICE],
            observation: "No se encuentra coincidencia de Cantidad y Precio unitario",
            fail_state: STATE_NOVELTY,
            check: quantity_price,
        },
        Rule {
            id: "zven.supplier_name",
            items: &[items::SUPPLIER_NAME],
            observation: "No se encuentra coincidencia del Nombre del emisor",
            fail_state: STATE_NOVELTY,
            check: supplier_name,
        },
        Rule {
            id: "zven.account",
            items: &[items::ACCOUNT],
            observation: "Cuenta no se encuentra en la Asociacion cuenta indicador",
            fail_state: STATE_NOVELTY,
            check: account,
        },
    ]
}

fn same_position(a: &str, b: &str) -> bool {
    let a = digits(Some(a));
    let b = digits(Some(b));
    !a.is_empty() && a.trim_start_matches('0') == b.trim_start_matches('0')
}

fn maestro_values(ctx: &ZvenContext<'_>) -> Check {
    let positions = ctx.base.positions();
    let entries = ctx
        .maestro_rows
        .iter()
        .enumerate()
        .map(|(i, row)| {
            let chosen = row.chosen_amount();
            let sap = positions
                .iter()
                .find(|p| same_position(&p.position_index, &row.posicion))
                .map(|p| p.por_calcular);
            let ok = sap.is_some_and(|sap| within_tolerance(chosen, sap, MAESTRO_EPSILON));
            LedgerEntry::new(items::MAESTRO_VALUE)
                .ordinal(ordinal(i))
                .xml(amount(chosen))
                .maybe_order(sap.map(amount))
                .approved(Approval::from_bool(ok))
        })
        .collect();
    Check::from_entries(entries)
}

fn maestro_totals(ctx: &ZvenContext<'_>) -> Check {
    let tolerance = ctx.base.tolerance();
    let subtotal = ctx.base.subtotal();
    let chosen = saturating_sum(ctx.maestro_rows.iter().map(|r| r.chosen_amount()));
    let mut entries = vec![
        LedgerEntry::new(items::MAESTRO_TOTAL)
            .xml(amount(subtotal))
            .order(amount(chosen))
            .approved(Approval::from_bool(within_tolerance(subtotal, chosen, tolerance))),
    ];
    if ctx.maestro_rows.iter().any(|r| r.uses_me()) {
        let me = saturating_sum(ctx.maestro_rows.iter().filter_map(|r| r.por_calcular_me));
        let cop = ctx.base.header().amount_to_pay_cop.unwrap_or_default();
        entries.push(
            LedgerEntry::new(items::MAESTRO_ME_TOTAL)
                .xml(amount(cop))
                .order(amount(me))
                .approved(Approval::from_bool(within_tolerance(cop, me, tolerance))),
        );
    }
    Check::from_entries(entries)
}

fn trm(ctx: &ZvenContext<'_>) -> Check {
    let foreign = ctx.base.header().currency_code() != "COP";
    trm_check(&ctx.base, foreign, TRM_EPSILON)
}

fn quantity_price(ctx: &ZvenContext<'_>) -> Check {
    quantity_price_check(&ctx.base, LINE_TOLERANCE, Some(ctx.base.tolerance()))
}

fn supplier_name(ctx: &ZvenContext<'_>) -> Check {
    supplier_name_check(&ctx.base)
}

fn account(ctx: &ZvenContext<'_>) -> Check {
    let entries = ctx
        .base
        .positions()
        .iter()
        .enumerate()
        .map(|(i, p)| {
            let account = text(p.account.as_deref());
            let ok = account
                .as_deref()
                .is_some_and(|a| ctx.asociacion.contains_account(a));
            LedgerEntry::new(items::ACCOUNT)
                .ordinal(ordinal(i))
                .maybe_order(account)
                .approved(Approval::from_bool(ok))
        })
        .collect();
    Check::from_entries(entries)
}

/// Put the candidate on hold until the Maestro lists it, copying its bundle
/// for the commercial team.
pub fn hold_for_maestro<S: Store + ?Sized>(
    mut engine: RuleEngine<'_, S>,
    candidate: &Candidate,
    config: &RunConfig,
    now: NaiveDateTime,
) -> Result<Settlement, CxpError> {
    let header = &candidate.header;
    let mut observation = format!(
        "No se encuentran datos de la OC {} y factura {} en el Maestro de comercializados",
        candidate.purchase_order(),
        header.invoice_number.trim()
    );
    match copy_bundle(
        header.bundle_path.as_deref(),
        config.carpeta_destino_comercializados.as_deref(),
    ) {
        Ok(copied) => info!(factura = %header.invoice_number, to = %copied.display(), "bundle copied"),
        Err(err) => {
            warn!(factura = %header.invoice_number, error = %err, "bundle copy failed");
            observation.push_str(&format!(", no fue posible copiar el insumo: {err}"));
        }
    }
    engine.note_once(&observation)?;
    engine.finish(STATE_WAITING_COMMERCIALIZED.to_string(), now)
}

/// Copy a bundle (file or folder) into `destination/INSUMO`.
/// Returns the path of the copy.
pub fn copy_bundle(bundle: Option<&str>, destination: Option<&Path>) -> Result<PathBuf, CxpError> {
    let destination = destination.ok_or_else(|| {
        CxpError::Configuration("CarpetaDestinoComercializados no configurada".into())
    })?;
    let source = bundle
        .map(str::trim)
        .filter(|b| !b.is_empty())
        .map(PathBuf::from)
        .ok_or_else(|| CxpError::Data("documento sin ruta de insumo".into()))?;
    let name = source
        .file_name()
        .ok_or_else(|| CxpError::Data(format!("ruta de insumo invalida: {}", source.display())))?;
    if !source.exists() {
        return Err(CxpError::Data(format!("no existe el insumo {}", source.display())));
    }

    let folder = destination.join(BUNDLE_FOLDER);
    fs::create_dir_all(&folder)?;
    let target = folder.join(name);
    if source.is_dir() {
        copy_dir(&source, &target)?;
    } else {
        fs::copy(&source, &target)?;
    }
    Ok(target)
}

fn copy_dir(from: &Path, to: &Path) -> Result<(), CxpError> {
    fs::create_dir_all(to)?;
    for entry in fs::read_dir(from)? {
        let entry = entry?;
        let target = to.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_dir(&entry.path(), &target)?;
        } else {
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{InvoiceDetail, InvoiceHeader, PoPosition, RunConfigBuilder};
    use crate::masters::Table;
    use crate::rules::Verdict;

    fn maestro(rows: &[[&str; 6]]) -> MaestroComercializados {
        let mut raw: Vec<Vec<String>> = vec![
            ["OC", "FACTURA", "VALOR TOTAL OC", "POSICION", "POR CALCULAR (VALOR UNITARIO)", "POR CALCULAR (ME)"]
                .iter()
                .map(|c| c.to_string())
                .collect(),
        ];
        for r in rows {
            raw.push(r.iter().map(|c| c.to_string()).collect());
        }
        let table = Table::from_rows(raw, &["OC", "FACTURA"]).unwrap();
        MaestroComercializados::from_table(&table).unwrap()
    }

    fn candidate() -> Candidate {
        let positions = vec![
            PoPosition {
                position_index: "10".into(),
                por_calcular: dec!(600),
                account: Some("1435050100".into()),
                ..Default::default()
            },
            PoPosition {
                position_index: "20".into(),
                por_calcular: dec!(400),
                account: Some("1435050100".into()),
                ..Default::default()
            },
        ];
        Candidate {
            header: InvoiceHeader {
                invoice_number: "F1".into(),
                purchase_order_ref: Some("O1".into()),
                ..Default::default()
            },
            details: vec![InvoiceDetail {
                line_extension_amount: dec!(1000),
                ..Default::default()
            }],
            selected: vec![0, 1],
            positions,
        }
    }

    #[test]
    fn maestro_values_match_positions() {
        let config = RunConfigBuilder::new("s", "d").build();
        let c = candidate();
        let m = maestro(&[["O1", "F1", "1000", "10", "600", ""], ["O1", "F1", "1000", "20", "400", "0"]]);
        let assoc = AsociacionCuentaIndicador::default();
        let ctx = ZvenContext::new(RuleContext::new(&c, &config), &m, &assoc);
        assert!(ctx.in_maestro());
        assert_eq!(maestro_values(&ctx).verdict, Verdict::Pass);
        assert_eq!(maestro_totals(&ctx).verdict, Verdict::Pass);
        assert_eq!(account(&ctx).verdict, Verdict::Fail);
    }

    #[test]
    fn me_amount_takes_precedence() {
        let config = RunConfigBuilder::new("s", "d").build();
        let c = candidate();
        let m = maestro(&[["O1", "F1", "1000", "10", "600", "150"], ["O1", "F1", "1000", "20", "400", "0"]]);
        let assoc = AsociacionCuentaIndicador::default();
        let ctx = ZvenContext::new(RuleContext::new(&c, &config), &m, &assoc);
        let check = maestro_values(&ctx);
        assert_eq!(check.verdict, Verdict::Fail);
        assert_eq!(check.entries[0].aprobado, Some(Approval::No));
        assert_eq!(check.entries[1].aprobado, Some(Approval::Yes));
    }

    #[test]
    fn copies_files_and_folders() {
        let dir = tempfile::tempdir().unwrap();
        let bundle = dir.path().join("F9");
        fs::create_dir_all(bundle.join("anexos")).unwrap();
        fs::write(bundle.join("F9.xml"), "<Invoice/>").unwrap();
        fs::write(bundle.join("anexos").join("F9.pdf"), "pdf").unwrap();
        let dest = dir.path().join("destino");

        let copied = copy_bundle(bundle.to_str(), Some(&dest)).unwrap();
        assert_eq!(copied, dest.join(BUNDLE_FOLDER).join("F9"));
        assert!(copied.join("F9.xml").is_file());
        assert!(copied.join("anexos").join("F9.pdf").is_file());
    }

    #[test]
    fn copy_reports_missing_inputs() {
        let dir = tempfile::tempdir().unwrap();
        assert!(copy_bundle(None, Some(dir.path())).is_err());
        assert!(copy_bundle(Some("/no/existe/F1.zip"), Some(dir.path())).is_err());
        assert!(matches!(
            copy_bundle(Some("F1.zip"), None),
            Err(CxpError::Configuration(_))
        ));
    }
}
