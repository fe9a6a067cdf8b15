use chrono::{Datelike, Months, NaiveDate, NaiveDateTime};
use tracing::{debug, info, info_span, warn};

use super::export::append_unresolved;
use super::receptor::{RECEPTOR_RULES, items};
use crate::core::values::{format_decimal, non_blank};
use crate::core::{
    Approval, CxpError, DocumentType, InvoiceHeader, RunConfig, STATE_APPROVED, STATE_FOUND,
    STATE_NOT_SUCCESSFUL, STATE_NOVELTY, STATE_REJECTED,
};
use crate::ledger::LedgerEntry;
use crate::rules::{RuleEngine, Settlement};
use crate::store::{Store, with_transaction};

/// DIAN type code of a credit note that references an invoice.
pub const REFERENCING_TYPECODE: &str = "20";

pub(crate) const OBS_WITHOUT_REFERENCE: &str = "Nota credito sin referencia";
pub(crate) const OBS_REFERENCE_NOT_FOUND: &str = "Nota credito con referencia no encontrada";

/// What a credit-note pass produced.
#[derive(Debug, Default)]
pub struct CreditNoteReport {
    pub found: usize,
    pub not_successful: usize,
    pub novelty: usize,
    pub errors: usize,
    /// Notes left with a novelty or out of their window, as persisted.
    pub unresolved: Vec<InvoiceHeader>,
    /// Rows in the novelty export after this pass, when one is configured.
    pub exported: Option<usize>,
}

/// Issue window of the referenced invoice: the note's month and the one
/// before it.
pub fn lookup_window(issued: NaiveDate) -> Option<(NaiveDate, NaiveDate)> {
    let month_start = issued.with_day(1)?;
    let from = month_start.checked_sub_months(Months::new(1))?;
    let to = month_start.checked_add_months(Months::new(1))?.pred_opt()?;
    Some((from, to))
}

fn preference(result: Option<&str>) -> u8 {
    let result = result.map(str::trim).unwrap_or_default();
    if result.starts_with(STATE_REJECTED) {
        0
    } else if result.starts_with(STATE_APPROVED) {
        1
    } else {
        2
    }
}

/// Invoice a note resolves to: rejected first, then approved, then any
/// other; the oldest row wins a tie.
pub fn pick_invoice(mut invoices: Vec<InvoiceHeader>) -> Option<InvoiceHeader> {
    invoices.sort_by_key(|h| (preference(h.final_result_pre_events.as_deref()), h.id));
    invoices.into_iter().next()
}

/// Whole days since the note was first processed exceed the retake window.
pub fn is_overdue(note: &InvoiceHeader, retake_days: i64, now: NaiveDateTime) -> bool {
    note.first_process_date
        .is_some_and(|first| (now.date() - first.date()).num_days() > retake_days)
}

fn reconcile<S: Store + ?Sized>(
    store: &mut S,
    note: &InvoiceHeader,
    config: &RunConfig,
    now: NaiveDateTime,
) -> Result<Settlement, CxpError> {
    let mut engine = RuleEngine::new(store, note);

    if is_overdue(note, config.nc_retake_days, now) {
        engine.note_once(&format!(
            "Nota credito supera el plazo maximo de retoma de {} dias",
            config.nc_retake_days
        ))?;
        return engine.finish(STATE_NOT_SUCCESSFUL.to_string(), now);
    }

    engine.run(RECEPTOR_RULES, note)?;

    let typecode = non_blank(note.invoice_typecode.as_deref());
    if typecode != Some(REFERENCING_TYPECODE) {
        engine.flag_once(STATE_NOVELTY, OBS_WITHOUT_REFERENCE)?;
        return engine.settle(STATE_FOUND, now);
    }

    let reference = non_blank(note.referenced_invoice.as_deref());
    let window = lookup_window(note.issue_date.unwrap_or(now.date()));
    let invoice = match (reference, window) {
        (Some(reference), Some((from, to))) => {
            let invoices = engine.store().invoices_by_reference(
                &note.supplier_tax_id,
                reference,
                from,
                to,
            )?;
            debug!(reference, %from, %to, hits = invoices.len(), "referenced invoice lookup");
            pick_invoice(invoices)
        }
        _ => None,
    };

    engine.record(
        &LedgerEntry::new(items::REFERENCE)
            .maybe_xml(reference.map(str::to_string))
            .maybe_order(invoice.as_ref().and_then(|fv| fv.prefix_and_number.clone()))
            .approved(Approval::from_bool(invoice.is_some())),
    )?;

    let Some(invoice) = invoice else {
        engine.flag_once(STATE_NOVELTY, OBS_REFERENCE_NOT_FOUND)?;
        return engine.settle(STATE_FOUND, now);
    };

    engine.record(
        &LedgerEntry::new(items::NC_AMOUNT)
            .maybe_xml(note.amount_to_pay.map(format_decimal))
            .approved(Approval::Yes),
    )?;
    engine.record(
        &LedgerEntry::new(items::INVOICE_AMOUNT)
            .maybe_xml(invoice.amount_to_pay.map(format_decimal))
            .approved(Approval::Yes),
    )?;
    // Receptor failures stay in the ledger and observation; a hit always links.
    engine
        .store()
        .link_credit_note(invoice.id, note.invoice_number.trim())?;
    info!(factura = %invoice.invoice_number, "credit note linked to invoice");
    engine.finish(STATE_FOUND.to_string(), now)
}

/// Reconcile every pending credit note against the invoice it references.
///
/// A note whose referenced invoice is found links to it and ends
/// `Encontrado`, even when receptor checks failed; a note without a usable
/// reference is retried on later runs until its window closes.
/// Unresolved notes are appended to the novelty export when configured.
pub fn reconcile_credit_notes<S: Store + ?Sized>(
    store: &mut S,
    config: &RunConfig,
    now: NaiveDateTime,
) -> Result<CreditNoteReport, CxpError> {
    let notes = store.pending_headers(DocumentType::CreditNote)?;
    info!(notes = notes.len(), "reconciling credit notes");
    let mut report = CreditNoteReport::default();

    for note in notes {
        let span = info_span!(
            "credit_note",
            id = note.id,
            nit = %note.supplier_tax_id,
            nc = %note.invoice_number
        );
        let _guard = span.enter();

        match with_transaction(store, |s| reconcile(s, &note, config, now)) {
            Ok(settlement) => {
                if settlement.state == STATE_NOT_SUCCESSFUL {
                    report.not_successful += 1;
                } else if settlement.is_novelty() {
                    report.novelty += 1;
                } else {
                    report.found += 1;
                    continue;
                }
                if let Some(stored) = store.header(note.id)? {
                    report.unresolved.push(stored);
                }
            }
            Err(err) if err.is_fatal() => return Err(err),
            Err(err) => {
                warn!(error = %err, "credit note failed");
                report.errors += 1;
            }
        }
    }

    if let Some(path) = config.novelty_export.as_deref() {
        if !report.unresolved.is_empty() {
            match append_unresolved(path, &report.unresolved) {
                Ok(rows) => report.exported = Some(rows),
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "novelty export failed");
                    report.errors += 1;
                }
            }
        }
    }
    info!(
        found = report.found,
        not_successful = report.not_successful,
        novelty = report.novelty,
        errors = report.errors,
        "credit notes reconciled"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn window_spans_previous_and_current_month() {
        assert_eq!(
            lookup_window(day(2024, 3, 15)),
            Some((day(2024, 2, 1), day(2024, 3, 31)))
        );
        assert_eq!(
            lookup_window(day(2024, 1, 31)),
            Some((day(2023, 12, 1), day(2024, 1, 31)))
        );
        assert_eq!(
            lookup_window(day(2024, 12, 1)),
            Some((day(2024, 11, 1), day(2024, 12, 31)))
        );
    }

    #[test]
    fn rejected_beats_approved_beats_rest() {
        let fv = |id: i64, result: &str| InvoiceHeader {
            id,
            final_result_pre_events: Some(result.into()),
            ..Default::default()
        };
        let picked = pick_invoice(vec![
            fv(1, "PROCESADO"),
            fv(2, "APROBADO"),
            fv(3, "RECHAZADO CONTADO"),
        ]);
        assert_eq!(picked.map(|h| h.id), Some(3));
        let picked = pick_invoice(vec![fv(5, "APROBADO"), fv(4, "APROBADO"), fv(1, "CON NOVEDAD")]);
        assert_eq!(picked.map(|h| h.id), Some(4));
        assert!(pick_invoice(Vec::new()).is_none());
    }

    #[test]
    fn overdue_counts_whole_days() {
        let first = day(2024, 1, 1).and_hms_opt(23, 0, 0).unwrap();
        let note = InvoiceHeader {
            first_process_date: Some(first),
            ..Default::default()
        };
        let at = |days| {
            day(2024, 1, 1)
                .checked_add_days(chrono::Days::new(days))
                .and_then(|d| d.and_hms_opt(1, 0, 0))
                .unwrap()
        };
        assert!(!is_overdue(&note, 120, at(120)));
        assert!(is_overdue(&note, 120, at(121)));
        assert!(!is_overdue(&InvoiceHeader::default(), 120, at(500)));
    }
}
