use chrono::NaiveDateTime;
use tracing::{info, warn};

use super::receptor::RECEPTOR_RULES;
use crate::core::{CxpError, DocumentType, STATE_PROCESSED};
use crate::rules::RuleEngine;
use crate::store::{Store, with_transaction};

/// What a debit-note pass produced.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DebitNoteReport {
    pub processed: usize,
    pub novelty: usize,
    pub errors: usize,
}

/// Run the receptor checks on every pending debit note.
pub fn validate_debit_notes<S: Store + ?Sized>(
    store: &mut S,
    now: NaiveDateTime,
) -> Result<DebitNoteReport, CxpError> {
    let notes = store.pending_headers(DocumentType::DebitNote)?;
    info!(notes = notes.len(), "validating debit notes");
    let mut report = DebitNoteReport::default();

    for note in notes {
        let outcome = with_transaction(store, |s| {
            let mut engine = RuleEngine::new(s, &note);
            engine.run(RECEPTOR_RULES, &note)?;
            engine.settle(STATE_PROCESSED, now)
        });
        match outcome {
            Ok(settlement) if settlement.is_novelty() => report.novelty += 1,
            Ok(_) => report.processed += 1,
            Err(err) if err.is_fatal() => return Err(err),
            Err(err) => {
                warn!(id = note.id, nd = %note.invoice_number, error = %err, "debit note failed");
                report.errors += 1;
            }
        }
    }
    info!(
        processed = report.processed,
        novelty = report.novelty,
        errors = report.errors,
        "debit notes validated"
    );
    Ok(report)
}
