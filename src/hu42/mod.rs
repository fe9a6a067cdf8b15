//! Credit and debit notes.
//!
//! Credit notes (NC) are checked against the receptor data of the company
//! and resolved to the invoice they reference: same supplier, same
//! `prefijo_y_numero`, issued in the note's month or the previous one, not
//! yet claimed by another note. A resolved note ends `Encontrado` and the
//! invoice records the note number. Notes older than the retake window end
//! `No exitoso`.
//!
//! Debit notes (ND) only go through the receptor checks.

mod credit_notes;
mod debit_notes;
pub mod export;
pub mod receptor;

pub use credit_notes::{
    CreditNoteReport, REFERENCING_TYPECODE, is_overdue, lookup_window, pick_invoice,
    reconcile_credit_notes,
};
pub use debit_notes::{DebitNoteReport, validate_debit_notes};
pub use export::{EXPORT_COLUMNS, EXPORT_SHEET, append_unresolved, read_export};
