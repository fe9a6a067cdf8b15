//! Persistence boundary.
//!
//! Every read and write of the pipeline goes through [`Store`]. The in-memory
//! implementation backs tests and embedding callers; the SQLite
//! implementation (`sqlite` feature) persists to a relational database with
//! parameterized statements.
//!
//! # Example
//!
//! ```
//! use cxp_validacion::core::*;
//! use cxp_validacion::store::{MemoryStore, Store, with_transaction};
//!
//! let mut store = MemoryStore::new();
//! let result: Result<(), CxpError> = with_transaction(&mut store, |s| {
//!     s.update_header(1, &HeaderUpdate::default())?;
//!     Err(CxpError::Data("boom".into()))
//! });
//! assert!(result.is_err());
//! ```

mod connection;
mod memory;
#[cfg(feature = "sqlite")]
mod sqlite;

use chrono::NaiveDate;
use tracing::warn;

use crate::core::values::{prepend_observation, truncate_observation};
use crate::core::{
    CandidateRecord, CxpError, DocumentType, HeaderUpdate, HistoryRow, InvoiceDetail,
    InvoiceHeader, LedgerKey, LedgerRow, NoveltyRecord,
};

pub use connection::{AuthMethod, ConnectionSettings, Connector, RetryPolicy, open_session};
pub use memory::MemoryStore;
#[cfg(feature = "sqlite")]
pub use sqlite::{SqliteConnector, SqliteStore};

/// Database operations the pipeline depends on.
pub trait Store {
    /// Start a transaction.
    fn begin(&mut self) -> Result<(), CxpError>;
    /// Make every write since [`Store::begin`] durable.
    fn commit(&mut self) -> Result<(), CxpError>;
    /// Discard every write since [`Store::begin`].
    fn rollback(&mut self) -> Result<(), CxpError>;

    /// Headers of the given kind that still need a pass.
    fn pending_headers(&self, kind: DocumentType) -> Result<Vec<InvoiceHeader>, CxpError>;
    fn header(&self, id: i64) -> Result<Option<InvoiceHeader>, CxpError>;
    /// Detail lines belonging to pending invoices.
    fn pending_details(&self) -> Result<Vec<InvoiceDetail>, CxpError>;
    /// History rows with at least one position not yet consumed.
    fn open_history(&self) -> Result<Vec<HistoryRow>, CxpError>;

    /// Drop the candidate working set and store `records` in its place.
    fn replace_candidates(&mut self, records: &[CandidateRecord]) -> Result<(), CxpError>;
    fn candidates(&self) -> Result<Vec<CandidateRecord>, CxpError>;

    /// Apply `update`; the observation is prepended to the existing one.
    fn update_header(&mut self, id: i64, update: &HeaderUpdate) -> Result<(), CxpError>;
    /// Flag the named positions of `(nit, purchase_order)` as consumed.
    fn mark_positions(
        &mut self,
        nit: &str,
        purchase_order: &str,
        positions: &[String],
    ) -> Result<usize, CxpError>;

    fn ledger_row(&self, key: &LedgerKey) -> Result<Option<LedgerRow>, CxpError>;
    /// Insert or replace a ledger row; text is truncated on the way in.
    fn put_ledger_row(&mut self, row: &LedgerRow) -> Result<(), CxpError>;
    /// All rows of one document, ordered by item and ordinal.
    fn ledger_rows(&self, nit: &str, factura: &str) -> Result<Vec<LedgerRow>, CxpError>;
    /// Write `state` on every ledger row of `(nit, factura)`.
    fn set_ledger_state(&mut self, nit: &str, factura: &str, state: &str) -> Result<usize, CxpError>;

    /// Insert or update the novelty audit row of `(nit, factura)`.
    fn upsert_novelty(&mut self, record: &NoveltyRecord) -> Result<(), CxpError>;
    fn novelties(&self) -> Result<Vec<NoveltyRecord>, CxpError>;

    /// Invoices of `nit` with `prefix_and_number == reference`, issued in
    /// `[from, to]` and not yet referenced by a credit note.
    fn invoices_by_reference(
        &self,
        nit: &str,
        reference: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<InvoiceHeader>, CxpError>;
    /// Record on the invoice the number of the credit note referencing it.
    fn link_credit_note(&mut self, invoice_id: i64, credit_note: &str) -> Result<(), CxpError>;
}

/// Apply `update` to `header` the way every [`Store`] must: the observation
/// is prepended, the first-process date is only ever set once.
pub fn apply_header_update(header: &mut InvoiceHeader, update: &HeaderUpdate) {
    if let Some(state) = &update.phase4_state {
        header.phase4_state = Some(state.clone());
    }
    if let Some(observation) = &update.observation {
        header.phase4_observation = Some(prepend_observation(
            header.phase4_observation.as_deref(),
            observation,
        ));
    }
    if let Some(result) = &update.final_result {
        header.final_result_pre_events = Some(result.clone());
    }
    if let Some(date) = update.first_process_date {
        header.first_process_date.get_or_insert(date);
    }
    if let Some(date) = update.retake_date {
        header.retake_date = Some(date);
    }
}

/// Merge a novelty upsert with the row already stored for the same
/// `(nit, factura)`. Dates discovered earlier survive a later update.
pub fn merge_novelty(existing: Option<&NoveltyRecord>, record: &NoveltyRecord) -> NoveltyRecord {
    let mut merged = record.clone();
    merged.observation = truncate_observation(&merged.observation);
    if let Some(existing) = existing {
        merged.doc_date = merged.doc_date.or_else(|| existing.doc_date.clone());
        merged.reg_date = merged.reg_date.or_else(|| existing.reg_date.clone());
    }
    merged
}

/// Run `f` inside a transaction: commit on `Ok`, roll back on `Err` and
/// hand the error back.
pub fn with_transaction<S, T, F>(store: &mut S, f: F) -> Result<T, CxpError>
where
    S: Store + ?Sized,
    F: FnOnce(&mut S) -> Result<T, CxpError>,
{
    store.begin()?;
    match f(store) {
        Ok(value) => {
            store.commit()?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = store.rollback() {
                warn!(error = %rollback_err, "rollback failed");
            }
            Err(err)
        }
    }
}
