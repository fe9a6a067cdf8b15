//! Comparative ledger and novelty history.
//!
//! The ledger is a multiset of rows keyed by
//! `(ID_registro, NIT, Factura, Item, ordinal)`. Rows are created the first
//! time an item is referenced for a document and updated in place after
//! that; they are never deleted. Every row of a document carries the same
//! `Estado_validacion_antes_de_eventos`.
//!
//! ```
//! use cxp_validacion::core::{Approval, InvoiceHeader};
//! use cxp_validacion::ledger::{LedgerEntry, LedgerWriter};
//! use cxp_validacion::store::{MemoryStore, Store};
//!
//! let header = InvoiceHeader {
//!     id: 1,
//!     supplier_tax_id: "800111".into(),
//!     invoice_number: "F1".into(),
//!     ..Default::default()
//! };
//! let mut store = MemoryStore::new();
//! let ledger = LedgerWriter::for_header(&header);
//! ledger
//!     .upsert(&mut store, &LedgerEntry::new("TRM").xml("4125.5").approved(Approval::Yes))
//!     .unwrap();
//! ledger.set_state(&mut store, "PROCESADO").unwrap();
//! let rows = store.ledger_rows("800111", "F1").unwrap();
//! assert_eq!(rows[0].estado_validacion.as_deref(), Some("PROCESADO"));
//! ```

use chrono::NaiveDateTime;
use tracing::debug;

use crate::core::values::{non_blank, prepend_observation};
use crate::core::{
    Approval, CxpError, HistoryRow, InvoiceHeader, LedgerKey, LedgerRow, NoveltyRecord,
    POSITION_SEPARATOR,
};
use crate::store::Store;

/// Item holding the free-text observation of a document.
pub const ITEM_OBSERVATIONS: &str = "Observaciones";

/// One value to write for an item.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LedgerEntry {
    pub item: String,
    pub ordinal: u32,
    pub valor_xml: Option<String>,
    pub valor_orden_compra: Option<String>,
    pub aprobado: Option<Approval>,
}

impl LedgerEntry {
    pub fn new(item: impl Into<String>) -> Self {
        Self {
            item: item.into(),
            ..Default::default()
        }
    }

    pub fn ordinal(mut self, ordinal: u32) -> Self {
        self.ordinal = ordinal;
        self
    }

    pub fn xml(mut self, value: impl Into<String>) -> Self {
        self.valor_xml = Some(value.into());
        self
    }

    pub fn order(mut self, value: impl Into<String>) -> Self {
        self.valor_orden_compra = Some(value.into());
        self
    }

    pub fn maybe_xml(mut self, value: Option<String>) -> Self {
        self.valor_xml = value;
        self
    }

    pub fn maybe_order(mut self, value: Option<String>) -> Self {
        self.valor_orden_compra = value;
        self
    }

    pub fn approved(mut self, approval: Approval) -> Self {
        self.aprobado = Some(approval);
        self
    }
}

/// Writes the ledger rows of one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerWriter {
    id_registro: i64,
    nit: String,
    factura: String,
}

impl LedgerWriter {
    pub fn new(id_registro: i64, nit: impl Into<String>, factura: impl Into<String>) -> Self {
        Self {
            id_registro,
            nit: nit.into(),
            factura: factura.into(),
        }
    }

    pub fn for_header(header: &InvoiceHeader) -> Self {
        let (nit, factura) = header.key();
        Self::new(header.id, nit, factura)
    }

    pub fn key(&self, item: &str, ordinal: u32) -> LedgerKey {
        LedgerKey {
            id_registro: self.id_registro,
            nit: self.nit.clone(),
            factura: self.factura.clone(),
            item: item.to_string(),
            ordinal,
        }
    }

    /// Upsert one row. Fields left `None` in `entry` keep their stored value.
    /// A new row inherits the document state already present on its siblings.
    pub fn upsert<S: Store + ?Sized>(
        &self,
        store: &mut S,
        entry: &LedgerEntry,
    ) -> Result<LedgerRow, CxpError> {
        let key = self.key(&entry.item, entry.ordinal);
        let mut row = match store.ledger_row(&key)? {
            Some(row) => row,
            None => {
                let mut row = LedgerRow::empty(key);
                row.estado_validacion = self.current_state(store)?;
                debug!(item = %entry.item, ordinal = entry.ordinal, "ledger item created");
                row
            }
        };
        if entry.valor_xml.is_some() {
            row.valor_xml = entry.valor_xml.clone();
        }
        if entry.valor_orden_compra.is_some() {
            row.valor_orden_compra = entry.valor_orden_compra.clone();
        }
        if entry.aprobado.is_some() {
            row.aprobado = entry.aprobado;
        }
        store.put_ledger_row(&row)?;
        Ok(row)
    }

    /// Prepend `text` to the observation item.
    pub fn append_observation<S: Store + ?Sized>(
        &self,
        store: &mut S,
        text: &str,
    ) -> Result<(), CxpError> {
        let key = self.key(ITEM_OBSERVATIONS, 0);
        let existing = store.ledger_row(&key)?.and_then(|r| r.valor_xml);
        let combined = prepend_observation(existing.as_deref(), text);
        self.upsert(store, &LedgerEntry::new(ITEM_OBSERVATIONS).xml(combined))?;
        Ok(())
    }

    /// Replicate `state` onto every row of the document.
    pub fn set_state<S: Store + ?Sized>(&self, store: &mut S, state: &str) -> Result<usize, CxpError> {
        store.set_ledger_state(&self.nit, &self.factura, state)
    }

    fn current_state<S: Store + ?Sized>(&self, store: &S) -> Result<Option<String>, CxpError> {
        Ok(store
            .ledger_rows(&self.nit, &self.factura)?
            .into_iter()
            .find_map(|r| r.estado_validacion))
    }
}

/// Record a novelty outcome for `header` in `HistoricoNovedades`.
pub fn record_novelty<S: Store + ?Sized>(
    store: &mut S,
    header: &InvoiceHeader,
    state: &str,
    processed_at: NaiveDateTime,
    order_dates: Option<(String, String)>,
) -> Result<(), CxpError> {
    let (nit, factura) = header.key();
    let refreshed = store.header(header.id)?;
    let observation = refreshed
        .as_ref()
        .and_then(|h| h.phase4_observation.clone())
        .unwrap_or_default();
    let (doc_date, reg_date) = match order_dates {
        Some((doc, reg)) => (Some(doc), Some(reg)),
        None => (None, None),
    };
    store.upsert_novelty(&NoveltyRecord {
        id_registro: header.id,
        nit,
        factura,
        purchase_order: header.purchase_order().map(str::to_string),
        state: state.to_string(),
        observation,
        processed_at,
        doc_date: doc_date.filter(|d| !d.trim().is_empty()),
        reg_date: reg_date.filter(|d| !d.trim().is_empty()),
    })
}

fn first_slot(raw: &str) -> Option<String> {
    raw.split(POSITION_SEPARATOR)
        .map(str::trim)
        .find(|s| !s.is_empty())
        .map(str::to_string)
}

/// Fill FecDoc/FecReg of novelty rows that lack them from open history.
/// Returns how many rows were completed.
pub fn backfill_novelty_dates<S: Store + ?Sized>(store: &mut S) -> Result<usize, CxpError> {
    let pending: Vec<NoveltyRecord> = store
        .novelties()?
        .into_iter()
        .filter(|n| n.doc_date.is_none() || n.reg_date.is_none())
        .collect();
    if pending.is_empty() {
        return Ok(0);
    }
    let history = store.open_history()?;
    let mut filled = 0;
    for mut record in pending {
        let Some(order) = non_blank(record.purchase_order.as_deref()).map(str::to_string) else {
            continue;
        };
        let Some(row) = history.iter().find(|h: &&HistoryRow| {
            h.supplier_tax_id.trim() == record.nit.trim()
                && h.purchase_order.trim().eq_ignore_ascii_case(&order)
        }) else {
            continue;
        };
        let doc_date = record.doc_date.clone().or_else(|| first_slot(&row.doc_date));
        let reg_date = record.reg_date.clone().or_else(|| first_slot(&row.reg_date));
        if doc_date == record.doc_date && reg_date == record.reg_date {
            continue;
        }
        record.doc_date = doc_date;
        record.reg_date = reg_date;
        store.upsert_novelty(&record)?;
        filled += 1;
    }
    debug!(filled, "novelty dates backfilled");
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn writer() -> LedgerWriter {
        LedgerWriter::new(1, "800111", "F1")
    }

    #[test]
    fn upsert_merges_fields() {
        let mut store = MemoryStore::new();
        let ledger = writer();
        ledger
            .upsert(&mut store, &LedgerEntry::new("Cuenta").ordinal(2).xml("A"))
            .unwrap();
        let row = ledger
            .upsert(
                &mut store,
                &LedgerEntry::new("Cuenta").ordinal(2).order("B").approved(Approval::No),
            )
            .unwrap();
        assert_eq!(row.valor_xml.as_deref(), Some("A"));
        assert_eq!(row.valor_orden_compra.as_deref(), Some("B"));
        assert_eq!(row.aprobado, Some(Approval::No));
        assert_eq!(store.ledger_rows("800111", "F1").unwrap().len(), 1);
    }

    #[test]
    fn new_rows_inherit_document_state() {
        let mut store = MemoryStore::new();
        let ledger = writer();
        ledger.upsert(&mut store, &LedgerEntry::new("TRM")).unwrap();
        ledger.set_state(&mut store, "CON NOVEDAD").unwrap();
        let row = ledger.upsert(&mut store, &LedgerEntry::new("Cuenta")).unwrap();
        assert_eq!(row.estado_validacion.as_deref(), Some("CON NOVEDAD"));
    }

    #[test]
    fn observations_newest_first() {
        let mut store = MemoryStore::new();
        let ledger = writer();
        ledger.append_observation(&mut store, "X").unwrap();
        ledger.append_observation(&mut store, "Y").unwrap();
        let row = store
            .ledger_row(&ledger.key(ITEM_OBSERVATIONS, 0))
            .unwrap()
            .unwrap();
        assert_eq!(row.valor_xml.as_deref(), Some("Y, X"));
    }

    #[test]
    fn first_slot_skips_blanks() {
        assert_eq!(first_slot("|2024-01-05|2024-01-06").as_deref(), Some("2024-01-05"));
        assert_eq!(first_slot(" "), None);
    }
}
