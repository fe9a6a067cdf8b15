use std::collections::BTreeMap;

use chrono::NaiveDate;

use super::{Store, apply_header_update, merge_novelty};
use crate::core::values::{non_blank, truncate_observation};
use crate::core::{
    CandidateRecord, CxpError, DocumentType, HeaderUpdate, HistoryRow, InvoiceDetail,
    InvoiceHeader, LedgerKey, LedgerRow, NoveltyRecord, is_fully_processed, mark_row_positions,
};

#[derive(Debug, Clone, Default)]
struct Tables {
    headers: BTreeMap<i64, InvoiceHeader>,
    details: Vec<InvoiceDetail>,
    history: Vec<HistoryRow>,
    candidates: Vec<CandidateRecord>,
    ledger: BTreeMap<LedgerKey, LedgerRow>,
    novelties: BTreeMap<(String, String), NoveltyRecord>,
}

/// In-memory [`Store`]. A transaction snapshots every table at
/// [`Store::begin`] and restores the snapshot on rollback.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    tables: Tables,
    snapshot: Option<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a header, as the upstream ingestor would.
    pub fn insert_header(&mut self, header: InvoiceHeader) {
        self.tables.headers.insert(header.id, header);
    }

    pub fn insert_detail(&mut self, detail: InvoiceDetail) {
        self.tables.details.push(detail);
    }

    pub fn insert_history(&mut self, row: HistoryRow) {
        self.tables.history.push(row);
    }

    /// Every history row, consumed or not.
    pub fn history(&self) -> &[HistoryRow] {
        &self.tables.history
    }

    /// Every ledger row in key order.
    pub fn all_ledger_rows(&self) -> Vec<LedgerRow> {
        self.tables.ledger.values().cloned().collect()
    }

    pub fn in_transaction(&self) -> bool {
        self.snapshot.is_some()
    }

    fn header_mut(&mut self, id: i64) -> Result<&mut InvoiceHeader, CxpError> {
        self.tables
            .headers
            .get_mut(&id)
            .ok_or_else(|| CxpError::Data(format!("header {id} not found")))
    }

    fn is_pending_invoice(&self, nit: &str, factura: &str) -> bool {
        self.tables.headers.values().any(|h| {
            h.document_type == Some(DocumentType::Invoice)
                && h.is_pending()
                && h.supplier_tax_id.trim() == nit.trim()
                && h.invoice_number.trim() == factura.trim()
        })
    }
}

fn same_key(a: &str, b: &str) -> bool {
    a.trim().eq_ignore_ascii_case(b.trim())
}

impl Store for MemoryStore {
    fn begin(&mut self) -> Result<(), CxpError> {
        if self.snapshot.is_some() {
            return Err(CxpError::Database("transaction already open".into()));
        }
        self.snapshot = Some(self.tables.clone());
        Ok(())
    }

    fn commit(&mut self) -> Result<(), CxpError> {
        self.snapshot
            .take()
            .map(|_| ())
            .ok_or_else(|| CxpError::Database("commit without transaction".into()))
    }

    fn rollback(&mut self) -> Result<(), CxpError> {
        let snapshot = self
            .snapshot
            .take()
            .ok_or_else(|| CxpError::Database("rollback without transaction".into()))?;
        self.tables = snapshot;
        Ok(())
    }

    fn pending_headers(&self, kind: DocumentType) -> Result<Vec<InvoiceHeader>, CxpError> {
        Ok(self
            .tables
            .headers
            .values()
            .filter(|h| h.document_type == Some(kind) && h.is_pending())
            .cloned()
            .collect())
    }

    fn header(&self, id: i64) -> Result<Option<InvoiceHeader>, CxpError> {
        Ok(self.tables.headers.get(&id).cloned())
    }

    fn pending_details(&self) -> Result<Vec<InvoiceDetail>, CxpError> {
        Ok(self
            .tables
            .details
            .iter()
            .filter(|d| self.is_pending_invoice(&d.supplier_tax_id, &d.invoice_number))
            .cloned()
            .collect())
    }

    fn open_history(&self) -> Result<Vec<HistoryRow>, CxpError> {
        Ok(self
            .tables
            .history
            .iter()
            .filter(|row| !is_fully_processed(row))
            .cloned()
            .collect())
    }

    fn replace_candidates(&mut self, records: &[CandidateRecord]) -> Result<(), CxpError> {
        self.tables.candidates = records.to_vec();
        Ok(())
    }

    fn candidates(&self) -> Result<Vec<CandidateRecord>, CxpError> {
        Ok(self.tables.candidates.clone())
    }

    fn update_header(&mut self, id: i64, update: &HeaderUpdate) -> Result<(), CxpError> {
        apply_header_update(self.header_mut(id)?, update);
        Ok(())
    }

    fn mark_positions(
        &mut self,
        nit: &str,
        purchase_order: &str,
        positions: &[String],
    ) -> Result<usize, CxpError> {
        Ok(self
            .tables
            .history
            .iter_mut()
            .filter(|row| {
                same_key(&row.supplier_tax_id, nit) && same_key(&row.purchase_order, purchase_order)
            })
            .map(|row| mark_row_positions(row, positions))
            .sum())
    }

    fn ledger_row(&self, key: &LedgerKey) -> Result<Option<LedgerRow>, CxpError> {
        Ok(self.tables.ledger.get(key).cloned())
    }

    fn put_ledger_row(&mut self, row: &LedgerRow) -> Result<(), CxpError> {
        let mut row = row.clone();
        row.valor_xml = row.valor_xml.as_deref().map(truncate_observation);
        row.valor_orden_compra = row.valor_orden_compra.as_deref().map(truncate_observation);
        self.tables.ledger.insert(row.key.clone(), row);
        Ok(())
    }

    fn ledger_rows(&self, nit: &str, factura: &str) -> Result<Vec<LedgerRow>, CxpError> {
        Ok(self
            .tables
            .ledger
            .values()
            .filter(|r| r.key.nit == nit && r.key.factura == factura)
            .cloned()
            .collect())
    }

    fn set_ledger_state(&mut self, nit: &str, factura: &str, state: &str) -> Result<usize, CxpError> {
        let mut touched = 0;
        for row in self
            .tables
            .ledger
            .values_mut()
            .filter(|r| r.key.nit == nit && r.key.factura == factura)
        {
            row.estado_validacion = Some(state.to_string());
            touched += 1;
        }
        Ok(touched)
    }

    fn upsert_novelty(&mut self, record: &NoveltyRecord) -> Result<(), CxpError> {
        let key = (record.nit.clone(), record.factura.clone());
        let merged = merge_novelty(self.tables.novelties.get(&key), record);
        self.tables.novelties.insert(key, merged);
        Ok(())
    }

    fn novelties(&self) -> Result<Vec<NoveltyRecord>, CxpError> {
        Ok(self.tables.novelties.values().cloned().collect())
    }

    fn invoices_by_reference(
        &self,
        nit: &str,
        reference: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<InvoiceHeader>, CxpError> {
        Ok(self
            .tables
            .headers
            .values()
            .filter(|h| {
                h.document_type == Some(DocumentType::Invoice)
                    && same_key(&h.supplier_tax_id, nit)
                    && h.prefix_and_number
                        .as_deref()
                        .is_some_and(|p| same_key(p, reference))
                    && h.issue_date.is_some_and(|d| d >= from && d <= to)
                    && non_blank(h.nc_referenced.as_deref()).is_none()
            })
            .cloned()
            .collect())
    }

    fn link_credit_note(&mut self, invoice_id: i64, credit_note: &str) -> Result<(), CxpError> {
        self.header_mut(invoice_id)?.nc_referenced = Some(credit_note.to_string());
        Ok(())
    }
}
