use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::state::{STATE_WAITING, is_novelty};

/// Mark written on a purchase-order position once the engine consumed it.
pub const MARK_PROCESSED: &str = "PROCESADO";

/// Kind of inbound electronic document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DocumentType {
    /// FV: Factura de venta (invoice).
    Invoice,
    /// NC: Nota crédito.
    CreditNote,
    /// ND: Nota débito.
    DebitNote,
}

impl DocumentType {
    /// Two-letter code stored upstream.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Invoice => "FV",
            Self::CreditNote => "NC",
            Self::DebitNote => "ND",
        }
    }

    /// Parse from the two-letter code (case-insensitive).
    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim().to_ascii_uppercase().as_str() {
            "FV" => Some(Self::Invoice),
            "NC" => Some(Self::CreditNote),
            "ND" => Some(Self::DebitNote),
            _ => None,
        }
    }
}

/// SAP purchase-order class, routing a candidate to its rule battery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderClass {
    /// ZPAF / 41: fixed assets.
    Zpaf,
    /// ZVEN / 50: commercialized goods.
    Zven,
    /// ZPCN / 42: general orders.
    Zpcn,
    /// ZPPA: general orders, fixed-asset-like.
    Zppa,
    /// ZPRE / 45: service receptions.
    Zpre,
}

impl OrderClass {
    /// Parse the SAP class code or its legacy numeric equivalent.
    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim().to_ascii_uppercase().as_str() {
            "ZPAF" | "41" => Some(Self::Zpaf),
            "ZVEN" | "50" => Some(Self::Zven),
            "ZPCN" | "42" => Some(Self::Zpcn),
            "ZPPA" => Some(Self::Zppa),
            "ZPRE" | "45" => Some(Self::Zpre),
            _ => None,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::Zpaf => "ZPAF",
            Self::Zven => "ZVEN",
            Self::Zpcn => "ZPCN",
            Self::Zppa => "ZPPA",
            Self::Zpre => "ZPRE",
        }
    }
}

/// One incoming document (FV, NC or ND) as landed in the staging table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InvoiceHeader {
    /// Identity of the staging row (`ID_registro` in the ledger).
    pub id: i64,
    /// NIT of the issuing supplier.
    pub supplier_tax_id: String,
    /// Document number (`Factura` in the ledger).
    pub invoice_number: String,
    /// FV / NC / ND. `None` when upstream wrote an unknown code.
    pub document_type: Option<DocumentType>,
    /// Purchase order the invoice refers to.
    pub purchase_order_ref: Option<String>,
    /// Payment means code; `"1"` and `"01"` denote cash.
    pub payment_means: Option<String>,
    /// ISO currency code of the invoice (`COP`, `USD`).
    pub currency: Option<String>,
    /// Exchange rate to COP declared on the invoice.
    pub trm: Option<Decimal>,
    /// Amount to pay in invoice currency.
    pub amount_to_pay: Option<Decimal>,
    /// Amount to pay converted to COP.
    pub amount_to_pay_cop: Option<Decimal>,
    /// Supplier legal name as written on the XML.
    pub supplier_name: Option<String>,
    /// Issue date of the document.
    pub issue_date: Option<NaiveDate>,
    /// Prefix and number, the business identifier NCs refer to.
    pub prefix_and_number: Option<String>,
    /// DIAN invoice type code (`"20"` for NCs that reference an invoice).
    pub invoice_typecode: Option<String>,
    /// Invoice `prefijo_y_numero` an NC points at.
    pub referenced_invoice: Option<String>,
    /// Receptor legal name.
    pub receptor_name: Option<String>,
    /// Receptor NIT.
    pub receptor_tax_id: Option<String>,
    /// Receptor identification type code (`"31"` = NIT).
    pub receptor_person_type: Option<String>,
    /// Receptor verification digit.
    pub receptor_check_digit: Option<String>,
    /// Receptor fiscal responsibilities (`O-13;O-15`).
    pub receptor_tax_level_code: Option<String>,
    /// Location of the electronic-document bundle (file or folder).
    pub bundle_path: Option<String>,
    /// Phase-4 processing state.
    pub phase4_state: Option<String>,
    /// Phase-4 observation text, newest first.
    pub phase4_observation: Option<String>,
    /// `ResultadoFinalAntesEventos`.
    pub final_result_pre_events: Option<String>,
    /// First time the engine looked at this document.
    pub first_process_date: Option<NaiveDateTime>,
    /// Last time the engine retried this document.
    pub retake_date: Option<NaiveDateTime>,
    /// NC number that references this invoice (`NotaCreditoReferenciada`).
    pub nc_referenced: Option<String>,
}

impl InvoiceHeader {
    /// Business key `(nit, factura)`.
    pub fn key(&self) -> (String, String) {
        (
            self.supplier_tax_id.trim().to_string(),
            self.invoice_number.trim().to_string(),
        )
    }

    /// Purchase order reference, trimmed, `None` when blank.
    pub fn purchase_order(&self) -> Option<&str> {
        self.purchase_order_ref
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// Currency code upper-cased; blank counts as COP.
    pub fn currency_code(&self) -> String {
        match self.currency.as_deref().map(str::trim) {
            Some(c) if !c.is_empty() => c.to_ascii_uppercase(),
            _ => "COP".to_string(),
        }
    }

    pub fn is_usd(&self) -> bool {
        self.currency_code() == "USD"
    }

    /// Whether the header still needs a validation pass.
    ///
    /// Untouched documents and documents waiting for data are pending. Credit
    /// notes with a novelty are retried until found or out of their window.
    pub fn is_pending(&self) -> bool {
        match self.final_result_pre_events.as_deref().map(str::trim) {
            None | Some("") => true,
            Some(result) if result.starts_with(STATE_WAITING) => true,
            Some(result) => {
                self.document_type == Some(DocumentType::CreditNote) && is_novelty(result)
            }
        }
    }
}

/// One invoice line, keyed by `(nit, factura)`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InvoiceDetail {
    pub supplier_tax_id: String,
    pub invoice_number: String,
    /// Line ordinal within the invoice.
    pub line_number: u32,
    pub quantity: Option<Decimal>,
    pub unit_price: Option<Decimal>,
    /// Line subtotal before taxes.
    pub line_extension_amount: Decimal,
}

/// A purchase-order row as SAP history delivers it: multi-position fields
/// hold pipe-joined parallel arrays. Decoded by [`crate::core::expand_positions`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HistoryRow {
    pub supplier_tax_id: String,
    pub purchase_order: String,
    pub positions: String,
    pub por_calcular: String,
    pub trm: String,
    pub supplier_name: String,
    pub creditor_id: String,
    pub doc_date: String,
    pub reg_date: String,
    pub tax_indicator: String,
    pub account: String,
    pub order_class: String,
    pub currency: String,
    pub fixed_asset: String,
    pub capitalized_on: String,
    pub criterion_2: String,
    pub city: String,
    pub fi_doc: String,
    pub cost_center: String,
    pub pep_element: String,
    pub order: String,
    pub order_class_code: String,
    pub site: String,
    pub quantity: String,
    pub unit_price: String,
    pub mark: String,
}

/// A single purchase-order position after expansion.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PoPosition {
    pub supplier_tax_id: String,
    pub purchase_order: String,
    /// SAP position number (`10`, `20`, ...).
    pub position_index: String,
    /// Per-position amount SAP holds for settlement.
    pub por_calcular: Decimal,
    pub trm: Option<Decimal>,
    pub supplier_name: Option<String>,
    pub creditor_id: Option<String>,
    pub doc_date: Option<String>,
    pub reg_date: Option<String>,
    pub tax_indicator: Option<String>,
    pub account: Option<String>,
    pub order_class: Option<String>,
    pub currency: Option<String>,
    pub fixed_asset: Option<String>,
    pub capitalized_on: Option<String>,
    pub criterion_2: Option<String>,
    pub city: Option<String>,
    pub fi_doc: Option<String>,
    pub cost_center: Option<String>,
    pub pep_element: Option<String>,
    pub order: Option<String>,
    /// SAP order type (`ZINV`, `ZADM`) for internal orders.
    pub order_class_code: Option<String>,
    /// Emplazamiento (`DCTO_01`, `GTO_02`) for PEP elements.
    pub site: Option<String>,
    pub quantity: Option<Decimal>,
    pub unit_price: Option<Decimal>,
    pub mark: Option<String>,
}

impl PoPosition {
    /// Whether the engine consumed this position on an earlier run.
    pub fn is_processed(&self) -> bool {
        self.mark
            .as_deref()
            .is_some_and(|m| m.trim().eq_ignore_ascii_case(MARK_PROCESSED))
    }

    pub fn order_class(&self) -> Option<OrderClass> {
        self.order_class.as_deref().and_then(OrderClass::from_code)
    }
}

/// Approval flag of a ledger row (`Aprobado`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Approval {
    Yes,
    No,
}

impl Approval {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Yes => "SI",
            Self::No => "NO",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim() {
            "SI" => Some(Self::Yes),
            "NO" => Some(Self::No),
            _ => None,
        }
    }

    pub fn from_bool(ok: bool) -> Self {
        if ok { Self::Yes } else { Self::No }
    }
}

/// Key of a comparative ledger row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LedgerKey {
    pub id_registro: i64,
    pub nit: String,
    pub factura: String,
    pub item: String,
    /// Ordinal for multi-valued items (one row per position or line).
    pub ordinal: u32,
}

/// One row of the comparative ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerRow {
    pub key: LedgerKey,
    /// Observed value on the invoice.
    pub valor_xml: Option<String>,
    /// Value held by SAP.
    pub valor_orden_compra: Option<String>,
    pub aprobado: Option<Approval>,
    /// Document state, identical on every row of the document.
    pub estado_validacion: Option<String>,
}

impl LedgerRow {
    pub fn empty(key: LedgerKey) -> Self {
        Self {
            key,
            valor_xml: None,
            valor_orden_compra: None,
            aprobado: None,
            estado_validacion: None,
        }
    }
}

/// `HistoricoNovedades` row: one per `(nit, factura)` that ended with a novelty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoveltyRecord {
    pub id_registro: i64,
    pub nit: String,
    pub factura: String,
    pub purchase_order: Option<String>,
    pub state: String,
    pub observation: String,
    pub processed_at: NaiveDateTime,
    /// FecDoc of the purchase order, once known.
    pub doc_date: Option<String>,
    /// FecReg of the purchase order, once known.
    pub reg_date: Option<String>,
}

/// Changes applied to a header at the end of a step.
///
/// `observation` is prepended to the existing text, never replacing it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HeaderUpdate {
    pub phase4_state: Option<String>,
    pub observation: Option<String>,
    pub final_result: Option<String>,
    pub first_process_date: Option<NaiveDateTime>,
    pub retake_date: Option<NaiveDateTime>,
}
