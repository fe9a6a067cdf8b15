//! Validation of purchase-order backed invoices.
//!
//! [`build_candidates`] joins pending invoice headers with their detail lines
//! and open purchase-order positions, picking the positions each invoice
//! spans. [`Dispatcher`] routes every candidate to the rule battery of its
//! SAP order class:
//!
//! | Class | Battery |
//! |-------|---------|
//! | ZPAF / 41 | fixed assets ([`zpaf`]) |
//! | ZVEN / 50 | commercialized goods ([`zven`]) |
//! | ZPCN / ZPPA / 42 | general orders ([`zpcn`]) |
//! | ZPRE / 45 | service receptions ([`zpre`]) |

mod candidates;
mod common;
mod dispatcher;
pub mod zpaf;
pub mod zpcn;
pub mod zpre;
pub mod zven;

pub use candidates::{BuildReport, Candidate, build_candidates, candidate_record};
pub use dispatcher::{Battery, Dispatcher, MasterCache};

use rust_decimal::Decimal;

use crate::core::{InvoiceDetail, InvoiceHeader, PoPosition, RunConfig};

/// Ledger item names written by the batteries.
pub mod items {
    pub const AMOUNT: &str = "Valor a pagar";
    pub const TRM: &str = "TRM";
    pub const SUPPLIER_NAME: &str = "Nombre emisor";
    pub const FIXED_ASSET: &str = "Activo fijo";
    pub const CAPITALIZED_ON: &str = "Capitalizado el";
    pub const TAX_INDICATOR: &str = "Indicador impuestos";
    pub const CRITERION_2: &str = "Criterio clasif. 2";
    pub const ACCOUNT: &str = "Cuenta";
    pub const QUANTITY: &str = "Cantidad";
    pub const UNIT_PRICE: &str = "Precio unitario";
    pub const MAESTRO_VALUE: &str = "Valor maestro comercializados";
    pub const MAESTRO_TOTAL: &str = "Suma maestro comercializados";
    pub const MAESTRO_ME_TOTAL: &str = "Suma ME maestro comercializados";
    pub const COST_CENTER: &str = "Centro de coste";
    pub const PEP_ELEMENT: &str = "Elemento PEP";
    pub const SITE: &str = "Emplazamiento";
    pub const ORDER: &str = "Orden";
    pub const ORDER_CLASS: &str = "Clase orden";
}

/// What every rule of a battery sees.
#[derive(Debug, Clone, Copy)]
pub struct RuleContext<'a> {
    pub candidate: &'a Candidate,
    pub config: &'a RunConfig,
}

impl<'a> RuleContext<'a> {
    pub fn new(candidate: &'a Candidate, config: &'a RunConfig) -> Self {
        Self { candidate, config }
    }

    pub fn header(&self) -> &'a InvoiceHeader {
        &self.candidate.header
    }

    pub fn details(&self) -> &'a [InvoiceDetail] {
        &self.candidate.details
    }

    /// Chosen positions, in purchase-order order.
    pub fn positions(&self) -> &'a [PoPosition] {
        &self.candidate.positions
    }

    pub fn first_position(&self) -> Option<&'a PoPosition> {
        self.candidate.positions.first()
    }

    /// `Σ line_extension_amount` of the detail lines.
    pub fn subtotal(&self) -> Decimal {
        self.candidate.subtotal()
    }

    /// `Σ por_calcular` of the chosen positions.
    pub fn positions_total(&self) -> Decimal {
        self.candidate.positions_total()
    }

    pub fn tolerance(&self) -> Decimal {
        self.config.tolerance
    }
}
