//! # cxp-validacion
//!
//! Accounts-payable validation engine for inbound Colombian electronic
//! documents: invoices (FV) are matched to open SAP purchase-order positions
//! and validated by the rule battery of their order class; credit notes (NC)
//! are reconciled with the invoice they reference; debit notes (ND) get the
//! receptor checks.
//!
//! All monetary values use [`rust_decimal::Decimal`], never floating point.
//! Every outcome is written to the comparative ledger, one row per
//! `(ID_registro, NIT, Factura, Item, ordinal)`.
//!
//! ## Quick Start
//!
//! ```rust
//! use cxp_validacion::core::*;
//! use rust_decimal_macros::dec;
//!
//! let positions = [dec!(600), dec!(400), dec!(400), dec!(600)];
//! let subset = find_subset(&positions, dec!(1000), 2, dec!(0));
//! assert_eq!(subset, vec![0, 1]);
//!
//! assert!(supplier_names_match("ACME S.A.S.", "sas acme"));
//! assert_eq!(cash_suffix(Some("01")), " CONTADO");
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `core` (default) | Data model, values, config, matcher, store trait, ledger, rule engine |
//! | `sqlite` (default) | SQLite-backed store |
//! | `excel` (default) | Excel masters and the NC novelty export |
//! | `hu41` (default) | Candidate builder, dispatcher and order-class batteries |
//! | `hu42` (default) | Credit and debit note reconciliation |
//! | `all` | Everything |
//!
//! The [`pipeline`] run entry point needs both `hu41` and `hu42`.

#[cfg(feature = "core")]
pub mod core;

#[cfg(feature = "core")]
pub mod ledger;

#[cfg(feature = "core")]
pub mod rules;

#[cfg(feature = "core")]
pub mod store;

#[cfg(feature = "excel")]
pub mod masters;

#[cfg(feature = "hu41")]
pub mod hu41;

#[cfg(feature = "hu42")]
pub mod hu42;

#[cfg(all(feature = "hu41", feature = "hu42"))]
pub mod pipeline;

// Re-export core types at crate root for convenience
#[cfg(feature = "core")]
pub use crate::core::*;
