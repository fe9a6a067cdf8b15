//! Core data model, value utilities, configuration, position expansion and
//! subset-sum matching.
//!
//! Everything here is free of I/O; the store, ledger and rule batteries build
//! on top of it.

mod config;
mod error;
mod matcher;
mod positions;
mod state;
mod types;
pub mod values;
mod working_set;

pub use config::*;
pub use error::*;
pub use matcher::*;
pub use positions::*;
pub use state::*;
pub use types::*;
pub use working_set::*;
pub use values::{
    cash_suffix, checked_sum, is_cash, normalize_text, parse_decimal, prepend_observation,
    saturating_sum, supplier_names_match, truncate_observation, within_tolerance,
};
