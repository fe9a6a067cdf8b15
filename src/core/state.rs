//! Result states written to `ResultadoFinalAntesEventos`, the phase-4 state
//! and the ledger's `Estado_validacion_antes_de_eventos`.

use super::values::cash_suffix;

pub const STATE_PROCESSED: &str = "PROCESADO";
pub const STATE_APPROVED: &str = "APROBADO";
pub const STATE_REJECTED: &str = "RECHAZADO";
pub const STATE_NOVELTY: &str = "CON NOVEDAD";
pub const STATE_WAITING: &str = "EN ESPERA";
pub const STATE_WAITING_COMMERCIALIZED: &str = "EN ESPERA - COMERCIALIZADOS";
pub const STATE_NOVELTY_COMMERCIALIZED: &str = "CON NOVEDAD - COMERCIALIZADOS";
pub const STATE_FOUND: &str = "Encontrado";
pub const STATE_NOT_SUCCESSFUL: &str = "No exitoso";

/// Append `" CONTADO"` to `state` when the payment means denote cash.
pub fn with_cash_suffix(state: &str, payment_means: Option<&str>) -> String {
    format!("{state}{}", cash_suffix(payment_means))
}

/// Whether a final result is one of the novelty variants.
pub fn is_novelty(result: &str) -> bool {
    result.trim_start().starts_with(STATE_NOVELTY)
}
