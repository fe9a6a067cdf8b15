use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::core::CxpError;

pub const VAR_RESULT: &str = "vLocStrResultadoSP";
pub const VAR_SUMMARY: &str = "vLocStrResumenSP";
pub const VAR_STATS: &str = "vLocDicEstadisticas";
pub const VAR_ERROR_DETAIL: &str = "vGblStrDetalleError";
pub const VAR_SYSTEM_ERROR: &str = "vGblStrSystemError";

/// Counters of one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStats {
    pub candidatos: usize,
    pub procesados: usize,
    pub con_novedad: usize,
    pub en_espera: usize,
    pub sin_orden: usize,
    pub errores: usize,
    pub nc_encontradas: usize,
    pub nc_no_exitosas: usize,
    pub nc_con_novedad: usize,
    pub nd_procesadas: usize,
}

impl RunStats {
    /// Counters as a mapping literal, in declaration order:
    /// `{'candidatos': 1, 'procesados': 1, ...}`.
    pub fn to_literal(&self) -> String {
        let fields = [
            ("candidatos", self.candidatos),
            ("procesados", self.procesados),
            ("con_novedad", self.con_novedad),
            ("en_espera", self.en_espera),
            ("sin_orden", self.sin_orden),
            ("errores", self.errores),
            ("nc_encontradas", self.nc_encontradas),
            ("nc_no_exitosas", self.nc_no_exitosas),
            ("nc_con_novedad", self.nc_con_novedad),
            ("nd_procesadas", self.nd_procesadas),
        ];
        let body: Vec<String> = fields
            .iter()
            .map(|(name, value)| format!("'{name}': {value}"))
            .collect();
        format!("{{{}}}", body.join(", "))
    }

    pub fn summary(&self) -> String {
        format!(
            "Validacion finalizada: {} candidatos, {} procesados, {} con novedad, {} en espera, \
             {} sin orden de compra, {} errores. NC: {} encontradas, {} no exitosas, {} con novedad. \
             ND: {} procesadas.",
            self.candidatos,
            self.procesados,
            self.con_novedad,
            self.en_espera,
            self.sin_orden,
            self.errores,
            self.nc_encontradas,
            self.nc_no_exitosas,
            self.nc_con_novedad,
            self.nd_procesadas,
        )
    }
}

/// Why a run stopped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunFailure {
    /// Error kind: `Configuration`, `Connection`, `Database`, ...
    pub kind: String,
    pub detail: String,
}

impl From<&CxpError> for RunFailure {
    fn from(err: &CxpError) -> Self {
        let kind = match err {
            CxpError::Configuration(_) => "Configuration",
            CxpError::Connection(_) => "Connection",
            CxpError::Database(_) => "Database",
            CxpError::Data(_) => "Data",
            CxpError::Master(_) => "Master",
            CxpError::Export(_) => "Export",
            CxpError::Io(_) => "Io",
        };
        Self {
            kind: kind.to_string(),
            detail: err.to_string(),
        }
    }
}

/// Result of a run, handed back to the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunOutcome {
    pub ok: bool,
    pub summary: String,
    pub stats: RunStats,
    pub error: Option<RunFailure>,
}

impl RunOutcome {
    pub fn success(stats: RunStats) -> Self {
        Self {
            ok: true,
            summary: stats.summary(),
            stats,
            error: None,
        }
    }

    /// A run aborted by `err`; `stats` holds what was done before.
    pub fn failure(err: &CxpError, stats: RunStats) -> Self {
        Self {
            ok: false,
            summary: format!("Validacion fallida: {err}"),
            stats,
            error: Some(err.into()),
        }
    }

    /// Variables the orchestrator reads after the run.
    pub fn to_orchestrator_vars(&self) -> BTreeMap<&'static str, String> {
        let mut vars = BTreeMap::new();
        let result = if self.ok { "True" } else { "False" };
        vars.insert(VAR_RESULT, result.to_string());
        vars.insert(VAR_SUMMARY, self.summary.clone());
        vars.insert(VAR_STATS, self.stats.to_literal());
        if let Some(error) = &self.error {
            vars.insert(VAR_ERROR_DETAIL, error.detail.clone());
            vars.insert(VAR_SYSTEM_ERROR, error.kind.clone());
        }
        vars
    }
}
