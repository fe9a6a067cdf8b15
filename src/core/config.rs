//! Run configuration (`vLocDicConfig`).
//!
//! The orchestrator hands the configuration over as a JSON object, a JSON
//! string, or the textual literal form of its mapping
//! (`{'Tolerancia': 500, 'Flag': True}`). All three end up in [`RunConfig`].

use std::path::PathBuf;
use std::time::Duration;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::error::CxpError;
use super::values::parse_decimal;

pub const KEY_SERVER: &str = "ServidorBaseDatos";
pub const KEY_DATABASE: &str = "NombreBaseDatos";
pub const KEY_USER: &str = "UsuarioBaseDatos";
pub const KEY_PASSWORD: &str = "ClaveBaseDatos";
pub const KEY_TOLERANCE: &str = "Tolerancia";
pub const KEY_TRM_TOLERANCE: &str = "ToleranciaTRM";
pub const KEY_MAESTRO: &str = "RutaInsumosComercializados";
pub const KEY_ASOCIACION: &str = "RutaInsumoAsociacion";
pub const KEY_DESTINO_COMERCIALIZADOS: &str = "CarpetaDestinoComercializados";
pub const KEY_IMPUESTOS_ESPECIALES: &str = "DocImpuestosEspeciales";
pub const KEY_RETAKE_DAYS: &str = "plazo_maximo_retoma_dias";
pub const KEY_NOVELTY_EXPORT: &str = "RutaInsumoRetorno";
pub const KEY_MAX_RETRIES: &str = "MaxRetries";
pub const KEY_COMMAND_TIMEOUT: &str = "TiempoEsperaComando";

/// Settings for one validation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    /// Database server host.
    pub server: String,
    /// Database name.
    pub database: String,
    /// SQL login; when absent only trusted authentication is attempted.
    pub user: Option<String>,
    pub password: Option<String>,
    /// Amount tolerance (default 500).
    pub tolerance: Decimal,
    /// TRM tolerance for service receptions (default 10).
    pub trm_tolerance: Decimal,
    /// Maestro Comercializados workbook.
    pub maestro_comercializados: Option<PathBuf>,
    /// Asociación cuenta indicador workbook.
    pub asociacion_cuenta_indicador: Option<PathBuf>,
    /// Destination for ZVEN bundles waiting for the Maestro.
    pub carpeta_destino_comercializados: Option<PathBuf>,
    /// Impuestos Especiales workbook (`IVA CECO` sheet).
    pub impuestos_especiales: Option<PathBuf>,
    /// Days an NC keeps being retried after its first pass (default 120).
    pub nc_retake_days: i64,
    /// Workbook collecting unresolved NCs.
    pub novelty_export: Option<PathBuf>,
    /// Connection attempts per authentication method (default 3).
    pub max_retries: u32,
    /// Per-statement timeout.
    pub command_timeout: Option<Duration>,
}

impl RunConfig {
    /// Parse configuration text: JSON first, then the literal mapping form.
    pub fn parse(text: &str) -> Result<Self, CxpError> {
        let value: Value = match serde_json::from_str(text) {
            Ok(value) => value,
            Err(_) => serde_json::from_str(&literal_to_json(text)).map_err(|e| {
                CxpError::Configuration(format!("configuration is neither JSON nor a mapping literal: {e}"))
            })?,
        };
        match value {
            Value::Object(map) => Self::from_map(&map),
            // A JSON string holding the mapping.
            Value::String(inner) => Self::parse(&inner),
            other => Err(CxpError::Configuration(format!(
                "configuration must be a mapping, got {other}"
            ))),
        }
    }

    /// Build from an already-decoded mapping.
    pub fn from_map(map: &Map<String, Value>) -> Result<Self, CxpError> {
        let server = get_str(map, KEY_SERVER)
            .ok_or_else(|| CxpError::Configuration(format!("missing required key '{KEY_SERVER}'")))?;
        let database = get_str(map, KEY_DATABASE).ok_or_else(|| {
            CxpError::Configuration(format!("missing required key '{KEY_DATABASE}'"))
        })?;

        let command_timeout = get_decimal(map, KEY_COMMAND_TIMEOUT)?
            .and_then(|secs| u64::try_from(secs.trunc()).ok())
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs);

        Ok(Self {
            server,
            database,
            user: get_str(map, KEY_USER),
            password: get_str(map, KEY_PASSWORD),
            tolerance: get_decimal(map, KEY_TOLERANCE)?.unwrap_or(dec!(500)),
            trm_tolerance: get_decimal(map, KEY_TRM_TOLERANCE)?.unwrap_or(dec!(10)),
            maestro_comercializados: get_str(map, KEY_MAESTRO).map(PathBuf::from),
            asociacion_cuenta_indicador: get_str(map, KEY_ASOCIACION).map(PathBuf::from),
            carpeta_destino_comercializados: get_str(map, KEY_DESTINO_COMERCIALIZADOS)
                .map(PathBuf::from),
            impuestos_especiales: get_str(map, KEY_IMPUESTOS_ESPECIALES).map(PathBuf::from),
            nc_retake_days: get_integer(map, KEY_RETAKE_DAYS)?.unwrap_or(120),
            novelty_export: get_str(map, KEY_NOVELTY_EXPORT).map(PathBuf::from),
            max_retries: get_integer(map, KEY_MAX_RETRIES)?
                .map(|n| n.clamp(1, i64::from(u32::MAX)) as u32)
                .unwrap_or(3),
            command_timeout,
        })
    }
}

/// Builder for [`RunConfig`], mostly for embedding callers and tests.
///
/// ```
/// use cxp_validacion::core::RunConfigBuilder;
/// use rust_decimal_macros::dec;
///
/// let config = RunConfigBuilder::new("localhost", "cxp")
///     .tolerance(dec!(100))
///     .build();
/// assert_eq!(config.trm_tolerance, dec!(10));
/// ```
pub struct RunConfigBuilder {
    config: RunConfig,
}

impl RunConfigBuilder {
    pub fn new(server: impl Into<String>, database: impl Into<String>) -> Self {
        Self {
            config: RunConfig {
                server: server.into(),
                database: database.into(),
                user: None,
                password: None,
                tolerance: dec!(500),
                trm_tolerance: dec!(10),
                maestro_comercializados: None,
                asociacion_cuenta_indicador: None,
                carpeta_destino_comercializados: None,
                impuestos_especiales: None,
                nc_retake_days: 120,
                novelty_export: None,
                max_retries: 3,
                command_timeout: None,
            },
        }
    }

    pub fn credentials(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.config.user = Some(user.into());
        self.config.password = Some(password.into());
        self
    }

    pub fn tolerance(mut self, tolerance: Decimal) -> Self {
        self.config.tolerance = tolerance;
        self
    }

    pub fn trm_tolerance(mut self, tolerance: Decimal) -> Self {
        self.config.trm_tolerance = tolerance;
        self
    }

    pub fn maestro_comercializados(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.maestro_comercializados = Some(path.into());
        self
    }

    pub fn asociacion_cuenta_indicador(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.asociacion_cuenta_indicador = Some(path.into());
        self
    }

    pub fn carpeta_destino_comercializados(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.carpeta_destino_comercializados = Some(path.into());
        self
    }

    pub fn impuestos_especiales(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.impuestos_especiales = Some(path.into());
        self
    }

    pub fn nc_retake_days(mut self, days: i64) -> Self {
        self.config.nc_retake_days = days;
        self
    }

    pub fn novelty_export(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.novelty_export = Some(path.into());
        self
    }

    pub fn max_retries(mut self, retries: u32) -> Self {
        self.config.max_retries = retries.max(1);
        self
    }

    pub fn build(self) -> RunConfig {
        self.config
    }
}

fn get_str(map: &Map<String, Value>, key: &str) -> Option<String> {
    match map.get(key)? {
        Value::String(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn get_decimal(map: &Map<String, Value>, key: &str) -> Result<Option<Decimal>, CxpError> {
    let raw = match map.get(key) {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::String(s)) if s.trim().is_empty() => return Ok(None),
        Some(Value::String(s)) => s.clone(),
        Some(other) => {
            return Err(CxpError::Configuration(format!(
                "key '{key}' must be numeric, got {other}"
            )));
        }
    };
    parse_decimal(&raw)
        .map(Some)
        .ok_or_else(|| CxpError::Configuration(format!("key '{key}': '{raw}' is not a number")))
}

fn get_integer(map: &Map<String, Value>, key: &str) -> Result<Option<i64>, CxpError> {
    Ok(get_decimal(map, key)?.and_then(|d| i64::try_from(d.trunc()).ok()))
}

/// Rewrite a mapping literal (single-quoted strings, `True`/`False`/`None`)
/// as JSON. Double-quoted strings and numbers pass through.
pub fn literal_to_json(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\'' => {
                out.push('"');
                while let Some(c) = chars.next() {
                    match c {
                        '\\' => match chars.next() {
                            Some('\'') => out.push('\''),
                            Some(next) => {
                                out.push('\\');
                                out.push(next);
                            }
                            None => out.push_str("\\\\"),
                        },
                        '"' => out.push_str("\\\""),
                        '\'' => break,
                        other => out.push(other),
                    }
                }
                out.push('"');
            }
            '"' => {
                out.push('"');
                while let Some(c) = chars.next() {
                    out.push(c);
                    match c {
                        '\\' => {
                            if let Some(next) = chars.next() {
                                out.push(next);
                            }
                        }
                        '"' => break,
                        _ => {}
                    }
                }
            }
            c if c.is_alphabetic() => {
                let mut word = String::from(c);
                while let Some(&next) = chars.peek() {
                    if next.is_alphanumeric() || next == '_' {
                        word.push(next);
                        chars.next();
                    } else {
                        break;
                    }
                }
                out.push_str(match word.as_str() {
                    "True" => "true",
                    "False" => "false",
                    "None" => "null",
                    other => other,
                });
            }
            other => out.push(other),
        }
    }
    out
}
