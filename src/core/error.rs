use thiserror::Error;

/// Errors that can occur while running the validation pipeline.
///
/// Rule failures are not errors: they are reported as [`crate::rules::Verdict`]
/// values and end up in the comparative ledger.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CxpError {
    /// Missing or unparsable configuration key.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Database session could not be established.
    #[error("connection error: {0}")]
    Connection(String),

    /// A statement against the store failed.
    #[error("database error: {0}")]
    Database(String),

    /// A single document carries data the engine cannot work with.
    #[error("data error: {0}")]
    Data(String),

    /// Excel master file missing, or missing a sheet or column.
    #[error("master file error: {0}")]
    Master(String),

    /// Novelty export workbook could not be written.
    #[error("export error: {0}")]
    Export(String),

    /// Filesystem error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CxpError {
    /// Fatal errors abort the run; the rest are counted per candidate.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Configuration(_) | Self::Connection(_) | Self::Master(_)
        )
    }
}

impl From<serde_json::Error> for CxpError {
    fn from(err: serde_json::Error) -> Self {
        Self::Configuration(err.to_string())
    }
}

#[cfg(feature = "sqlite")]
impl From<rusqlite::Error> for CxpError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Database(err.to_string())
    }
}

#[cfg(feature = "excel")]
impl From<calamine::Error> for CxpError {
    fn from(err: calamine::Error) -> Self {
        Self::Master(err.to_string())
    }
}

#[cfg(feature = "excel")]
impl From<rust_xlsxwriter::XlsxError> for CxpError {
    fn from(err: rust_xlsxwriter::XlsxError) -> Self {
        Self::Export(err.to_string())
    }
}
