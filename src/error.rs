use std::io;

use thiserror::Error;

/// Errors surfaced by a conversion.
///
/// Attribute-level problems (a bad color, a missing size) never show up here:
/// the readers fall back to defaults instead.
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("XML error: {0}")]
    Xml(#[from] roxmltree::Error),

    #[error("invalid DOCX: {0}")]
    InvalidDocx(String),

    #[error("invalid XLSX: {0}")]
    InvalidXlsx(String),

    #[error("unsupported input: {0}")]
    UnsupportedInput(String),

    #[error("layout error: {0}")]
    Layout(String),

    #[error("PDF error: {0}")]
    Pdf(String),

    #[error("engine {engine} unavailable: {reason}")]
    EngineUnavailable { engine: String, reason: String },

    #[error("all conversion engines failed: {}", format_failures(.0))]
    EnginesExhausted(Vec<(String, String)>),

    #[error("conversion cancelled")]
    Cancelled,
}

impl Error {
    pub(crate) fn engine(engine: &str, reason: impl Into<String>) -> Self {
        Error::EngineUnavailable {
            engine: engine.to_string(),
            reason: reason.into(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }
}

fn format_failures(failures: &[(String, String)]) -> String {
    failures
        .iter()
        .map(|(engine, reason)| format!("{engine}: {reason}"))
        .collect::<Vec<_>>()
        .join("; ")
}
