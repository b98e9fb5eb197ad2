use thiserror::Error;

use crate::diagnostics::DiagnosticKind;

/// Failure to obtain a parsed catalog document for one URL.
#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("catalog request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("catalog returned HTTP status {0}")]
    Status(u16),

    #[error("malformed catalog XML: {0}")]
    MalformedXml(String),
}

impl CatalogError {
    pub fn kind(&self) -> DiagnosticKind {
        match self {
            CatalogError::Transport(_) | CatalogError::Status(_) => DiagnosticKind::Transport,
            CatalogError::MalformedXml(_) => DiagnosticKind::MalformedResponse,
        }
    }
}

/// Rejected query parameters or lookups, raised before any request is sent.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    #[error("missing required parameter: {0}")]
    MissingParameter(&'static str),

    #[error("not a valid date for {name}: '{value}' (expected YYYY-MM-DDTHH:MM:SS.f)")]
    InvalidDate { name: &'static str, value: String },

    #[error("parameter '{0}' is already set by a named filter")]
    DuplicateParameter(String),

    #[error("invalid extra parameter '{0}', expected name=value")]
    InvalidParameter(String),

    #[error("target '{0}' has no configuration")]
    UnknownTarget(String),

    #[error("instrument '{iid}' is not configured for target '{target}' (known: {known})")]
    UnknownInstrument {
        target: String,
        iid: String,
        known: String,
    },

    #[error("instrument host '{ihid}' is not configured for target '{target}'")]
    UnknownInstrumentHost { target: String, ihid: String },
}
