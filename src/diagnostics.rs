//! Record of every non-fatal failure seen while running a query.
//!
//! Each entry is also emitted through `tracing`, so the log file and the
//! returned report always agree.

use serde::Serialize;
use tracing::{error, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    /// The request could not complete or returned a failure status
    Transport,
    /// The body was not well-formed XML
    MalformedResponse,
    /// The catalog answered but no product matched
    Empty,
    /// Products were returned but none carried the expected image type
    Filtered,
    /// The catalog reported an `Error` element
    ServiceError,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub kind: DiagnosticKind,
    pub url: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Diagnostics(Vec<Diagnostic>);

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn critical(&mut self, kind: DiagnosticKind, url: &str, message: impl Into<String>) {
        let message = message.into();
        error!(url, ?kind, "{}", message);
        self.0.push(Diagnostic {
            severity: Severity::Critical,
            kind,
            url: url.to_string(),
            message,
        });
    }

    pub fn warning(&mut self, kind: DiagnosticKind, url: &str, message: impl Into<String>) {
        let message = message.into();
        warn!(url, ?kind, "{}", message);
        self.0.push(Diagnostic {
            severity: Severity::Warning,
            kind,
            url: url.to_string(),
            message,
        });
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn has_kind(&self, kind: DiagnosticKind) -> bool {
        self.0.iter().any(|d| d.kind == kind)
    }
}
