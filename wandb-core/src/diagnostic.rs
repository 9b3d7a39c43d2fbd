//! Diagnostics - Messages surfaced to the operator alongside lifecycle results

use std::fmt;

use crate::resource::State;

/// Severity of a diagnostic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "error"),
            Severity::Warning => write!(f, "warning"),
        }
    }
}

/// A single operator-facing message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub summary: String,
    pub detail: String,
}

impl Diagnostic {
    pub fn error(summary: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            summary: summary.into(),
            detail: detail.into(),
        }
    }

    pub fn warning(summary: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            summary: summary.into(),
            detail: detail.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.detail.is_empty() {
            write!(f, "{}: {}", self.severity, self.summary)
        } else {
            write!(f, "{}: {}: {}", self.severity, self.summary, self.detail)
        }
    }
}

/// Result of a successful create or update
///
/// Warnings never abort the operation; the state is committed regardless.
#[derive(Debug, Clone, PartialEq)]
pub struct Applied {
    pub state: State,
    pub warnings: Vec<Diagnostic>,
}

impl Applied {
    pub fn new(state: State) -> Self {
        Self {
            state,
            warnings: Vec::new(),
        }
    }

    pub fn with_warning(mut self, warning: Diagnostic) -> Self {
        self.warnings.push(warning);
        self
    }
}
