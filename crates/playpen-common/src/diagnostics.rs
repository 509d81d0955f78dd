//! Compile-time and preview diagnostics.
//!
//! [`Diagnostics`] is always present on the controller. Its two lists follow
//! different rules: `compile_errors` is replaced wholesale on every edit and
//! every rebuild, while `preview_errors` only grows until it is cleared.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::Hostname;

/// Diagnostic severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Prevents a bundle from being produced.
    Error,
    /// Informational; the build can still succeed.
    Warning,
}

/// A 1-based position in the source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLocation {
    /// Line number, starting at 1.
    pub line: u32,
    /// Column number, starting at 1.
    pub column: u32,
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// A single compile-time diagnostic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Severity of the diagnostic.
    pub severity: Severity,
    /// Human-readable message.
    pub message: String,
    /// Where in the source the problem is, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<SourceLocation>,
}

impl Diagnostic {
    /// Create an error diagnostic without a location.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            message: message.into(),
            location: None,
        }
    }

    /// Create a warning diagnostic without a location.
    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            message: message.into(),
            location: None,
        }
    }

    /// Attach a source location.
    #[must_use]
    pub fn at(mut self, location: SourceLocation) -> Self {
        self.location = Some(location);
        self
    }

    /// Returns `true` for error-severity diagnostics.
    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

/// A runtime error reported by the preview sandbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreviewError {
    /// Human-readable message.
    pub message: String,
    /// Source location, when the sandbox can attribute one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<SourceLocation>,
    /// Bundle that was running when the error happened.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<Hostname>,
    /// Machine-readable code (trap kind), if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl PreviewError {
    /// Create a preview error with only a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            location: None,
            hostname: None,
            code: None,
        }
    }

    /// Attribute the error to a bundle.
    #[must_use]
    pub fn with_hostname(mut self, hostname: Hostname) -> Self {
        self.hostname = Some(hostname);
        self
    }

    /// Attach a machine-readable code.
    #[must_use]
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }
}

/// Everything the console/footer displays.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostics {
    /// Diagnostics of the latest compile, replaced wholesale.
    pub compile_errors: Vec<Diagnostic>,
    /// Runtime errors reported by the preview, append-only until cleared.
    pub preview_errors: Vec<PreviewError>,
}

impl Diagnostics {
    /// Replace the compile diagnostics.
    pub fn replace_compile_errors(&mut self, diagnostics: Vec<Diagnostic>) {
        self.compile_errors = diagnostics;
    }

    /// Append a preview error. Existing entries are never touched.
    pub fn push_preview_error(&mut self, error: PreviewError) {
        self.preview_errors.push(error);
    }

    /// Drop every preview error.
    pub fn clear_preview_errors(&mut self) {
        self.preview_errors.clear();
    }

    /// Number of error-severity compile diagnostics.
    pub fn error_count(&self) -> usize {
        self.compile_errors.iter().filter(|d| d.is_error()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preview_errors_append_only() {
        let mut diagnostics = Diagnostics::default();
        diagnostics.push_preview_error(PreviewError::new("first"));
        diagnostics.push_preview_error(PreviewError::new("second"));

        assert_eq!(diagnostics.preview_errors.len(), 2);
        assert_eq!(diagnostics.preview_errors[0].message, "first");

        diagnostics.clear_preview_errors();
        diagnostics.push_preview_error(PreviewError::new("third"));
        assert_eq!(diagnostics.preview_errors.len(), 1);
    }

    #[test]
    fn test_compile_errors_replaced() {
        let mut diagnostics = Diagnostics::default();
        diagnostics.replace_compile_errors(vec![
            Diagnostic::error("a"),
            Diagnostic::warning("b"),
        ]);
        assert_eq!(diagnostics.error_count(), 1);

        diagnostics.replace_compile_errors(Vec::new());
        assert!(diagnostics.compile_errors.is_empty());
    }

    #[test]
    fn test_diagnostic_serialization() {
        let diagnostic = Diagnostic::error("expected `(`").at(SourceLocation { line: 3, column: 7 });
        let json = serde_json::to_value(&diagnostic).unwrap();

        assert_eq!(json["severity"], "error");
        assert_eq!(json["location"]["line"], 3);
        assert_eq!(diagnostic.location.unwrap().to_string(), "3:7");
    }
}
