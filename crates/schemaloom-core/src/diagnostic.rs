//! Errors as data
//!
//! Every pipeline stage reports problems as [`ProcessError`] values next to
//! its best-effort output instead of failing the whole call.
//!
//! IMPORTANT: Error codes are stable. NEVER rename or remove codes - they are
//! part of the public API. Add new codes with new names only.

use serde::{Deserialize, Serialize};

/// Error code registry (v1)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Document-level failures
    /// Input is not valid JSON at all
    InvalidJson,

    /// A required top-level structure is missing or has the wrong shape
    InvalidSchemaFormat,

    /// A CHECK constraint has an empty expression
    EmptyCheckDetail,

    // Construct-level failures
    /// A table's column list has the wrong shape
    InvalidColumns,

    /// A relation entry is missing required fields
    InvalidRelation,

    /// A constraint could not be interpreted
    InvalidConstraint,

    /// A SQL statement failed to parse
    SqlParseError,

    /// An unexpected token or construct in otherwise valid input
    UnexpectedToken,

    /// A statement refers to a table that has not been declared
    UnknownTable,

    /// A construct that is valid input but not representable
    UnsupportedConstruct,

    // Output
    /// DDL generation failed
    DeparseError,

    /// Two foreign keys produced relationships with the same name
    RelationshipNameCollision,
}

impl ErrorCode {
    /// Get the error code as a stable string identifier
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidJson => "INVALID_JSON",
            Self::InvalidSchemaFormat => "INVALID_SCHEMA_FORMAT",
            Self::EmptyCheckDetail => "EMPTY_CHECK_DETAIL",
            Self::InvalidColumns => "INVALID_COLUMNS",
            Self::InvalidRelation => "INVALID_RELATION",
            Self::InvalidConstraint => "INVALID_CONSTRAINT",
            Self::SqlParseError => "SQL_PARSE_ERROR",
            Self::UnexpectedToken => "UNEXPECTED_TOKEN",
            Self::UnknownTable => "UNKNOWN_TABLE",
            Self::UnsupportedConstruct => "UNSUPPORTED_CONSTRUCT",
            Self::DeparseError => "DEPARSE_ERROR",
            Self::RelationshipNameCollision => "RELATIONSHIP_NAME_COLLISION",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Error class
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// One construct is malformed; processing continued on its siblings
    Warning,

    /// The input is unusable; the accompanying value is empty
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Warning => write!(f, "warning"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

/// Position in the source text (1-indexed)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub line: usize,
    pub column: Option<usize>,
}

impl Location {
    pub fn line(line: usize) -> Self {
        Self { line, column: None }
    }

    pub fn with_position(line: usize, column: usize) -> Self {
        Self {
            line,
            column: Some(column),
        }
    }
}

/// A non-fatal problem reported alongside a result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessError {
    pub code: ErrorCode,
    pub severity: Severity,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
}

impl ProcessError {
    pub fn new(code: ErrorCode, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            code,
            severity,
            message: message.into(),
            location: None,
        }
    }

    /// A recoverable problem
    pub fn warning(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::new(code, Severity::Warning, message)
    }

    /// An unrecoverable problem
    pub fn critical(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::new(code, Severity::Critical, message)
    }

    pub fn with_location(mut self, location: Location) -> Self {
        self.location = Some(location);
        self
    }

    pub fn is_critical(&self) -> bool {
        self.severity == Severity::Critical
    }
}

impl std::fmt::Display for ProcessError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)?;
        if let Some(loc) = &self.location {
            write!(f, " (line {})", loc.line)?;
        }
        Ok(())
    }
}

/// A value paired with the errors collected while producing it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessResult<T> {
    pub value: T,
    pub errors: Vec<ProcessError>,
}

impl<T> ProcessResult<T> {
    pub fn new(value: T, errors: Vec<ProcessError>) -> Self {
        Self { value, errors }
    }

    /// A result without errors
    pub fn ok(value: T) -> Self {
        Self::new(value, Vec::new())
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn has_critical(&self) -> bool {
        self.errors.iter().any(ProcessError::is_critical)
    }

    pub fn error_count(&self) -> usize {
        self.errors.len()
    }

    pub fn warning_count(&self) -> usize {
        self.errors.iter().filter(|e| !e.is_critical()).count()
    }
}

impl<T: Default> ProcessResult<T> {
    /// An empty value with a single critical error
    pub fn failed(error: ProcessError) -> Self {
        Self::new(T::default(), vec![error])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_code_stability() {
        assert_eq!(ErrorCode::InvalidJson.as_str(), "INVALID_JSON");
        assert_eq!(ErrorCode::EmptyCheckDetail.as_str(), "EMPTY_CHECK_DETAIL");
        assert_eq!(
            serde_json::to_value(ErrorCode::RelationshipNameCollision).unwrap(),
            "RELATIONSHIP_NAME_COLLISION"
        );
    }

    #[test]
    fn error_serialization_always_has_message() {
        let err = ProcessError::warning(ErrorCode::SqlParseError, "Expected ), found EOF")
            .with_location(Location::line(3));

        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["message"], "Expected ), found EOF");
        assert_eq!(json["severity"], "warning");
        assert_eq!(json["location"]["line"], 3);
    }

    #[test]
    fn failed_result_is_empty_and_critical() {
        let result: ProcessResult<Vec<u8>> =
            ProcessResult::failed(ProcessError::critical(ErrorCode::InvalidJson, "bad"));
        assert!(result.value.is_empty());
        assert!(result.has_critical());
        assert_eq!(result.warning_count(), 0);
    }
}
