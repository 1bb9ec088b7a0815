//! Canonical schema JSON
//!
//! The serialized form of [`Schema`] itself. Partial documents are accepted;
//! missing fields take their defaults and entity names are filled from
//! their map keys.

use schemaloom_core::{Constraint, ErrorCode, ProcessError, ProcessResult, Schema};
use serde_json::Value;

/// Parse canonical schema JSON
pub fn parse_canonical(source: &str) -> ProcessResult<Schema> {
    let document: Value = match serde_json::from_str(source) {
        Ok(document) => document,
        Err(e) => {
            return ProcessResult::failed(ProcessError::critical(
                ErrorCode::InvalidJson,
                format!("Invalid JSON: {}", e),
            ))
        }
    };

    if !document.get("tables").is_some_and(Value::is_object) {
        return ProcessResult::failed(ProcessError::critical(
            ErrorCode::InvalidSchemaFormat,
            "Invalid schema format: 'tables' must be an object",
        ));
    }

    let mut schema: Schema = match serde_json::from_value(document) {
        Ok(schema) => schema,
        Err(e) => {
            return ProcessResult::failed(ProcessError::critical(
                ErrorCode::InvalidSchemaFormat,
                format!("Invalid schema format: {}", e),
            ))
        }
    };
    schema.normalize_names();

    if let Some(error) = empty_check(&schema) {
        return ProcessResult::failed(error);
    }

    tracing::debug!(tables = schema.tables.len(), "parsed canonical schema");
    ProcessResult::ok(schema)
}

fn empty_check(schema: &Schema) -> Option<ProcessError> {
    schema.tables.values().find_map(|table| {
        table.constraints.values().find_map(|constraint| match constraint {
            Constraint::Check(check) if check.detail.trim().is_empty() => {
                Some(ProcessError::critical(
                    ErrorCode::EmptyCheckDetail,
                    format!(
                        "CHECK constraint detail must not be empty ('{}' on table '{}')",
                        check.name, table.name
                    ),
                ))
            }
            _ => None,
        })
    })
}
