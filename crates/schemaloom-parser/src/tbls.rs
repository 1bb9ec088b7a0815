//! tbls `schema.json` catalogs
//!
//! The document is walked as untyped JSON so that one malformed table or
//! relation is reported and skipped instead of rejecting the whole file.

use indexmap::IndexMap;
use regex::Regex;
use schemaloom_core::{
    Cardinality, Column, Constraint, DefaultValue, Enum, ErrorCode, ForeignKeyAction,
    ForeignKeyConstraint, Index, ProcessError, ProcessResult, Relationship, Schema, Table,
};
use serde_json::Value;
use std::sync::OnceLock;

/// Schema plus the relationships declared by the catalog's `relations`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Catalog {
    pub schema: Schema,
    pub relationships: IndexMap<String, Relationship>,
}

/// Parse a tbls catalog into a schema
pub fn parse_tbls(source: &str) -> ProcessResult<Schema> {
    let result = parse_tbls_with_relationships(source);
    ProcessResult::new(result.value.schema, result.errors)
}

/// Parse a tbls catalog, keeping the relationships it declares
pub fn parse_tbls_with_relationships(source: &str) -> ProcessResult<Catalog> {
    let document: Value = match serde_json::from_str(source) {
        Ok(document) => document,
        Err(e) => {
            return ProcessResult::failed(ProcessError::critical(
                ErrorCode::InvalidJson,
                format!("Invalid JSON: {}", e),
            ))
        }
    };

    let Some(tables) = document.get("tables").and_then(Value::as_array) else {
        return ProcessResult::failed(ProcessError::critical(
            ErrorCode::InvalidSchemaFormat,
            "Invalid schema format: 'tables' must be an array",
        ));
    };

    let mut parser = CatalogParser::default();
    for (position, table) in tables.iter().enumerate() {
        if let Err(error) = parser.table(position, table) {
            return ProcessResult::failed(error);
        }
    }
    if let Some(enums) = document.get("enums").and_then(Value::as_array) {
        parser.enums(enums);
    }
    if let Some(relations) = document.get("relations").and_then(Value::as_array) {
        for (position, relation) in relations.iter().enumerate() {
            parser.relation(position, relation);
        }
    }

    ProcessResult::new(parser.catalog, parser.errors)
}

#[derive(Default)]
struct CatalogParser {
    catalog: Catalog,
    errors: Vec<ProcessError>,
}

impl CatalogParser {
    fn warn(&mut self, code: ErrorCode, message: String) {
        tracing::warn!(code = code.as_str(), "{}", message);
        self.errors.push(ProcessError::warning(code, message));
    }

    /// Returns a critical error only for an empty CHECK definition
    fn table(&mut self, position: usize, value: &Value) -> Result<(), ProcessError> {
        let Some(name) = str_field(value, "name") else {
            self.warn(
                ErrorCode::InvalidSchemaFormat,
                format!("Table at position {} has no name", position),
            );
            return Ok(());
        };
        let mut table = Table::new(name);
        table.comment = str_field(value, "comment").map(str::to_string);

        match value.get("columns").and_then(Value::as_array) {
            Some(columns) => {
                for column in columns {
                    match parse_column(column) {
                        Some(column) => {
                            table.columns.insert(column.name.clone(), column);
                        }
                        None => self.warn(
                            ErrorCode::InvalidColumns,
                            format!("Column without a name in table '{}'", name),
                        ),
                    }
                }
            }
            None => self.warn(
                ErrorCode::InvalidColumns,
                format!("Columns of table '{}' must be an array", name),
            ),
        }

        for constraint in array_field(value, "constraints") {
            self.constraint(&mut table, constraint)?;
        }

        for index in array_field(value, "indexes") {
            if let Some(index) = parse_index(index) {
                table.indexes.insert(index.name.clone(), index);
            }
        }

        tracing::debug!(table = %name, columns = table.columns.len(), "parsed catalog table");
        self.catalog.schema.tables.insert(name.to_string(), table);
        Ok(())
    }

    /// Add one catalog constraint to `table`. Malformed entries are reported
    /// and skipped; an empty CHECK definition is critical.
    fn constraint(&mut self, table: &mut Table, value: &Value) -> Result<(), ProcessError> {
        let (Some(kind), Some(name)) = (str_field(value, "type"), str_field(value, "name")) else {
            self.warn(
                ErrorCode::InvalidConstraint,
                format!("Constraint without a name or type in table '{}'", table.name),
            );
            return Ok(());
        };
        let columns = strings(value.get("columns"));
        let def = str_field(value, "def").unwrap_or_default();

        match kind {
            "PRIMARY KEY" | "UNIQUE" if columns.is_empty() => {
                self.warn(
                    ErrorCode::InvalidConstraint,
                    format!("{} constraint '{}' on table '{}' has no columns", kind, name, table.name),
                );
            }
            "PRIMARY KEY" => {
                for column_name in &columns {
                    if let Some(column) = table.columns.get_mut(column_name) {
                        column.not_null = true;
                        column.primary = columns.len() == 1;
                    }
                }
                table.add_constraint(Constraint::primary_key(name, columns));
            }
            "UNIQUE" => {
                if let [only] = columns.as_slice() {
                    if let Some(column) = table.columns.get_mut(only) {
                        column.unique = true;
                    }
                }
                table.add_constraint(Constraint::unique(name, columns));
            }
            "FOREIGN KEY" => {
                let target_table = str_field(value, "referenced_table").unwrap_or_default();
                let target_columns = strings(value.get("referenced_columns"));
                if columns.is_empty() || target_columns.is_empty() || target_table.is_empty() {
                    self.warn(
                        ErrorCode::InvalidConstraint,
                        format!(
                            "Foreign key '{}' on table '{}' is missing its columns or referenced table",
                            name, table.name
                        ),
                    );
                    return Ok(());
                }
                let (update_action, delete_action) = foreign_key_actions(def);
                let fk = ForeignKeyConstraint::new(name, columns, target_table, target_columns)
                    .on_update(update_action)
                    .on_delete(delete_action);
                table.add_constraint(fk.into());
            }
            "CHECK" => {
                if def.trim().is_empty() {
                    return Err(ProcessError::critical(
                        ErrorCode::EmptyCheckDetail,
                        format!(
                            "CHECK constraint '{}' on table '{}' has an empty definition",
                            name, table.name
                        ),
                    ));
                }
                table.add_constraint(Constraint::check(name, def));
            }
            _ => {}
        }

        Ok(())
    }

    fn enums(&mut self, enums: &[Value]) {
        for value in enums {
            let Some(qualified) = str_field(value, "name") else {
                continue;
            };
            let name = qualified.rsplit('.').next().unwrap_or(qualified);
            let values = strings(value.get("values"));
            self.catalog
                .schema
                .enums
                .insert(name.to_string(), Enum::new(name, values));
        }
    }

    /// `{ table, columns, parent_table, parent_columns, cardinality, def }`
    fn relation(&mut self, position: usize, value: &Value) {
        let (Some(table_name), Some(parent_table)) =
            (str_field(value, "table"), str_field(value, "parent_table"))
        else {
            self.warn(
                ErrorCode::InvalidRelation,
                format!("Relation at position {} is missing 'table' or 'parent_table'", position),
            );
            return;
        };
        let (Some(columns), Some(parent_columns)) = (
            value.get("columns").and_then(Value::as_array),
            value.get("parent_columns").and_then(Value::as_array),
        ) else {
            self.warn(
                ErrorCode::InvalidRelation,
                format!(
                    "Relation '{}_to_{}' must have 'columns' and 'parent_columns' arrays",
                    parent_table, table_name
                ),
            );
            return;
        };

        let columns = strings_of(columns);
        let parent_columns = strings_of(parent_columns);
        let (update_action, delete_action) =
            foreign_key_actions(str_field(value, "def").unwrap_or_default());
        let name = format!("{}_to_{}", parent_table, table_name);

        if let Some(table) = self.catalog.schema.tables.get_mut(table_name) {
            if !table.constraints.contains_key(&name) {
                let fk = ForeignKeyConstraint::new(
                    &name,
                    columns.clone(),
                    parent_table,
                    parent_columns.clone(),
                )
                .on_update(update_action)
                .on_delete(delete_action);
                table.add_constraint(fk.into());
            }
        }

        let cardinality = match str_field(value, "cardinality") {
            Some("one") => Cardinality::OneToOne,
            _ => Cardinality::OneToMany,
        };
        let relationship = Relationship {
            name: name.clone(),
            primary_table_name: parent_table.to_string(),
            primary_column_name: parent_columns.first().cloned().unwrap_or_default(),
            foreign_table_name: table_name.to_string(),
            foreign_column_name: columns.first().cloned().unwrap_or_default(),
            cardinality,
            update_constraint: update_action,
            delete_constraint: delete_action,
        };
        self.catalog.relationships.insert(name, relationship);
    }
}

fn parse_column(value: &Value) -> Option<Column> {
    let name = str_field(value, "name")?;
    let mut column = Column::new(name, str_field(value, "type").unwrap_or_default());
    column.not_null = value.get("nullable").and_then(Value::as_bool) == Some(false);
    column.default = value.get("default").and_then(default_value);
    column.comment = str_field(value, "comment").map(str::to_string);
    Some(column)
}

/// Catalog defaults are strings; numeric and boolean text keeps its kind
fn default_value(value: &Value) -> Option<DefaultValue> {
    match value {
        Value::String(text) => Some(if let Ok(number) = text.parse::<serde_json::Number>() {
            DefaultValue::Number(number)
        } else if text.eq_ignore_ascii_case("true") {
            DefaultValue::Boolean(true)
        } else if text.eq_ignore_ascii_case("false") {
            DefaultValue::Boolean(false)
        } else {
            DefaultValue::String(text.clone())
        }),
        Value::Number(number) => Some(DefaultValue::Number(number.clone())),
        Value::Bool(b) => Some(DefaultValue::Boolean(*b)),
        _ => None,
    }
}

fn parse_index(value: &Value) -> Option<Index> {
    let name = str_field(value, "name")?;
    let def = str_field(value, "def").unwrap_or_default().to_lowercase();
    let mut index = Index::new(name, strings(value.get("columns")));
    index.unique = def.contains("unique");
    if let Some(method) = using_pattern()
        .and_then(|p| p.captures(&def))
        .and_then(|c| c.get(1))
    {
        index.index_type = method.as_str().to_string();
    }
    Some(index)
}

fn using_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"using\s+(\w+)").ok())
        .as_ref()
}

fn action_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| {
            Regex::new(r"(?i)ON\s+(UPDATE|DELETE)\s+(SET\s+NULL|SET\s+DEFAULT|RESTRICT|CASCADE|NO\s+ACTION)").ok()
        })
        .as_ref()
}

/// ON UPDATE / ON DELETE actions from a constraint definition
fn foreign_key_actions(def: &str) -> (ForeignKeyAction, ForeignKeyAction) {
    let mut update = ForeignKeyAction::NoAction;
    let mut delete = ForeignKeyAction::NoAction;

    if let Some(pattern) = action_pattern() {
        for captures in pattern.captures_iter(def) {
            let (Some(event), Some(action)) = (captures.get(1), captures.get(2)) else {
                continue;
            };
            let action = ForeignKeyAction::parse(action.as_str());
            if event.as_str().eq_ignore_ascii_case("update") {
                update = action;
            } else {
                delete = action;
            }
        }
    }

    (update, delete)
}

fn str_field<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value.get(key).and_then(Value::as_str)
}

fn array_field<'a>(value: &'a Value, key: &str) -> &'a [Value] {
    value
        .get(key)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
}

fn strings(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| strings_of(items))
        .unwrap_or_default()
}

fn strings_of(items: &[Value]) -> Vec<String> {
    items
        .iter()
        .filter_map(Value::as_str)
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use schemaloom_core::Severity;

    const CATALOG: &str = r#"{
      "name": "app",
      "tables": [
        {
          "name": "users",
          "type": "BASE TABLE",
          "comment": "people",
          "columns": [
            { "name": "id", "type": "bigint", "nullable": false, "default": null },
            { "name": "age", "type": "integer", "nullable": true, "default": "18" },
            { "name": "active", "type": "boolean", "nullable": false, "default": "true" },
            { "name": "email", "type": "text", "nullable": false, "comment": "login" }
          ],
          "indexes": [
            { "name": "users_pkey", "def": "CREATE UNIQUE INDEX users_pkey ON public.users USING btree (id)", "columns": ["id"] },
            { "name": "users_email_idx", "def": "CREATE INDEX users_email_idx ON public.users USING gin (email)", "columns": ["email"] }
          ],
          "constraints": [
            { "name": "users_pkey", "type": "PRIMARY KEY", "def": "PRIMARY KEY (id)", "columns": ["id"] },
            { "name": "users_email_key", "type": "UNIQUE", "def": "UNIQUE (email)", "columns": ["email"] },
            { "name": "users_age_check", "type": "CHECK", "def": "CHECK ((age >= 0))", "columns": ["age"] }
          ]
        },
        {
          "name": "posts",
          "columns": [
            { "name": "id", "type": "bigint", "nullable": false },
            { "name": "user_id", "type": "bigint", "nullable": false }
          ],
          "constraints": [
            {
              "name": "posts_user_id_fkey",
              "type": "FOREIGN KEY",
              "def": "FOREIGN KEY (user_id) REFERENCES users(id) ON UPDATE RESTRICT ON DELETE CASCADE",
              "columns": ["user_id"],
              "referenced_table": "users",
              "referenced_columns": ["id"]
            }
          ]
        },
        { "name": "broken", "columns": "nope" }
      ],
      "relations": [
        { "table": "posts", "columns": ["user_id"], "parent_table": "users", "parent_columns": ["id"], "cardinality": "zero_or_more", "def": "FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE" },
        { "table": "profiles", "columns": ["user_id"], "parent_table": "users", "parent_columns": ["id"], "cardinality": "one" },
        { "columns": ["x"], "parent_table": "users", "parent_columns": ["id"] },
        { "table": "posts", "parent_table": "users", "columns": "user_id", "parent_columns": ["id"] }
      ],
      "enums": [
        { "name": "public.mood", "values": ["happy", "sad"] }
      ]
    }"#;

    #[test]
    fn test_parse_tables_columns_and_indexes() {
        let result = parse_tbls(CATALOG);
        let schema = result.value;

        let users = schema.table("users").unwrap();
        assert_eq!(users.comment.as_deref(), Some("people"));
        assert!(users.columns["id"].primary && users.columns["id"].not_null);
        assert_eq!(users.columns["age"].default, Some(DefaultValue::from(18)));
        assert_eq!(users.columns["active"].default, Some(DefaultValue::Boolean(true)));
        assert!(users.columns["email"].unique);
        assert_eq!(users.columns["email"].comment.as_deref(), Some("login"));

        assert!(users.indexes["users_pkey"].unique);
        assert_eq!(users.indexes["users_pkey"].index_type, "btree");
        assert!(!users.indexes["users_email_idx"].unique);
        assert_eq!(users.indexes["users_email_idx"].index_type, "gin");

        let Constraint::Check(check) = &users.constraints["users_age_check"] else {
            panic!("expected check");
        };
        assert_eq!(check.detail, "CHECK ((age >= 0))");

        assert_eq!(schema.enums["mood"].values, vec!["happy".to_string(), "sad".to_string()]);
    }

    #[test]
    fn test_foreign_key_actions_from_def() {
        let schema = parse_tbls(CATALOG).value;
        let Constraint::ForeignKey(fk) = &schema.table("posts").unwrap().constraints["posts_user_id_fkey"] else {
            panic!("expected foreign key");
        };
        assert_eq!(fk.update_constraint, ForeignKeyAction::Restrict);
        assert_eq!(fk.delete_constraint, ForeignKeyAction::Cascade);
    }

    #[test]
    fn test_non_array_columns_is_recoverable() {
        let result = parse_tbls(CATALOG);
        let broken = result.value.table("broken").unwrap();
        assert!(broken.columns.is_empty());
        assert!(result
            .errors
            .iter()
            .any(|e| e.code == ErrorCode::InvalidColumns && e.severity == Severity::Warning));
    }

    #[test]
    fn test_relations() {
        let result = parse_tbls_with_relationships(CATALOG);
        let catalog = result.value;

        let invalid: Vec<_> = result
            .errors
            .iter()
            .filter(|e| e.code == ErrorCode::InvalidRelation)
            .collect();
        assert_eq!(invalid.len(), 2);

        let posts = &catalog.relationships["users_to_posts"];
        assert_eq!(posts.cardinality, Cardinality::OneToMany);
        assert_eq!(posts.primary_table_name, "users");
        assert_eq!(posts.foreign_column_name, "user_id");
        assert_eq!(posts.delete_constraint, ForeignKeyAction::Cascade);
        assert!(catalog.schema.table("posts").unwrap().constraints.contains_key("users_to_posts"));

        assert_eq!(catalog.relationships["users_to_profiles"].cardinality, Cardinality::OneToOne);
    }

    #[test]
    fn test_invalid_json_is_critical() {
        let result = parse_tbls("{ not json");
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].code, ErrorCode::InvalidJson);
        assert!(result.has_critical());
        assert!(result.value.is_empty());
    }

    #[test]
    fn test_tables_must_be_array() {
        let result = parse_tbls(r#"{ "tables": {} }"#);
        assert_eq!(result.errors[0].code, ErrorCode::InvalidSchemaFormat);
        assert!(result.errors[0].message.starts_with("Invalid schema format"));
        assert!(result.value.is_empty());
    }

    #[test]
    fn test_empty_check_is_critical() {
        let result = parse_tbls(
            r#"{ "tables": [ { "name": "t", "columns": [],
                 "constraints": [ { "name": "c", "type": "CHECK", "def": "" } ] } ] }"#,
        );
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].code, ErrorCode::EmptyCheckDetail);
        assert!(result.has_critical());
        assert!(result.value.is_empty());
    }

    #[test]
    fn test_malformed_constraints_are_reported() {
        let result = parse_tbls(
            r#"{ "tables": [ { "name": "t",
                 "columns": [ { "name": "a", "type": "int" } ],
                 "constraints": [
                   { "name": "t_a_fkey", "type": "FOREIGN KEY", "columns": ["a"] },
                   { "type": "UNIQUE", "columns": ["a"] },
                   { "name": "t_pkey", "type": "PRIMARY KEY", "columns": [] },
                   { "name": "t_a_key", "type": "UNIQUE", "columns": ["a"] }
                 ] } ] }"#,
        );

        let codes: Vec<ErrorCode> = result.errors.iter().map(|e| e.code).collect();
        assert_eq!(codes, vec![ErrorCode::InvalidConstraint; 3]);
        assert!(result.errors.iter().all(|e| e.severity == Severity::Warning));

        let table = result.value.table("t").unwrap();
        assert_eq!(table.constraints.len(), 1);
        assert!(table.constraints.contains_key("t_a_key"));
        assert!(!table.columns["a"].primary);
    }
}
