//! PostgreSQL DDL for single patch operations
//!
//! An [`Operation`] aimed at a known schema path becomes the statement that
//! makes the same change on a live database:
//!
//! | path                                   | add / replace            | remove            |
//! |----------------------------------------|--------------------------|-------------------|
//! | `/tables/{t}`                          | `CREATE TABLE` (add)     | `DROP TABLE`      |
//! | `/tables/{t}/name`, `/comment`         | rename, `COMMENT ON`     | comment only      |
//! | `/tables/{t}/columns/{c}`              | `ADD COLUMN` (add)       | `DROP COLUMN`     |
//! | `/tables/{t}/columns/{c}/{attribute}`  | `ALTER COLUMN` and kin   | attribute reset   |
//! | `/tables/{t}/indexes/{i}`              | `CREATE INDEX` (add)     | `DROP INDEX`      |
//! | `/tables/{t}/constraints/{k}`          | `ADD CONSTRAINT` (add)   | `DROP CONSTRAINT` |
//! | `/enums/{e}`, `/extensions/{x}`        | `CREATE TYPE/EXTENSION`  | `DROP ...`        |
//!
//! Anything else, including `move`, `copy` and `test`, has no DDL form and
//! comes back as an `UNSUPPORTED_CONSTRUCT` warning with empty output.

use super::{literal, DeparseError, Deparser, DeparserStrategy};
use crate::patch::Operation;
use schemaloom_core::{
    Column, Constraint, DefaultValue, Enum, ErrorCode, Extension, Index, ProcessError,
    ProcessResult, Schema, Table,
};
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Render one patch operation as PostgreSQL DDL
pub fn deparse_operation(operation: &Operation) -> ProcessResult<String> {
    let mut deparser = Deparser::new(DeparserStrategy::postgres());
    match deparser.operation_statements(operation) {
        Ok(statements) => {
            tracing::debug!(
                op = operation.kind(),
                path = %operation.path(),
                statements = statements.len(),
                "deparsed operation"
            );
            ProcessResult::new(statements.join("\n\n"), deparser.warnings)
        }
        Err(error) => {
            tracing::warn!(path = %operation.path(), "{}", error.message);
            ProcessResult::failed(error)
        }
    }
}

fn unsupported(operation: &Operation) -> ProcessError {
    ProcessError::warning(
        ErrorCode::UnsupportedConstruct,
        format!(
            "'{}' at '{}' has no DDL equivalent",
            operation.kind(),
            operation.path()
        ),
    )
}

fn failure(error: DeparseError) -> ProcessError {
    ProcessError::critical(ErrorCode::DeparseError, error.to_string())
}

fn definition<T: DeserializeOwned>(value: &Value, path: &str) -> Result<T, ProcessError> {
    serde_json::from_value(value.clone()).map_err(|e| {
        ProcessError::critical(
            ErrorCode::DeparseError,
            format!("Value at '{}' is not a valid definition: {}", path, e),
        )
    })
}

impl Deparser {
    fn operation_statements(&mut self, operation: &Operation) -> Result<Vec<String>, ProcessError> {
        let (value, creating) = match operation {
            Operation::Add { value, .. } => (Some(value), true),
            Operation::Replace { value, .. } => (Some(value), false),
            Operation::Remove { .. } => (None, false),
            _ => return Err(unsupported(operation)),
        };
        let path = operation.path();
        let segments: Vec<&str> = path
            .strip_prefix('/')
            .map(|rest| rest.split('/').collect())
            .unwrap_or_default();
        let s = self.strategy;

        let statements = match (segments.as_slice(), value) {
            (["tables", table_name], Some(value)) if creating => {
                let mut table: Table = definition(value, path)?;
                if table.name.is_empty() {
                    table.name = table_name.to_string();
                }
                let mut schema = Schema::new().with_table(table);
                schema.normalize_names();
                self.statements(&schema).map_err(failure)?
            }
            (["tables", table_name], None) => vec![format!("DROP TABLE {};", s.quote(table_name))],
            (["tables", table_name, "name"], Some(Value::String(new_name))) => vec![format!(
                "ALTER TABLE {} RENAME TO {};",
                s.quote(table_name),
                s.quote(new_name)
            )],
            (["tables", table_name, "comment"], value) => vec![format!(
                "COMMENT ON TABLE {} IS {};",
                s.quote(table_name),
                comment_text(value)
            )],
            (["tables", table_name, "columns", column_name], Some(value)) if creating => {
                let mut column: Column = definition(value, path)?;
                if column.name.is_empty() {
                    column.name = column_name.to_string();
                }
                let table = Table::new(*table_name);
                let mut statements = vec![format!(
                    "ALTER TABLE {} ADD COLUMN {};",
                    s.quote(table_name),
                    self.column_definition(&table, &column, &Schema::new())
                )];
                if let Some(comment) = &column.comment {
                    statements.push(format!(
                        "COMMENT ON COLUMN {}.{} IS {};",
                        s.quote(table_name),
                        s.quote(&column.name),
                        literal(comment)
                    ));
                }
                statements
            }
            (["tables", table_name, "columns", column_name], None) => vec![format!(
                "ALTER TABLE {} DROP COLUMN {};",
                s.quote(table_name),
                s.quote(column_name)
            )],
            (["tables", table_name, "columns", column_name, attribute], value) => {
                match self.column_attribute(table_name, column_name, attribute, value) {
                    Some(statement) => vec![statement],
                    None => return Err(unsupported(operation)),
                }
            }
            (["tables", table_name, "indexes", index_name], Some(value)) if creating => {
                let mut index: Index = definition(value, path)?;
                if index.name.is_empty() {
                    index.name = index_name.to_string();
                }
                vec![self.create_index(&Table::new(*table_name), &index).map_err(failure)?]
            }
            (["tables", _, "indexes", index_name], None) => {
                vec![format!("DROP INDEX {};", s.quote(index_name))]
            }
            (["tables", table_name, "constraints", constraint_name], Some(value)) if creating => {
                let mut constraint: Constraint = definition(value, path)?;
                if constraint.name().is_empty() {
                    constraint.set_name(constraint_name.to_string());
                }
                self.constraint_statement(&Table::new(*table_name), &constraint)
                    .map_err(failure)?
                    .into_iter()
                    .collect()
            }
            (["tables", table_name, "constraints", constraint_name], None) => vec![format!(
                "ALTER TABLE {} DROP CONSTRAINT {};",
                s.quote(table_name),
                s.quote(constraint_name)
            )],
            (["enums", enum_name], Some(value)) if creating => {
                let mut enum_type: Enum = definition(value, path)?;
                if enum_type.name.is_empty() {
                    enum_type.name = enum_name.to_string();
                }
                self.enum_statements(&enum_type)
            }
            (["enums", enum_name], None) => vec![format!("DROP TYPE {};", s.quote(enum_name))],
            (["extensions", extension_name], Some(value)) if creating => {
                let mut extension: Extension = definition(value, path)?;
                if extension.name.is_empty() {
                    extension.name = extension_name.to_string();
                }
                vec![format!(
                    "CREATE EXTENSION IF NOT EXISTS {};",
                    s.quote_if_needed(&extension.name)
                )]
            }
            (["extensions", extension_name], None) => vec![format!(
                "DROP EXTENSION IF EXISTS {};",
                s.quote_if_needed(extension_name)
            )],
            _ => return Err(unsupported(operation)),
        };

        Ok(statements)
    }

    /// One column attribute set (`value`) or reset (`None`)
    fn column_attribute(
        &self,
        table_name: &str,
        column_name: &str,
        attribute: &str,
        value: Option<&Value>,
    ) -> Option<String> {
        let s = self.strategy;
        let alter = format!(
            "ALTER TABLE {} ALTER COLUMN {}",
            s.quote(table_name),
            s.quote(column_name)
        );

        match (attribute, value) {
            ("type", Some(Value::String(column_type))) => {
                Some(format!("{} TYPE {};", alter, column_type))
            }
            ("notNull", Some(Value::Bool(true))) => Some(format!("{} SET NOT NULL;", alter)),
            ("notNull", Some(Value::Bool(false)) | None) => Some(format!("{} DROP NOT NULL;", alter)),
            ("default", None | Some(Value::Null)) => Some(format!("{} DROP DEFAULT;", alter)),
            ("default", Some(value)) => {
                let default: DefaultValue = serde_json::from_value(value.clone()).ok()?;
                self.default_clause(&default)
                    .map(|clause| format!("{} SET {};", alter, clause))
            }
            ("comment", value) => Some(format!(
                "COMMENT ON COLUMN {}.{} IS {};",
                s.quote(table_name),
                s.quote(column_name),
                comment_text(value)
            )),
            ("name", Some(Value::String(new_name))) => Some(format!(
                "ALTER TABLE {} RENAME COLUMN {} TO {};",
                s.quote(table_name),
                s.quote(column_name),
                s.quote(new_name)
            )),
            _ => None,
        }
    }
}

/// Comment literal, or `NULL` to clear it
fn comment_text(value: Option<&Value>) -> String {
    match value.and_then(Value::as_str) {
        Some(comment) => literal(comment),
        None => "NULL".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn add(path: &str, value: Value) -> Operation {
        Operation::Add {
            path: path.into(),
            value,
        }
    }

    fn remove(path: &str) -> Operation {
        Operation::Remove { path: path.into() }
    }

    fn ddl(operation: Operation) -> String {
        let result = deparse_operation(&operation);
        assert!(result.errors.is_empty(), "{:?}", result.errors);
        result.value
    }

    #[test]
    fn test_add_table_with_comments() {
        let sql = ddl(add(
            "/tables/users",
            json!({
                "name": "users",
                "columns": {
                    "id": { "name": "id", "type": "bigint", "primary": true, "notNull": true, "comment": "User ID" },
                    "email": { "name": "email", "type": "varchar(255)", "notNull": true, "comment": "User email" }
                },
                "comment": "User table",
                "indexes": {},
                "constraints": {}
            }),
        ));

        assert_eq!(
            sql,
            "CREATE TABLE \"users\" (\n  \"id\" bigint PRIMARY KEY,\n  \"email\" varchar(255) NOT NULL\n);\n\n\
             COMMENT ON TABLE \"users\" IS 'User table';\n\n\
             COMMENT ON COLUMN \"users\".\"id\" IS 'User ID';\n\n\
             COMMENT ON COLUMN \"users\".\"email\" IS 'User email';"
        );
    }

    #[test]
    fn test_add_table_with_defaults() {
        let sql = ddl(add(
            "/tables/settings",
            json!({
                "columns": {
                    "id": { "type": "bigint", "primary": true, "notNull": true },
                    "enabled": { "type": "boolean", "notNull": true, "default": true },
                    "title": { "type": "varchar(100)", "default": "Default Title" }
                }
            }),
        ));

        assert_eq!(
            sql,
            "CREATE TABLE \"settings\" (\n  \"id\" bigint PRIMARY KEY,\n  \
             \"enabled\" boolean NOT NULL DEFAULT TRUE,\n  \
             \"title\" varchar(100) DEFAULT 'Default Title'\n);"
        );
    }

    #[test]
    fn test_add_table_with_constraints() {
        let sql = ddl(add(
            "/tables/posts",
            json!({
                "columns": { "id": { "type": "bigint" }, "user_id": { "type": "bigint" } },
                "indexes": { "posts_user_idx": { "columns": ["user_id"], "type": "" } },
                "constraints": {
                    "posts_user_fk": {
                        "type": "FOREIGN KEY",
                        "columnNames": ["user_id"],
                        "targetTableName": "users",
                        "targetColumnNames": ["id"]
                    },
                    "posts_pkey": { "type": "PRIMARY KEY", "columnNames": ["id"] }
                }
            }),
        ));

        let lines: Vec<&str> = sql.split("\n\n").collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[1], "CREATE INDEX \"posts_user_idx\" ON \"posts\" (\"user_id\");");
        assert_eq!(
            lines[2],
            "ALTER TABLE \"posts\" ADD CONSTRAINT \"posts_pkey\" PRIMARY KEY (\"id\");"
        );
        assert!(lines[3].starts_with("ALTER TABLE \"posts\" ADD CONSTRAINT \"posts_user_fk\" FOREIGN KEY"));
    }

    #[test]
    fn test_drop_table() {
        assert_eq!(ddl(remove("/tables/users")), "DROP TABLE \"users\";");
    }

    #[test]
    fn test_add_column_with_comment() {
        let sql = ddl(add(
            "/tables/users/columns/age",
            json!({ "name": "age", "type": "integer", "comment": "User age" }),
        ));
        assert_eq!(
            sql,
            "ALTER TABLE \"users\" ADD COLUMN \"age\" integer;\n\n\
             COMMENT ON COLUMN \"users\".\"age\" IS 'User age';"
        );
    }

    #[test]
    fn test_add_column_with_constraints() {
        let sql = ddl(add(
            "/tables/products/columns/price",
            json!({ "name": "price", "type": "decimal(10,2)", "notNull": true, "default": 0 }),
        ));
        assert_eq!(
            sql,
            "ALTER TABLE \"products\" ADD COLUMN \"price\" decimal(10,2) NOT NULL DEFAULT 0;"
        );
    }

    #[test]
    fn test_drop_column() {
        assert_eq!(
            ddl(remove("/tables/users/columns/age")),
            "ALTER TABLE \"users\" DROP COLUMN \"age\";"
        );
    }

    #[test]
    fn test_create_indexes() {
        let index = |unique: bool, columns: Value, index_type: &str| {
            json!({ "unique": unique, "columns": columns, "type": index_type })
        };

        assert_eq!(
            ddl(add(
                "/tables/users/indexes/idx_users_email",
                index(false, json!(["email"]), "BTREE")
            )),
            "CREATE INDEX \"idx_users_email\" ON \"users\" USING BTREE (\"email\");"
        );
        assert_eq!(
            ddl(add(
                "/tables/users/indexes/idx_users_username_unique",
                index(true, json!(["username"]), "btree")
            )),
            "CREATE UNIQUE INDEX \"idx_users_username_unique\" ON \"users\" USING BTREE (\"username\");"
        );
        assert_eq!(
            ddl(add(
                "/tables/orders/indexes/idx_orders_user_date",
                index(false, json!(["user_id", "created_at"]), "BTREE")
            )),
            "CREATE INDEX \"idx_orders_user_date\" ON \"orders\" USING BTREE (\"user_id\", \"created_at\");"
        );
        assert_eq!(
            ddl(add(
                "/tables/products/indexes/idx_products_category",
                index(false, json!(["category_id"]), "")
            )),
            "CREATE INDEX \"idx_products_category\" ON \"products\" (\"category_id\");"
        );
    }

    #[test]
    fn test_index_without_columns_is_critical() {
        let result = deparse_operation(&add(
            "/tables/users/indexes/broken",
            json!({ "columns": [] }),
        ));
        assert_eq!(result.value, "");
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].code, ErrorCode::DeparseError);
        assert!(result.has_critical());
    }

    #[test]
    fn test_constraints() {
        assert_eq!(
            ddl(add(
                "/tables/posts/constraints/posts_score_check",
                json!({ "type": "CHECK", "detail": "score >= 0" })
            )),
            "ALTER TABLE \"posts\" ADD CONSTRAINT \"posts_score_check\" CHECK (score >= 0);"
        );
        assert_eq!(
            ddl(remove("/tables/posts/constraints/posts_score_check")),
            "ALTER TABLE \"posts\" DROP CONSTRAINT \"posts_score_check\";"
        );
    }

    #[test]
    fn test_column_attributes() {
        let replace = |path: &str, value: Value| Operation::Replace {
            path: path.into(),
            value,
        };

        assert_eq!(
            ddl(replace("/tables/users/columns/email/type", json!("text"))),
            "ALTER TABLE \"users\" ALTER COLUMN \"email\" TYPE text;"
        );
        assert_eq!(
            ddl(replace("/tables/users/columns/email/notNull", json!(true))),
            "ALTER TABLE \"users\" ALTER COLUMN \"email\" SET NOT NULL;"
        );
        assert_eq!(
            ddl(remove("/tables/users/columns/email/notNull")),
            "ALTER TABLE \"users\" ALTER COLUMN \"email\" DROP NOT NULL;"
        );
        assert_eq!(
            ddl(replace("/tables/users/columns/created_at/default", json!("now()"))),
            "ALTER TABLE \"users\" ALTER COLUMN \"created_at\" SET DEFAULT now();"
        );
        assert_eq!(
            ddl(replace("/tables/users/columns/created_at/default", Value::Null)),
            "ALTER TABLE \"users\" ALTER COLUMN \"created_at\" DROP DEFAULT;"
        );
        assert_eq!(
            ddl(replace("/tables/users/columns/email/name", json!("login"))),
            "ALTER TABLE \"users\" RENAME COLUMN \"email\" TO \"login\";"
        );
        assert_eq!(
            ddl(remove("/tables/users/columns/email/comment")),
            "COMMENT ON COLUMN \"users\".\"email\" IS NULL;"
        );
    }

    #[test]
    fn test_table_rename_and_comment() {
        assert_eq!(
            ddl(Operation::Replace {
                path: "/tables/users/name".into(),
                value: json!("accounts"),
            }),
            "ALTER TABLE \"users\" RENAME TO \"accounts\";"
        );
        assert_eq!(
            ddl(add("/tables/users/comment", json!("it's people"))),
            "COMMENT ON TABLE \"users\" IS 'it''s people';"
        );
    }

    #[test]
    fn test_enums_and_extensions() {
        assert_eq!(
            ddl(add("/enums/mood", json!({ "values": ["happy", "sad"] }))),
            "CREATE TYPE \"mood\" AS ENUM ('happy', 'sad');"
        );
        assert_eq!(ddl(remove("/enums/mood")), "DROP TYPE \"mood\";");
        assert_eq!(
            ddl(add("/extensions/pgcrypto", json!({}))),
            "CREATE EXTENSION IF NOT EXISTS pgcrypto;"
        );
        assert_eq!(
            ddl(remove("/extensions/uuid-ossp")),
            "DROP EXTENSION IF EXISTS \"uuid-ossp\";"
        );
    }

    #[test]
    fn test_operations_without_ddl_are_warnings() {
        for operation in [
            Operation::Move {
                from: "/tables/a".into(),
                path: "/tables/b".into(),
            },
            Operation::Replace {
                path: "/tables/users".into(),
                value: json!({}),
            },
            add("/tables/users/columns/email/primary", json!(true)),
            remove("/somewhere/else"),
        ] {
            let result = deparse_operation(&operation);
            assert_eq!(result.value, "");
            assert_eq!(result.errors.len(), 1);
            assert_eq!(result.errors[0].code, ErrorCode::UnsupportedConstruct);
            assert!(!result.has_critical());
        }
    }

    #[test]
    fn test_malformed_value_is_critical() {
        let result = deparse_operation(&add("/tables/users/columns/age", json!("integer")));
        assert_eq!(result.errors[0].code, ErrorCode::DeparseError);
        assert!(result.has_critical());
    }
}
