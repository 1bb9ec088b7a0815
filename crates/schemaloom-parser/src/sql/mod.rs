//! SQL DDL parsing using datafusion-sqlparser-rs
//!
//! Input is split into top-level statements and each one is parsed on its
//! own, so a statement the parser rejects becomes a warning and the rest of
//! the file still contributes to the schema.

mod chunks;
mod converter;

pub use chunks::{split_statements, Chunk};

use converter::DdlConverter;
use regex::Regex;
use schemaloom_core::{DialectConfig, Enum, ErrorCode, ProcessResult, Schema};
use sqlparser::dialect::{Dialect, MySqlDialect, PostgreSqlDialect};
use sqlparser::parser::Parser;
use std::sync::OnceLock;

/// SQL DDL parser with configurable dialect
pub struct SqlParser {
    dialect: Box<dyn Dialect>,
}

impl SqlParser {
    /// Create a SQL parser for PostgreSQL
    pub fn postgres() -> Self {
        Self {
            dialect: Box::new(PostgreSqlDialect {}),
        }
    }

    /// Create a SQL parser for MySQL
    pub fn mysql() -> Self {
        Self {
            dialect: Box::new(MySqlDialect {}),
        }
    }

    /// Create a parser from a dialect config
    pub fn from_dialect(dialect: &DialectConfig) -> Self {
        match dialect {
            DialectConfig::Postgres => Self::postgres(),
            DialectConfig::Mysql => Self::mysql(),
        }
    }

    /// Parse DDL text into a schema.
    ///
    /// Never fails: statements that do not parse are reported as
    /// `SQL_PARSE_ERROR` warnings at their starting line.
    pub fn parse(&self, sql: &str) -> ProcessResult<Schema> {
        let mut converter = DdlConverter::new();

        for chunk in split_statements(sql) {
            converter.at_line(chunk.line);

            if let Some(enum_type) = parse_create_enum(chunk.text) {
                converter
                    .schema_mut()
                    .enums
                    .insert(enum_type.name.clone(), enum_type);
                continue;
            }
            if let Some((name, comment)) = parse_type_comment(chunk.text) {
                match converter.schema_mut().enums.get_mut(&name) {
                    Some(enum_type) => enum_type.comment = Some(comment),
                    None => converter.warn(
                        ErrorCode::UnknownTable,
                        format!("COMMENT ON TYPE refers to unknown type '{}'", name),
                    ),
                }
                continue;
            }

            match Parser::parse_sql(&*self.dialect, chunk.text) {
                Ok(statements) => {
                    for statement in &statements {
                        converter.convert(statement);
                    }
                }
                Err(e) => converter.warn(
                    ErrorCode::SqlParseError,
                    format!("Failed to parse SQL: {}", e),
                ),
            }
        }

        converter.finish()
    }
}

impl Default for SqlParser {
    fn default() -> Self {
        Self::postgres()
    }
}

fn create_enum_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"(?is)^CREATE\s+TYPE\s+(.+?)\s+AS\s+ENUM\s*\((.*)\)$").ok())
        .as_ref()
}

fn type_comment_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| {
            Regex::new(r"(?is)^COMMENT\s+ON\s+TYPE\s+(.+?)\s+IS\s+'((?:[^']|'')*)'$").ok()
        })
        .as_ref()
}

fn string_literal_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"'((?:[^']|'')*)'").ok())
        .as_ref()
}

/// `CREATE TYPE name AS ENUM ('a', 'b')`, which sqlparser does not model
fn parse_create_enum(statement: &str) -> Option<Enum> {
    let captures = create_enum_pattern()?.captures(statement)?;
    let name = type_name(captures.get(1)?.as_str());
    let values = string_literal_pattern()?
        .captures_iter(captures.get(2)?.as_str())
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str().replace("''", "'"))
        .collect();

    Some(Enum::new(name, values))
}

fn parse_type_comment(statement: &str) -> Option<(String, String)> {
    let captures = type_comment_pattern()?.captures(statement)?;
    Some((
        type_name(captures.get(1)?.as_str()),
        captures.get(2)?.as_str().replace("''", "'"),
    ))
}

/// Unqualified, unquoted type name
fn type_name(raw: &str) -> String {
    let last = raw.rsplit('.').next().unwrap_or(raw).trim();
    last.trim_matches('"').replace("\"\"", "\"")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use schemaloom_core::{Constraint, DefaultValue, ForeignKeyAction, Severity};

    #[test]
    fn parse_create_table_with_inline_constraints() {
        let result = SqlParser::postgres().parse(
            "CREATE TABLE users (
                id bigserial PRIMARY KEY,
                email VARCHAR(255) NOT NULL UNIQUE,
                age INTEGER CHECK (age >= 0),
                active BOOLEAN DEFAULT TRUE,
                role TEXT DEFAULT 'member',
                score INTEGER DEFAULT -1,
                created_at TIMESTAMP DEFAULT now()
            );",
        );

        assert!(result.errors.is_empty(), "{:?}", result.errors);
        let users = result.value.table("users").unwrap();

        let id = &users.columns["id"];
        assert!(id.primary && id.not_null);
        assert_eq!(id.column_type, "bigserial");

        let email = &users.columns["email"];
        assert!(email.unique && email.not_null);
        assert_eq!(email.column_type, "varchar(255)");

        assert_eq!(users.columns["age"].check.as_deref(), Some("age >= 0"));
        assert_eq!(users.columns["active"].default, Some(DefaultValue::Boolean(true)));
        assert_eq!(users.columns["role"].default, Some(DefaultValue::from("member")));
        assert_eq!(users.columns["score"].default, Some(DefaultValue::from(-1)));
        assert_eq!(users.columns["created_at"].default, Some(DefaultValue::from("now()")));

        assert!(matches!(users.constraints["PRIMARY_id"], Constraint::PrimaryKey(_)));
        assert!(matches!(users.constraints["UNIQUE_email"], Constraint::Unique(_)));
        assert!(matches!(users.constraints["CHECK_age"], Constraint::Check(_)));
    }

    #[test]
    fn parse_foreign_keys_with_actions() {
        let result = SqlParser::postgres().parse(
            "CREATE TABLE users (id INT PRIMARY KEY);
             CREATE TABLE posts (
                id INT PRIMARY KEY,
                user_id INT REFERENCES users ON DELETE CASCADE,
                editor_id INT,
                CONSTRAINT posts_editor_fk FOREIGN KEY (editor_id) REFERENCES users (id) ON UPDATE SET NULL
             );",
        );

        let posts = result.value.table("posts").unwrap();
        let Constraint::ForeignKey(inline) = &posts.constraints["posts_user_id_fkey"] else {
            panic!("expected foreign key");
        };
        assert_eq!(inline.target_table_name, "users");
        assert_eq!(inline.target_column_names, vec!["id".to_string()]);
        assert_eq!(inline.delete_constraint, ForeignKeyAction::Cascade);

        let Constraint::ForeignKey(named) = &posts.constraints["posts_editor_fk"] else {
            panic!("expected foreign key");
        };
        assert_eq!(named.update_constraint, ForeignKeyAction::SetNull);
        assert_eq!(named.delete_constraint, ForeignKeyAction::NoAction);
    }

    #[test]
    fn parse_indexes_comments_extensions_and_enums() {
        let result = SqlParser::postgres().parse(
            "CREATE EXTENSION IF NOT EXISTS \"uuid-ossp\";
             CREATE TYPE status AS ENUM ('active', 'it''s off');
             COMMENT ON TYPE status IS 'Account status';
             CREATE TABLE users (id uuid, tags text[], state status);
             CREATE UNIQUE INDEX users_id_idx ON users USING btree (id);
             CREATE INDEX users_tags_idx ON users USING GIN (tags);
             COMMENT ON TABLE users IS 'All users';
             COMMENT ON COLUMN users.id IS 'Primary id';",
        );

        assert!(result.errors.is_empty(), "{:?}", result.errors);
        let schema = result.value;
        assert!(schema.extensions.contains_key("uuid-ossp"));

        let status = &schema.enums["status"];
        assert_eq!(status.values, vec!["active".to_string(), "it's off".to_string()]);
        assert_eq!(status.comment.as_deref(), Some("Account status"));

        let users = schema.table("users").unwrap();
        assert_eq!(users.comment.as_deref(), Some("All users"));
        assert_eq!(users.columns["id"].comment.as_deref(), Some("Primary id"));
        assert_eq!(users.columns["state"].column_type, "status");

        let unique = &users.indexes["users_id_idx"];
        assert!(unique.unique);
        assert_eq!(unique.index_type, "btree");
        assert_eq!(users.indexes["users_tags_idx"].index_type, "gin");
    }

    #[test]
    fn alter_table_adds_constraints() {
        let result = SqlParser::postgres().parse(
            "CREATE TABLE a (id INT NOT NULL, code TEXT);
             ALTER TABLE a ADD CONSTRAINT a_pkey PRIMARY KEY (id);
             ALTER TABLE a ADD CONSTRAINT a_code_key UNIQUE (code);
             ALTER TABLE a ADD CONSTRAINT a_code_check CHECK (length(code) > 2);",
        );

        let a = result.value.table("a").unwrap();
        assert!(a.columns["id"].primary);
        assert!(a.columns["code"].unique);
        assert_eq!(a.constraints.len(), 3);
    }

    #[test]
    fn bad_statement_is_recoverable() {
        let result = SqlParser::postgres().parse(
            "CREATE TABLE a (id INT);\n\nCREATE TABLE broken (id INT,,);\nCREATE TABLE b (id INT);",
        );

        assert_eq!(result.value.tables.len(), 2);
        assert_eq!(result.errors.len(), 1);
        let error = &result.errors[0];
        assert_eq!(error.code, ErrorCode::SqlParseError);
        assert_eq!(error.severity, Severity::Warning);
        assert_eq!(error.location.map(|l| l.line), Some(3));
    }

    #[test]
    fn unknown_table_reference_is_warning() {
        let result = SqlParser::postgres().parse("CREATE INDEX i ON missing (id);");
        assert_eq!(result.errors[0].code, ErrorCode::UnknownTable);
        assert!(result.value.tables.is_empty());
    }

    #[test]
    fn mysql_inline_comments_and_auto_increment() {
        let result = SqlParser::mysql().parse(
            "CREATE TABLE `users` (
                `id` INT NOT NULL AUTO_INCREMENT PRIMARY KEY COMMENT 'row id',
                `email` VARCHAR(255) NOT NULL,
                INDEX `users_email_idx` (`email`)
             ) COMMENT='people';",
        );

        assert!(result.errors.is_empty(), "{:?}", result.errors);
        let users = result.value.table("users").unwrap();
        assert_eq!(users.comment.as_deref(), Some("people"));
        assert_eq!(users.columns["id"].comment.as_deref(), Some("row id"));
        assert_eq!(
            users.columns["id"].default,
            Some(DefaultValue::from("autoincrement()"))
        );
        assert!(users.indexes.contains_key("users_email_idx"));
    }
}
