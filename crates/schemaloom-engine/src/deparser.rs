//! DDL generation from the canonical schema
//!
//! Statements come out in dependency order:
//!
//! 1. extensions and enum types
//! 2. every `CREATE TABLE`, each followed by its comments
//! 3. every `CREATE INDEX`
//! 4. `ALTER TABLE ... ADD CONSTRAINT` for all primary keys, then all unique
//!    constraints, then all checks
//! 5. all foreign keys, so every key they reference already exists
//!
//! Statements are separated by a blank line. Structural problems abort the
//! whole rendering with a single `DEPARSE_ERROR` and empty output.

use regex::Regex;
use schemaloom_core::{
    CheckConstraint, Column, Constraint, DefaultValue, DialectConfig, Enum, ErrorCode,
    ForeignKeyConstraint, Index, ProcessError, ProcessResult, Schema, Table,
};
use std::sync::OnceLock;
use thiserror::Error;

mod operation;

pub use operation::deparse_operation;

/// How table and column comments are written
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommentStyle {
    /// Separate `COMMENT ON ...` statements after the table
    Statements,

    /// `COMMENT '...'` on columns and `COMMENT='...'` on the table
    Inline,
}

/// Everything that differs between the generated PostgreSQL and MySQL DDL
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeparserStrategy {
    pub dialect: DialectConfig,

    /// Identifier quote character
    pub quote: char,

    /// `CREATE EXTENSION`
    pub supports_extensions: bool,

    /// `CREATE TYPE ... AS ENUM`; without it enum columns are written inline
    pub supports_enum_types: bool,

    pub comment_style: CommentStyle,

    /// `USING method` goes after the column list instead of before it
    pub index_method_after_columns: bool,
}

impl DeparserStrategy {
    pub fn postgres() -> Self {
        Self {
            dialect: DialectConfig::Postgres,
            quote: '"',
            supports_extensions: true,
            supports_enum_types: true,
            comment_style: CommentStyle::Statements,
            index_method_after_columns: false,
        }
    }

    pub fn mysql() -> Self {
        Self {
            dialect: DialectConfig::Mysql,
            quote: '`',
            supports_extensions: false,
            supports_enum_types: false,
            comment_style: CommentStyle::Inline,
            index_method_after_columns: true,
        }
    }

    pub fn for_dialect(dialect: DialectConfig) -> Self {
        match dialect {
            DialectConfig::Postgres => Self::postgres(),
            DialectConfig::Mysql => Self::mysql(),
        }
    }

    /// Quote an identifier, doubling embedded quote characters
    pub fn quote(&self, identifier: &str) -> String {
        let q = self.quote;
        let escaped = identifier.replace(q, &format!("{}{}", q, q));
        format!("{}{}{}", q, escaped, q)
    }

    fn quote_all(&self, identifiers: &[String]) -> String {
        identifiers
            .iter()
            .map(|i| self.quote(i))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Leave simple lowercase names bare
    fn quote_if_needed(&self, identifier: &str) -> String {
        match simple_identifier_pattern() {
            Some(pattern) if pattern.is_match(identifier) => identifier.to_string(),
            _ => self.quote(identifier),
        }
    }
}

/// Schema shapes that cannot be rendered as DDL
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DeparseError {
    #[error("Index '{index}' on table '{table}' has no columns")]
    IndexWithoutColumns { table: String, index: String },

    #[error(
        "Foreign key '{constraint}' on table '{table}' has {columns} column(s) but {targets} target column(s)"
    )]
    ForeignKeyArity {
        table: String,
        constraint: String,
        columns: usize,
        targets: usize,
    },

    #[error("CHECK constraint '{constraint}' on table '{table}' has an empty detail")]
    EmptyCheck { table: String, constraint: String },
}

/// Render `schema` as DDL for `dialect`
pub fn deparse(schema: &Schema, dialect: DialectConfig) -> ProcessResult<String> {
    Deparser::new(DeparserStrategy::for_dialect(dialect)).deparse(schema)
}

/// Schema to DDL renderer for one dialect
pub struct Deparser {
    strategy: DeparserStrategy,
    warnings: Vec<ProcessError>,
}

impl Deparser {
    pub fn new(strategy: DeparserStrategy) -> Self {
        Self {
            strategy,
            warnings: Vec::new(),
        }
    }

    /// Render a schema. Never panics; failures come back as a single
    /// critical error with empty output.
    pub fn deparse(mut self, schema: &Schema) -> ProcessResult<String> {
        match self.statements(schema) {
            Ok(statements) => {
                tracing::debug!(
                    dialect = ?self.strategy.dialect,
                    statements = statements.len(),
                    "deparsed schema"
                );
                ProcessResult::new(statements.join("\n\n"), self.warnings)
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to deparse schema");
                ProcessResult::failed(ProcessError::critical(ErrorCode::DeparseError, e.to_string()))
            }
        }
    }

    fn warn(&mut self, message: String) {
        tracing::warn!("{}", message);
        self.warnings
            .push(ProcessError::warning(ErrorCode::UnsupportedConstruct, message));
    }

    fn statements(&mut self, schema: &Schema) -> Result<Vec<String>, DeparseError> {
        let s = self.strategy;
        let mut statements = Vec::new();

        for extension in schema.extensions.values() {
            if s.supports_extensions {
                statements.push(format!(
                    "CREATE EXTENSION IF NOT EXISTS {};",
                    s.quote_if_needed(&extension.name)
                ));
            } else {
                self.warn(format!(
                    "Extension '{}' has no {:?} equivalent and was skipped",
                    extension.name, s.dialect
                ));
            }
        }

        if s.supports_enum_types {
            for enum_type in schema.enums.values() {
                statements.extend(self.enum_statements(enum_type));
            }
        }

        for table in schema.tables.values() {
            statements.push(self.create_table(table, schema));
            if s.comment_style == CommentStyle::Statements {
                statements.extend(self.comment_statements(table));
            }
        }

        for table in schema.tables.values() {
            for index in table.indexes.values() {
                statements.push(self.create_index(table, index)?);
            }
        }

        let mut primary_keys = Vec::new();
        let mut uniques = Vec::new();
        let mut checks = Vec::new();
        let mut foreign_keys = Vec::new();

        for table in schema.tables.values() {
            for constraint in table.constraints.values() {
                let Some(statement) = self.constraint_statement(table, constraint)? else {
                    continue;
                };
                let bucket = match constraint {
                    Constraint::PrimaryKey(_) => &mut primary_keys,
                    Constraint::Unique(_) => &mut uniques,
                    Constraint::Check(_) => &mut checks,
                    _ => &mut foreign_keys,
                };
                bucket.push(statement);
            }
        }

        statements.extend(primary_keys);
        statements.extend(uniques);
        statements.extend(checks);
        statements.extend(foreign_keys);
        Ok(statements)
    }

    fn enum_statements(&self, enum_type: &Enum) -> Vec<String> {
        let s = self.strategy;
        let values: Vec<String> = enum_type.values.iter().map(|v| literal(v)).collect();
        let mut statements = vec![format!(
            "CREATE TYPE {} AS ENUM ({});",
            s.quote(&enum_type.name),
            values.join(", ")
        )];
        if let Some(comment) = &enum_type.comment {
            statements.push(format!(
                "COMMENT ON TYPE {} IS {};",
                s.quote(&enum_type.name),
                literal(comment)
            ));
        }
        statements
    }

    fn create_table(&self, table: &Table, schema: &Schema) -> String {
        let s = self.strategy;
        let columns: Vec<String> = table
            .columns
            .values()
            .map(|column| format!("  {}", self.column_definition(table, column, schema)))
            .collect();

        let mut sql = if columns.is_empty() {
            format!("CREATE TABLE {} ()", s.quote(&table.name))
        } else {
            format!("CREATE TABLE {} (\n{}\n)", s.quote(&table.name), columns.join(",\n"))
        };

        if s.comment_style == CommentStyle::Inline {
            if let Some(comment) = &table.comment {
                sql.push_str(&format!(" COMMENT={}", literal(comment)));
            }
        }
        sql.push(';');
        sql
    }

    /// Column keywords in fixed order: PRIMARY KEY, UNIQUE, NOT NULL, DEFAULT.
    /// Keys already declared by a named constraint are left to that constraint.
    fn column_definition(&self, table: &Table, column: &Column, schema: &Schema) -> String {
        let s = self.strategy;
        let mut parts = vec![s.quote(&column.name), self.column_type(column, schema)];

        if column.primary && !covered_by_primary_key(table, &column.name) {
            parts.push("PRIMARY KEY".to_string());
        }
        if column.unique && !table.has_unique_constraint_on(&column.name) {
            parts.push("UNIQUE".to_string());
        }
        if column.not_null && !column.primary {
            parts.push("NOT NULL".to_string());
        }
        if let Some(default) = &column.default {
            parts.extend(self.default_clause(default));
        }
        if let Some(check) = &column.check {
            let declared = table.constraints.values().any(|c| match c {
                Constraint::Check(existing) => existing.detail == *check,
                _ => false,
            });
            if !check.trim().is_empty() && !declared {
                parts.push(wrap_check(check));
            }
        }
        if s.comment_style == CommentStyle::Inline {
            if let Some(comment) = &column.comment {
                parts.push(format!("COMMENT {}", literal(comment)));
            }
        }

        parts.join(" ")
    }

    fn column_type(&self, column: &Column, schema: &Schema) -> String {
        match schema.enums.get(&column.column_type) {
            Some(enum_type) if !self.strategy.supports_enum_types => {
                let values: Vec<String> = enum_type.values.iter().map(|v| literal(v)).collect();
                format!("ENUM({})", values.join(", "))
            }
            Some(enum_type) => self.strategy.quote_if_needed(&enum_type.name),
            None => column.column_type.clone(),
        }
    }

    fn default_clause(&self, default: &DefaultValue) -> Option<String> {
        match default {
            DefaultValue::Boolean(true) => Some("DEFAULT TRUE".to_string()),
            DefaultValue::Boolean(false) => Some("DEFAULT FALSE".to_string()),
            DefaultValue::Number(n) => Some(format!("DEFAULT {}", n)),
            DefaultValue::String(text) if text == AUTO_INCREMENT_DEFAULT => {
                match self.strategy.dialect {
                    DialectConfig::Mysql => Some("AUTO_INCREMENT".to_string()),
                    // serial types carry their own sequence
                    DialectConfig::Postgres => None,
                }
            }
            DefaultValue::String(text) if is_sql_expression(text) => {
                Some(format!("DEFAULT {}", text.trim()))
            }
            DefaultValue::String(text) => Some(format!("DEFAULT {}", literal(text))),
        }
    }

    fn comment_statements(&self, table: &Table) -> Vec<String> {
        let s = self.strategy;
        let mut statements = Vec::new();

        if let Some(comment) = &table.comment {
            statements.push(format!(
                "COMMENT ON TABLE {} IS {};",
                s.quote(&table.name),
                literal(comment)
            ));
        }
        for column in table.columns.values() {
            if let Some(comment) = &column.comment {
                statements.push(format!(
                    "COMMENT ON COLUMN {}.{} IS {};",
                    s.quote(&table.name),
                    s.quote(&column.name),
                    literal(comment)
                ));
            }
        }

        statements
    }

    fn create_index(&self, table: &Table, index: &Index) -> Result<String, DeparseError> {
        if index.columns.is_empty() {
            return Err(DeparseError::IndexWithoutColumns {
                table: table.name.clone(),
                index: index.name.clone(),
            });
        }

        let s = self.strategy;
        let unique = if index.unique { "UNIQUE " } else { "" };
        let columns = s.quote_all(&index.columns);
        let using = if index.index_type.is_empty() {
            String::new()
        } else {
            format!(" USING {}", index.index_type.to_uppercase())
        };

        let sql = if s.index_method_after_columns {
            format!(
                "CREATE {}INDEX {} ON {} ({}){};",
                unique,
                s.quote(&index.name),
                s.quote(&table.name),
                columns,
                using
            )
        } else {
            format!(
                "CREATE {}INDEX {} ON {}{} ({});",
                unique,
                s.quote(&index.name),
                s.quote(&table.name),
                using,
                columns
            )
        };
        Ok(sql)
    }

    fn foreign_key_clause(
        &self,
        table: &Table,
        fk: &ForeignKeyConstraint,
    ) -> Result<String, DeparseError> {
        if fk.column_names.is_empty() || fk.column_names.len() != fk.target_column_names.len() {
            return Err(DeparseError::ForeignKeyArity {
                table: table.name.clone(),
                constraint: fk.name.clone(),
                columns: fk.column_names.len(),
                targets: fk.target_column_names.len(),
            });
        }

        let s = self.strategy;
        Ok(format!(
            "FOREIGN KEY ({}) REFERENCES {} ({}) ON UPDATE {} ON DELETE {}",
            s.quote_all(&fk.column_names),
            s.quote(&fk.target_table_name),
            s.quote_all(&fk.target_column_names),
            fk.update_constraint.as_sql(),
            fk.delete_constraint.as_sql()
        ))
    }

    /// `ALTER TABLE ... ADD CONSTRAINT` for one constraint. INTERLEAVE has no
    /// DDL form and yields a warning instead.
    fn constraint_statement(
        &mut self,
        table: &Table,
        constraint: &Constraint,
    ) -> Result<Option<String>, DeparseError> {
        let s = self.strategy;
        let clause = match constraint {
            Constraint::PrimaryKey(pk) => format!("PRIMARY KEY ({})", s.quote_all(&pk.column_names)),
            Constraint::Unique(unique) => format!("UNIQUE ({})", s.quote_all(&unique.column_names)),
            Constraint::Check(check) => check_clause(table, check)?,
            Constraint::ForeignKey(fk) => self.foreign_key_clause(table, fk)?,
            Constraint::Interleave(il) => {
                self.warn(format!(
                    "INTERLEAVE constraint '{}' on table '{}' was skipped",
                    il.name, table.name
                ));
                return Ok(None);
            }
        };
        Ok(Some(self.add_constraint(table, constraint.name(), clause)))
    }

    fn add_constraint(&self, table: &Table, name: &str, clause: String) -> String {
        let s = self.strategy;
        if name.is_empty() {
            format!("ALTER TABLE {} ADD {};", s.quote(&table.name), clause)
        } else {
            format!(
                "ALTER TABLE {} ADD CONSTRAINT {} {};",
                s.quote(&table.name),
                s.quote(name),
                clause
            )
        }
    }
}

/// Default that marks an auto-incrementing column
const AUTO_INCREMENT_DEFAULT: &str = "autoincrement()";

/// Zero-argument SQL keywords that are valid defaults on their own
const DEFAULT_KEYWORDS: &[&str] = &[
    "CURRENT_TIMESTAMP",
    "CURRENT_DATE",
    "CURRENT_TIME",
    "LOCALTIMESTAMP",
    "LOCALTIME",
    "CURRENT_USER",
    "SESSION_USER",
    "NULL",
];

fn simple_identifier_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^[a-z_][a-z0-9_]*$").ok())
        .as_ref()
}

fn function_call_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"(?s)^[A-Za-z_][A-Za-z0-9_.]*\s*\(.*\)$").ok())
        .as_ref()
}

fn cast_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r#"(?s)^'(?:[^']|'')*'::[A-Za-z_"][\w\s."\[\]()]*$"#).ok())
        .as_ref()
}

/// String defaults that are SQL expressions rather than text values:
/// function calls, keywords, casts and parenthesized expressions
fn is_sql_expression(text: &str) -> bool {
    let text = text.trim();
    let matches = |pattern: Option<&'static Regex>| pattern.is_some_and(|p| p.is_match(text));

    DEFAULT_KEYWORDS.iter().any(|k| k.eq_ignore_ascii_case(text))
        || matches(function_call_pattern())
        || matches(cast_pattern())
        || (text.starts_with('(') && text.ends_with(')'))
}

/// Single-quoted SQL string literal
fn literal(text: &str) -> String {
    format!("'{}'", text.replace('\'', "''"))
}

fn wrap_check(detail: &str) -> String {
    let detail = detail.trim();
    let keyword = detail.get(..5).is_some_and(|head| head.eq_ignore_ascii_case("CHECK"))
        && detail
            .get(5..)
            .and_then(|rest| rest.chars().next())
            .is_some_and(|c| c.is_whitespace() || c == '(');
    if keyword {
        detail.to_string()
    } else {
        format!("CHECK ({})", detail)
    }
}

fn check_clause(table: &Table, check: &CheckConstraint) -> Result<String, DeparseError> {
    if check.detail.trim().is_empty() {
        return Err(DeparseError::EmptyCheck {
            table: table.name.clone(),
            constraint: check.name.clone(),
        });
    }
    Ok(wrap_check(&check.detail))
}

fn covered_by_primary_key(table: &Table, column: &str) -> bool {
    table.constraints.values().any(|c| match c {
        Constraint::PrimaryKey(pk) => pk.column_names.iter().any(|name| name == column),
        _ => false,
    })
}
