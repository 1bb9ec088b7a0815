//! Canonical schema model
//!
//! Format-agnostic tables, columns, indexes, constraints and enums. Every
//! parser converges on a [`Schema`] and every deparser starts from one.
//!
//! Maps are [`IndexMap`]s: they keep declaration order for rendering while
//! comparing as plain maps, so two schemas with the same content are equal
//! regardless of the order their tables were declared in.

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};

pub type Tables = IndexMap<String, Table>;
pub type Columns = IndexMap<String, Column>;
pub type Indexes = IndexMap<String, Index>;
pub type Constraints = IndexMap<String, Constraint>;
pub type Enums = IndexMap<String, Enum>;
pub type Extensions = IndexMap<String, Extension>;

/// A complete database schema
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Schema {
    pub tables: Tables,
    pub enums: Enums,
    pub extensions: Extensions,
}

impl Schema {
    /// Create an empty schema
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a table, keyed by its name
    pub fn with_table(mut self, table: Table) -> Self {
        self.tables.insert(table.name.clone(), table);
        self
    }

    /// Add an enum type, keyed by its name
    pub fn with_enum(mut self, enum_type: Enum) -> Self {
        self.enums.insert(enum_type.name.clone(), enum_type);
        self
    }

    /// Add an extension, keyed by its name
    pub fn with_extension(mut self, extension: Extension) -> Self {
        self.extensions.insert(extension.name.clone(), extension);
        self
    }

    /// Look up a table by name
    pub fn table(&self, name: &str) -> Option<&Table> {
        self.tables.get(name)
    }

    /// Look up a table by name for mutation
    pub fn table_mut(&mut self, name: &str) -> Option<&mut Table> {
        self.tables.get_mut(name)
    }

    /// True when the schema declares nothing at all
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty() && self.enums.is_empty() && self.extensions.is_empty()
    }

    /// Fill in missing entity names from their map keys.
    ///
    /// Documents built up from partial JSON (patch streams, hand-written
    /// fixtures) may omit the `name` field; after this call every entity's
    /// name equals its key.
    pub fn normalize_names(&mut self) {
        for (key, table) in self.tables.iter_mut() {
            if table.name.is_empty() {
                table.name = key.clone();
            }
            for (key, column) in table.columns.iter_mut() {
                if column.name.is_empty() {
                    column.name = key.clone();
                }
            }
            for (key, index) in table.indexes.iter_mut() {
                if index.name.is_empty() {
                    index.name = key.clone();
                }
            }
            for (key, constraint) in table.constraints.iter_mut() {
                if constraint.name().is_empty() {
                    constraint.set_name(key.clone());
                }
            }
        }
        for (key, enum_type) in self.enums.iter_mut() {
            if enum_type.name.is_empty() {
                enum_type.name = key.clone();
            }
        }
        for (key, extension) in self.extensions.iter_mut() {
            if extension.name.is_empty() {
                extension.name = key.clone();
            }
        }
    }
}

/// A table with its columns, indexes and constraints
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Table {
    pub name: String,
    pub columns: Columns,
    pub indexes: Indexes,
    pub constraints: Constraints,
    pub comment: Option<String>,
}

impl Table {
    /// Create an empty table
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_column(mut self, column: Column) -> Self {
        self.columns.insert(column.name.clone(), column);
        self
    }

    pub fn with_index(mut self, index: Index) -> Self {
        self.indexes.insert(index.name.clone(), index);
        self
    }

    pub fn with_constraint(mut self, constraint: Constraint) -> Self {
        self.constraints.insert(constraint.name().to_string(), constraint);
        self
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    /// Insert a constraint, keyed by its name
    pub fn add_constraint(&mut self, constraint: Constraint) {
        self.constraints.insert(constraint.name().to_string(), constraint);
    }

    /// True when a UNIQUE constraint covers exactly `column`
    pub fn has_unique_constraint_on(&self, column: &str) -> bool {
        self.constraints.values().any(|c| match c {
            Constraint::Unique(u) => u.column_names.len() == 1 && u.column_names[0] == column,
            _ => false,
        })
    }
}

/// A table column
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Column {
    pub name: String,

    /// Type as written in the source dialect (e.g. `varchar(255)`)
    #[serde(rename = "type")]
    pub column_type: String,

    pub not_null: bool,

    /// Primary columns are implicitly not null
    pub primary: bool,

    pub unique: bool,

    pub default: Option<DefaultValue>,

    pub check: Option<String>,

    pub comment: Option<String>,
}

impl Column {
    /// Create a nullable, unconstrained column
    pub fn new(name: impl Into<String>, column_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            column_type: column_type.into(),
            ..Self::default()
        }
    }

    /// Mark as primary key (implies not null)
    pub fn primary_key(mut self) -> Self {
        self.primary = true;
        self.not_null = true;
        self
    }

    pub fn not_null(mut self) -> Self {
        self.not_null = true;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn with_default(mut self, value: impl Into<DefaultValue>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn with_check(mut self, check: impl Into<String>) -> Self {
        self.check = Some(check.into());
        self
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }
}

/// A column default: a string, number or boolean literal
///
/// Non-literal expressions such as `now()` are stored as strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DefaultValue {
    Boolean(bool),
    Number(serde_json::Number),
    String(String),
}

impl std::fmt::Display for DefaultValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Boolean(b) => write!(f, "{}", b),
            Self::Number(n) => write!(f, "{}", n),
            Self::String(s) => write!(f, "{}", s),
        }
    }
}

impl From<&str> for DefaultValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for DefaultValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<bool> for DefaultValue {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<i64> for DefaultValue {
    fn from(value: i64) -> Self {
        Self::Number(value.into())
    }
}

/// An index over one or more columns
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Index {
    pub name: String,
    pub columns: Vec<String>,
    pub unique: bool,

    /// Access method (btree, gin, ...); empty for the dialect default
    #[serde(rename = "type", deserialize_with = "string_or_null")]
    pub index_type: String,
}

impl Index {
    pub fn new(name: impl Into<String>, columns: Vec<String>) -> Self {
        Self {
            name: name.into(),
            columns,
            ..Self::default()
        }
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn with_type(mut self, index_type: impl Into<String>) -> Self {
        self.index_type = index_type.into();
        self
    }
}

fn string_or_null<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// Referential action for ON UPDATE / ON DELETE
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ForeignKeyAction {
    #[default]
    NoAction,
    Cascade,
    Restrict,
    SetNull,
    SetDefault,
}

impl ForeignKeyAction {
    /// Parse any common spelling (`SET NULL`, `set_null`, `setNull`, ...).
    /// Unknown spellings fall back to `NoAction`.
    pub fn parse(text: &str) -> Self {
        let normalized: String = text
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_lowercase();

        match normalized.as_str() {
            "cascade" => Self::Cascade,
            "restrict" => Self::Restrict,
            "setnull" => Self::SetNull,
            "setdefault" => Self::SetDefault,
            _ => Self::NoAction,
        }
    }

    /// Stable identifier used in the canonical JSON form
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoAction => "NO_ACTION",
            Self::Cascade => "CASCADE",
            Self::Restrict => "RESTRICT",
            Self::SetNull => "SET_NULL",
            Self::SetDefault => "SET_DEFAULT",
        }
    }

    /// SQL spelling, as written after `ON UPDATE` / `ON DELETE`
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::NoAction => "NO ACTION",
            Self::Cascade => "CASCADE",
            Self::Restrict => "RESTRICT",
            Self::SetNull => "SET NULL",
            Self::SetDefault => "SET DEFAULT",
        }
    }
}

impl std::fmt::Display for ForeignKeyAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Table constraint, discriminated by `type`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Constraint {
    #[serde(rename = "PRIMARY KEY")]
    PrimaryKey(PrimaryKeyConstraint),

    #[serde(rename = "FOREIGN KEY")]
    ForeignKey(ForeignKeyConstraint),

    #[serde(rename = "UNIQUE")]
    Unique(UniqueConstraint),

    #[serde(rename = "CHECK")]
    Check(CheckConstraint),

    /// Parent/child storage interleaving (hierarchical-storage dialects)
    #[serde(rename = "INTERLEAVE")]
    Interleave(InterleaveConstraint),
}

impl Constraint {
    pub fn name(&self) -> &str {
        match self {
            Self::PrimaryKey(c) => &c.name,
            Self::ForeignKey(c) => &c.name,
            Self::Unique(c) => &c.name,
            Self::Check(c) => &c.name,
            Self::Interleave(c) => &c.name,
        }
    }

    pub fn set_name(&mut self, name: String) {
        match self {
            Self::PrimaryKey(c) => c.name = name,
            Self::ForeignKey(c) => c.name = name,
            Self::Unique(c) => c.name = name,
            Self::Check(c) => c.name = name,
            Self::Interleave(c) => c.name = name,
        }
    }

    /// The `type` discriminant as it appears in JSON and DDL
    pub fn kind(&self) -> &'static str {
        match self {
            Self::PrimaryKey(_) => "PRIMARY KEY",
            Self::ForeignKey(_) => "FOREIGN KEY",
            Self::Unique(_) => "UNIQUE",
            Self::Check(_) => "CHECK",
            Self::Interleave(_) => "INTERLEAVE",
        }
    }

    pub fn primary_key(name: impl Into<String>, column_names: Vec<String>) -> Self {
        Self::PrimaryKey(PrimaryKeyConstraint {
            name: name.into(),
            column_names,
        })
    }

    pub fn unique(name: impl Into<String>, column_names: Vec<String>) -> Self {
        Self::Unique(UniqueConstraint {
            name: name.into(),
            column_names,
        })
    }

    pub fn check(name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::Check(CheckConstraint {
            name: name.into(),
            detail: detail.into(),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PrimaryKeyConstraint {
    pub name: String,
    pub column_names: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ForeignKeyConstraint {
    pub name: String,
    pub column_names: Vec<String>,
    pub target_table_name: String,
    pub target_column_names: Vec<String>,
    pub update_constraint: ForeignKeyAction,
    pub delete_constraint: ForeignKeyAction,
}

impl ForeignKeyConstraint {
    pub fn new(
        name: impl Into<String>,
        column_names: Vec<String>,
        target_table_name: impl Into<String>,
        target_column_names: Vec<String>,
    ) -> Self {
        Self {
            name: name.into(),
            column_names,
            target_table_name: target_table_name.into(),
            target_column_names,
            ..Self::default()
        }
    }

    pub fn on_update(mut self, action: ForeignKeyAction) -> Self {
        self.update_constraint = action;
        self
    }

    pub fn on_delete(mut self, action: ForeignKeyAction) -> Self {
        self.delete_constraint = action;
        self
    }
}

impl From<ForeignKeyConstraint> for Constraint {
    fn from(value: ForeignKeyConstraint) -> Self {
        Self::ForeignKey(value)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct UniqueConstraint {
    pub name: String,
    pub column_names: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckConstraint {
    pub name: String,

    /// Boolean expression; never empty in a well-formed schema
    pub detail: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct InterleaveConstraint {
    pub name: String,
    pub column_name: String,
    pub target_table_name: String,
    pub target_column_name: String,
    pub update_constraint: ForeignKeyAction,
    pub delete_constraint: ForeignKeyAction,
}

/// An enumerated type
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Enum {
    pub name: String,
    pub values: Vec<String>,
    pub comment: Option<String>,
}

impl Enum {
    pub fn new(name: impl Into<String>, values: Vec<String>) -> Self {
        Self {
            name: name.into(),
            values,
            comment: None,
        }
    }
}

/// A database extension (e.g. `uuid-ossp`)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Extension {
    pub name: String,
}

impl Extension {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// Relationship multiplicity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Cardinality {
    OneToOne,
    OneToMany,
}

/// Logical link between two tables, derived from a foreign key.
///
/// Never stored in a [`Schema`]; recomputed from its constraints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Relationship {
    pub name: String,
    pub primary_table_name: String,
    pub primary_column_name: String,
    pub foreign_table_name: String,
    pub foreign_column_name: String,
    pub cardinality: Cardinality,
    pub update_constraint: ForeignKeyAction,
    pub delete_constraint: ForeignKeyAction,
}
