//! schemaloom core
//!
//! Canonical schema model shared by every parser, the diff engine, the patch
//! applier and the deparsers, plus the error and configuration types.
//! Never rename error codes - they are part of the public API.

pub mod config;
pub mod diagnostic;
pub mod schema;

pub use config::{CollisionPolicy, Config, ConfigError, DialectConfig, FormatTag, RelationshipConfig};
pub use diagnostic::{ErrorCode, Location, ProcessError, ProcessResult, Severity};
pub use schema::{
    Cardinality, CheckConstraint, Column, Columns, Constraint, Constraints, DefaultValue, Enum,
    Enums, Extension, Extensions, ForeignKeyAction, ForeignKeyConstraint, Index, Indexes,
    InterleaveConstraint, PrimaryKeyConstraint, Relationship, Schema, Table, Tables,
    UniqueConstraint,
};
