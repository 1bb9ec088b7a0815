//! schemaloom engine - operations over the canonical schema
//!
//! This crate implements everything downstream of parsing:
//! - Relationship derivation from foreign keys
//! - Structural diff between two schema snapshots
//! - Relaxed JSON Patch application
//! - DDL generation for PostgreSQL and MySQL, for whole schemas and for
//!   single patch operations

pub mod deparser;
pub mod diff;
pub mod patch;
pub mod relationships;

pub use deparser::{
    deparse, deparse_operation, CommentStyle, DeparseError, Deparser, DeparserStrategy,
};
pub use diff::{diff, Change, ChangeStatus, ColumnAttribute, DiffItem, IndexAttribute};
pub use patch::{apply_operation, apply_patch, Operation, PatchError};
pub use relationships::{derive_relationships, derive_relationships_with, Relationships};
