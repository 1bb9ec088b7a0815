//! Source format parsers
//!
//! This crate handles:
//! - PostgreSQL and MySQL DDL, parsed with datafusion-sqlparser-rs
//! - Drizzle ORM schema files for PostgreSQL and MySQL
//! - tbls `schema.json` catalogs
//! - Rails `db/schema.rb` dumps
//! - Canonical schema JSON
//!
//! Every parser returns a best-effort [`Schema`] together with the problems
//! it found; none of them panics on malformed input.

pub mod canonical;
pub mod drizzle;
pub mod schemarb;
pub mod sql;
pub mod tbls;

pub use canonical::parse_canonical;
pub use drizzle::DialectStrategy;
pub use sql::SqlParser;
pub use tbls::{parse_tbls, parse_tbls_with_relationships, Catalog};

use schemaloom_core::{FormatTag, ProcessResult, Schema};

/// Parse `source` as the given format
pub fn parse(source: &str, format: FormatTag) -> ProcessResult<Schema> {
    tracing::debug!(format = %format, bytes = source.len(), "parsing schema source");

    match format {
        FormatTag::Postgres => SqlParser::postgres().parse(source),
        FormatTag::Mysql => SqlParser::mysql().parse(source),
        FormatTag::DrizzlePostgres => drizzle::parse_postgres(source),
        FormatTag::DrizzleMysql => drizzle::parse_mysql(source),
        FormatTag::Tbls => parse_tbls(source),
        FormatTag::SchemaRb => schemarb::parse(source),
        FormatTag::Canonical => parse_canonical(source),
    }
}
