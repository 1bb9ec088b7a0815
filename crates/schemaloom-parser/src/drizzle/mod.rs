//! Drizzle ORM schema files (`drizzle-orm/pg-core`, `drizzle-orm/mysql-core`)
//!
//! The source is tokenized and parsed into a small expression tree, then
//! `pgTable`/`mysqlTable` declarations are converted table by table. Foreign
//! key targets are first recorded by property name and rewritten to column
//! names once every table has been seen, so a child table may be declared
//! before its parent.

mod ast;
mod converter;
mod dialect;
mod lexer;
mod parser;

pub use converter::{resolve_foreign_key_targets, PropertyColumns};
pub use dialect::DialectStrategy;
pub use lexer::LexError;

use converter::DrizzleConverter;
use lexer::Lexer;
use schemaloom_core::{ErrorCode, Location, ProcessError, ProcessResult, Schema};

/// Parse a Drizzle schema file with the given dialect strategy
pub fn parse(source: &str, strategy: &DialectStrategy) -> ProcessResult<Schema> {
    let tokens = match Lexer::new(source).tokenize() {
        Ok(tokens) => tokens,
        Err(e) => {
            return ProcessResult::failed(
                ProcessError::critical(ErrorCode::UnexpectedToken, e.to_string())
                    .with_location(Location::line(e.line())),
            )
        }
    };

    let program = parser::parse_program(tokens);
    let mut converter = DrizzleConverter::new(strategy);
    for error in &program.errors {
        converter.warn_at(
            error.line(),
            ErrorCode::UnexpectedToken,
            format!("Skipped unparseable declaration: {}", error),
        );
    }

    converter.convert(&program.declarations);
    converter.finish()
}

/// Parse a `drizzle-orm/pg-core` schema file
pub fn parse_postgres(source: &str) -> ProcessResult<Schema> {
    parse(source, &DialectStrategy::postgres())
}

/// Parse a `drizzle-orm/mysql-core` schema file
pub fn parse_mysql(source: &str) -> ProcessResult<Schema> {
    parse(source, &DialectStrategy::mysql())
}
