//! Rails `db/schema.rb` dumps
//!
//! The dump is tokenized and parsed into a list of method calls, then
//! `create_table` blocks and the `add_foreign_key`, `add_check_constraint`
//! and `add_index` statements that follow them are converted in order.
//! Statements that reference a table not yet created are reported and
//! skipped.

mod converter;
mod lexer;
mod parser;

pub use converter::{convert_column_type, singularize};
pub use lexer::LexError;

use converter::SchemaRbConverter;
use lexer::Lexer;
use schemaloom_core::{ErrorCode, Location, ProcessError, ProcessResult, Schema};

/// Parse a `schema.rb` file
pub fn parse(source: &str) -> ProcessResult<Schema> {
    let tokens = match Lexer::new(source).tokenize() {
        Ok(tokens) => tokens,
        Err(e) => {
            let (line, column) = e.position();
            return ProcessResult::failed(
                ProcessError::critical(ErrorCode::UnexpectedToken, e.to_string())
                    .with_location(Location::with_position(line, column)),
            );
        }
    };

    let program = parser::parse_program(tokens);
    let mut converter = SchemaRbConverter::new();
    for error in &program.errors {
        let (line, column) = error.position();
        converter.warn_at(
            line,
            column,
            ErrorCode::UnexpectedToken,
            format!("Skipped unparseable statement: {}", error),
        );
    }

    if let Err(error) = converter.convert(&program.calls) {
        tracing::error!(code = %error.code.as_str(), "{}", error.message);
        return ProcessResult::failed(error);
    }
    converter.finish()
}
