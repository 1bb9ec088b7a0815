//! Recursive-descent parser for `schema.rb`.
//!
//! A schema dump is a tree of method calls: `create_table` with a
//! `do |t| ... end` block of `t.<type>` calls, and top-level
//! `add_foreign_key`-style statements. Each statement becomes a [`Call`];
//! a statement that does not parse is skipped, together with any block it
//! opens, and reported.

use super::lexer::{Spanned, Token};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ParseError {
    #[error("Expected {expected}, found {found:?}")]
    Expected {
        expected: &'static str,
        found: Token,
        line: usize,
        column: usize,
    },
}

impl ParseError {
    pub fn position(&self) -> (usize, usize) {
        match self {
            Self::Expected { line, column, .. } => (*line, *column),
        }
    }
}

/// Argument values
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Str(String),
    Symbol(String),
    Num(String),
    Bool(bool),
    Nil,
    Array(Vec<Value>),
    Hash(Vec<(String, Value)>),
    /// `-> { body }`
    Lambda(Box<Value>),
    /// `Float::INFINITY`, `Time.now` and similar references
    Path(String),
    /// Calls and anything else without a literal value
    Opaque,
}

impl Value {
    /// Text of a string or symbol
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Str(s) | Self::Symbol(s) => Some(s),
            _ => None,
        }
    }
}

/// `receiver.name(args, key: value) do |params| body end`
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub receiver: Option<String>,
    pub name: String,
    pub args: Vec<Value>,
    pub options: Vec<(String, Value)>,
    pub block: Option<Block>,
    pub line: usize,
    pub column: usize,
}

impl Call {
    pub fn option(&self, key: &str) -> Option<&Value> {
        self.options.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Positional string and symbol arguments, in order
    pub fn texts(&self) -> Vec<&str> {
        self.args.iter().filter_map(Value::as_text).collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub params: Vec<String>,
    pub body: Vec<Call>,
}

#[derive(Debug, Default)]
pub struct Program {
    pub calls: Vec<Call>,
    pub errors: Vec<ParseError>,
}

/// Parse a token stream produced by [`super::lexer::Lexer::tokenize`]
pub fn parse_program(tokens: Vec<Spanned>) -> Program {
    let mut parser = Parser::new(tokens);
    let calls = parser.statements(false);
    Program {
        calls,
        errors: parser.errors,
    }
}

struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
    errors: Vec<ParseError>,
}

impl Parser {
    fn new(tokens: Vec<Spanned>) -> Self {
        Self {
            tokens,
            pos: 0,
            errors: Vec::new(),
        }
    }

    fn current(&self) -> &Token {
        self.tokens.get(self.pos).map(|s| &s.token).unwrap_or(&Token::Eof)
    }

    fn spaced(&self) -> bool {
        self.tokens.get(self.pos).is_some_and(|s| s.spaced)
    }

    fn position(&self) -> (usize, usize) {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map(|s| (s.line, s.column))
            .unwrap_or((1, 1))
    }

    fn advance(&mut self) {
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
    }

    fn is_keyword(&self, keyword: &str) -> bool {
        matches!(self.current(), Token::Ident(ident) if ident == keyword)
    }

    fn error(&self, expected: &'static str) -> ParseError {
        let (line, column) = self.position();
        ParseError::Expected {
            expected,
            found: self.current().clone(),
            line,
            column,
        }
    }

    fn expect(&mut self, token: Token, expected: &'static str) -> Result<(), ParseError> {
        if *self.current() == token {
            self.advance();
            Ok(())
        } else {
            Err(self.error(expected))
        }
    }

    fn skip_newlines(&mut self) {
        while *self.current() == Token::Newline {
            self.advance();
        }
    }

    /// Statements up to `end` (inside a block) or the end of input
    fn statements(&mut self, in_block: bool) -> Vec<Call> {
        let mut calls = Vec::new();
        loop {
            self.skip_newlines();
            match self.current() {
                Token::Eof => {
                    if in_block {
                        self.errors.push(self.error("'end'"));
                    }
                    return calls;
                }
                Token::Ident(ident) if ident == "end" => {
                    if in_block {
                        self.advance();
                        return calls;
                    }
                    self.errors.push(self.error("a statement"));
                    self.advance();
                }
                _ => match self.call() {
                    Ok(call) => calls.push(call),
                    Err(error) => {
                        self.errors.push(error);
                        self.skip_statement();
                    }
                },
            }
        }
    }

    /// Skip to the end of the current statement, including a block it opens
    fn skip_statement(&mut self) {
        let mut depth = 0usize;
        loop {
            match self.current() {
                Token::Eof => return,
                Token::Newline if depth == 0 => return,
                Token::Ident(ident) if ident == "do" => depth += 1,
                Token::Ident(ident) if ident == "end" => {
                    if depth == 0 {
                        return;
                    }
                    depth -= 1;
                }
                _ => {}
            }
            self.advance();
        }
    }

    fn call(&mut self) -> Result<Call, ParseError> {
        let (line, column) = self.position();
        let Token::Ident(first) = self.current().clone() else {
            return Err(self.error("a method call"));
        };
        self.advance();

        let mut receiver = None;
        let mut name = first;
        loop {
            match self.current() {
                Token::Dot | Token::Scope => {
                    self.advance();
                    let Token::Ident(next) = self.current().clone() else {
                        return Err(self.error("a method name"));
                    };
                    self.advance();
                    receiver = Some(std::mem::replace(&mut name, next));
                }
                // `Schema[7.1]`
                Token::LBracket if !self.spaced() => {
                    self.advance();
                    self.arguments(Some(Token::RBracket))?;
                }
                _ => break,
            }
        }

        let (args, options) = if *self.current() == Token::LParen && !self.spaced() {
            self.advance();
            self.arguments(Some(Token::RParen))?
        } else if self.starts_argument() {
            self.arguments(None)?
        } else {
            (Vec::new(), Vec::new())
        };

        let block = if self.is_keyword("do") {
            self.advance();
            Some(self.block()?)
        } else {
            None
        };

        if !matches!(self.current(), Token::Newline | Token::Eof) && !self.is_keyword("end") {
            return Err(self.error("end of statement"));
        }

        Ok(Call {
            receiver,
            name,
            args,
            options,
            block,
            line,
            column,
        })
    }

    fn block(&mut self) -> Result<Block, ParseError> {
        let mut params = Vec::new();
        if *self.current() == Token::Pipe {
            self.advance();
            loop {
                match self.current().clone() {
                    Token::Ident(param) => {
                        params.push(param);
                        self.advance();
                    }
                    Token::Comma => self.advance(),
                    Token::Pipe => {
                        self.advance();
                        break;
                    }
                    _ => return Err(self.error("block parameters")),
                }
            }
        }
        let body = self.statements(true);
        Ok(Block { params, body })
    }

    fn starts_argument(&self) -> bool {
        match self.current() {
            Token::Str(_)
            | Token::Symbol(_)
            | Token::Num(_)
            | Token::Label(_)
            | Token::LBracket
            | Token::Minus
            | Token::Lambda => true,
            Token::Ident(ident) => !matches!(ident.as_str(), "do" | "end" | "if" | "unless"),
            _ => false,
        }
    }

    /// Positional arguments and `key: value` options, up to `closing` or,
    /// without one, the end of the line
    fn arguments(
        &mut self,
        closing: Option<Token>,
    ) -> Result<(Vec<Value>, Vec<(String, Value)>), ParseError> {
        let mut args = Vec::new();
        let mut options = Vec::new();

        loop {
            if let Some(closing) = &closing {
                self.skip_newlines();
                if self.current() == closing {
                    self.advance();
                    break;
                }
            }

            match self.current().clone() {
                Token::Label(key) => {
                    self.advance();
                    self.skip_newlines();
                    options.push((key, self.value()?));
                }
                Token::Str(key) | Token::Symbol(key)
                    if self.tokens.get(self.pos + 1).map(|s| &s.token) == Some(&Token::Rocket) =>
                {
                    self.advance();
                    self.advance();
                    self.skip_newlines();
                    options.push((key, self.value()?));
                }
                _ => args.push(self.value()?),
            }

            if closing.is_some() {
                self.skip_newlines();
            }
            if *self.current() == Token::Comma {
                self.advance();
                self.skip_newlines();
                continue;
            }
            if let Some(closing) = closing {
                self.expect(closing, "',' or a closing bracket")?;
            }
            break;
        }

        Ok((args, options))
    }

    fn value(&mut self) -> Result<Value, ParseError> {
        let value = match self.current().clone() {
            Token::Str(s) => {
                self.advance();
                Value::Str(s)
            }
            Token::Symbol(s) => {
                self.advance();
                Value::Symbol(s)
            }
            Token::Num(n) => {
                self.advance();
                Value::Num(n)
            }
            Token::Minus => {
                self.advance();
                let Token::Num(n) = self.current().clone() else {
                    return Err(self.error("a number"));
                };
                self.advance();
                Value::Num(format!("-{}", n))
            }
            Token::Ident(ident) => {
                self.advance();
                match ident.as_str() {
                    "true" => Value::Bool(true),
                    "false" => Value::Bool(false),
                    "nil" => Value::Nil,
                    _ => self.path(ident)?,
                }
            }
            Token::LBracket => {
                self.advance();
                let (items, _) = self.arguments(Some(Token::RBracket))?;
                Value::Array(items)
            }
            Token::LBrace => {
                self.advance();
                let (_, entries) = self.arguments(Some(Token::RBrace))?;
                Value::Hash(entries)
            }
            Token::Lambda => {
                self.advance();
                self.expect(Token::LBrace, "'{'")?;
                self.skip_newlines();
                let body = self.value()?;
                self.skip_newlines();
                self.expect(Token::RBrace, "'}'")?;
                Value::Lambda(Box::new(body))
            }
            Token::LParen => {
                self.advance();
                let inner = self.value()?;
                self.expect(Token::RParen, "')'")?;
                inner
            }
            _ => return Err(self.error("a value")),
        };
        Ok(value)
    }

    /// `A::B.c`, optionally called with arguments
    fn path(&mut self, first: String) -> Result<Value, ParseError> {
        let mut path = first;
        while matches!(self.current(), Token::Dot | Token::Scope) {
            let separator = if *self.current() == Token::Dot { "." } else { "::" };
            self.advance();
            let Token::Ident(next) = self.current().clone() else {
                return Err(self.error("a name"));
            };
            self.advance();
            path = format!("{}{}{}", path, separator, next);
        }
        if *self.current() == Token::LParen && !self.spaced() {
            self.advance();
            self.arguments(Some(Token::RParen))?;
            return Ok(Value::Opaque);
        }
        Ok(Value::Path(path))
    }
}
