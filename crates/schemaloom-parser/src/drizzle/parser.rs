//! Recursive-descent parser for Drizzle schema files.
//!
//! Only `const` declarations are kept. Imports, type declarations and any
//! other top-level statement are skipped; a declaration whose initializer
//! does not parse is skipped too and reported.

use super::ast::{Declaration, Expr};
use super::lexer::{Spanned, Token};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ParseError {
    #[error("Expected {expected}, found {found:?}")]
    Expected {
        expected: &'static str,
        found: Token,
        line: usize,
    },
}

impl ParseError {
    pub fn line(&self) -> usize {
        match self {
            Self::Expected { line, .. } => *line,
        }
    }
}

/// Parsed file: the declarations that parsed and the errors of those that did not
#[derive(Debug, Default)]
pub struct Program {
    pub declarations: Vec<Declaration>,
    pub errors: Vec<ParseError>,
}

/// Parse a token stream produced by [`super::lexer::Lexer::tokenize`]
pub fn parse_program(tokens: Vec<Spanned>) -> Program {
    Parser::new(tokens).parse()
}

const STATEMENT_KEYWORDS: &[&str] = &[
    "export", "import", "const", "let", "var", "type", "interface", "function", "enum",
];

struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
}

impl Parser {
    fn new(tokens: Vec<Spanned>) -> Self {
        Self { tokens, pos: 0 }
    }

    fn current(&self) -> &Token {
        self.tokens.get(self.pos).map(|s| &s.token).unwrap_or(&Token::Eof)
    }

    fn nth(&self, offset: usize) -> &Token {
        self.tokens
            .get(self.pos + offset)
            .map(|s| &s.token)
            .unwrap_or(&Token::Eof)
    }

    fn line(&self) -> usize {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map(|s| s.line)
            .unwrap_or(1)
    }

    fn advance(&mut self) {
        if self.pos < self.tokens.len() {
            self.pos += 1;
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

    fn error(&self, expected: &'static str) -> ParseError {
        ParseError::Expected {
            expected,
            found: self.current().clone(),
            line: self.line(),
        }
    }

    fn parse(mut self) -> Program {
        let mut program = Program::default();

        while *self.current() != Token::Eof {
            match self.current() {
                Token::Semicolon => self.advance(),
                Token::Ident(kw) if kw == "export" => {
                    self.advance();
                    if self.at_variable_keyword() {
                        self.declaration(&mut program);
                    } else {
                        self.skip_statement();
                    }
                }
                Token::Ident(_) if self.at_variable_keyword() => self.declaration(&mut program),
                _ => self.skip_statement(),
            }
        }

        program
    }

    fn at_variable_keyword(&self) -> bool {
        matches!(self.current(), Token::Ident(kw) if kw == "const" || kw == "let" || kw == "var")
    }

    fn declaration(&mut self, program: &mut Program) {
        let start = self.pos;
        match self.parse_declaration() {
            Ok(Some(declaration)) => program.declarations.push(declaration),
            Ok(None) => {}
            Err(error) => {
                tracing::debug!(line = error.line(), "skipping unparseable declaration");
                program.errors.push(error);
                if self.pos == start {
                    self.advance();
                }
                self.skip_statement();
            }
        }
    }

    fn parse_declaration(&mut self) -> Result<Option<Declaration>, ParseError> {
        let line = self.line();
        self.advance(); // const / let / var

        let name = match self.current() {
            Token::Ident(name) => name.clone(),
            // destructuring patterns declare nothing the converter reads
            _ => {
                self.skip_statement();
                return Ok(None);
            }
        };
        self.advance();

        if *self.current() == Token::Colon {
            self.advance();
            self.skip_type();
        }
        self.expect(Token::Eq, "'='")?;
        let init = self.parse_expr()?;
        if *self.current() == Token::Semicolon {
            self.advance();
        }

        Ok(Some(Declaration { name, init, line }))
    }

    /// Skip to the end of the current statement: a top-level `;`, or a
    /// statement keyword starting a new line
    fn skip_statement(&mut self) {
        let mut depth = 0usize;
        let mut previous_line = self.line();
        let mut consumed = false;

        loop {
            let line = self.line();
            match self.current() {
                Token::Eof => return,
                Token::Semicolon if depth == 0 => {
                    self.advance();
                    return;
                }
                Token::Ident(kw)
                    if depth == 0
                        && consumed
                        && line > previous_line
                        && STATEMENT_KEYWORDS.contains(&kw.as_str()) =>
                {
                    return
                }
                Token::LParen | Token::LBrace | Token::LBracket => depth += 1,
                Token::RParen | Token::RBrace | Token::RBracket => depth = depth.saturating_sub(1),
                _ => {}
            }
            previous_line = line;
            consumed = true;
            self.advance();
        }
    }

    /// Skip a type annotation, stopping before the token that ends it
    fn skip_type(&mut self) {
        let start_line = self.line();
        let mut depth = 0usize;
        loop {
            match self.current() {
                Token::Eof => return,
                Token::Ident(kw)
                    if depth == 0
                        && self.line() > start_line
                        && STATEMENT_KEYWORDS.contains(&kw.as_str()) =>
                {
                    return
                }
                Token::LParen | Token::LBrace | Token::LBracket | Token::Lt => depth += 1,
                Token::RParen | Token::RBrace | Token::RBracket | Token::Gt if depth > 0 => {
                    depth -= 1
                }
                Token::Eq | Token::Comma | Token::Semicolon if depth == 0 => return,
                Token::RParen | Token::RBrace | Token::RBracket => return,
                _ => {}
            }
            self.advance();
        }
    }

    /// Skip a balanced group starting at the current opening token
    fn skip_group(&mut self) {
        let mut depth = 0usize;
        loop {
            match self.current() {
                Token::Eof => return,
                Token::LParen | Token::LBrace | Token::LBracket => depth += 1,
                Token::RParen | Token::RBrace | Token::RBracket => {
                    depth = depth.saturating_sub(1);
                    if depth == 0 {
                        self.advance();
                        return;
                    }
                }
                _ => {}
            }
            self.advance();
        }
    }

    fn parse_expr(&mut self) -> Result<Expr, ParseError> {
        if let Token::Ident(param) = self.current() {
            if *self.nth(1) == Token::Arrow {
                let params = vec![param.clone()];
                self.advance();
                self.advance();
                return self.arrow_body(params);
            }
            if param == "async" && matches!(self.nth(1), Token::LParen | Token::Ident(_)) {
                self.advance();
                return self.parse_expr();
            }
        }
        if *self.current() == Token::LParen {
            if let Some(params) = self.arrow_params() {
                return self.arrow_body(params);
            }
        }

        let expr = self.parse_unary()?;
        self.parse_binary(expr)
    }

    /// Parameters of `(a, b) => ...` if the parenthesis opens an arrow function
    fn arrow_params(&mut self) -> Option<Vec<String>> {
        let mut depth = 0usize;
        let mut offset = 0;
        let mut params = Vec::new();

        loop {
            match self.nth(offset) {
                Token::Eof => return None,
                Token::LParen | Token::LBrace | Token::LBracket => depth += 1,
                Token::RParen | Token::RBrace | Token::RBracket => {
                    depth -= 1;
                    if depth == 0 {
                        break;
                    }
                }
                Token::Ident(name) if depth == 1 && matches!(self.nth(offset + 1), Token::Comma | Token::RParen | Token::Colon | Token::Eq) => {
                    params.push(name.clone());
                }
                _ => {}
            }
            offset += 1;
        }

        if *self.nth(offset + 1) != Token::Arrow {
            return None;
        }
        self.pos += offset + 2;
        Some(params)
    }

    fn arrow_body(&mut self, params: Vec<String>) -> Result<Expr, ParseError> {
        let body = if *self.current() == Token::LBrace {
            self.block_return()?
        } else {
            self.parse_expr()?
        };
        Ok(Expr::Arrow {
            params,
            body: Box::new(body),
        })
    }

    /// Value of the first top-level `return` in a block body
    fn block_return(&mut self) -> Result<Expr, ParseError> {
        let start = self.pos;
        self.advance(); // {
        let mut depth = 1usize;

        while depth > 0 {
            match self.current() {
                Token::Eof => break,
                Token::Ident(kw) if kw == "return" && depth == 1 => {
                    self.advance();
                    let value = self.parse_expr()?;
                    self.pos = start;
                    self.skip_group();
                    return Ok(value);
                }
                Token::LParen | Token::LBrace | Token::LBracket => depth += 1,
                Token::RParen | Token::RBrace | Token::RBracket => depth -= 1,
                _ => {}
            }
            self.advance();
        }

        Ok(Expr::Opaque)
    }

    /// Operators are parsed for their extent only
    fn parse_binary(&mut self, left: Expr) -> Result<Expr, ParseError> {
        let mut result = left;
        loop {
            match self.current() {
                Token::Punct('?') => {
                    self.advance();
                    self.parse_expr()?;
                    self.expect(Token::Colon, "':'")?;
                    self.parse_expr()?;
                    result = Expr::Opaque;
                }
                Token::Punct(_) | Token::Lt | Token::Gt | Token::Minus => {
                    while matches!(
                        self.current(),
                        Token::Punct(_) | Token::Lt | Token::Gt | Token::Minus | Token::Eq
                    ) {
                        self.advance();
                    }
                    self.parse_unary()?;
                    result = Expr::Opaque;
                }
                _ => return Ok(result),
            }
        }
    }

    fn parse_unary(&mut self) -> Result<Expr, ParseError> {
        match self.current() {
            Token::Minus => {
                self.advance();
                match self.parse_unary()? {
                    Expr::Num(n) => Ok(Expr::Num(format!("-{}", n))),
                    _ => Ok(Expr::Opaque),
                }
            }
            Token::Punct('!') | Token::Punct('+') | Token::Punct('~') => {
                self.advance();
                self.parse_unary()?;
                Ok(Expr::Opaque)
            }
            Token::Ident(kw) if kw == "typeof" || kw == "await" || kw == "void" => {
                self.advance();
                self.parse_unary()?;
                Ok(Expr::Opaque)
            }
            _ => {
                let primary = self.parse_primary()?;
                self.parse_postfix(primary)
            }
        }
    }

    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        let expr = match self.current().clone() {
            Token::Ident(name) => {
                self.advance();
                match name.as_str() {
                    "true" => Expr::Bool(true),
                    "false" => Expr::Bool(false),
                    "null" | "undefined" => Expr::Null,
                    "new" => self.parse_new()?,
                    _ => match self.current().clone() {
                        Token::Template(raw) => {
                            self.advance();
                            Expr::TaggedTemplate { tag: name, raw }
                        }
                        _ => Expr::Ident(name),
                    },
                }
            }
            Token::Str(s) => {
                self.advance();
                Expr::Str(s)
            }
            Token::Num(n) => {
                self.advance();
                Expr::Num(n)
            }
            Token::Template(raw) => {
                self.advance();
                Expr::Template(raw)
            }
            Token::LParen => {
                self.advance();
                let inner = self.parse_expr()?;
                self.expect(Token::RParen, "')'")?;
                inner
            }
            Token::LBracket => self.parse_array()?,
            Token::LBrace => self.parse_object()?,
            _ => return Err(self.error("expression")),
        };
        Ok(expr)
    }

    fn parse_new(&mut self) -> Result<Expr, ParseError> {
        let Token::Ident(mut callee) = self.current().clone() else {
            return Err(self.error("constructor name"));
        };
        self.advance();
        while *self.current() == Token::Dot {
            self.advance();
            if let Token::Ident(part) = self.current().clone() {
                callee = format!("{}.{}", callee, part);
                self.advance();
            }
        }
        if *self.current() == Token::LParen {
            self.skip_group();
        }
        Ok(Expr::New { callee })
    }

    fn parse_array(&mut self) -> Result<Expr, ParseError> {
        self.advance(); // [
        let mut elements = Vec::new();

        while *self.current() != Token::RBracket {
            if *self.current() == Token::Spread {
                self.advance();
                self.parse_expr()?;
                elements.push(Expr::Opaque);
            } else {
                elements.push(self.parse_expr()?);
            }
            if *self.current() == Token::Comma {
                self.advance();
            } else {
                break;
            }
        }

        self.expect(Token::RBracket, "']'")?;
        Ok(Expr::Array(elements))
    }

    fn parse_object(&mut self) -> Result<Expr, ParseError> {
        self.advance(); // {
        let mut props = Vec::new();

        while *self.current() != Token::RBrace {
            let key = match self.current().clone() {
                Token::Ident(key) | Token::Str(key) | Token::Num(key) => {
                    self.advance();
                    Some(key)
                }
                Token::Spread => {
                    self.advance();
                    self.parse_expr()?;
                    None
                }
                Token::LBracket => {
                    // computed key
                    self.skip_group();
                    self.expect(Token::Colon, "':'")?;
                    self.parse_expr()?;
                    None
                }
                _ => return Err(self.error("property name")),
            };

            if let Some(key) = key {
                let value = match self.current() {
                    Token::Colon => {
                        self.advance();
                        self.parse_expr()?
                    }
                    Token::LParen => {
                        // method shorthand
                        self.skip_group();
                        if *self.current() == Token::LBrace {
                            self.skip_group();
                        }
                        Expr::Opaque
                    }
                    _ => Expr::Ident(key.clone()),
                };
                props.push((key, value));
            }

            if *self.current() == Token::Comma {
                self.advance();
            } else {
                break;
            }
        }

        self.expect(Token::RBrace, "'}'")?;
        Ok(Expr::Object(props))
    }

    fn parse_postfix(&mut self, mut expr: Expr) -> Result<Expr, ParseError> {
        loop {
            match self.current() {
                Token::Dot => {
                    self.advance();
                    let Token::Ident(property) = self.current().clone() else {
                        return Err(self.error("property name"));
                    };
                    self.advance();
                    expr = Expr::Member {
                        object: Box::new(expr),
                        property,
                    };
                }
                Token::Punct('?') if *self.nth(1) == Token::Dot => {
                    self.advance();
                }
                Token::Punct('!') if !matches!(self.nth(1), Token::Eq | Token::Punct('=')) => {
                    self.advance();
                }
                Token::LParen => {
                    let args = self.parse_args()?;
                    expr = Expr::Call {
                        callee: Box::new(expr),
                        args,
                    };
                }
                Token::Lt if self.generic_args_before_call() => {
                    self.skip_type_arguments();
                }
                Token::Ident(kw) if kw == "as" || kw == "satisfies" => {
                    self.advance();
                    self.skip_type();
                }
                _ => return Ok(expr),
            }
        }
    }

    fn parse_args(&mut self) -> Result<Vec<Expr>, ParseError> {
        self.advance(); // (
        let mut args = Vec::new();

        while *self.current() != Token::RParen {
            if *self.current() == Token::Spread {
                self.advance();
            }
            args.push(self.parse_expr()?);
            if *self.current() == Token::Comma {
                self.advance();
            } else {
                break;
            }
        }

        self.expect(Token::RParen, "')'")?;
        Ok(args)
    }

    /// `<...>` followed by `(`, as in `.$type<Role>()`
    fn generic_args_before_call(&self) -> bool {
        let mut depth = 0usize;
        let mut offset = 0;
        loop {
            match self.nth(offset) {
                Token::Lt => depth += 1,
                Token::Gt => {
                    depth -= 1;
                    if depth == 0 {
                        return *self.nth(offset + 1) == Token::LParen;
                    }
                }
                Token::Eof | Token::Semicolon => return false,
                _ => {}
            }
            offset += 1;
        }
    }

    fn skip_type_arguments(&mut self) {
        let mut depth = 0usize;
        loop {
            match self.current() {
                Token::Lt => depth += 1,
                Token::Gt => {
                    depth -= 1;
                    if depth == 0 {
                        self.advance();
                        return;
                    }
                }
                Token::Eof => return,
                _ => {}
            }
            self.advance();
        }
    }
}
