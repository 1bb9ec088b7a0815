//! Tokenizer for the Ruby subset found in Rails `db/schema.rb` dumps.

use std::iter::Peekable;
use std::str::Chars;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum LexError {
    #[error("Unterminated string literal starting on line {line}, column {column}")]
    UnterminatedString { line: usize, column: usize },
}

impl LexError {
    pub fn position(&self) -> (usize, usize) {
        match self {
            Self::UnterminatedString { line, column } => (*line, *column),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// Method names, local variables, constants and keywords
    Ident(String),
    /// `name:` hash key
    Label(String),
    /// `:name` or `:"name"`
    Symbol(String),
    Str(String),
    Num(String),

    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Dot,
    Pipe,
    /// `::`
    Scope,
    /// `=>`
    Rocket,
    /// `->`
    Lambda,
    Minus,
    Newline,
    Punct(char),

    Eof,
}

/// A token, where it starts (1-indexed) and whether whitespace precedes it
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub token: Token,
    pub line: usize,
    pub column: usize,
    pub spaced: bool,
}

pub struct Lexer<'a> {
    chars: Peekable<Chars<'a>>,
    current_char: Option<char>,
    line: usize,
    column: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        let mut chars = input.chars().peekable();
        let current_char = chars.next();
        Self {
            chars,
            current_char,
            line: 1,
            column: 1,
        }
    }

    fn advance(&mut self) {
        if self.current_char == Some('\n') {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        self.current_char = self.chars.next();
    }

    fn peek(&mut self) -> Option<&char> {
        self.chars.peek()
    }

    /// Skip blanks and `#` comments, but not newlines; returns whether
    /// anything was skipped
    fn skip_blanks(&mut self) -> bool {
        let mut skipped = false;
        while let Some(c) = self.current_char {
            match c {
                '\n' => break,
                '\\' if self.peek() == Some(&'\n') => {
                    self.advance();
                    self.advance();
                }
                c if c.is_whitespace() => self.advance(),
                '#' => {
                    while let Some(c) = self.current_char {
                        if c == '\n' {
                            break;
                        }
                        self.advance();
                    }
                }
                _ => break,
            }
            skipped = true;
        }
        skipped
    }

    fn read_identifier(&mut self) -> String {
        let mut ident = String::new();
        while let Some(c) = self.current_char {
            if c.is_alphanumeric() || c == '_' {
                ident.push(c);
                self.advance();
            } else {
                break;
            }
        }
        if let Some(c @ ('?' | '!')) = self.current_char {
            ident.push(c);
            self.advance();
        }
        ident
    }

    fn read_number(&mut self) -> String {
        let mut num = String::new();
        while let Some(c) = self.current_char {
            let decimal_point = c == '.' && self.peek().is_some_and(|n| n.is_ascii_digit());
            if c.is_ascii_digit() || c == '_' || decimal_point {
                if c != '_' {
                    num.push(c);
                }
                self.advance();
            } else {
                break;
            }
        }
        num
    }

    fn read_string(&mut self, quote: char) -> Result<String, LexError> {
        let (line, column) = (self.line, self.column);
        self.advance(); // skip opening quote
        let mut value = String::new();
        loop {
            match self.current_char {
                None => return Err(LexError::UnterminatedString { line, column }),
                Some(c) if c == quote => {
                    self.advance();
                    return Ok(value);
                }
                Some('\\') => {
                    self.advance();
                    let Some(escaped) = self.current_char else {
                        return Err(LexError::UnterminatedString { line, column });
                    };
                    match (quote, escaped) {
                        ('"', 'n') => value.push('\n'),
                        ('"', 't') => value.push('\t'),
                        // single-quoted strings only unescape quotes and backslashes
                        ('\'', c) if c != '\'' && c != '\\' => {
                            value.push('\\');
                            value.push(c);
                        }
                        (_, other) => value.push(other),
                    }
                    self.advance();
                }
                Some(c) => {
                    value.push(c);
                    self.advance();
                }
            }
        }
    }

    fn next_token(&mut self) -> Result<Spanned, LexError> {
        let spaced = self.skip_blanks();
        let (line, column) = (self.line, self.column);

        let Some(c) = self.current_char else {
            return Ok(Spanned {
                token: Token::Eof,
                line,
                column,
                spaced,
            });
        };

        let token = match c {
            '\n' => self.single(Token::Newline),
            ';' => self.single(Token::Newline),
            '(' => self.single(Token::LParen),
            ')' => self.single(Token::RParen),
            '[' => self.single(Token::LBracket),
            ']' => self.single(Token::RBracket),
            '{' => self.single(Token::LBrace),
            '}' => self.single(Token::RBrace),
            ',' => self.single(Token::Comma),
            '.' => self.single(Token::Dot),
            '|' => self.single(Token::Pipe),
            '-' => {
                self.advance();
                if self.current_char == Some('>') {
                    self.advance();
                    Token::Lambda
                } else {
                    Token::Minus
                }
            }
            '=' if self.peek() == Some(&'>') => {
                self.advance();
                self.advance();
                Token::Rocket
            }
            ':' => {
                self.advance();
                match self.current_char {
                    Some(':') => {
                        self.advance();
                        Token::Scope
                    }
                    Some(q @ ('"' | '\'')) => Token::Symbol(self.read_string(q)?),
                    Some(c) if c.is_alphabetic() || c == '_' => Token::Symbol(self.read_identifier()),
                    _ => Token::Punct(':'),
                }
            }
            '\'' | '"' => Token::Str(self.read_string(c)?),
            c if c.is_ascii_digit() => Token::Num(self.read_number()),
            c if c.is_alphabetic() || c == '_' => {
                let ident = self.read_identifier();
                if self.current_char == Some(':') && self.peek() != Some(&':') {
                    self.advance();
                    Token::Label(ident)
                } else {
                    Token::Ident(ident)
                }
            }
            other => self.single(Token::Punct(other)),
        };

        Ok(Spanned {
            token,
            line,
            column,
            spaced,
        })
    }

    fn single(&mut self, token: Token) -> Token {
        self.advance();
        token
    }

    /// Tokenize the whole input; the last token is always `Eof`
    pub fn tokenize(&mut self) -> Result<Vec<Spanned>, LexError> {
        let mut tokens = Vec::new();
        loop {
            let spanned = self.next_token()?;
            let done = spanned.token == Token::Eof;
            tokens.push(spanned);
            if done {
                return Ok(tokens);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn tokens(input: &str) -> Vec<Token> {
        Lexer::new(input)
            .tokenize()
            .unwrap()
            .into_iter()
            .map(|s| s.token)
            .collect()
    }

    #[test]
    fn test_column_line() {
        assert_eq!(
            tokens("t.string \"email\", null: false, default: -> { \"now()\" } # login\n"),
            vec![
                Token::Ident("t".into()),
                Token::Dot,
                Token::Ident("string".into()),
                Token::Str("email".into()),
                Token::Comma,
                Token::Label("null".into()),
                Token::Ident("false".into()),
                Token::Comma,
                Token::Label("default".into()),
                Token::Lambda,
                Token::LBrace,
                Token::Str("now()".into()),
                Token::RBrace,
                Token::Newline,
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_symbols_scopes_and_numbers() {
        assert_eq!(
            tokens("ActiveRecord::Schema[7.1].define(version: 2024_01_31_000000) do |t|"),
            vec![
                Token::Ident("ActiveRecord".into()),
                Token::Scope,
                Token::Ident("Schema".into()),
                Token::LBracket,
                Token::Num("7.1".into()),
                Token::RBracket,
                Token::Dot,
                Token::Ident("define".into()),
                Token::LParen,
                Token::Label("version".into()),
                Token::Num("20240131000000".into()),
                Token::RParen,
                Token::Ident("do".into()),
                Token::Pipe,
                Token::Ident("t".into()),
                Token::Pipe,
                Token::Eof,
            ]
        );
        assert_eq!(
            tokens("on_delete: :cascade, :\"odd name\" => 1"),
            vec![
                Token::Label("on_delete".into()),
                Token::Symbol("cascade".into()),
                Token::Comma,
                Token::Symbol("odd name".into()),
                Token::Rocket,
                Token::Num("1".into()),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_string_escapes() {
        assert_eq!(
            tokens(r#"'it\'s' "tab\there" 'a\d'"#),
            vec![
                Token::Str("it's".into()),
                Token::Str("tab\there".into()),
                Token::Str("a\\d".into()),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_positions_and_spacing() {
        let spanned = Lexer::new("t.index [\"a\"]\n  x[1]").tokenize().unwrap();
        let bracket = &spanned[3];
        assert_eq!(bracket.token, Token::LBracket);
        assert!(bracket.spaced);
        assert_eq!((bracket.line, bracket.column), (1, 9));

        let index = spanned.iter().rfind(|s| s.token == Token::LBracket).unwrap();
        assert!(!index.spaced);
        assert_eq!((index.line, index.column), (2, 4));
    }

    #[test]
    fn test_unterminated_string() {
        let error = Lexer::new("create_table \"users").tokenize().unwrap_err();
        assert_eq!(error.position(), (1, 14));
    }
}
