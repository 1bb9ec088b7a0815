//! Tokenizer for the TypeScript subset found in Drizzle schema files.

use std::iter::Peekable;
use std::str::Chars;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum LexError {
    #[error("Unterminated string literal starting on line {0}")]
    UnterminatedString(usize),
    #[error("Unterminated template literal starting on line {0}")]
    UnterminatedTemplate(usize),
}

impl LexError {
    pub fn line(&self) -> usize {
        match self {
            Self::UnterminatedString(line) | Self::UnterminatedTemplate(line) => *line,
        }
    }
}

/// Token types.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    // Identifiers and literals
    Ident(String),
    Str(String),
    /// Raw text between backticks, interpolations included verbatim
    Template(String),
    Num(String),

    // Symbols
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Comma,
    Colon,
    Semicolon,
    Dot,
    Spread,
    Arrow,
    Eq,
    Lt,
    Gt,
    Minus,
    /// Any other operator character
    Punct(char),

    // End of input
    Eof,
}

/// A token and the 1-indexed line it starts on
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub token: Token,
    pub line: usize,
}

pub struct Lexer<'a> {
    chars: Peekable<Chars<'a>>,
    current_char: Option<char>,
    line: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        let mut chars = input.chars().peekable();
        let current_char = chars.next();
        Self {
            chars,
            current_char,
            line: 1,
        }
    }

    fn advance(&mut self) {
        if self.current_char == Some('\n') {
            self.line += 1;
        }
        self.current_char = self.chars.next();
    }

    fn peek(&mut self) -> Option<&char> {
        self.chars.peek()
    }

    fn skip_whitespace_and_comments(&mut self) {
        while let Some(c) = self.current_char {
            match c {
                c if c.is_whitespace() => self.advance(),
                '/' if self.peek() == Some(&'/') => {
                    while let Some(c) = self.current_char {
                        if c == '\n' {
                            break;
                        }
                        self.advance();
                    }
                }
                '/' if self.peek() == Some(&'*') => {
                    self.advance();
                    self.advance();
                    while let Some(c) = self.current_char {
                        self.advance();
                        if c == '*' && self.current_char == Some('/') {
                            self.advance();
                            break;
                        }
                    }
                }
                _ => break,
            }
        }
    }

    fn read_identifier(&mut self) -> String {
        let mut ident = String::new();
        while let Some(c) = self.current_char {
            if c.is_alphanumeric() || c == '_' || c == '$' {
                ident.push(c);
                self.advance();
            } else {
                break;
            }
        }
        ident
    }

    fn read_number(&mut self) -> String {
        let mut num = String::new();
        while let Some(c) = self.current_char {
            if c.is_ascii_alphanumeric() || c == '.' || c == '_' {
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
        let start = self.line;
        self.advance(); // skip opening quote
        let mut value = String::new();
        loop {
            match self.current_char {
                None | Some('\n') => return Err(LexError::UnterminatedString(start)),
                Some(c) if c == quote => {
                    self.advance();
                    return Ok(value);
                }
                Some('\\') => {
                    self.advance();
                    let Some(escaped) = self.current_char else {
                        return Err(LexError::UnterminatedString(start));
                    };
                    value.push(match escaped {
                        'n' => '\n',
                        't' => '\t',
                        'r' => '\r',
                        '0' => '\0',
                        other => other,
                    });
                    self.advance();
                }
                Some(c) => {
                    value.push(c);
                    self.advance();
                }
            }
        }
    }

    fn read_template(&mut self) -> Result<String, LexError> {
        let start = self.line;
        self.advance(); // skip opening backtick
        let mut value = String::new();
        loop {
            match self.current_char {
                None => return Err(LexError::UnterminatedTemplate(start)),
                Some('`') => {
                    self.advance();
                    return Ok(value);
                }
                Some('\\') => {
                    self.advance();
                    if let Some(escaped) = self.current_char {
                        value.push(escaped);
                        self.advance();
                    }
                }
                Some(c) => {
                    value.push(c);
                    self.advance();
                }
            }
        }
    }

    fn next_token(&mut self) -> Result<Spanned, LexError> {
        self.skip_whitespace_and_comments();
        let line = self.line;

        let Some(c) = self.current_char else {
            return Ok(Spanned {
                token: Token::Eof,
                line,
            });
        };

        let token = match c {
            '(' => self.single(Token::LParen),
            ')' => self.single(Token::RParen),
            '{' => self.single(Token::LBrace),
            '}' => self.single(Token::RBrace),
            '[' => self.single(Token::LBracket),
            ']' => self.single(Token::RBracket),
            ',' => self.single(Token::Comma),
            ':' => self.single(Token::Colon),
            ';' => self.single(Token::Semicolon),
            '<' => self.single(Token::Lt),
            '>' => self.single(Token::Gt),
            '-' => self.single(Token::Minus),
            '.' => {
                self.advance();
                if self.current_char == Some('.') && self.peek() == Some(&'.') {
                    self.advance();
                    self.advance();
                    Token::Spread
                } else {
                    Token::Dot
                }
            }
            '=' => {
                self.advance();
                match self.current_char {
                    Some('>') => {
                        self.advance();
                        Token::Arrow
                    }
                    Some('=') => {
                        while self.current_char == Some('=') {
                            self.advance();
                        }
                        Token::Punct('=')
                    }
                    _ => Token::Eq,
                }
            }
            '\'' | '"' => Token::Str(self.read_string(c)?),
            '`' => Token::Template(self.read_template()?),
            c if c.is_ascii_digit() => Token::Num(self.read_number()),
            c if c.is_alphabetic() || c == '_' || c == '$' => Token::Ident(self.read_identifier()),
            other => self.single(Token::Punct(other)),
        };

        Ok(Spanned { token, line })
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
