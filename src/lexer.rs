//! Tokenizer for the toy language.

use std::error::Error;
use std::fmt;

/// Token kinds of the language.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
    /// `(`
    LeftParen,
    /// `)`
    RightParen,
    /// `{`
    LeftBrace,
    /// `}`
    RightBrace,
    /// `,`
    Comma,
    /// `;`
    Semicolon,
    /// `+`
    Plus,
    /// `-`
    Minus,
    /// `*`
    Star,
    /// `/`
    Slash,
    /// `=`
    Equal,
    /// `==`
    EqualEqual,
    /// `!=`
    BangEqual,
    /// `<`
    Less,
    /// `<=`
    LessEqual,
    /// `>`
    Greater,
    /// `>=`
    GreaterEqual,
    /// Integer literal.
    Number(i32),
    /// Identifier.
    Identifier(String),
    /// `int`
    Int,
    /// `return`
    Return,
    /// `while`
    While,
    /// `for`
    For,
    /// `if`
    If,
    /// `else`
    Else,
    /// `print`
    Print,
    /// End of input.
    Eof,
}

/// A token with its source position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    /// Token kind.
    pub kind: TokenKind,
    /// 1-based source line.
    pub line: usize,
    /// 1-based source column.
    pub column: usize,
}

impl Token {
    fn new(kind: TokenKind, line: usize, column: usize) -> Self {
        Self { kind, line, column }
    }
}

/// Error produced when the scanner meets a character it cannot tokenize.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LexError {
    /// Human-readable description.
    pub message: String,
    /// 1-based source line.
    pub line: usize,
    /// 1-based source column.
    pub column: usize,
}

impl LexError {
    fn new(message: impl Into<String>, line: usize, column: usize) -> Self {
        Self {
            message: message.into(),
            line,
            column,
        }
    }
}

impl fmt::Display for LexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "lex error at line {}, column {}: {}",
            self.line, self.column, self.message
        )
    }
}

impl Error for LexError {}

/// Tokenize source text.
pub fn lex(source: &str) -> Result<Vec<Token>, LexError> {
    Lexer::new(source).lex()
}

struct Lexer {
    chars: Vec<char>,
    current: usize,
    line: usize,
    column: usize,
    token_line: usize,
    token_column: usize,
    tokens: Vec<Token>,
}

impl Lexer {
    fn new(source: &str) -> Self {
        Self {
            chars: source.chars().collect(),
            current: 0,
            line: 1,
            column: 1,
            token_line: 1,
            token_column: 1,
            tokens: Vec::new(),
        }
    }

    fn lex(mut self) -> Result<Vec<Token>, LexError> {
        while !self.is_at_end() {
            self.token_line = self.line;
            self.token_column = self.column;
            self.scan_token()?;
        }

        self.tokens
            .push(Token::new(TokenKind::Eof, self.line, self.column));
        Ok(self.tokens)
    }

    fn scan_token(&mut self) -> Result<(), LexError> {
        let c = self.advance();
        match c {
            '(' => self.add(TokenKind::LeftParen),
            ')' => self.add(TokenKind::RightParen),
            '{' => self.add(TokenKind::LeftBrace),
            '}' => self.add(TokenKind::RightBrace),
            ',' => self.add(TokenKind::Comma),
            ';' => self.add(TokenKind::Semicolon),
            '+' => self.add(TokenKind::Plus),
            '-' => self.add(TokenKind::Minus),
            '*' => self.add(TokenKind::Star),
            '/' => {
                if self.matches('/') {
                    self.skip_line_comment();
                } else if self.matches('*') {
                    self.skip_block_comment()?;
                } else {
                    self.add(TokenKind::Slash);
                }
            }
            '=' => {
                if self.matches('=') {
                    self.add(TokenKind::EqualEqual);
                } else {
                    self.add(TokenKind::Equal);
                }
            }
            '!' => {
                if self.matches('=') {
                    self.add(TokenKind::BangEqual);
                } else {
                    return Err(LexError::new(
                        "expected '=' after '!'",
                        self.token_line,
                        self.token_column,
                    ));
                }
            }
            '<' => {
                if self.matches('=') {
                    self.add(TokenKind::LessEqual);
                } else {
                    self.add(TokenKind::Less);
                }
            }
            '>' => {
                if self.matches('=') {
                    self.add(TokenKind::GreaterEqual);
                } else {
                    self.add(TokenKind::Greater);
                }
            }
            ' ' | '\t' | '\r' | '\n' => {}
            c if c.is_ascii_digit() => self.number(c)?,
            c if c.is_ascii_alphabetic() || c == '_' => self.identifier(c),
            c => {
                return Err(LexError::new(
                    format!("unexpected character '{}'", c),
                    self.token_line,
                    self.token_column,
                ));
            }
        }
        Ok(())
    }

    fn number(&mut self, first: char) -> Result<(), LexError> {
        let mut text = String::new();
        text.push(first);
        while self.peek().is_ascii_digit() {
            text.push(self.advance());
        }

        match text.parse::<i32>() {
            Ok(value) => {
                self.add(TokenKind::Number(value));
                Ok(())
            }
            Err(_) => Err(LexError::new(
                format!("integer literal '{}' does not fit in 32 bits", text),
                self.token_line,
                self.token_column,
            )),
        }
    }

    fn identifier(&mut self, first: char) {
        let mut text = String::new();
        text.push(first);
        while self.peek().is_ascii_alphanumeric() || self.peek() == '_' {
            text.push(self.advance());
        }

        let kind = match text.as_str() {
            "int" => TokenKind::Int,
            "return" => TokenKind::Return,
            "while" => TokenKind::While,
            "for" => TokenKind::For,
            "if" => TokenKind::If,
            "else" => TokenKind::Else,
            "print" => TokenKind::Print,
            _ => TokenKind::Identifier(text),
        };
        self.add(kind);
    }

    fn skip_line_comment(&mut self) {
        while !self.is_at_end() && self.peek() != '\n' {
            self.advance();
        }
    }

    fn skip_block_comment(&mut self) -> Result<(), LexError> {
        while !self.is_at_end() {
            let c = self.advance();
            if c == '*' && self.matches('/') {
                return Ok(());
            }
        }
        Err(LexError::new(
            "unterminated block comment",
            self.token_line,
            self.token_column,
        ))
    }

    fn add(&mut self, kind: TokenKind) {
        self.tokens
            .push(Token::new(kind, self.token_line, self.token_column));
    }

    fn advance(&mut self) -> char {
        let c = self.chars[self.current];
        self.current += 1;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        c
    }

    fn matches(&mut self, expected: char) -> bool {
        if self.peek() == expected {
            self.advance();
            true
        } else {
            false
        }
    }

    fn peek(&self) -> char {
        self.chars.get(self.current).copied().unwrap_or('\0')
    }

    fn is_at_end(&self) -> bool {
        self.current >= self.chars.len()
    }
}
