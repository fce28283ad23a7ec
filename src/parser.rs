//! Recursive-descent parser producing the AST.
//!
//! The parser performs no semantic analysis: it checks syntax, builds the
//! tree, and records every function (with its arity), parameter, and
//! assigned variable in the symbol table for later inspection. Scoping and
//! name resolution happen entirely at lowering time.

use std::error::Error;
use std::fmt;

use crate::ast::{AstNode, BinaryOp};
use crate::lexer::{Token, TokenKind};
use crate::symtab::SymbolTable;

/// Error produced when the token stream does not match the grammar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    /// Human-readable description.
    pub message: String,
    /// 1-based source line.
    pub line: usize,
    /// 1-based source column.
    pub column: usize,
}

impl ParseError {
    fn new(message: impl Into<String>, token: &Token) -> Self {
        Self {
            message: message.into(),
            line: token.line,
            column: token.column,
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "parse error at line {}, column {}: {}",
            self.line, self.column, self.message
        )
    }
}

impl Error for ParseError {}

/// Parser over a token stream.
pub struct Parser {
    tokens: Vec<Token>,
    current: usize,
    symbols: SymbolTable,
}

impl Parser {
    /// Create a parser for a token stream.
    pub fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            current: 0,
            symbols: SymbolTable::new(),
        }
    }

    /// The symbol table populated while parsing.
    pub fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }

    /// Parse a whole program: one or more function definitions and global
    /// declarations, folded into a right-leaning `Sequence` chain.
    pub fn parse_program(&mut self) -> Result<AstNode, ParseError> {
        let mut items = Vec::new();
        while !self.check_eof() {
            items.push(self.top_level_item()?);
        }

        fold_sequence(items)
            .ok_or_else(|| ParseError::new("expected a declaration", self.peek()))
    }

    fn top_level_item(&mut self) -> Result<AstNode, ParseError> {
        self.expect(&TokenKind::Int, "expected 'int' at top level")?;
        let name = self.expect_identifier("expected a name after 'int'")?;

        if self.matches(&TokenKind::LeftParen) {
            self.function_definition(name)
        } else {
            self.global_declaration(name)
        }
    }

    fn global_declaration(&mut self, name: String) -> Result<AstNode, ParseError> {
        let init = if self.matches(&TokenKind::Equal) {
            Some(Box::new(self.expression()?))
        } else {
            None
        };
        self.expect(&TokenKind::Semicolon, "expected ';' after global declaration")?;

        self.symbols.add_variable(&name);
        Ok(AstNode::GlobalVar { name, init })
    }

    fn function_definition(&mut self, name: String) -> Result<AstNode, ParseError> {
        let mut params = Vec::new();
        if !self.check(&TokenKind::RightParen) {
            loop {
                self.expect(&TokenKind::Int, "expected 'int' before parameter name")?;
                let param = self.expect_identifier("expected a parameter name")?;
                self.symbols.add_parameter(&param);
                params.push(param);
                if !self.matches(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(&TokenKind::RightParen, "expected ')' after parameters")?;

        self.symbols.add_function(&name, params.len());
        let body = self.block()?;
        Ok(AstNode::FunctionDef {
            name,
            params,
            body: Box::new(body),
        })
    }

    fn block(&mut self) -> Result<AstNode, ParseError> {
        self.expect(&TokenKind::LeftBrace, "expected '{'")?;
        let mut statements = Vec::new();
        while !self.check(&TokenKind::RightBrace) && !self.check_eof() {
            statements.push(self.statement()?);
        }
        self.expect(&TokenKind::RightBrace, "expected '}'")?;

        fold_sequence(statements)
            .ok_or_else(|| ParseError::new("expected a statement", self.previous()))
    }

    fn statement(&mut self) -> Result<AstNode, ParseError> {
        if self.matches(&TokenKind::Return) {
            return self.return_statement();
        }
        if self.matches(&TokenKind::While) {
            return self.while_statement();
        }
        if self.matches(&TokenKind::For) {
            return self.for_statement();
        }
        if self.matches(&TokenKind::If) {
            return self.if_statement();
        }
        if self.matches(&TokenKind::Print) {
            return self.print_statement();
        }
        if self.looks_like_assignment() {
            let assignment = self.assignment()?;
            self.expect(&TokenKind::Semicolon, "expected ';' after assignment")?;
            return Ok(assignment);
        }

        let expr = self.expression()?;
        self.expect(&TokenKind::Semicolon, "expected ';' after expression")?;
        Ok(expr)
    }

    fn return_statement(&mut self) -> Result<AstNode, ParseError> {
        let value = if self.check(&TokenKind::Semicolon) {
            None
        } else {
            Some(Box::new(self.expression()?))
        };
        self.expect(&TokenKind::Semicolon, "expected ';' after return")?;
        Ok(AstNode::Return(value))
    }

    fn while_statement(&mut self) -> Result<AstNode, ParseError> {
        self.expect(&TokenKind::LeftParen, "expected '(' after 'while'")?;
        let condition = self.expression()?;
        self.expect(&TokenKind::RightParen, "expected ')' after loop condition")?;
        let body = self.body()?;
        Ok(AstNode::While {
            condition: Box::new(condition),
            body: Box::new(body),
        })
    }

    fn for_statement(&mut self) -> Result<AstNode, ParseError> {
        self.expect(&TokenKind::LeftParen, "expected '(' after 'for'")?;
        let init = self.assignment()?;
        self.expect(&TokenKind::Semicolon, "expected ';' after for-init")?;
        let condition = self.expression()?;
        self.expect(&TokenKind::Semicolon, "expected ';' after for-condition")?;
        let increment = self.assignment()?;
        self.expect(&TokenKind::RightParen, "expected ')' after for-increment")?;
        let body = self.body()?;
        Ok(AstNode::For {
            init: Box::new(init),
            condition: Box::new(condition),
            increment: Box::new(increment),
            body: Box::new(body),
        })
    }

    fn if_statement(&mut self) -> Result<AstNode, ParseError> {
        self.expect(&TokenKind::LeftParen, "expected '(' after 'if'")?;
        let condition = self.expression()?;
        self.expect(&TokenKind::RightParen, "expected ')' after condition")?;
        let then_branch = self.body()?;
        let else_branch = if self.matches(&TokenKind::Else) {
            Some(Box::new(self.body()?))
        } else {
            None
        };
        Ok(AstNode::If {
            condition: Box::new(condition),
            then_branch: Box::new(then_branch),
            else_branch,
        })
    }

    fn print_statement(&mut self) -> Result<AstNode, ParseError> {
        self.expect(&TokenKind::LeftParen, "expected '(' after 'print'")?;
        let value = self.expression()?;
        self.expect(&TokenKind::RightParen, "expected ')' after print argument")?;
        self.expect(&TokenKind::Semicolon, "expected ';' after print")?;
        Ok(AstNode::Print(Box::new(value)))
    }

    /// A loop or branch body: either a braced block or a single statement.
    fn body(&mut self) -> Result<AstNode, ParseError> {
        if self.check(&TokenKind::LeftBrace) {
            self.block()
        } else {
            self.statement()
        }
    }

    fn assignment(&mut self) -> Result<AstNode, ParseError> {
        let name = self.expect_identifier("expected an assignment target")?;
        self.expect(&TokenKind::Equal, "expected '=' in assignment")?;
        let value = self.expression()?;

        self.symbols.add_variable(&name);
        Ok(AstNode::Assignment {
            name,
            value: Box::new(value),
        })
    }

    fn looks_like_assignment(&self) -> bool {
        matches!(self.peek().kind, TokenKind::Identifier(_))
            && matches!(
                self.tokens.get(self.current + 1).map(|t| &t.kind),
                Some(TokenKind::Equal)
            )
    }

    fn expression(&mut self) -> Result<AstNode, ParseError> {
        self.equality()
    }

    fn equality(&mut self) -> Result<AstNode, ParseError> {
        let mut expr = self.relational()?;
        loop {
            let op = if self.matches(&TokenKind::EqualEqual) {
                BinaryOp::Eq
            } else if self.matches(&TokenKind::BangEqual) {
                BinaryOp::Ne
            } else {
                break;
            };
            let right = self.relational()?;
            expr = binary(op, expr, right);
        }
        Ok(expr)
    }

    fn relational(&mut self) -> Result<AstNode, ParseError> {
        let mut expr = self.additive()?;
        loop {
            let op = if self.matches(&TokenKind::LessEqual) {
                BinaryOp::Le
            } else if self.matches(&TokenKind::GreaterEqual) {
                BinaryOp::Ge
            } else if self.matches(&TokenKind::Less) {
                BinaryOp::Lt
            } else if self.matches(&TokenKind::Greater) {
                BinaryOp::Gt
            } else {
                break;
            };
            let right = self.additive()?;
            expr = binary(op, expr, right);
        }
        Ok(expr)
    }

    fn additive(&mut self) -> Result<AstNode, ParseError> {
        let mut expr = self.multiplicative()?;
        loop {
            let op = if self.matches(&TokenKind::Plus) {
                BinaryOp::Add
            } else if self.matches(&TokenKind::Minus) {
                BinaryOp::Sub
            } else {
                break;
            };
            let right = self.multiplicative()?;
            expr = binary(op, expr, right);
        }
        Ok(expr)
    }

    fn multiplicative(&mut self) -> Result<AstNode, ParseError> {
        let mut expr = self.primary()?;
        loop {
            let op = if self.matches(&TokenKind::Star) {
                BinaryOp::Mul
            } else if self.matches(&TokenKind::Slash) {
                BinaryOp::Div
            } else {
                break;
            };
            let right = self.primary()?;
            expr = binary(op, expr, right);
        }
        Ok(expr)
    }

    fn primary(&mut self) -> Result<AstNode, ParseError> {
        if let TokenKind::Number(value) = &self.peek().kind {
            let value = *value;
            self.advance();
            return Ok(AstNode::Number(value));
        }

        if matches!(self.peek().kind, TokenKind::Identifier(_)) {
            let name = self.expect_identifier("expected an identifier")?;
            if self.matches(&TokenKind::LeftParen) {
                return self.call(name);
            }
            return Ok(AstNode::Variable(name));
        }

        if self.matches(&TokenKind::LeftParen) {
            let expr = self.expression()?;
            self.expect(&TokenKind::RightParen, "expected ')' after expression")?;
            return Ok(expr);
        }

        Err(ParseError::new("expected an expression", self.peek()))
    }

    fn call(&mut self, name: String) -> Result<AstNode, ParseError> {
        let mut args = Vec::new();
        if !self.check(&TokenKind::RightParen) {
            loop {
                args.push(self.expression()?);
                if !self.matches(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(&TokenKind::RightParen, "expected ')' after arguments")?;
        Ok(AstNode::FunctionCall { name, args })
    }

    fn expect(&mut self, kind: &TokenKind, message: &str) -> Result<(), ParseError> {
        if self.check(kind) {
            self.advance();
            Ok(())
        } else {
            Err(ParseError::new(message, self.peek()))
        }
    }

    fn expect_identifier(&mut self, message: &str) -> Result<String, ParseError> {
        match &self.peek().kind {
            TokenKind::Identifier(name) => {
                let name = name.clone();
                self.advance();
                Ok(name)
            }
            _ => Err(ParseError::new(message, self.peek())),
        }
    }

    fn matches(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn check(&self, kind: &TokenKind) -> bool {
        &self.peek().kind == kind
    }

    fn check_eof(&self) -> bool {
        matches!(self.peek().kind, TokenKind::Eof)
    }

    fn advance(&mut self) {
        if !self.check_eof() {
            self.current += 1;
        }
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.current]
    }

    fn previous(&self) -> &Token {
        &self.tokens[self.current.saturating_sub(1)]
    }
}

fn binary(op: BinaryOp, left: AstNode, right: AstNode) -> AstNode {
    AstNode::BinaryOp {
        op,
        left: Box::new(left),
        right: Box::new(right),
    }
}

/// Fold a statement list into the right-leaning `Sequence` encoding.
fn fold_sequence(items: Vec<AstNode>) -> Option<AstNode> {
    let mut iter = items.into_iter().rev();
    let last = iter.next()?;
    Some(iter.fold(last, |rest, item| AstNode::Sequence {
        first: Box::new(item),
        second: Box::new(rest),
    }))
}
