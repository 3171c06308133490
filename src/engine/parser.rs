// Copyright 2024 OctoFHIR Team
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Pratt parser for FHIRPath expressions

use super::ast::{BinaryOperator, ExpressionNode, LiteralValue, UnaryOperator};
use super::error::{FhirPathError, Result, SourceLocation};
use super::tokenizer::{Spanned, Token, Tokenizer};
use rust_decimal::Decimal;
use std::str::FromStr;

/// Operator precedence levels, lowest first
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Precedence {
    /// implies (right associative)
    Implies = 1,
    /// or, xor
    Or = 2,
    And = 3,
    /// in, contains
    Membership = 4,
    /// =, !=, ~, !~
    Equality = 5,
    /// <, >, <=, >=
    Inequality = 6,
    /// |
    Union = 7,
    /// is, as
    Type = 8,
    /// +, -, &
    Additive = 9,
    /// *, /, div, mod
    Multiplicative = 10,
    Unary = 11,
    /// `.` and `[]`
    Invocation = 12,
}

impl Precedence {
    /// Next higher level, used for left-associative operators
    pub const fn next_level(self) -> Self {
        match self {
            Precedence::Implies => Precedence::Or,
            Precedence::Or => Precedence::And,
            Precedence::And => Precedence::Membership,
            Precedence::Membership => Precedence::Equality,
            Precedence::Equality => Precedence::Inequality,
            Precedence::Inequality => Precedence::Union,
            Precedence::Union => Precedence::Type,
            Precedence::Type => Precedence::Additive,
            Precedence::Additive => Precedence::Multiplicative,
            Precedence::Multiplicative => Precedence::Unary,
            Precedence::Unary | Precedence::Invocation => Precedence::Invocation,
        }
    }
}

fn binary_operator(token: &Token<'_>) -> Option<(BinaryOperator, Precedence)> {
    let pair = match token {
        Token::Multiply => (BinaryOperator::Multiply, Precedence::Multiplicative),
        Token::Divide => (BinaryOperator::Divide, Precedence::Multiplicative),
        Token::Div => (BinaryOperator::IntegerDivide, Precedence::Multiplicative),
        Token::Mod => (BinaryOperator::Modulo, Precedence::Multiplicative),
        Token::Plus => (BinaryOperator::Add, Precedence::Additive),
        Token::Minus => (BinaryOperator::Subtract, Precedence::Additive),
        Token::Ampersand => (BinaryOperator::Concatenate, Precedence::Additive),
        Token::Union => (BinaryOperator::Union, Precedence::Union),
        Token::LessThan => (BinaryOperator::LessThan, Precedence::Inequality),
        Token::LessThanOrEqual => (BinaryOperator::LessThanOrEqual, Precedence::Inequality),
        Token::GreaterThan => (BinaryOperator::GreaterThan, Precedence::Inequality),
        Token::GreaterThanOrEqual => (BinaryOperator::GreaterThanOrEqual, Precedence::Inequality),
        Token::Equal => (BinaryOperator::Equal, Precedence::Equality),
        Token::NotEqual => (BinaryOperator::NotEqual, Precedence::Equality),
        Token::Equivalent => (BinaryOperator::Equivalent, Precedence::Equality),
        Token::NotEquivalent => (BinaryOperator::NotEquivalent, Precedence::Equality),
        Token::In => (BinaryOperator::In, Precedence::Membership),
        Token::Contains => (BinaryOperator::Contains, Precedence::Membership),
        Token::And => (BinaryOperator::And, Precedence::And),
        Token::Or => (BinaryOperator::Or, Precedence::Or),
        Token::Xor => (BinaryOperator::Xor, Precedence::Or),
        Token::Implies => (BinaryOperator::Implies, Precedence::Implies),
        _ => return None,
    };
    Some(pair)
}

/// Maximum nesting of an expression, both while parsing and in the resulting tree
pub const MAX_NESTING_DEPTH: usize = 256;

const CALENDAR_UNITS: &[&str] = &[
    "year", "years", "month", "months", "week", "weeks", "day", "days", "hour", "hours",
    "minute", "minutes", "second", "seconds", "millisecond", "milliseconds",
];

/// Parses a complete expression.
pub fn parse_expression(input: &str) -> Result<ExpressionNode> {
    let tokens = Tokenizer::new(input).tokenize_all()?;
    if tokens.is_empty() {
        return Err(FhirPathError::parse_error(
            "Expression is empty",
            input,
            SourceLocation::new(0, 0),
        ));
    }
    let mut parser = Parser {
        input,
        tokens,
        position: 0,
        nesting: 0,
    };
    let expression = parser.parse_expression_with_precedence(Precedence::Implies)?;
    match parser.tokens.get(parser.position) {
        None => Ok(expression),
        Some(token) => Err(FhirPathError::parse_error(
            format!("Unexpected token {:?}", token.value),
            input,
            token.location(),
        )),
    }
}

struct Parser<'input> {
    input: &'input str,
    tokens: Vec<Spanned<Token<'input>>>,
    position: usize,
    nesting: usize,
}

impl<'input> Parser<'input> {
    fn peek(&self) -> Option<&Token<'input>> {
        self.tokens.get(self.position).map(|t| &t.value)
    }

    fn peek_next(&self) -> Option<&Token<'input>> {
        self.tokens.get(self.position + 1).map(|t| &t.value)
    }

    fn advance(&mut self) -> Option<Token<'input>> {
        let token = self.tokens.get(self.position).map(|t| t.value.clone());
        if token.is_some() {
            self.position += 1;
        }
        token
    }

    fn error_here(&self, message: impl Into<String>) -> FhirPathError {
        let location = self
            .tokens
            .get(self.position)
            .map(Spanned::location)
            .unwrap_or_else(|| SourceLocation::new(self.input.len(), 0));
        FhirPathError::parse_error(message, self.input, location)
    }

    fn expect(&mut self, expected: Token<'static>, what: &str) -> Result<()> {
        match self.peek() {
            Some(token) if *token == expected => {
                self.position += 1;
                Ok(())
            }
            Some(token) => {
                let message = format!("Expected {what}, found {token:?}");
                Err(self.error_here(message))
            }
            None => Err(self.error_here(format!("Expected {what}, found end of expression"))),
        }
    }

    fn descend(&mut self) -> Result<()> {
        self.nesting += 1;
        if self.nesting > MAX_NESTING_DEPTH {
            return Err(self.too_deep());
        }
        Ok(())
    }

    fn check_depth(&self, depth: usize) -> Result<()> {
        if depth > MAX_NESTING_DEPTH {
            return Err(self.too_deep());
        }
        Ok(())
    }

    fn too_deep(&self) -> FhirPathError {
        self.error_here(format!(
            "Expression is nested too deeply (maximum depth is {MAX_NESTING_DEPTH})"
        ))
    }

    fn parse_expression_with_precedence(&mut self, min: Precedence) -> Result<ExpressionNode> {
        self.descend()?;
        let result = self.parse_binary_chain(min);
        self.nesting -= 1;
        result
    }

    fn parse_binary_chain(&mut self, min: Precedence) -> Result<ExpressionNode> {
        let mut left = self.parse_unary()?;
        let mut depth = left.depth();

        while let Some(token) = self.peek() {
            if matches!(token, Token::Is | Token::As) {
                if Precedence::Type < min {
                    break;
                }
                let is_check = matches!(token, Token::Is);
                self.position += 1;
                let type_name = self.parse_type_specifier()?;
                depth += 1;
                self.check_depth(depth)?;
                left = if is_check {
                    ExpressionNode::TypeCheck {
                        expression: Box::new(left),
                        type_name,
                    }
                } else {
                    ExpressionNode::TypeCast {
                        expression: Box::new(left),
                        type_name,
                    }
                };
                continue;
            }

            let Some((op, precedence)) = binary_operator(token) else {
                break;
            };
            if precedence < min {
                break;
            }
            self.position += 1;
            let next_min = if precedence == Precedence::Implies {
                precedence
            } else {
                precedence.next_level()
            };
            let right = self.parse_expression_with_precedence(next_min)?;
            depth = depth.max(right.depth()) + 1;
            self.check_depth(depth)?;
            left = ExpressionNode::binary_op(op, left, right);
        }

        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<ExpressionNode> {
        let op = match self.peek() {
            Some(Token::Minus) => UnaryOperator::Minus,
            Some(Token::Plus) => UnaryOperator::Plus,
            _ => {
                let primary = self.parse_primary()?;
                return self.parse_postfix(primary);
            }
        };
        self.position += 1;
        self.descend()?;
        let operand = self.parse_unary();
        self.nesting -= 1;
        let operand = operand?;
        self.check_depth(operand.depth() + 1)?;
        Ok(match (op, operand) {
            (UnaryOperator::Minus, ExpressionNode::Literal(LiteralValue::Integer(i))) => {
                ExpressionNode::Literal(LiteralValue::Integer(-i))
            }
            (UnaryOperator::Minus, ExpressionNode::Literal(LiteralValue::Decimal(d))) => {
                ExpressionNode::Literal(LiteralValue::Decimal(-d))
            }
            (UnaryOperator::Plus, operand) => operand,
            (op, operand) => ExpressionNode::UnaryOp {
                op,
                operand: Box::new(operand),
            },
        })
    }

    fn parse_postfix(&mut self, mut node: ExpressionNode) -> Result<ExpressionNode> {
        let mut depth = node.depth();
        loop {
            self.check_depth(depth)?;
            match self.peek() {
                Some(Token::Dot) => {
                    self.position += 1;
                    let name = self
                        .advance()
                        .and_then(|token| token.as_member_name())
                        .ok_or_else(|| self.error_here("Expected member name after '.'"))?;
                    if matches!(self.peek(), Some(Token::LeftParen)) {
                        let args = self.parse_arguments()?;
                        let widest = args.iter().map(ExpressionNode::depth).max().unwrap_or(0);
                        depth = depth.max(widest) + 1;
                        node = ExpressionNode::method_call(node, name, args);
                    } else {
                        depth += 1;
                        node = ExpressionNode::path(node, name);
                    }
                }
                Some(Token::LeftBracket) => {
                    self.position += 1;
                    let index = self.parse_expression_with_precedence(Precedence::Implies)?;
                    self.expect(Token::RightBracket, "']'")?;
                    depth = depth.max(index.depth()) + 1;
                    node = ExpressionNode::Index {
                        base: Box::new(node),
                        index: Box::new(index),
                    };
                }
                _ => return Ok(node),
            }
        }
    }

    fn parse_arguments(&mut self) -> Result<Vec<ExpressionNode>> {
        self.expect(Token::LeftParen, "'('")?;
        let mut args = Vec::new();
        if matches!(self.peek(), Some(Token::RightParen)) {
            self.position += 1;
            return Ok(args);
        }
        loop {
            args.push(self.parse_expression_with_precedence(Precedence::Implies)?);
            match self.peek() {
                Some(Token::Comma) => self.position += 1,
                _ => break,
            }
        }
        self.expect(Token::RightParen, "')'")?;
        Ok(args)
    }

    fn parse_type_specifier(&mut self) -> Result<String> {
        let mut name = self
            .advance()
            .and_then(|token| token.as_member_name())
            .ok_or_else(|| self.error_here("Expected type name"))?;
        if matches!(self.peek(), Some(Token::Dot)) {
            if let Some(qualified) = self.peek_next().and_then(Token::as_member_name) {
                self.position += 2;
                name = format!("{name}.{qualified}");
            }
        }
        Ok(name)
    }

    fn parse_primary(&mut self) -> Result<ExpressionNode> {
        let Some(token) = self.advance() else {
            return Err(self.error_here("Unexpected end of expression"));
        };

        let node = match token {
            Token::Integer(value) => {
                return self.parse_number_or_quantity(Decimal::from(value), LiteralValue::Integer(value));
            }
            Token::Decimal(text) => {
                let value = Decimal::from_str(text).map_err(|_| {
                    self.previous_error(format!("Invalid decimal literal '{text}'"))
                })?;
                return self.parse_number_or_quantity(value, LiteralValue::Decimal(value));
            }
            Token::String(text) => ExpressionNode::Literal(LiteralValue::String(text)),
            Token::Boolean(value) => ExpressionNode::Literal(LiteralValue::Boolean(value)),
            Token::Date(text) => ExpressionNode::Literal(LiteralValue::Date(text.to_string())),
            Token::DateTime(text) => ExpressionNode::Literal(LiteralValue::DateTime(text.to_string())),
            Token::Time(text) => ExpressionNode::Literal(LiteralValue::Time(text.to_string())),
            Token::Percent => {
                let name = match self.advance() {
                    Some(Token::String(name)) => name,
                    Some(other) => other
                        .as_member_name()
                        .ok_or_else(|| self.previous_error("Expected variable name after '%'"))?,
                    None => return Err(self.error_here("Expected variable name after '%'")),
                };
                ExpressionNode::Variable(name)
            }
            Token::DollarThis => ExpressionNode::This,
            Token::DollarIndex => ExpressionNode::IndexVariable,
            Token::DollarTotal => ExpressionNode::Total,
            Token::LeftParen => {
                let inner = self.parse_expression_with_precedence(Precedence::Implies)?;
                self.expect(Token::RightParen, "')'")?;
                inner
            }
            Token::LeftBrace => {
                self.expect(Token::RightBrace, "'}'")?;
                ExpressionNode::Empty
            }
            Token::Identifier(_) | Token::DelimitedIdentifier(_) => {
                let name = token.as_member_name().unwrap_or_default();
                self.identifier_or_call(name)?
            }
            other if other.is_keyword() && matches!(self.peek(), Some(Token::LeftParen)) => {
                let name = other.as_member_name().unwrap_or_default();
                self.identifier_or_call(name)?
            }
            other => return Err(self.previous_error(format!("Unexpected token {other:?}"))),
        };
        Ok(node)
    }

    fn identifier_or_call(&mut self, name: String) -> Result<ExpressionNode> {
        if matches!(self.peek(), Some(Token::LeftParen)) {
            let args = self.parse_arguments()?;
            Ok(ExpressionNode::FunctionCall { name, args })
        } else {
            Ok(ExpressionNode::Identifier(name))
        }
    }

    fn parse_number_or_quantity(&mut self, value: Decimal, literal: LiteralValue) -> Result<ExpressionNode> {
        let unit = match self.peek() {
            Some(Token::String(unit)) => Some(unit.clone()),
            Some(Token::Identifier(unit)) if CALENDAR_UNITS.contains(unit) => Some((*unit).to_string()),
            _ => None,
        };
        match unit {
            Some(unit) => {
                self.position += 1;
                Ok(ExpressionNode::Literal(LiteralValue::Quantity { value, unit }))
            }
            None => Ok(ExpressionNode::Literal(literal)),
        }
    }

    fn previous_error(&self, message: impl Into<String>) -> FhirPathError {
        let location = self
            .position
            .checked_sub(1)
            .and_then(|index| self.tokens.get(index))
            .map(Spanned::location)
            .unwrap_or_else(|| SourceLocation::new(0, 0));
        FhirPathError::parse_error(message, self.input, location)
    }
}
