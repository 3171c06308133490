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

//! Tokenizer for FHIRPath expressions
//!
//! Produces a flat list of spanned tokens. Identifiers, decimals and temporal
//! literals borrow from the input; string literals are unescaped eagerly.

use super::error::{FhirPathError, Result, SourceLocation};
use once_cell::sync::Lazy;
use rustc_hash::FxHashMap;

#[derive(Debug, Clone, PartialEq)]
pub enum Token<'input> {
    Integer(i64),
    /// Decimal literal kept as text, parsed by the parser
    Decimal(&'input str),
    String(String),
    Boolean(bool),
    Date(&'input str),
    DateTime(&'input str),
    Time(&'input str),

    Identifier(&'input str),
    /// Backtick-quoted identifier (`` `div` ``)
    DelimitedIdentifier(String),

    Plus,
    Minus,
    Multiply,
    Divide,
    Div,
    Mod,
    Equal,
    NotEqual,
    Equivalent,
    NotEquivalent,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
    Ampersand,
    Union,
    And,
    Or,
    Xor,
    Implies,
    In,
    Contains,
    Is,
    As,

    LeftParen,
    RightParen,
    LeftBracket,
    RightBracket,
    LeftBrace,
    RightBrace,
    Dot,
    Comma,
    Percent,
    DollarThis,
    DollarIndex,
    DollarTotal,
}

impl<'input> Token<'input> {
    /// Name usable after `.` or as a function name, including keywords.
    pub fn as_member_name(&self) -> Option<String> {
        match self {
            Token::Identifier(name) => Some((*name).to_string()),
            Token::DelimitedIdentifier(name) => Some(name.clone()),
            other => KEYWORD_TABLE
                .iter()
                .find(|(_, token)| *token == other)
                .map(|(text, _)| (*text).to_string()),
        }
    }

    pub fn is_keyword(&self) -> bool {
        KEYWORD_TABLE.values().any(|token| token == self)
    }
}

/// Token together with its byte span in the expression
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned<T> {
    pub value: T,
    pub start: usize,
    pub end: usize,
}

impl<T> Spanned<T> {
    pub fn location(&self) -> SourceLocation {
        SourceLocation::new(self.start, self.end.saturating_sub(self.start))
    }
}

static KEYWORD_TABLE: Lazy<FxHashMap<&'static str, Token<'static>>> = Lazy::new(|| {
    let mut map = FxHashMap::default();
    map.insert("and", Token::And);
    map.insert("or", Token::Or);
    map.insert("xor", Token::Xor);
    map.insert("implies", Token::Implies);
    map.insert("div", Token::Div);
    map.insert("mod", Token::Mod);
    map.insert("in", Token::In);
    map.insert("contains", Token::Contains);
    map.insert("is", Token::Is);
    map.insert("as", Token::As);
    map.insert("true", Token::Boolean(true));
    map.insert("false", Token::Boolean(false));
    map
});

pub struct Tokenizer<'input> {
    input: &'input str,
    bytes: &'input [u8],
    position: usize,
}

impl<'input> Tokenizer<'input> {
    pub fn new(input: &'input str) -> Self {
        Self {
            input,
            bytes: input.as_bytes(),
            position: 0,
        }
    }

    pub fn tokenize_all(mut self) -> Result<Vec<Spanned<Token<'input>>>> {
        let mut tokens = Vec::new();
        loop {
            self.skip_trivia()?;
            if self.position >= self.bytes.len() {
                return Ok(tokens);
            }
            let start = self.position;
            let value = self.next_token()?;
            tokens.push(Spanned {
                value,
                start,
                end: self.position,
            });
        }
    }

    fn error(&self, message: impl Into<String>, start: usize) -> FhirPathError {
        let length = self.position.saturating_sub(start).max(1);
        FhirPathError::parse_error(message, self.input, SourceLocation::new(start, length))
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.position).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.bytes.get(self.position + offset).copied()
    }

    fn skip_trivia(&mut self) -> Result<()> {
        loop {
            match (self.peek(), self.peek_at(1)) {
                (Some(ch), _) if ch.is_ascii_whitespace() => self.position += 1,
                (Some(b'/'), Some(b'/')) => {
                    while let Some(ch) = self.peek() {
                        if ch == b'\n' {
                            break;
                        }
                        self.position += 1;
                    }
                }
                (Some(b'/'), Some(b'*')) => {
                    let start = self.position;
                    self.position += 2;
                    loop {
                        match (self.peek(), self.peek_at(1)) {
                            (Some(b'*'), Some(b'/')) => {
                                self.position += 2;
                                break;
                            }
                            (Some(_), _) => self.position += 1,
                            (None, _) => return Err(self.error("Unterminated comment", start)),
                        }
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    fn next_token(&mut self) -> Result<Token<'input>> {
        let start = self.position;
        let Some(ch) = self.peek() else {
            return Err(self.error("Unexpected end of expression", start));
        };

        match ch {
            b'+' => self.advance_with(Token::Plus),
            b'-' => self.advance_with(Token::Minus),
            b'*' => self.advance_with(Token::Multiply),
            b'/' => self.advance_with(Token::Divide),
            b'&' => self.advance_with(Token::Ampersand),
            b'|' => self.advance_with(Token::Union),
            b'=' => self.advance_with(Token::Equal),
            b'~' => self.advance_with(Token::Equivalent),
            b'(' => self.advance_with(Token::LeftParen),
            b')' => self.advance_with(Token::RightParen),
            b'[' => self.advance_with(Token::LeftBracket),
            b']' => self.advance_with(Token::RightBracket),
            b'{' => self.advance_with(Token::LeftBrace),
            b'}' => self.advance_with(Token::RightBrace),
            b'.' => self.advance_with(Token::Dot),
            b',' => self.advance_with(Token::Comma),
            b'%' => self.advance_with(Token::Percent),
            b'!' => match self.peek_at(1) {
                Some(b'=') => {
                    self.position += 2;
                    Ok(Token::NotEqual)
                }
                Some(b'~') => {
                    self.position += 2;
                    Ok(Token::NotEquivalent)
                }
                _ => {
                    self.position += 1;
                    Err(self.error("Unexpected character '!'", start))
                }
            },
            b'<' => {
                if self.peek_at(1) == Some(b'=') {
                    self.position += 2;
                    Ok(Token::LessThanOrEqual)
                } else {
                    self.advance_with(Token::LessThan)
                }
            }
            b'>' => {
                if self.peek_at(1) == Some(b'=') {
                    self.position += 2;
                    Ok(Token::GreaterThanOrEqual)
                } else {
                    self.advance_with(Token::GreaterThan)
                }
            }
            b'\'' => {
                let text = self.parse_quoted(b'\'')?;
                Ok(Token::String(text))
            }
            b'`' => {
                let text = self.parse_quoted(b'`')?;
                Ok(Token::DelimitedIdentifier(text))
            }
            b'$' => {
                self.position += 1;
                let name = self.parse_identifier();
                match name {
                    "this" => Ok(Token::DollarThis),
                    "index" => Ok(Token::DollarIndex),
                    "total" => Ok(Token::DollarTotal),
                    _ => Err(self.error(format!("Unknown special variable '${name}'"), start)),
                }
            }
            b'@' => self.parse_temporal(),
            b'0'..=b'9' => self.parse_number(),
            ch if Self::is_id_start(ch) => {
                let ident = self.parse_identifier();
                Ok(KEYWORD_TABLE
                    .get(ident)
                    .cloned()
                    .unwrap_or(Token::Identifier(ident)))
            }
            _ => {
                let ch = self.input[start..].chars().next().unwrap_or('?');
                self.position += ch.len_utf8();
                Err(self.error(format!("Unexpected character '{ch}'"), start))
            }
        }
    }

    fn advance_with(&mut self, token: Token<'input>) -> Result<Token<'input>> {
        self.position += 1;
        Ok(token)
    }

    fn is_id_start(ch: u8) -> bool {
        ch.is_ascii_alphabetic() || ch == b'_'
    }

    fn is_id_continue(ch: u8) -> bool {
        ch.is_ascii_alphanumeric() || ch == b'_'
    }

    fn parse_identifier(&mut self) -> &'input str {
        let start = self.position;
        while self.peek().is_some_and(Self::is_id_continue) {
            self.position += 1;
        }
        &self.input[start..self.position]
    }

    fn take_digits(&mut self) -> usize {
        let start = self.position;
        while self.peek().is_some_and(|ch| ch.is_ascii_digit()) {
            self.position += 1;
        }
        self.position - start
    }

    fn parse_number(&mut self) -> Result<Token<'input>> {
        let start = self.position;
        self.take_digits();
        let is_decimal = self.peek() == Some(b'.') && self.peek_at(1).is_some_and(|c| c.is_ascii_digit());
        if is_decimal {
            self.position += 1;
            self.take_digits();
            return Ok(Token::Decimal(&self.input[start..self.position]));
        }
        let text = &self.input[start..self.position];
        text.parse::<i64>()
            .map(Token::Integer)
            .map_err(|_| self.error(format!("Integer literal '{text}' is out of range"), start))
    }

    fn parse_quoted(&mut self, quote: u8) -> Result<String> {
        let start = self.position;
        self.position += 1;
        let mut text = String::new();
        loop {
            let Some(ch) = self.peek() else {
                return Err(self.error("Unterminated string literal", start));
            };
            if ch == quote {
                self.position += 1;
                return Ok(text);
            }
            if ch == b'\\' {
                let escape_start = self.position;
                self.position += 1;
                let escaped = self.peek().ok_or_else(|| self.error("Unterminated escape", start))?;
                self.position += 1;
                match escaped {
                    b'\'' => text.push('\''),
                    b'"' => text.push('"'),
                    b'`' => text.push('`'),
                    b'\\' => text.push('\\'),
                    b'/' => text.push('/'),
                    b'f' => text.push('\u{000C}'),
                    b'n' => text.push('\n'),
                    b'r' => text.push('\r'),
                    b't' => text.push('\t'),
                    b'u' => {
                        let hex = self
                            .input
                            .get(self.position..self.position + 4)
                            .ok_or_else(|| self.error("Invalid unicode escape", escape_start))?;
                        let code = u32::from_str_radix(hex, 16)
                            .ok()
                            .and_then(char::from_u32)
                            .ok_or_else(|| self.error("Invalid unicode escape", escape_start))?;
                        text.push(code);
                        self.position += 4;
                    }
                    other => {
                        return Err(self.error(
                            format!("Invalid escape sequence '\\{}'", other as char),
                            escape_start,
                        ));
                    }
                }
                continue;
            }
            // Quotes and backslashes are ASCII so `position` stays on a char boundary.
            let rest = &self.input[self.position..];
            let next = rest.chars().next().unwrap_or_default();
            text.push(next);
            self.position += next.len_utf8();
        }
    }

    fn parse_temporal(&mut self) -> Result<Token<'input>> {
        let start = self.position;
        self.position += 1;
        if self.peek() == Some(b'T') {
            self.position += 1;
            let time_start = self.position;
            self.parse_time_part(start)?;
            return Ok(Token::Time(&self.input[time_start..self.position]));
        }

        let date_start = self.position;
        if self.take_digits() != 4 {
            return Err(self.error("Invalid date literal", start));
        }
        for _ in 0..2 {
            if self.peek() == Some(b'-') && self.peek_at(1).is_some_and(|c| c.is_ascii_digit()) {
                self.position += 1;
                if self.take_digits() != 2 {
                    return Err(self.error("Invalid date literal", start));
                }
            } else {
                break;
            }
        }

        if self.peek() != Some(b'T') {
            return Ok(Token::Date(&self.input[date_start..self.position]));
        }
        self.position += 1;
        if self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.parse_time_part(start)?;
        }
        match self.peek() {
            Some(b'Z') => self.position += 1,
            Some(b'+') | Some(b'-') if self.peek_at(1).is_some_and(|c| c.is_ascii_digit()) => {
                self.position += 1;
                let hours = self.take_digits();
                if hours != 2 || self.peek() != Some(b':') {
                    return Err(self.error("Invalid timezone offset", start));
                }
                self.position += 1;
                if self.take_digits() != 2 {
                    return Err(self.error("Invalid timezone offset", start));
                }
            }
            _ => {}
        }
        Ok(Token::DateTime(&self.input[date_start..self.position]))
    }

    fn parse_time_part(&mut self, start: usize) -> Result<()> {
        if self.take_digits() != 2 {
            return Err(self.error("Invalid time literal", start));
        }
        for _ in 0..2 {
            if self.peek() == Some(b':') {
                self.position += 1;
                if self.take_digits() != 2 {
                    return Err(self.error("Invalid time literal", start));
                }
            }
        }
        if self.peek() == Some(b'.') && self.peek_at(1).is_some_and(|c| c.is_ascii_digit()) {
            self.position += 1;
            self.take_digits();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(input: &str) -> Vec<Token<'_>> {
        Tokenizer::new(input)
            .tokenize_all()
            .unwrap()
            .into_iter()
            .map(|t| t.value)
            .collect()
    }

    #[test]
    fn tokenizes_path_with_function_call() {
        assert_eq!(
            tokens("Patient.name.given.first()"),
            vec![
                Token::Identifier("Patient"),
                Token::Dot,
                Token::Identifier("name"),
                Token::Dot,
                Token::Identifier("given"),
                Token::Dot,
                Token::Identifier("first"),
                Token::LeftParen,
                Token::RightParen,
            ]
        );
    }

    #[test]
    fn keywords_and_operators() {
        assert_eq!(
            tokens("a != 1 and b <= 2.5 implies c !~ 'x'"),
            vec![
                Token::Identifier("a"),
                Token::NotEqual,
                Token::Integer(1),
                Token::And,
                Token::Identifier("b"),
                Token::LessThanOrEqual,
                Token::Decimal("2.5"),
                Token::Implies,
                Token::Identifier("c"),
                Token::NotEquivalent,
                Token::String("x".to_string()),
            ]
        );
    }

    #[test]
    fn string_escapes_are_decoded() {
        assert_eq!(
            tokens(r"'it\'s é'"),
            vec![Token::String("it's é".to_string())]
        );
    }

    #[test]
    fn temporal_literals() {
        assert_eq!(
            tokens("@2024-01-15 @2024-01-15T10:30:00Z @T08:15 @2024-01-15T10:30:00.123+02:00"),
            vec![
                Token::Date("2024-01-15"),
                Token::DateTime("2024-01-15T10:30:00Z"),
                Token::Time("08:15"),
                Token::DateTime("2024-01-15T10:30:00.123+02:00"),
            ]
        );
    }

    #[test]
    fn special_variables_and_comments() {
        assert_eq!(
            tokens("$this // trailing\n /* block */ $index"),
            vec![Token::DollarThis, Token::DollarIndex]
        );
    }

    #[test]
    fn keywords_remain_usable_as_member_names() {
        assert_eq!(Token::Contains.as_member_name(), Some("contains".to_string()));
        assert!(Token::Div.is_keyword());
        assert!(!Token::Identifier("given").is_keyword());
    }

    #[test]
    fn rejects_unterminated_string() {
        let err = Tokenizer::new("'abc").tokenize_all().unwrap_err();
        assert!(err.to_string().contains("Unterminated string literal"));
    }

    #[test]
    fn rejects_unknown_character() {
        assert!(Tokenizer::new("a # b").tokenize_all().is_err());
    }
}
