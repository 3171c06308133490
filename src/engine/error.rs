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

//! Error types for expression parsing and evaluation

use std::fmt;
use thiserror::Error;

/// Position of a token inside the expression text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceLocation {
    /// Byte offset from the start of the expression
    pub offset: usize,
    /// Length of the offending token in bytes
    pub length: usize,
}

impl SourceLocation {
    pub fn new(offset: usize, length: usize) -> Self {
        Self { offset, length }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "offset {}", self.offset)
    }
}

/// Errors raised by the expression engine
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FhirPathError {
    #[error("{message} at {location}")]
    ParseError {
        message: String,
        expression: String,
        location: SourceLocation,
    },

    #[error("{message}")]
    EvaluationError { message: String },

    #[error("Unknown function '{name}'")]
    UnknownFunction { name: String },

    #[error("Function '{name}' expects {expected} argument(s), got {actual}")]
    InvalidArity {
        name: String,
        expected: String,
        actual: usize,
    },
}

impl FhirPathError {
    pub fn parse_error(
        message: impl Into<String>,
        expression: impl Into<String>,
        location: SourceLocation,
    ) -> Self {
        Self::ParseError {
            message: message.into(),
            expression: expression.into(),
            location,
        }
    }

    pub fn evaluation_error(message: impl Into<String>) -> Self {
        Self::EvaluationError {
            message: message.into(),
        }
    }

    pub fn is_parse_error(&self) -> bool {
        matches!(self, Self::ParseError { .. })
    }
}

/// Result alias used across the engine
pub type Result<T> = std::result::Result<T, FhirPathError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_error_display_includes_offset() {
        let err = FhirPathError::parse_error("Unexpected token ')'", "a.b)", SourceLocation::new(3, 1));
        assert_eq!(err.to_string(), "Unexpected token ')' at offset 3");
        assert!(err.is_parse_error());
    }

    #[test]
    fn arity_error_display() {
        let err = FhirPathError::InvalidArity {
            name: "substring".to_string(),
            expected: "1 or 2".to_string(),
            actual: 0,
        };
        assert_eq!(
            err.to_string(),
            "Function 'substring' expects 1 or 2 argument(s), got 0"
        );
        assert!(!err.is_parse_error());
    }
}
