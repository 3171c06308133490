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

//! Operation-level errors

use crate::model::OperationOutcome;
use std::fmt;
use thiserror::Error;

/// Which expression of the request an error belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpressionRole {
    Main,
    Context,
}

impl ExpressionRole {
    fn evaluation_label(self) -> &'static str {
        match self {
            ExpressionRole::Main => "evaluation",
            ExpressionRole::Context => "context evaluation",
        }
    }
}

impl fmt::Display for ExpressionRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ExpressionRole::Main => "expression",
            ExpressionRole::Context => "context",
        })
    }
}

/// Terminal failure of a `$fhirpath` invocation. The first error wins.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum OperationError {
    #[error("missing '{name}' parameter")]
    MissingParameter { name: String },

    #[error("invalid '{name}' parameter: {reason}")]
    InvalidParameterValue { name: String, reason: String },

    #[error("{role} parse error: {message}")]
    ParseError { role: ExpressionRole, message: String },

    #[error("{} error: {message}", .role.evaluation_label())]
    EvaluationError { role: ExpressionRole, message: String },

    #[error("{0}")]
    ResourceDecodeError(String),

    #[error("{0}")]
    MalformedRequest(String),

    #[error("request cancelled")]
    Cancelled,
}

impl OperationError {
    pub fn missing(name: &str) -> Self {
        OperationError::MissingParameter {
            name: name.to_string(),
        }
    }

    pub fn invalid(name: &str, reason: impl Into<String>) -> Self {
        OperationError::InvalidParameterValue {
            name: name.to_string(),
            reason: reason.into(),
        }
    }

    /// Machine-readable kind, used as the OperationOutcome detail code
    pub fn kind(&self) -> &'static str {
        match self {
            OperationError::MissingParameter { .. } => "missing-parameter",
            OperationError::InvalidParameterValue { .. } => "invalid-parameter-value",
            OperationError::ParseError { .. } => "parse-error",
            OperationError::EvaluationError { .. } => "evaluation-error",
            OperationError::ResourceDecodeError(_) => "resource-decode-error",
            OperationError::MalformedRequest(_) => "malformed-request",
            OperationError::Cancelled => "cancelled",
        }
    }

    pub fn to_outcome(&self) -> OperationOutcome {
        OperationOutcome::fatal(self.kind(), &self.to_string())
    }
}

pub type OperationResult<T> = Result<T, OperationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_failing_phase() {
        let parse = OperationError::ParseError {
            role: ExpressionRole::Context,
            message: "Unexpected token at offset 3".to_string(),
        };
        assert_eq!(parse.to_string(), "context parse error: Unexpected token at offset 3");

        let eval = OperationError::EvaluationError {
            role: ExpressionRole::Main,
            message: "boom".to_string(),
        };
        assert_eq!(eval.to_string(), "evaluation error: boom");
        assert_eq!(OperationError::missing("resource").to_string(), "missing 'resource' parameter");
    }

    #[test]
    fn outcome_carries_kind() {
        let outcome = OperationError::Cancelled.to_outcome();
        assert_eq!(outcome.kind(), Some("cancelled"));
        assert_eq!(outcome.issue[0].diagnostics.as_deref(), Some("request cancelled"));
    }
}
