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

//! Abstract syntax tree for FHIRPath expressions

use rust_decimal::Decimal;
use std::fmt;

/// AST node for FHIRPath expressions
#[derive(Debug, Clone, PartialEq)]
pub enum ExpressionNode {
    /// Literal value
    Literal(LiteralValue),

    /// Member or type name evaluated against the current focus
    Identifier(String),

    /// Function invoked on the current focus (`where(...)` at path start)
    FunctionCall {
        name: String,
        args: Vec<ExpressionNode>,
    },

    /// Function invoked on the result of `base` (`base.first()`)
    MethodCall {
        base: Box<ExpressionNode>,
        name: String,
        args: Vec<ExpressionNode>,
    },

    /// Path navigation (`base.path`)
    Path {
        base: Box<ExpressionNode>,
        path: String,
    },

    /// Indexer (`base[index]`)
    Index {
        base: Box<ExpressionNode>,
        index: Box<ExpressionNode>,
    },

    BinaryOp {
        op: BinaryOperator,
        left: Box<ExpressionNode>,
        right: Box<ExpressionNode>,
    },

    UnaryOp {
        op: UnaryOperator,
        operand: Box<ExpressionNode>,
    },

    /// `expression is Type`
    TypeCheck {
        expression: Box<ExpressionNode>,
        type_name: String,
    },

    /// `expression as Type`
    TypeCast {
        expression: Box<ExpressionNode>,
        type_name: String,
    },

    /// External constant (`%resource`, `%v`)
    Variable(String),

    /// `$this`
    This,

    /// `$index`
    IndexVariable,

    /// `$total`
    Total,

    /// `{}`
    Empty,
}

/// Literal values in FHIRPath
#[derive(Debug, Clone, PartialEq)]
pub enum LiteralValue {
    Boolean(bool),
    Integer(i64),
    Decimal(Decimal),
    String(String),
    /// Date literal without the leading `@`
    Date(String),
    /// DateTime literal without the leading `@`
    DateTime(String),
    /// Time literal without the leading `@T`
    Time(String),
    Quantity { value: Decimal, unit: String },
}

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    Equal,
    NotEqual,
    Equivalent,
    NotEquivalent,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
    Add,
    Subtract,
    Multiply,
    Divide,
    IntegerDivide,
    Modulo,
    Concatenate,
    Union,
    And,
    Or,
    Xor,
    Implies,
    In,
    Contains,
}

impl BinaryOperator {
    pub fn as_str(&self) -> &'static str {
        match self {
            BinaryOperator::Equal => "=",
            BinaryOperator::NotEqual => "!=",
            BinaryOperator::Equivalent => "~",
            BinaryOperator::NotEquivalent => "!~",
            BinaryOperator::LessThan => "<",
            BinaryOperator::LessThanOrEqual => "<=",
            BinaryOperator::GreaterThan => ">",
            BinaryOperator::GreaterThanOrEqual => ">=",
            BinaryOperator::Add => "+",
            BinaryOperator::Subtract => "-",
            BinaryOperator::Multiply => "*",
            BinaryOperator::Divide => "/",
            BinaryOperator::IntegerDivide => "div",
            BinaryOperator::Modulo => "mod",
            BinaryOperator::Concatenate => "&",
            BinaryOperator::Union => "|",
            BinaryOperator::And => "and",
            BinaryOperator::Or => "or",
            BinaryOperator::Xor => "xor",
            BinaryOperator::Implies => "implies",
            BinaryOperator::In => "in",
            BinaryOperator::Contains => "contains",
        }
    }
}

impl fmt::Display for BinaryOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOperator {
    Plus,
    Minus,
}

impl ExpressionNode {
    pub fn identifier(name: impl Into<String>) -> Self {
        Self::Identifier(name.into())
    }

    pub fn path(base: ExpressionNode, path: impl Into<String>) -> Self {
        Self::Path {
            base: Box::new(base),
            path: path.into(),
        }
    }

    pub fn method_call(base: ExpressionNode, name: impl Into<String>, args: Vec<ExpressionNode>) -> Self {
        Self::MethodCall {
            base: Box::new(base),
            name: name.into(),
            args,
        }
    }

    pub fn binary_op(op: BinaryOperator, left: ExpressionNode, right: ExpressionNode) -> Self {
        Self::BinaryOp {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// Height of the tree rooted at this node; a leaf has depth 1.
    pub fn depth(&self) -> usize {
        let children = match self {
            ExpressionNode::FunctionCall { args, .. } => args.iter().map(Self::depth).max().unwrap_or(0),
            ExpressionNode::MethodCall { base, args, .. } => {
                args.iter().map(Self::depth).max().unwrap_or(0).max(base.depth())
            }
            ExpressionNode::Path { base, .. } => base.depth(),
            ExpressionNode::Index { base, index } => base.depth().max(index.depth()),
            ExpressionNode::BinaryOp { left, right, .. } => left.depth().max(right.depth()),
            ExpressionNode::UnaryOp { operand, .. } => operand.depth(),
            ExpressionNode::TypeCheck { expression, .. } | ExpressionNode::TypeCast { expression, .. } => {
                expression.depth()
            }
            ExpressionNode::Literal(_)
            | ExpressionNode::Identifier(_)
            | ExpressionNode::Variable(_)
            | ExpressionNode::This
            | ExpressionNode::IndexVariable
            | ExpressionNode::Total
            | ExpressionNode::Empty => 0,
        };
        children + 1
    }

    /// Reads this node as a type specifier such as `Patient` or `FHIR.Patient`.
    pub fn as_type_specifier(&self) -> Option<String> {
        match self {
            ExpressionNode::Identifier(name) => Some(name.clone()),
            ExpressionNode::Path { base, path } => match base.as_ref() {
                ExpressionNode::Identifier(namespace) => Some(format!("{namespace}.{path}")),
                _ => None,
            },
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_specifier_from_identifier_and_qualified_path() {
        assert_eq!(
            ExpressionNode::identifier("Patient").as_type_specifier(),
            Some("Patient".to_string())
        );
        let qualified = ExpressionNode::path(ExpressionNode::identifier("FHIR"), "Patient");
        assert_eq!(qualified.as_type_specifier(), Some("FHIR.Patient".to_string()));
        assert_eq!(ExpressionNode::This.as_type_specifier(), None);
    }

    #[test]
    fn depth_counts_the_longest_branch() {
        assert_eq!(ExpressionNode::This.depth(), 1);
        let path = ExpressionNode::path(ExpressionNode::path(ExpressionNode::identifier("a"), "b"), "c");
        assert_eq!(path.depth(), 3);
        let sum = ExpressionNode::binary_op(BinaryOperator::Add, ExpressionNode::Empty, path);
        assert_eq!(sum.depth(), 4);
    }
}
