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

//! Tree-walking evaluator

use super::ast::{ExpressionNode, LiteralValue, UnaryOperator};
use super::context::EvaluationContext;
use super::error::{FhirPathError, Result};
use super::operators;
use super::provider::ModelProvider;
use super::value::{Collection, FhirPathValue, FhirResource};
use serde_json::Value as JsonValue;

/// Type suffixes that may follow a choice element name (`value[x]`)
const FHIR_DATA_TYPES: &[&str] = &[
    "Boolean", "Integer", "Integer64", "Decimal", "String", "Uri", "Url", "Canonical", "Code",
    "Id", "Oid", "Uuid", "Markdown", "Base64Binary", "Instant", "Date", "DateTime", "Time",
    "PositiveInt", "UnsignedInt", "Quantity", "CodeableConcept", "CodeableReference", "Coding",
    "Range", "Ratio", "RatioRange", "Period", "SampledData", "Attachment", "Reference",
    "Identifier", "HumanName", "Address", "ContactPoint", "Timing", "Age", "Duration", "Count",
    "Distance", "Money", "Annotation", "Signature", "Expression", "Meta", "Dosage",
    "ContactDetail", "RelatedArtifact", "UsageContext", "TriggerDefinition", "DataRequirement",
    "ParameterDefinition", "Availability", "ExtendedContactDetail",
];

/// Iteration variables visible to an expression
#[derive(Debug, Clone)]
pub(super) struct Scope {
    pub this: Collection,
    pub index: Option<usize>,
    pub total: Option<Collection>,
}

impl Scope {
    pub fn root(input: &Collection) -> Self {
        Self {
            this: input.clone(),
            index: None,
            total: None,
        }
    }

    /// Scope for one item of a lambda argument (`where`, `select`, ...)
    pub fn for_item(&self, item: &FhirPathValue, index: usize) -> Self {
        Self {
            this: Collection::single(item.clone()),
            index: Some(index),
            total: self.total.clone(),
        }
    }
}

pub(super) struct Evaluator<'a> {
    pub(super) model: &'a dyn ModelProvider,
    pub(super) context: &'a EvaluationContext,
}

impl<'a> Evaluator<'a> {
    pub fn new(model: &'a dyn ModelProvider, context: &'a EvaluationContext) -> Self {
        Self { model, context }
    }

    pub fn evaluate_root(&self, node: &ExpressionNode, input: Collection) -> Result<Collection> {
        let scope = Scope::root(&input);
        self.evaluate(node, &input, &scope)
    }

    pub fn evaluate(&self, node: &ExpressionNode, input: &Collection, scope: &Scope) -> Result<Collection> {
        match node {
            ExpressionNode::Literal(literal) => Ok(Collection::single(literal_value(literal))),
            ExpressionNode::Identifier(name) => Ok(self.navigate(input, name)),
            ExpressionNode::FunctionCall { name, args } => self.call_function(name, args, input, scope),
            ExpressionNode::MethodCall { base, name, args } => {
                let target = self.evaluate(base, input, scope)?;
                self.call_function(name, args, &target, scope)
            }
            ExpressionNode::Path { base, path } => {
                let target = self.evaluate(base, input, scope)?;
                Ok(self.navigate(&target, path))
            }
            ExpressionNode::Index { base, index } => {
                let target = self.evaluate(base, input, scope)?;
                let index = self.evaluate(index, &scope.this, scope)?;
                let position = match index.as_slice() {
                    [] => return Ok(Collection::empty()),
                    [FhirPathValue::Integer(i)] => *i,
                    _ => return Err(FhirPathError::evaluation_error("Indexer must be a single integer")),
                };
                Ok(usize::try_from(position)
                    .ok()
                    .and_then(|i| target.get(i).cloned())
                    .map(Collection::single)
                    .unwrap_or_default())
            }
            ExpressionNode::BinaryOp { op, left, right } => {
                let left = self.evaluate(left, input, scope)?;
                let right = self.evaluate(right, input, scope)?;
                operators::evaluate_binary(*op, left, right)
            }
            ExpressionNode::UnaryOp { op, operand } => {
                let operand = self.evaluate(operand, input, scope)?;
                match op {
                    UnaryOperator::Plus => Ok(operand),
                    UnaryOperator::Minus => operators::negate(operand),
                }
            }
            ExpressionNode::TypeCheck { expression, type_name } => {
                let value = self.evaluate(expression, input, scope)?;
                match value.as_slice() {
                    [] => Ok(Collection::empty()),
                    [item] => Ok(Collection::boolean(item.is_of_type(type_name))),
                    _ => Err(FhirPathError::evaluation_error(
                        "'is' requires a single item on the left",
                    )),
                }
            }
            ExpressionNode::TypeCast { expression, type_name } => {
                let value = self.evaluate(expression, input, scope)?;
                Ok(value.into_iter().filter(|item| item.is_of_type(type_name)).collect())
            }
            ExpressionNode::Variable(name) => self
                .context
                .resolve_variable(name)
                .ok_or_else(|| FhirPathError::evaluation_error(format!("Unknown variable '%{name}'"))),
            ExpressionNode::This => Ok(scope.this.clone()),
            ExpressionNode::IndexVariable => Ok(scope
                .index
                .and_then(|i| i64::try_from(i).ok())
                .map(|i| Collection::single(FhirPathValue::Integer(i)))
                .unwrap_or_default()),
            ExpressionNode::Total => Ok(scope.total.clone().unwrap_or_default()),
            ExpressionNode::Empty => Ok(Collection::empty()),
        }
    }

    /// Member navigation. A capitalized name equal to the item's type selects
    /// the item itself, so `Patient.name` works against a Patient.
    pub fn navigate(&self, input: &Collection, name: &str) -> Collection {
        let mut result = Collection::new();
        let is_type_name = name.chars().next().is_some_and(char::is_uppercase);
        for item in input {
            let FhirPathValue::Resource(node) = item else {
                continue;
            };
            if is_type_name {
                if node.type_name() == Some(name) {
                    result.push(item.clone());
                    continue;
                }
                // A resource type name never names a member.
                if self.model.is_resource_type(name) {
                    continue;
                }
            }
            self.child_values(node, name, &mut result);
        }
        result
    }

    fn child_values(&self, node: &FhirResource, name: &str, out: &mut Collection) {
        if let Some(json) = node.get_property(name) {
            push_json(json, self.model.element_type(name), out);
            return;
        }

        // Choice elements: `value` resolves `valueQuantity`, `valueString`, ...
        let Some(object) = node.json().as_object() else {
            return;
        };
        for (key, json) in object {
            let Some(suffix) = key.strip_prefix(name) else {
                continue;
            };
            if FHIR_DATA_TYPES.contains(&suffix) {
                push_json(json, Some(suffix), out);
            }
        }
    }

    /// Direct children of every item, in document order
    pub fn children(&self, input: &Collection) -> Collection {
        let mut result = Collection::new();
        for item in input {
            let FhirPathValue::Resource(node) = item else {
                continue;
            };
            let Some(object) = node.json().as_object() else {
                continue;
            };
            for (key, json) in object {
                if key == "resourceType" || key.starts_with('_') {
                    continue;
                }
                push_json(json, self.model.element_type(key), &mut result);
            }
        }
        result
    }
}

fn push_json(json: &JsonValue, type_hint: Option<&str>, out: &mut Collection) {
    match json {
        JsonValue::Array(items) => {
            for item in items {
                if let Some(value) = typed_value(item, type_hint) {
                    out.push(value);
                }
            }
        }
        other => {
            if let Some(value) = typed_value(other, type_hint) {
                out.push(value);
            }
        }
    }
}

fn typed_value(json: &JsonValue, type_hint: Option<&str>) -> Option<FhirPathValue> {
    if let (JsonValue::String(text), Some(hint)) = (json, type_hint) {
        match hint {
            "date" | "Date" => return Some(FhirPathValue::Date(text.clone())),
            "dateTime" | "DateTime" | "instant" | "Instant" => {
                return Some(FhirPathValue::DateTime(text.clone()));
            }
            "time" | "Time" => return Some(FhirPathValue::Time(text.clone())),
            _ => {}
        }
    }
    FhirPathValue::from_json(json, type_hint)
}

pub(super) fn literal_value(literal: &LiteralValue) -> FhirPathValue {
    match literal {
        LiteralValue::Boolean(b) => FhirPathValue::Boolean(*b),
        LiteralValue::Integer(i) => FhirPathValue::Integer(*i),
        LiteralValue::Decimal(d) => FhirPathValue::Decimal(*d),
        LiteralValue::String(s) => FhirPathValue::String(s.clone()),
        LiteralValue::Date(s) => FhirPathValue::Date(s.clone()),
        LiteralValue::DateTime(s) => FhirPathValue::DateTime(s.clone()),
        LiteralValue::Time(s) => FhirPathValue::Time(s.clone()),
        LiteralValue::Quantity { value, unit } => FhirPathValue::Quantity {
            value: *value,
            unit: unit.clone(),
        },
    }
}

/// Singleton evaluation of a collection as a boolean
pub(super) fn singleton_boolean(collection: &Collection) -> Result<Option<bool>> {
    match collection.as_slice() {
        [] => Ok(None),
        [FhirPathValue::Boolean(b)] => Ok(Some(*b)),
        [_] => Ok(Some(true)),
        _ => Err(FhirPathError::evaluation_error(
            "Expected a single boolean but found a collection",
        )),
    }
}
