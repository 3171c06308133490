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

//! Built-in function library

use super::ast::ExpressionNode;
use super::error::{FhirPathError, Result};
use super::evaluator::{Evaluator, Scope, singleton_boolean};
use super::value::{Collection, FhirPathValue};
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use regex::Regex;
use rust_decimal::Decimal;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rustc_hash::FxHashMap;
use std::str::FromStr;

/// Upper bound on `repeat()` iterations
const MAX_REPEAT_DEPTH: usize = 1_000;

static REGEX_CACHE: Lazy<Mutex<FxHashMap<String, Regex>>> = Lazy::new(|| Mutex::new(FxHashMap::default()));

fn compile_regex(pattern: &str) -> Result<Regex> {
    let mut cache = REGEX_CACHE.lock();
    if let Some(regex) = cache.get(pattern) {
        return Ok(regex.clone());
    }
    let regex = Regex::new(pattern)
        .map_err(|e| FhirPathError::evaluation_error(format!("Invalid regular expression: {e}")))?;
    cache.insert(pattern.to_string(), regex.clone());
    Ok(regex)
}

fn check_arity(name: &str, args: &[ExpressionNode], min: usize, max: usize) -> Result<()> {
    if args.len() < min || args.len() > max {
        let expected = if min == max {
            min.to_string()
        } else {
            format!("{min} to {max}")
        };
        return Err(FhirPathError::InvalidArity {
            name: name.to_string(),
            expected,
            actual: args.len(),
        });
    }
    Ok(())
}

impl Evaluator<'_> {
    pub(super) fn call_function(
        &self,
        name: &str,
        args: &[ExpressionNode],
        input: &Collection,
        scope: &Scope,
    ) -> Result<Collection> {
        match name {
            // Existence
            "empty" => {
                check_arity(name, args, 0, 0)?;
                Ok(Collection::boolean(input.is_empty()))
            }
            "exists" => {
                check_arity(name, args, 0, 1)?;
                if let Some(criteria) = args.first() {
                    let filtered = self.filter(input, criteria, scope)?;
                    Ok(Collection::boolean(!filtered.is_empty()))
                } else {
                    Ok(Collection::boolean(!input.is_empty()))
                }
            }
            "all" => {
                check_arity(name, args, 1, 1)?;
                for (index, item) in input.iter().enumerate() {
                    let result = self.evaluate_for_item(&args[0], item, index, scope)?;
                    if singleton_boolean(&result)? != Some(true) {
                        return Ok(Collection::boolean(false));
                    }
                }
                Ok(Collection::boolean(true))
            }
            "allTrue" | "anyTrue" | "allFalse" | "anyFalse" => {
                check_arity(name, args, 0, 0)?;
                let flags: Vec<bool> = input.iter().filter_map(FhirPathValue::as_boolean).collect();
                let result = match name {
                    "allTrue" => flags.iter().all(|b| *b),
                    "anyTrue" => flags.iter().any(|b| *b),
                    "allFalse" => flags.iter().all(|b| !*b),
                    _ => flags.iter().any(|b| !*b),
                };
                Ok(Collection::boolean(result))
            }
            "count" => {
                check_arity(name, args, 0, 0)?;
                let count = i64::try_from(input.len()).unwrap_or(i64::MAX);
                Ok(Collection::single(FhirPathValue::Integer(count)))
            }
            "distinct" => {
                check_arity(name, args, 0, 0)?;
                Ok(input.clone().distinct())
            }
            "isDistinct" => {
                check_arity(name, args, 0, 0)?;
                Ok(Collection::boolean(input.clone().distinct().len() == input.len()))
            }
            "hasValue" => {
                check_arity(name, args, 0, 0)?;
                Ok(Collection::boolean(matches!(input.as_slice(), [v] if v.is_primitive())))
            }

            // Filtering and projection
            "where" => {
                check_arity(name, args, 1, 1)?;
                self.filter(input, &args[0], scope)
            }
            "select" => {
                check_arity(name, args, 1, 1)?;
                let mut result = Collection::new();
                for (index, item) in input.iter().enumerate() {
                    result.extend(self.evaluate_for_item(&args[0], item, index, scope)?);
                }
                Ok(result)
            }
            "repeat" => {
                check_arity(name, args, 1, 1)?;
                self.repeat(input, &args[0], scope)
            }
            "ofType" => {
                check_arity(name, args, 1, 1)?;
                let type_name = type_argument(name, &args[0])?;
                Ok(input.iter().filter(|v| v.is_of_type(&type_name)).cloned().collect())
            }
            "is" => {
                check_arity(name, args, 1, 1)?;
                let type_name = type_argument(name, &args[0])?;
                match input.as_slice() {
                    [] => Ok(Collection::empty()),
                    [item] => Ok(Collection::boolean(item.is_of_type(&type_name))),
                    _ => Err(FhirPathError::evaluation_error("is() requires a single item")),
                }
            }
            "as" => {
                check_arity(name, args, 1, 1)?;
                let type_name = type_argument(name, &args[0])?;
                Ok(input.iter().filter(|v| v.is_of_type(&type_name)).cloned().collect())
            }

            // Subsetting
            "single" => {
                check_arity(name, args, 0, 0)?;
                match input.len() {
                    0 | 1 => Ok(input.clone()),
                    _ => Err(FhirPathError::evaluation_error(
                        "single() called on a collection with more than one item",
                    )),
                }
            }
            "first" => {
                check_arity(name, args, 0, 0)?;
                Ok(input.first().cloned().map(Collection::single).unwrap_or_default())
            }
            "last" => {
                check_arity(name, args, 0, 0)?;
                Ok(input.last().cloned().map(Collection::single).unwrap_or_default())
            }
            "tail" => {
                check_arity(name, args, 0, 0)?;
                Ok(input.iter().skip(1).cloned().collect())
            }
            "skip" | "take" => {
                check_arity(name, args, 1, 1)?;
                let count = self.integer_argument(name, &args[0], scope)?.unwrap_or(0);
                let count = usize::try_from(count.max(0)).unwrap_or(usize::MAX);
                Ok(if name == "skip" {
                    input.iter().skip(count).cloned().collect()
                } else {
                    input.iter().take(count).cloned().collect()
                })
            }
            "intersect" => {
                check_arity(name, args, 1, 1)?;
                let other = self.evaluate(&args[0], &scope.this, scope)?;
                let result: Collection = input.iter().filter(|v| other.contains_value(v)).cloned().collect();
                Ok(result.distinct())
            }
            "exclude" => {
                check_arity(name, args, 1, 1)?;
                let other = self.evaluate(&args[0], &scope.this, scope)?;
                Ok(input.iter().filter(|v| !other.contains_value(v)).cloned().collect())
            }

            // Combining
            "union" | "combine" => {
                check_arity(name, args, 1, 1)?;
                let mut result = input.clone();
                result.extend(self.evaluate(&args[0], &scope.this, scope)?);
                Ok(if name == "union" { result.distinct() } else { result })
            }

            // Conditional
            "iif" => {
                check_arity(name, args, 2, 3)?;
                let branch_scope = Scope::root(input);
                let criterion = self.evaluate(&args[0], input, &branch_scope)?;
                if singleton_boolean(&criterion)? == Some(true) {
                    self.evaluate(&args[1], input, &branch_scope)
                } else if let Some(otherwise) = args.get(2) {
                    self.evaluate(otherwise, input, &branch_scope)
                } else {
                    Ok(Collection::empty())
                }
            }
            "not" => {
                check_arity(name, args, 0, 0)?;
                Ok(singleton_boolean(input)?
                    .map(|b| Collection::boolean(!b))
                    .unwrap_or_default())
            }

            // Conversion
            "toString" | "toInteger" | "toDecimal" | "toBoolean" => {
                check_arity(name, args, 0, 0)?;
                let Some(item) = single_item(name, input)? else {
                    return Ok(Collection::empty());
                };
                Ok(convert(name, item).map(Collection::single).unwrap_or_default())
            }
            "convertsToString" | "convertsToInteger" | "convertsToDecimal" | "convertsToBoolean" => {
                check_arity(name, args, 0, 0)?;
                let Some(item) = single_item(name, input)? else {
                    return Ok(Collection::empty());
                };
                let target = format!("to{}", &name["convertsTo".len()..]);
                Ok(Collection::boolean(convert(&target, item).is_some()))
            }

            // Strings
            "indexOf" => {
                check_arity(name, args, 1, 1)?;
                self.string_function(name, input, |text| {
                    let needle = self.string_argument(name, &args[0], scope)?;
                    Ok(needle.map(|needle| {
                        let index = text
                            .find(&needle)
                            .map(|byte| text[..byte].chars().count() as i64)
                            .unwrap_or(-1);
                        FhirPathValue::Integer(index)
                    }))
                })
            }
            "substring" => {
                check_arity(name, args, 1, 2)?;
                self.string_function(name, input, |text| {
                    let Some(start) = self.integer_argument(name, &args[0], scope)? else {
                        return Ok(None);
                    };
                    let length = match args.get(1) {
                        Some(arg) => self.integer_argument(name, arg, scope)?,
                        None => None,
                    };
                    let chars: Vec<char> = text.chars().collect();
                    let Ok(start) = usize::try_from(start) else {
                        return Ok(None);
                    };
                    if start >= chars.len() {
                        return Ok(None);
                    }
                    let end = match length {
                        Some(length) => start.saturating_add(usize::try_from(length.max(0)).unwrap_or(0)),
                        None => chars.len(),
                    }
                    .min(chars.len());
                    Ok(Some(FhirPathValue::String(chars[start..end].iter().collect())))
                })
            }
            "startsWith" | "endsWith" | "contains" => {
                check_arity(name, args, 1, 1)?;
                self.string_function(name, input, |text| {
                    let needle = self.string_argument(name, &args[0], scope)?;
                    Ok(needle.map(|needle| {
                        let result = match name {
                            "startsWith" => text.starts_with(&needle),
                            "endsWith" => text.ends_with(&needle),
                            _ => text.contains(&needle),
                        };
                        FhirPathValue::Boolean(result)
                    }))
                })
            }
            "upper" | "lower" | "trim" | "length" | "toChars" => {
                check_arity(name, args, 0, 0)?;
                if name == "toChars" {
                    let Some(text) = single_string(name, input)? else {
                        return Ok(Collection::empty());
                    };
                    return Ok(text.chars().map(|c| FhirPathValue::String(c.to_string())).collect());
                }
                self.string_function(name, input, |text| {
                    Ok(Some(match name {
                        "upper" => FhirPathValue::String(text.to_uppercase()),
                        "lower" => FhirPathValue::String(text.to_lowercase()),
                        "trim" => FhirPathValue::String(text.trim().to_string()),
                        _ => FhirPathValue::Integer(text.chars().count() as i64),
                    }))
                })
            }
            "replace" => {
                check_arity(name, args, 2, 2)?;
                self.string_function(name, input, |text| {
                    let pattern = self.string_argument(name, &args[0], scope)?;
                    let substitution = self.string_argument(name, &args[1], scope)?;
                    Ok(pattern
                        .zip(substitution)
                        .map(|(pattern, substitution)| FhirPathValue::String(text.replace(&pattern, &substitution))))
                })
            }
            "matches" => {
                check_arity(name, args, 1, 1)?;
                self.string_function(name, input, |text| {
                    let Some(pattern) = self.string_argument(name, &args[0], scope)? else {
                        return Ok(None);
                    };
                    let regex = compile_regex(&pattern)?;
                    Ok(Some(FhirPathValue::Boolean(regex.is_match(text))))
                })
            }
            "replaceMatches" => {
                check_arity(name, args, 2, 2)?;
                self.string_function(name, input, |text| {
                    let pattern = self.string_argument(name, &args[0], scope)?;
                    let substitution = self.string_argument(name, &args[1], scope)?;
                    let (Some(pattern), Some(substitution)) = (pattern, substitution) else {
                        return Ok(None);
                    };
                    let regex = compile_regex(&pattern)?;
                    Ok(Some(FhirPathValue::String(
                        regex.replace_all(text, substitution.as_str()).into_owned(),
                    )))
                })
            }
            "split" => {
                check_arity(name, args, 1, 1)?;
                let Some(text) = single_string(name, input)? else {
                    return Ok(Collection::empty());
                };
                let Some(separator) = self.string_argument(name, &args[0], scope)? else {
                    return Ok(Collection::empty());
                };
                Ok(text
                    .split(separator.as_str())
                    .map(|part| FhirPathValue::String(part.to_string()))
                    .collect())
            }
            "join" => {
                check_arity(name, args, 0, 1)?;
                let separator = match args.first() {
                    Some(arg) => self.string_argument(name, arg, scope)?.unwrap_or_default(),
                    None => String::new(),
                };
                let parts = input
                    .iter()
                    .map(|v| {
                        v.to_primitive_string().ok_or_else(|| {
                            FhirPathError::evaluation_error("join() requires a collection of strings")
                        })
                    })
                    .collect::<Result<Vec<_>>>()?;
                Ok(Collection::single(FhirPathValue::String(parts.join(&separator))))
            }

            // Math
            "abs" | "ceiling" | "floor" | "sqrt" | "round" => {
                check_arity(name, args, 0, if name == "round" { 1 } else { 0 })?;
                let precision = match args.first() {
                    Some(arg) => self.integer_argument(name, arg, scope)?.unwrap_or(0),
                    None => 0,
                };
                let Some(item) = single_item(name, input)? else {
                    return Ok(Collection::empty());
                };
                Ok(math(name, item, precision)?.map(Collection::single).unwrap_or_default())
            }

            // Tree navigation
            "children" => {
                check_arity(name, args, 0, 0)?;
                Ok(self.children(input))
            }
            "descendants" => {
                check_arity(name, args, 0, 0)?;
                let mut result = Collection::new();
                let mut frontier = self.children(input);
                let mut depth = 0;
                while !frontier.is_empty() && depth < MAX_REPEAT_DEPTH {
                    let next = self.children(&frontier);
                    result.extend(frontier);
                    frontier = next;
                    depth += 1;
                }
                Ok(result)
            }
            "extension" => {
                check_arity(name, args, 1, 1)?;
                let Some(url) = self.string_argument(name, &args[0], scope)? else {
                    return Ok(Collection::empty());
                };
                let extensions = self.navigate(input, "extension");
                Ok(extensions
                    .into_iter()
                    .filter(|ext| match ext {
                        FhirPathValue::Resource(node) => {
                            node.get_property("url").and_then(|u| u.as_str()) == Some(url.as_str())
                        }
                        _ => false,
                    })
                    .collect())
            }

            // Utility
            "trace" => {
                check_arity(name, args, 1, 2)?;
                let label = self
                    .string_argument(name, &args[0], scope)?
                    .unwrap_or_default();
                match args.get(1) {
                    Some(projection) => {
                        let mut projected = Collection::new();
                        for (index, item) in input.iter().enumerate() {
                            projected.extend(self.evaluate_for_item(projection, item, index, scope)?);
                        }
                        self.context.tracer().trace(&label, &projected);
                    }
                    None => self.context.tracer().trace(&label, input),
                }
                Ok(input.clone())
            }
            "now" => {
                check_arity(name, args, 0, 0)?;
                let now = chrono::Local::now();
                Ok(Collection::single(FhirPathValue::DateTime(
                    now.format("%Y-%m-%dT%H:%M:%S%.3f%:z").to_string(),
                )))
            }
            "today" => {
                check_arity(name, args, 0, 0)?;
                let today = chrono::Local::now().date_naive();
                Ok(Collection::single(FhirPathValue::Date(today.format("%Y-%m-%d").to_string())))
            }
            "timeOfDay" => {
                check_arity(name, args, 0, 0)?;
                let now = chrono::Local::now().time();
                Ok(Collection::single(FhirPathValue::Time(now.format("%H:%M:%S%.3f").to_string())))
            }

            other => Err(FhirPathError::UnknownFunction {
                name: other.to_string(),
            }),
        }
    }

    fn evaluate_for_item(
        &self,
        expression: &ExpressionNode,
        item: &FhirPathValue,
        index: usize,
        scope: &Scope,
    ) -> Result<Collection> {
        let item_scope = scope.for_item(item, index);
        let focus = item_scope.this.clone();
        self.evaluate(expression, &focus, &item_scope)
    }

    fn filter(&self, input: &Collection, criteria: &ExpressionNode, scope: &Scope) -> Result<Collection> {
        let mut result = Collection::new();
        for (index, item) in input.iter().enumerate() {
            let matched = self.evaluate_for_item(criteria, item, index, scope)?;
            if singleton_boolean(&matched)? == Some(true) {
                result.push(item.clone());
            }
        }
        Ok(result)
    }

    fn repeat(&self, input: &Collection, projection: &ExpressionNode, scope: &Scope) -> Result<Collection> {
        let mut result = Collection::new();
        let mut frontier = input.clone();
        for _ in 0..MAX_REPEAT_DEPTH {
            let mut next = Collection::new();
            for (index, item) in frontier.iter().enumerate() {
                for value in self.evaluate_for_item(projection, item, index, scope)? {
                    if !result.contains_value(&value) {
                        result.push(value.clone());
                        next.push(value);
                    }
                }
            }
            if next.is_empty() {
                return Ok(result);
            }
            frontier = next;
        }
        Err(FhirPathError::evaluation_error("repeat() exceeded the maximum depth"))
    }

    /// Evaluates an argument against `$this` and reads it as one string.
    fn string_argument(&self, name: &str, arg: &ExpressionNode, scope: &Scope) -> Result<Option<String>> {
        let value = self.evaluate(arg, &scope.this, scope)?;
        single_string(name, &value)
    }

    fn integer_argument(&self, name: &str, arg: &ExpressionNode, scope: &Scope) -> Result<Option<i64>> {
        let value = self.evaluate(arg, &scope.this, scope)?;
        match value.as_slice() {
            [] => Ok(None),
            [FhirPathValue::Integer(i)] => Ok(Some(*i)),
            _ => Err(FhirPathError::evaluation_error(format!(
                "{name}() expects an integer argument"
            ))),
        }
    }

    fn string_function<F>(&self, name: &str, input: &Collection, apply: F) -> Result<Collection>
    where
        F: FnOnce(&str) -> Result<Option<FhirPathValue>>,
    {
        let Some(text) = single_string(name, input)? else {
            return Ok(Collection::empty());
        };
        Ok(apply(&text)?.map(Collection::single).unwrap_or_default())
    }
}

fn single_item<'c>(name: &str, input: &'c Collection) -> Result<Option<&'c FhirPathValue>> {
    match input.as_slice() {
        [] => Ok(None),
        [item] => Ok(Some(item)),
        _ => Err(FhirPathError::evaluation_error(format!(
            "{name}() requires a single item but the input has {}",
            input.len()
        ))),
    }
}

fn single_string(name: &str, input: &Collection) -> Result<Option<String>> {
    match single_item(name, input)? {
        None => Ok(None),
        Some(FhirPathValue::String(text)) => Ok(Some(text.clone())),
        Some(other) => other.to_primitive_string().map(Some).ok_or_else(|| {
            FhirPathError::evaluation_error(format!("{name}() requires a string input"))
        }),
    }
}

fn type_argument(name: &str, arg: &ExpressionNode) -> Result<String> {
    arg.as_type_specifier().ok_or_else(|| {
        FhirPathError::evaluation_error(format!("{name}() expects a type name argument"))
    })
}

fn convert(target: &str, item: &FhirPathValue) -> Option<FhirPathValue> {
    match target {
        "toString" => match item {
            FhirPathValue::Quantity { .. } => Some(FhirPathValue::String(item.to_string())),
            other => other.to_primitive_string().map(FhirPathValue::String),
        },
        "toInteger" => match item {
            FhirPathValue::Integer(i) => Some(FhirPathValue::Integer(*i)),
            FhirPathValue::Boolean(b) => Some(FhirPathValue::Integer(i64::from(*b))),
            FhirPathValue::String(s) => s.parse::<i64>().ok().map(FhirPathValue::Integer),
            _ => None,
        },
        "toDecimal" => match item {
            FhirPathValue::Integer(_) | FhirPathValue::Decimal(_) => item.as_decimal().map(FhirPathValue::Decimal),
            FhirPathValue::Boolean(b) => Some(FhirPathValue::Decimal(Decimal::from(i64::from(*b)))),
            FhirPathValue::String(s) => Decimal::from_str(s).ok().map(FhirPathValue::Decimal),
            _ => None,
        },
        "toBoolean" => match item {
            FhirPathValue::Boolean(b) => Some(FhirPathValue::Boolean(*b)),
            FhirPathValue::Integer(1) => Some(FhirPathValue::Boolean(true)),
            FhirPathValue::Integer(0) => Some(FhirPathValue::Boolean(false)),
            FhirPathValue::String(s) => match s.to_lowercase().as_str() {
                "true" | "t" | "yes" | "y" | "1" | "1.0" => Some(FhirPathValue::Boolean(true)),
                "false" | "f" | "no" | "n" | "0" | "0.0" => Some(FhirPathValue::Boolean(false)),
                _ => None,
            },
            _ => None,
        },
        _ => None,
    }
}

fn math(name: &str, item: &FhirPathValue, precision: i64) -> Result<Option<FhirPathValue>> {
    let value = match item {
        FhirPathValue::Integer(i) if name == "abs" => return Ok(i.checked_abs().map(FhirPathValue::Integer)),
        FhirPathValue::Integer(i) if matches!(name, "ceiling" | "floor") => {
            return Ok(Some(FhirPathValue::Integer(*i)));
        }
        FhirPathValue::Integer(_) | FhirPathValue::Decimal(_) => item.as_decimal(),
        _ => {
            return Err(FhirPathError::evaluation_error(format!(
                "{name}() requires a numeric input"
            )));
        }
    };
    let Some(value) = value else {
        return Ok(None);
    };
    let result = match name {
        "abs" => FhirPathValue::Decimal(value.abs()),
        "ceiling" => i64::try_from(value.ceil()).ok().map(FhirPathValue::Integer).ok_or_else(overflow)?,
        "floor" => i64::try_from(value.floor()).ok().map(FhirPathValue::Integer).ok_or_else(overflow)?,
        "round" => {
            let places = u32::try_from(precision)
                .map_err(|_| FhirPathError::evaluation_error("round() precision must be non-negative"))?;
            FhirPathValue::Decimal(value.round_dp(places))
        }
        _ => {
            let Some(root) = value.to_f64().filter(|v| *v >= 0.0).map(f64::sqrt) else {
                return Ok(None);
            };
            match Decimal::from_f64(root) {
                Some(root) => FhirPathValue::Decimal(root),
                None => return Ok(None),
            }
        }
    };
    Ok(Some(result))
}

fn overflow() -> FhirPathError {
    FhirPathError::evaluation_error("Numeric overflow")
}

#[cfg(test)]
mod tests {
    use crate::engine::{
        CollectingTraceProvider, Collection, EvaluationContext, FhirPathEngine, FhirPathError, FhirPathValue,
    };
    use rstest::rstest;
    use serde_json::json;
    use std::sync::Arc;

    fn context() -> EvaluationContext {
        let patient = json!({
            "resourceType": "Patient",
            "name": [
                {"use": "official", "given": ["Alice", "B."], "family": "Smith"},
                {"use": "nickname", "given": ["Jim"]}
            ],
            "extension": [
                {"url": "http://example.org/eye-colour", "valueString": "blue"}
            ],
            "telecom": [{"system": "phone", "value": "555-1234"}]
        });
        EvaluationContext::new(FhirPathValue::from_json(&patient, None).unwrap())
    }

    fn eval(expression: &str) -> Collection {
        let ctx = context();
        FhirPathEngine::default().evaluate_expression(expression, &ctx).unwrap()
    }

    fn single(expression: &str) -> FhirPathValue {
        let result = eval(expression);
        assert_eq!(result.len(), 1, "expected one value for {expression}");
        result[0].clone()
    }

    #[rstest]
    #[case("Patient.name.given.first()", FhirPathValue::string("Alice"))]
    #[case("Patient.name.given.last()", FhirPathValue::string("Jim"))]
    #[case("name.given.count()", FhirPathValue::Integer(3))]
    #[case("name.where(use = 'nickname').given.single()", FhirPathValue::string("Jim"))]
    #[case("name.select(given.first()).last()", FhirPathValue::string("Jim"))]
    #[case("name.given.skip(1).first()", FhirPathValue::string("B."))]
    #[case("name.given.take(2).count()", FhirPathValue::Integer(2))]
    #[case("name.exists(family = 'Smith')", FhirPathValue::Boolean(true))]
    #[case("name.all(given.exists())", FhirPathValue::Boolean(true))]
    #[case("name.given.join(', ')", FhirPathValue::string("Alice, B., Jim"))]
    #[case("name.family.upper()", FhirPathValue::string("SMITH"))]
    #[case("name.family.substring(1, 3)", FhirPathValue::string("mit"))]
    #[case("name.family.indexOf('th')", FhirPathValue::Integer(3))]
    #[case("name.family.matches('^S.*h$')", FhirPathValue::Boolean(true))]
    #[case("name.family.replaceMatches('[aeiou]', '_')", FhirPathValue::string("Sm_th"))]
    #[case("iif(name.exists(), 'yes', 'no')", FhirPathValue::string("yes"))]
    #[case("extension('http://example.org/eye-colour').value", FhirPathValue::string("blue"))]
    #[case("'1.5'.toDecimal() + 1", FhirPathValue::Decimal(rust_decimal::Decimal::new(25, 1)))]
    #[case("(-5).abs()", FhirPathValue::Integer(5))]
    #[case("3.7.floor()", FhirPathValue::Integer(3))]
    #[case("'true'.toBoolean().not()", FhirPathValue::Boolean(false))]
    #[case("(1 | 2 | 2).count()", FhirPathValue::Integer(2))]
    #[case("(1).combine(1).count()", FhirPathValue::Integer(2))]
    #[case("telecom.value.convertsToInteger()", FhirPathValue::Boolean(false))]
    fn evaluates_functions(#[case] expression: &str, #[case] expected: FhirPathValue) {
        assert_eq!(single(expression), expected);
    }

    #[test]
    fn empty_input_propagates() {
        assert!(eval("name.suffix.first()").is_empty());
        assert!(eval("{}.upper()").is_empty());
        assert_eq!(single("{}.empty()"), FhirPathValue::Boolean(true));
    }

    #[test]
    fn of_type_filters_by_type() {
        assert_eq!(single("Patient.ofType(Patient).count()"), FhirPathValue::Integer(1));
        assert_eq!(single("name.given.ofType(String).count()"), FhirPathValue::Integer(3));
        assert_eq!(single("name.given.ofType(Integer).count()"), FhirPathValue::Integer(0));
    }

    #[test]
    fn unknown_function_reports_name() {
        let ctx = context();
        let err = FhirPathEngine::default()
            .evaluate_expression("name.frobnicate()", &ctx)
            .unwrap_err();
        assert_eq!(
            err,
            FhirPathError::UnknownFunction {
                name: "frobnicate".to_string()
            }
        );
    }

    #[test]
    fn single_fails_on_many_items() {
        let ctx = context();
        let err = FhirPathEngine::default()
            .evaluate_expression("name.given.single()", &ctx)
            .unwrap_err();
        assert!(err.to_string().contains("more than one item"));
    }

    #[test]
    fn trace_reports_input_and_passes_it_through() {
        let tracer = Arc::new(CollectingTraceProvider::new());
        let ctx = context().with_tracer(tracer.clone());
        let result = FhirPathEngine::default()
            .evaluate_expression("name.trace('names').given.trace('given', $this.upper()).first()", &ctx)
            .unwrap();
        assert_eq!(result.to_vec(), vec![FhirPathValue::string("Alice")]);

        let entries = tracer.take_entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].label, "names");
        assert_eq!(entries[0].values.len(), 2);
        assert_eq!(entries[1].label, "given");
        assert_eq!(entries[1].values[0], FhirPathValue::string("ALICE"));
    }

    #[test]
    fn repeat_walks_nested_items() {
        let questionnaire = json!({
            "resourceType": "Questionnaire",
            "item": [
                {"linkId": "1", "item": [{"linkId": "1.1"}, {"linkId": "1.2"}]},
                {"linkId": "2"}
            ]
        });
        let ctx = EvaluationContext::new(FhirPathValue::from_json(&questionnaire, None).unwrap());
        let result = FhirPathEngine::default()
            .evaluate_expression("repeat(item).linkId", &ctx)
            .unwrap();
        let ids: Vec<_> = result.iter().filter_map(FhirPathValue::as_str).collect();
        assert_eq!(ids, vec!["1", "2", "1.1", "1.2"]);
    }

    #[test]
    fn index_variable_inside_lambdas() {
        assert_eq!(
            eval("name.select($index)").to_vec(),
            vec![FhirPathValue::Integer(0), FhirPathValue::Integer(1)]
        );
    }
}
