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

//! Binary and unary operator semantics

use super::ast::BinaryOperator;
use super::error::{FhirPathError, Result};
use super::evaluator::singleton_boolean;
use super::value::{Collection, FhirPathValue, compare_values, values_equal, values_equivalent};
use rust_decimal::Decimal;
use std::cmp::Ordering;

pub(super) fn evaluate_binary(op: BinaryOperator, left: Collection, right: Collection) -> Result<Collection> {
    match op {
        BinaryOperator::Equal => Ok(equality(&left, &right).map(Collection::boolean).unwrap_or_default()),
        BinaryOperator::NotEqual => Ok(equality(&left, &right)
            .map(|eq| Collection::boolean(!eq))
            .unwrap_or_default()),
        BinaryOperator::Equivalent => Ok(Collection::boolean(equivalence(&left, &right))),
        BinaryOperator::NotEquivalent => Ok(Collection::boolean(!equivalence(&left, &right))),
        BinaryOperator::LessThan
        | BinaryOperator::LessThanOrEqual
        | BinaryOperator::GreaterThan
        | BinaryOperator::GreaterThanOrEqual => comparison(op, &left, &right),
        BinaryOperator::Add
        | BinaryOperator::Subtract
        | BinaryOperator::Multiply
        | BinaryOperator::Divide
        | BinaryOperator::IntegerDivide
        | BinaryOperator::Modulo => arithmetic(op, &left, &right),
        BinaryOperator::Concatenate => concatenate(&left, &right),
        BinaryOperator::Union => {
            let mut result = left;
            result.extend(right);
            Ok(result.distinct())
        }
        BinaryOperator::And | BinaryOperator::Or | BinaryOperator::Xor | BinaryOperator::Implies => {
            logical(op, singleton_boolean(&left)?, singleton_boolean(&right)?)
        }
        BinaryOperator::In => membership(&left, &right),
        BinaryOperator::Contains => membership(&right, &left),
    }
}

pub(super) fn negate(operand: Collection) -> Result<Collection> {
    match operand.as_slice() {
        [] => Ok(Collection::empty()),
        [FhirPathValue::Integer(i)] => i
            .checked_neg()
            .map(|v| Collection::single(FhirPathValue::Integer(v)))
            .ok_or_else(|| FhirPathError::evaluation_error("Integer overflow")),
        [FhirPathValue::Decimal(d)] => Ok(Collection::single(FhirPathValue::Decimal(-*d))),
        [FhirPathValue::Quantity { value, unit }] => Ok(Collection::single(FhirPathValue::Quantity {
            value: -*value,
            unit: unit.clone(),
        })),
        _ => Err(FhirPathError::evaluation_error(
            "Unary '-' requires a single numeric operand",
        )),
    }
}

fn equality(left: &Collection, right: &Collection) -> Option<bool> {
    if left.is_empty() || right.is_empty() {
        return None;
    }
    if left.len() != right.len() {
        return Some(false);
    }
    Some(left.iter().zip(right.iter()).all(|(a, b)| values_equal(a, b)))
}

fn equivalence(left: &Collection, right: &Collection) -> bool {
    left.len() == right.len()
        && left
            .iter()
            .all(|a| right.iter().any(|b| values_equivalent(a, b)))
}

fn single<'c>(collection: &'c Collection, op: BinaryOperator) -> Result<&'c FhirPathValue> {
    match collection.as_slice() {
        [value] => Ok(value),
        _ => Err(FhirPathError::evaluation_error(format!(
            "Operator '{op}' requires single items on both sides"
        ))),
    }
}

fn comparison(op: BinaryOperator, left: &Collection, right: &Collection) -> Result<Collection> {
    if left.is_empty() || right.is_empty() {
        return Ok(Collection::empty());
    }
    let (a, b) = (single(left, op)?, single(right, op)?);
    let Some(ordering) = compare_values(a, b) else {
        return Ok(Collection::empty());
    };
    let result = match op {
        BinaryOperator::LessThan => ordering == Ordering::Less,
        BinaryOperator::LessThanOrEqual => ordering != Ordering::Greater,
        BinaryOperator::GreaterThan => ordering == Ordering::Greater,
        _ => ordering != Ordering::Less,
    };
    Ok(Collection::boolean(result))
}

fn arithmetic(op: BinaryOperator, left: &Collection, right: &Collection) -> Result<Collection> {
    if left.is_empty() || right.is_empty() {
        return Ok(Collection::empty());
    }
    let (a, b) = (single(left, op)?, single(right, op)?);

    use FhirPathValue::*;
    let value = match (a, b) {
        (Integer(x), Integer(y)) => integer_arithmetic(op, *x, *y)?,
        (Integer(_) | Decimal(_), Integer(_) | Decimal(_)) => {
            let (x, y) = (a.as_decimal(), b.as_decimal());
            match (x, y) {
                (Some(x), Some(y)) => decimal_arithmetic(op, x, y),
                _ => None,
            }
        }
        (String(x), String(y)) if op == BinaryOperator::Add => Some(String(format!("{x}{y}"))),
        (Quantity { value: x, unit: ux }, Quantity { value: y, unit: uy })
            if ux == uy && matches!(op, BinaryOperator::Add | BinaryOperator::Subtract) =>
        {
            decimal_arithmetic(op, *x, *y).and_then(|v| match v {
                Decimal(value) => Some(Quantity {
                    value,
                    unit: ux.clone(),
                }),
                _ => None,
            })
        }
        _ => {
            return Err(FhirPathError::evaluation_error(format!(
                "Operator '{op}' is not defined for {} and {}",
                a.type_name(),
                b.type_name()
            )));
        }
    };
    Ok(value.map(Collection::single).unwrap_or_default())
}

fn integer_arithmetic(op: BinaryOperator, x: i64, y: i64) -> Result<Option<FhirPathValue>> {
    let value = match op {
        BinaryOperator::Add => x.checked_add(y).map(FhirPathValue::Integer),
        BinaryOperator::Subtract => x.checked_sub(y).map(FhirPathValue::Integer),
        BinaryOperator::Multiply => x.checked_mul(y).map(FhirPathValue::Integer),
        BinaryOperator::Divide => return Ok(decimal_arithmetic(op, Decimal::from(x), Decimal::from(y))),
        BinaryOperator::IntegerDivide => x.checked_div(y).map(FhirPathValue::Integer),
        BinaryOperator::Modulo => x.checked_rem(y).map(FhirPathValue::Integer),
        _ => None,
    };
    Ok(value)
}

/// Division by zero and overflow yield empty.
fn decimal_arithmetic(op: BinaryOperator, x: Decimal, y: Decimal) -> Option<FhirPathValue> {
    match op {
        BinaryOperator::Add => x.checked_add(y).map(FhirPathValue::Decimal),
        BinaryOperator::Subtract => x.checked_sub(y).map(FhirPathValue::Decimal),
        BinaryOperator::Multiply => x.checked_mul(y).map(FhirPathValue::Decimal),
        BinaryOperator::Divide => x.checked_div(y).map(|v| FhirPathValue::Decimal(v.normalize())),
        BinaryOperator::IntegerDivide => x
            .checked_div(y)
            .and_then(|v| i64::try_from(v.trunc()).ok())
            .map(FhirPathValue::Integer),
        BinaryOperator::Modulo => x.checked_rem(y).map(FhirPathValue::Decimal),
        _ => None,
    }
}

fn concatenate(left: &Collection, right: &Collection) -> Result<Collection> {
    let text = |collection: &Collection| -> Result<String> {
        match collection.as_slice() {
            [] => Ok(String::new()),
            [value] => value.to_primitive_string().ok_or_else(|| {
                FhirPathError::evaluation_error("Operator '&' requires string operands")
            }),
            _ => Err(FhirPathError::evaluation_error(
                "Operator '&' requires single items on both sides",
            )),
        }
    };
    Ok(Collection::single(FhirPathValue::String(format!(
        "{}{}",
        text(left)?,
        text(right)?
    ))))
}

fn logical(op: BinaryOperator, left: Option<bool>, right: Option<bool>) -> Result<Collection> {
    let result = match op {
        BinaryOperator::And => match (left, right) {
            (Some(false), _) | (_, Some(false)) => Some(false),
            (Some(true), Some(true)) => Some(true),
            _ => None,
        },
        BinaryOperator::Or => match (left, right) {
            (Some(true), _) | (_, Some(true)) => Some(true),
            (Some(false), Some(false)) => Some(false),
            _ => None,
        },
        BinaryOperator::Xor => match (left, right) {
            (Some(a), Some(b)) => Some(a != b),
            _ => None,
        },
        BinaryOperator::Implies => match (left, right) {
            (Some(false), _) | (_, Some(true)) => Some(true),
            (Some(true), Some(false)) => Some(false),
            _ => None,
        },
        _ => None,
    };
    Ok(result.map(Collection::boolean).unwrap_or_default())
}

fn membership(item: &Collection, container: &Collection) -> Result<Collection> {
    match item.as_slice() {
        [] => Ok(Collection::empty()),
        [value] => Ok(Collection::boolean(container.contains_value(value))),
        _ => Err(FhirPathError::evaluation_error(
            "Membership operators require a single item",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn int(i: i64) -> Collection {
        Collection::single(FhirPathValue::Integer(i))
    }

    fn boolean(b: Option<bool>) -> Collection {
        b.map(Collection::boolean).unwrap_or_default()
    }

    #[rstest]
    #[case(BinaryOperator::Add, 7, 2, Some(FhirPathValue::Integer(9)))]
    #[case(BinaryOperator::Subtract, 7, 2, Some(FhirPathValue::Integer(5)))]
    #[case(BinaryOperator::Multiply, 7, 2, Some(FhirPathValue::Integer(14)))]
    #[case(BinaryOperator::Divide, 7, 2, Some(FhirPathValue::Decimal(Decimal::new(35, 1))))]
    #[case(BinaryOperator::IntegerDivide, 7, 2, Some(FhirPathValue::Integer(3)))]
    #[case(BinaryOperator::Modulo, 7, 2, Some(FhirPathValue::Integer(1)))]
    #[case(BinaryOperator::IntegerDivide, 7, 0, None)]
    #[case(BinaryOperator::Divide, 7, 0, None)]
    fn integer_operators(
        #[case] op: BinaryOperator,
        #[case] left: i64,
        #[case] right: i64,
        #[case] expected: Option<FhirPathValue>,
    ) {
        let result = evaluate_binary(op, int(left), int(right)).unwrap();
        assert_eq!(result.first().cloned(), expected);
    }

    #[rstest]
    #[case(BinaryOperator::And, Some(true), None, None)]
    #[case(BinaryOperator::And, Some(false), None, Some(false))]
    #[case(BinaryOperator::Or, None, Some(true), Some(true))]
    #[case(BinaryOperator::Or, Some(false), None, None)]
    #[case(BinaryOperator::Xor, Some(true), Some(false), Some(true))]
    #[case(BinaryOperator::Implies, Some(false), None, Some(true))]
    #[case(BinaryOperator::Implies, Some(true), None, None)]
    fn three_valued_logic(
        #[case] op: BinaryOperator,
        #[case] left: Option<bool>,
        #[case] right: Option<bool>,
        #[case] expected: Option<bool>,
    ) {
        let result = evaluate_binary(op, boolean(left), boolean(right)).unwrap();
        assert_eq!(result, boolean(expected));
    }

    #[test]
    fn equality_with_empty_is_empty() {
        assert!(evaluate_binary(BinaryOperator::Equal, int(1), Collection::empty())
            .unwrap()
            .is_empty());
        assert_eq!(
            evaluate_binary(BinaryOperator::Equivalent, Collection::empty(), Collection::empty()).unwrap(),
            Collection::boolean(true)
        );
    }

    #[test]
    fn union_removes_duplicates() {
        let mut left = int(1);
        left.push(FhirPathValue::Integer(2));
        let result = evaluate_binary(BinaryOperator::Union, left, int(2)).unwrap();
        assert_eq!(result.len(), 2);
    }

    #[test]
    fn concatenation_treats_empty_as_empty_string() {
        let result = evaluate_binary(
            BinaryOperator::Concatenate,
            Collection::single(FhirPathValue::string("a")),
            Collection::empty(),
        )
        .unwrap();
        assert_eq!(result, Collection::single(FhirPathValue::string("a")));
    }

    #[test]
    fn comparison_requires_singletons() {
        let mut many = int(1);
        many.push(FhirPathValue::Integer(2));
        assert!(evaluate_binary(BinaryOperator::LessThan, many, int(3)).is_err());
    }

    #[test]
    fn membership_operators() {
        let mut list = int(1);
        list.push(FhirPathValue::Integer(2));
        assert_eq!(
            evaluate_binary(BinaryOperator::In, int(2), list.clone()).unwrap(),
            Collection::boolean(true)
        );
        assert_eq!(
            evaluate_binary(BinaryOperator::Contains, list, int(5)).unwrap(),
            Collection::boolean(false)
        );
    }
}
