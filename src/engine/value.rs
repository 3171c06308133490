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

//! Value types produced by FHIRPath evaluation
//!
//! Every evaluation result is a [`Collection`]. Primitive values carry their
//! FHIRPath kind; JSON objects (resources and complex elements) are kept as
//! shared JSON together with the type name the model assigned to them.

use rust_decimal::Decimal;
use serde_json::{Number, Value as JsonValue};
use smallvec::SmallVec;
use std::cmp::Ordering;
use std::fmt;
use std::ops::Deref;
use std::str::FromStr;
use std::sync::Arc;

/// Type name used for JSON objects whose type is not known to the model
pub const UNKNOWN_ELEMENT_TYPE: &str = "Element";

#[derive(Debug, Clone, PartialEq)]
pub enum FhirPathValue {
    Boolean(bool),
    Integer(i64),
    Decimal(Decimal),
    String(String),
    /// Partial dates are kept as written (`2024`, `2024-01`, `2024-01-15`)
    Date(String),
    DateTime(String),
    Time(String),
    Quantity { value: Decimal, unit: String },
    /// Resource or complex element
    Resource(FhirResource),
}

/// JSON object node with its declared type
#[derive(Debug, Clone, PartialEq)]
pub struct FhirResource {
    json: Arc<JsonValue>,
    type_name: Option<String>,
}

impl FhirResource {
    pub fn new(json: Arc<JsonValue>, type_name: Option<String>) -> Self {
        Self { json, type_name }
    }

    /// Wraps a resource, taking its type from `resourceType`.
    pub fn from_json(json: JsonValue) -> Self {
        let type_name = json
            .get("resourceType")
            .and_then(JsonValue::as_str)
            .map(str::to_string);
        Self {
            json: Arc::new(json),
            type_name,
        }
    }

    pub fn json(&self) -> &JsonValue {
        &self.json
    }

    pub fn shared_json(&self) -> Arc<JsonValue> {
        Arc::clone(&self.json)
    }

    pub fn type_name(&self) -> Option<&str> {
        self.type_name.as_deref()
    }

    pub fn resource_type(&self) -> Option<&str> {
        self.json.get("resourceType").and_then(JsonValue::as_str)
    }

    pub fn get_property(&self, name: &str) -> Option<&JsonValue> {
        self.json.as_object().and_then(|object| object.get(name))
    }
}

impl FhirPathValue {
    pub fn string(value: impl Into<String>) -> Self {
        Self::String(value.into())
    }

    /// Converts a JSON leaf into a value. Objects become typed nodes, arrays
    /// and nulls yield `None` (callers flatten arrays themselves).
    pub fn from_json(json: &JsonValue, type_hint: Option<&str>) -> Option<Self> {
        match json {
            JsonValue::Bool(b) => Some(Self::Boolean(*b)),
            JsonValue::String(s) => Some(Self::String(s.clone())),
            JsonValue::Number(n) => Some(number_to_value(n)),
            JsonValue::Object(_) => {
                let type_name = json
                    .get("resourceType")
                    .and_then(JsonValue::as_str)
                    .or(type_hint)
                    .map(str::to_string);
                Some(Self::Resource(FhirResource::new(
                    Arc::new(json.clone()),
                    type_name,
                )))
            }
            JsonValue::Array(_) | JsonValue::Null => None,
        }
    }

    /// FHIRPath type name of this value
    pub fn type_name(&self) -> &str {
        match self {
            Self::Boolean(_) => "boolean",
            Self::Integer(_) => "integer",
            Self::Decimal(_) => "decimal",
            Self::String(_) => "string",
            Self::Date(_) => "date",
            Self::DateTime(_) => "dateTime",
            Self::Time(_) => "time",
            Self::Quantity { .. } => "Quantity",
            Self::Resource(resource) => resource.type_name().unwrap_or(UNKNOWN_ELEMENT_TYPE),
        }
    }

    /// Text form of primitive values; `None` for quantities and JSON nodes.
    pub fn to_primitive_string(&self) -> Option<String> {
        match self {
            Self::Boolean(b) => Some(b.to_string()),
            Self::Integer(i) => Some(i.to_string()),
            Self::Decimal(d) => Some(d.to_string()),
            Self::String(s) | Self::Date(s) | Self::DateTime(s) | Self::Time(s) => Some(s.clone()),
            Self::Quantity { .. } | Self::Resource(_) => None,
        }
    }

    pub fn is_primitive(&self) -> bool {
        !matches!(self, Self::Quantity { .. } | Self::Resource(_))
    }

    /// JSON rendering used in responses
    pub fn to_json(&self) -> JsonValue {
        match self {
            Self::Boolean(b) => JsonValue::Bool(*b),
            Self::Integer(i) => JsonValue::from(*i),
            Self::Decimal(d) => decimal_to_json(d),
            Self::String(s) | Self::Date(s) | Self::DateTime(s) | Self::Time(s) => {
                JsonValue::String(s.clone())
            }
            Self::Quantity { value, unit } => serde_json::json!({
                "value": decimal_to_json(value),
                "unit": unit,
            }),
            Self::Resource(resource) => resource.json().clone(),
        }
    }

    pub fn as_boolean(&self) -> Option<bool> {
        match self {
            Self::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Numeric view for arithmetic across integer and decimal
    pub fn as_decimal(&self) -> Option<Decimal> {
        match self {
            Self::Integer(i) => Some(Decimal::from(*i)),
            Self::Decimal(d) => Some(*d),
            _ => None,
        }
    }

    /// Checks the value against a type specifier, with or without the
    /// `System.` / `FHIR.` namespace.
    pub fn is_of_type(&self, specifier: &str) -> bool {
        let name = specifier
            .strip_prefix("System.")
            .or_else(|| specifier.strip_prefix("FHIR."))
            .unwrap_or(specifier);
        match self {
            Self::Boolean(_) => matches!(name, "Boolean" | "boolean"),
            Self::Integer(_) => matches!(
                name,
                "Integer" | "integer" | "positiveInt" | "unsignedInt" | "integer64"
            ),
            Self::Decimal(_) => matches!(name, "Decimal" | "decimal"),
            Self::String(_) => matches!(
                name,
                "String"
                    | "string"
                    | "code"
                    | "id"
                    | "uri"
                    | "url"
                    | "canonical"
                    | "markdown"
                    | "oid"
                    | "uuid"
                    | "base64Binary"
            ),
            Self::Date(_) => matches!(name, "Date" | "date"),
            Self::DateTime(_) => matches!(name, "DateTime" | "dateTime" | "instant"),
            Self::Time(_) => matches!(name, "Time" | "time"),
            Self::Quantity { .. } => name == "Quantity",
            Self::Resource(resource) => {
                let declared = resource.type_name();
                declared == Some(name)
                    || (resource.resource_type().is_some()
                        && matches!(name, "Resource" | "DomainResource"))
            }
        }
    }
}

impl fmt::Display for FhirPathValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Quantity { value, unit } => write!(f, "{value} '{unit}'"),
            Self::Resource(resource) => write!(f, "{}", resource.json()),
            other => f.write_str(&other.to_primitive_string().unwrap_or_default()),
        }
    }
}

fn number_to_value(number: &Number) -> FhirPathValue {
    if let Some(i) = number.as_i64() {
        return FhirPathValue::Integer(i);
    }
    let text = number.to_string();
    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .map(FhirPathValue::Decimal)
        .unwrap_or_else(|_| FhirPathValue::String(text))
}

/// Renders a decimal as a JSON number, falling back to a string when the
/// value does not fit a JSON number.
pub fn decimal_to_json(value: &Decimal) -> JsonValue {
    Number::from_str(&value.to_string())
        .map(JsonValue::Number)
        .unwrap_or_else(|_| JsonValue::String(value.to_string()))
}

/// Structural equality used by `=`, `distinct` and membership
pub fn values_equal(left: &FhirPathValue, right: &FhirPathValue) -> bool {
    use FhirPathValue::*;
    match (left, right) {
        (Integer(_) | Decimal(_), Integer(_) | Decimal(_)) => left.as_decimal() == right.as_decimal(),
        (Boolean(a), Boolean(b)) => a == b,
        (String(a), String(b)) => a == b,
        (Date(a), Date(b)) | (DateTime(a), DateTime(b)) | (Time(a), Time(b)) => a == b,
        (Quantity { value: av, unit: au }, Quantity { value: bv, unit: bu }) => av == bv && au == bu,
        (Resource(a), Resource(b)) => a.json() == b.json(),
        (String(text), Date(_) | DateTime(_) | Time(_)) => {
            values_equal(&temporal_from_text(text, right), right)
        }
        (Date(_) | DateTime(_) | Time(_), String(text)) => {
            values_equal(left, &temporal_from_text(text, left))
        }
        _ => false,
    }
}

/// Reads a JSON string as the temporal kind of `like`; FHIR JSON carries
/// dates as plain strings.
fn temporal_from_text(text: &str, like: &FhirPathValue) -> FhirPathValue {
    match like {
        FhirPathValue::Time(_) => FhirPathValue::Time(text.to_string()),
        _ if text.contains('T') => FhirPathValue::DateTime(text.to_string()),
        _ => FhirPathValue::Date(text.to_string()),
    }
}

/// Looser equality used by `~`
pub fn values_equivalent(left: &FhirPathValue, right: &FhirPathValue) -> bool {
    match (left, right) {
        (FhirPathValue::String(a), FhirPathValue::String(b)) => normalize(a) == normalize(b),
        _ => values_equal(left, right),
    }
}

fn normalize(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Ordering for comparison operators; `None` when the values are not comparable.
pub fn compare_values(left: &FhirPathValue, right: &FhirPathValue) -> Option<Ordering> {
    use FhirPathValue::*;
    match (left, right) {
        (Integer(_) | Decimal(_), Integer(_) | Decimal(_)) => {
            left.as_decimal()?.partial_cmp(&right.as_decimal()?)
        }
        (String(a), String(b)) => Some(a.cmp(b)),
        (Date(a), Date(b)) | (DateTime(a), DateTime(b)) | (Time(a), Time(b)) => {
            // Only same-precision literals compare; partial precision is indeterminate.
            (a.len() == b.len()).then(|| a.cmp(b))
        }
        (Date(a), DateTime(b)) | (DateTime(b), Date(a)) if b.len() > a.len() => {
            let ordering = a.as_str().cmp(&b[..a.len()]);
            let ordering = if matches!(left, Date(_)) { ordering } else { ordering.reverse() };
            (ordering != Ordering::Equal).then_some(ordering)
        }
        (Quantity { value: av, unit: au }, Quantity { value: bv, unit: bu }) if au == bu => {
            av.partial_cmp(bv)
        }
        (String(text), Date(_) | DateTime(_) | Time(_)) => {
            compare_values(&temporal_from_text(text, right), right)
        }
        (Date(_) | DateTime(_) | Time(_), String(text)) => {
            compare_values(left, &temporal_from_text(text, left))
        }
        _ => None,
    }
}

/// Ordered collection of values
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Collection(SmallVec<[FhirPathValue; 2]>);

impl Collection {
    pub fn new() -> Self {
        Self(SmallVec::new())
    }

    pub fn empty() -> Self {
        Self::new()
    }

    pub fn single(value: FhirPathValue) -> Self {
        let mut values = SmallVec::new();
        values.push(value);
        Self(values)
    }

    pub fn from_vec(values: Vec<FhirPathValue>) -> Self {
        Self(SmallVec::from_vec(values))
    }

    pub fn boolean(value: bool) -> Self {
        Self::single(FhirPathValue::Boolean(value))
    }

    pub fn push(&mut self, value: FhirPathValue) {
        self.0.push(value);
    }

    pub fn extend(&mut self, other: Collection) {
        self.0.extend(other.0);
    }

    pub fn contains_value(&self, value: &FhirPathValue) -> bool {
        self.0.iter().any(|candidate| values_equal(candidate, value))
    }

    /// Removes duplicates, keeping the first occurrence of each value.
    pub fn distinct(self) -> Self {
        let mut result = Collection::new();
        for value in self.0 {
            if !result.contains_value(&value) {
                result.push(value);
            }
        }
        result
    }

    pub fn as_slice(&self) -> &[FhirPathValue] {
        &self.0
    }

    pub fn into_vec(self) -> Vec<FhirPathValue> {
        self.0.into_vec()
    }
}

impl Deref for Collection {
    type Target = [FhirPathValue];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl FromIterator<FhirPathValue> for Collection {
    fn from_iter<I: IntoIterator<Item = FhirPathValue>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for Collection {
    type Item = FhirPathValue;
    type IntoIter = smallvec::IntoIter<[FhirPathValue; 2]>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a Collection {
    type Item = &'a FhirPathValue;
    type IntoIter = std::slice::Iter<'a, FhirPathValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl From<FhirPathValue> for Collection {
    fn from(value: FhirPathValue) -> Self {
        Self::single(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn dec(text: &str) -> Decimal {
        text.parse().unwrap()
    }

    #[test]
    fn json_leaves_map_to_primitive_kinds() {
        assert_eq!(
            FhirPathValue::from_json(&json!("Alice"), None),
            Some(FhirPathValue::string("Alice"))
        );
        assert_eq!(
            FhirPathValue::from_json(&json!(42), None),
            Some(FhirPathValue::Integer(42))
        );
        assert_eq!(
            FhirPathValue::from_json(&json!(1.5), None),
            Some(FhirPathValue::Decimal(dec("1.5")))
        );
        assert_eq!(FhirPathValue::from_json(&json!(null), None), None);
    }

    #[test]
    fn objects_prefer_resource_type_over_hint() {
        let value = FhirPathValue::from_json(&json!({"resourceType": "Patient"}), Some("Reference")).unwrap();
        assert_eq!(value.type_name(), "Patient");
        let value = FhirPathValue::from_json(&json!({"family": "Smith"}), Some("HumanName")).unwrap();
        assert_eq!(value.type_name(), "HumanName");
        let value = FhirPathValue::from_json(&json!({"x": 1}), None).unwrap();
        assert_eq!(value.type_name(), UNKNOWN_ELEMENT_TYPE);
    }

    #[test]
    fn primitive_string_only_for_primitives() {
        assert_eq!(FhirPathValue::Boolean(true).to_primitive_string(), Some("true".to_string()));
        assert_eq!(
            FhirPathValue::Quantity { value: dec("5"), unit: "mg".to_string() }.to_primitive_string(),
            None
        );
    }

    #[test]
    fn integer_and_decimal_compare_numerically() {
        assert!(values_equal(&FhirPathValue::Integer(2), &FhirPathValue::Decimal(dec("2.0"))));
        assert_eq!(
            compare_values(&FhirPathValue::Integer(1), &FhirPathValue::Decimal(dec("1.5"))),
            Some(Ordering::Less)
        );
    }

    #[test]
    fn dates_of_different_precision_are_not_comparable() {
        let year = FhirPathValue::Date("2024".to_string());
        let day = FhirPathValue::Date("2024-01-01".to_string());
        assert_eq!(compare_values(&year, &day), None);
    }

    #[test]
    fn json_strings_compare_against_date_literals() {
        let birth_date = FhirPathValue::string("1990-05-01");
        let literal = FhirPathValue::Date("1985-01-01".to_string());
        assert_eq!(compare_values(&birth_date, &literal), Some(Ordering::Greater));
        assert!(values_equal(&literal, &FhirPathValue::string("1985-01-01")));
    }

    #[test]
    fn string_equivalence_ignores_case_and_whitespace() {
        assert!(values_equivalent(
            &FhirPathValue::string("Hello  World"),
            &FhirPathValue::string("hello world")
        ));
    }

    #[test]
    fn type_checks_accept_namespaces() {
        assert!(FhirPathValue::string("x").is_of_type("System.String"));
        assert!(FhirPathValue::Integer(1).is_of_type("integer"));
        let patient = FhirPathValue::from_json(&json!({"resourceType": "Patient"}), None).unwrap();
        assert!(patient.is_of_type("FHIR.Patient"));
        assert!(patient.is_of_type("Resource"));
        assert!(!patient.is_of_type("Observation"));
    }

    #[test]
    fn distinct_keeps_first_occurrence() {
        let collection = Collection::from_vec(vec![
            FhirPathValue::Integer(1),
            FhirPathValue::Integer(2),
            FhirPathValue::Decimal(dec("1.0")),
        ]);
        assert_eq!(
            collection.distinct().into_vec(),
            vec![FhirPathValue::Integer(1), FhirPathValue::Integer(2)]
        );
    }
}
