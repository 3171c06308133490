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

//! Binds the `variables` parameter to named values
//!
//! Two request shapes are accepted and may be mixed:
//! - the part itself is the variable: `{"name": "v", "valueString": "x"}`
//! - the part wraps `name` and value sub-parts:
//!   `{"name": "variable", "part": [{"name": "name", "valueString": "v"}, {"name": "value", "valueString": "x"}]}`

use super::error::{OperationError, OperationResult};
use super::navigator::{find_first, parts_of};
use crate::engine::{Collection, FhirPathValue};
use crate::model::{ElementValue, Extension, Parameter, ParameterEncoding};
use indexmap::IndexMap;
use rust_decimal::Decimal;
use serde_json::Value as JsonValue;
use std::str::FromStr;
use tracing::debug;

/// Name of the sub-part carrying the variable name in the wrapped shape
const NAME_PART: &str = "name";

/// A value bound to a variable, kept in its request encoding for echoing
#[derive(Debug, Clone, PartialEq)]
pub enum BoundValue {
    /// `value[x]`, primitive or complex
    Element(ElementValue),
    /// Embedded resource
    Resource(JsonValue),
    /// JSON decoded from a `json-value` extension
    Json(JsonValue),
}

/// Variable name to value, in first-bound order
pub type VariableBindings = IndexMap<String, BoundValue>;

impl BoundValue {
    fn from_encoding(name: &str, encoding: ParameterEncoding<'_>) -> OperationResult<Option<Self>> {
        match encoding {
            ParameterEncoding::Scalar(value) => Ok(Some(BoundValue::Element(value.clone()))),
            ParameterEncoding::EmbeddedResource(json) => Ok(Some(BoundValue::Resource(json.clone()))),
            ParameterEncoding::OutOfBand { json, .. } => {
                let value: JsonValue = serde_json::from_str(json).map_err(|e| {
                    OperationError::invalid(
                        "variables",
                        format!("json-value of variable '{name}' is not valid JSON: {e}"),
                    )
                })?;
                Ok(Some(BoundValue::Json(value)))
            }
            ParameterEncoding::Parts(_) | ParameterEncoding::Empty => Ok(None),
        }
    }

    /// Engine view of the value
    pub fn to_collection(&self) -> Collection {
        match self {
            BoundValue::Element(value) if value.is_primitive() => {
                primitive_value(value).map(Collection::single).unwrap_or_default()
            }
            BoundValue::Element(value) => json_collection(&value.value, Some(&value.type_code)),
            BoundValue::Resource(json) | BoundValue::Json(json) => json_collection(json, None),
        }
    }

    /// Output part named `name` carrying the value the way it was received
    pub fn to_parameter(&self, name: &str) -> Parameter {
        let parameter = Parameter::new(name);
        match self {
            BoundValue::Element(value) => parameter.with_value(value.clone()),
            BoundValue::Resource(json) => parameter.with_resource(json.clone()),
            BoundValue::Json(json) => parameter.with_extension(Extension::json_value(json)),
        }
    }
}

fn json_collection(json: &JsonValue, type_hint: Option<&str>) -> Collection {
    match json {
        JsonValue::Array(items) => items
            .iter()
            .filter_map(|item| FhirPathValue::from_json(item, type_hint))
            .collect(),
        other => FhirPathValue::from_json(other, type_hint)
            .map(Collection::single)
            .unwrap_or_default(),
    }
}

fn primitive_value(value: &ElementValue) -> Option<FhirPathValue> {
    let json = &value.value;
    match value.type_code.as_str() {
        "Boolean" => json.as_bool().map(FhirPathValue::Boolean),
        "Integer" | "PositiveInt" | "UnsignedInt" => json.as_i64().map(FhirPathValue::Integer),
        // integer64 travels as a JSON string
        "Integer64" => json
            .as_i64()
            .or_else(|| json.as_str().and_then(|s| s.parse().ok()))
            .map(FhirPathValue::Integer),
        "Decimal" => {
            let text = value.to_text()?;
            Decimal::from_str(&text)
                .or_else(|_| Decimal::from_scientific(&text))
                .ok()
                .map(FhirPathValue::Decimal)
        }
        "Date" => json.as_str().map(|s| FhirPathValue::Date(s.to_string())),
        "DateTime" | "Instant" => json.as_str().map(|s| FhirPathValue::DateTime(s.to_string())),
        "Time" => json.as_str().map(|s| FhirPathValue::Time(s.to_string())),
        _ => value.to_text().map(FhirPathValue::String),
    }
}

/// Binds the parts of every `variables` node. Later bindings of a name
/// replace earlier ones.
pub fn bind_variables(nodes: &[&Parameter]) -> OperationResult<VariableBindings> {
    let mut bindings = VariableBindings::new();
    for part in nodes.iter().flat_map(|node| parts_of(node)) {
        let Some((name, value)) = bind_part(part)? else {
            continue;
        };
        if bindings.insert(name.to_string(), value).is_some() {
            debug!(variable = name, "variable bound more than once, keeping the last value");
        }
    }
    Ok(bindings)
}

fn bind_part(part: &Parameter) -> OperationResult<Option<(&str, BoundValue)>> {
    let sub_parts = parts_of(part);
    let Some(name_part) = find_first(sub_parts, NAME_PART) else {
        if part.name.is_empty() {
            return Ok(None);
        }
        let value = BoundValue::from_encoding(&part.name, part.encoding())?;
        if value.is_none() {
            debug!(variable = %part.name, "variable part carries no value, skipping");
        }
        return Ok(value.map(|value| (part.name.as_str(), value)));
    };

    let Some(name) = name_part.value_str().filter(|name| !name.is_empty()) else {
        return Ok(None);
    };
    for candidate in sub_parts.iter().filter(|sub| sub.name != NAME_PART) {
        if let Some(value) = BoundValue::from_encoding(name, candidate.encoding())? {
            return Ok(Some((name, value)));
        }
    }
    debug!(variable = name, "variable has no value part, skipping");
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::JSON_VALUE_EXTENSION_URL;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn variables(parts: Vec<Parameter>) -> Parameter {
        Parameter::new("variables").with_parts(parts)
    }

    fn wrapped(name: &str, value: Parameter) -> Parameter {
        Parameter::new("variable")
            .with_part(Parameter::new(NAME_PART).with_string(name))
            .with_part(value)
    }

    #[test]
    fn binds_direct_parts() {
        let node = variables(vec![Parameter::new("v").with_string("testMe")]);
        let bindings = bind_variables(&[&node]).unwrap();
        assert_eq!(
            bindings.get("v").map(BoundValue::to_collection),
            Some(Collection::single(FhirPathValue::string("testMe")))
        );
    }

    #[test]
    fn binds_wrapped_parts_and_mixes_shapes() {
        let node = variables(vec![
            wrapped("a", Parameter::new("value").with_value(ElementValue::integer(7))),
            Parameter::new("b").with_value(ElementValue::boolean(true)),
        ]);
        let bindings = bind_variables(&[&node]).unwrap();
        assert_eq!(bindings.keys().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(bindings["a"].to_collection()[0], FhirPathValue::Integer(7));
        assert_eq!(bindings["b"].to_collection()[0], FhirPathValue::Boolean(true));
    }

    #[test]
    fn later_binding_wins() {
        let node = variables(vec![
            Parameter::new("v").with_string("first"),
            wrapped("v", Parameter::new("value").with_string("second")),
        ]);
        let bindings = bind_variables(&[&node]).unwrap();
        assert_eq!(bindings.len(), 1);
        assert_eq!(bindings["v"].to_collection()[0], FhirPathValue::string("second"));
    }

    #[test]
    fn wrapped_part_without_name_is_skipped() {
        let unnamed = Parameter::new("variable")
            .with_part(Parameter::new(NAME_PART))
            .with_part(Parameter::new("value").with_string("x"));
        let node = variables(vec![unnamed]);
        assert!(bind_variables(&[&node]).unwrap().is_empty());
        assert!(bind_variables(&[&variables(Vec::new())]).unwrap().is_empty());
    }

    #[test]
    fn converts_by_declared_type() {
        let node = variables(vec![
            Parameter::new("d").with_value(ElementValue::new("Decimal", json!(1.5))),
            Parameter::new("day").with_value(ElementValue::new("Date", json!("2024-02-29"))),
            Parameter::new("c").with_value(ElementValue::new("Code", json!("final"))),
            Parameter::new("n").with_value(ElementValue::new("HumanName", json!({"family": "Smith"}))),
        ]);
        let bindings = bind_variables(&[&node]).unwrap();
        assert_eq!(
            bindings["d"].to_collection()[0],
            FhirPathValue::Decimal(Decimal::new(15, 1))
        );
        assert_eq!(bindings["day"].to_collection()[0], FhirPathValue::Date("2024-02-29".to_string()));
        assert_eq!(bindings["c"].to_collection()[0], FhirPathValue::string("final"));
        assert_eq!(bindings["n"].to_collection()[0].type_name(), "HumanName");
    }

    #[test]
    fn json_value_extension_and_embedded_resource() {
        let node = variables(vec![
            Parameter::new("p").with_resource(json!({"resourceType": "Patient", "id": "x"})),
            Parameter::new("j").with_extension(Extension::new(
                JSON_VALUE_EXTENSION_URL,
                ElementValue::string(r#"{"system": "phone"}"#),
            )),
        ]);
        let bindings = bind_variables(&[&node]).unwrap();
        assert_eq!(bindings["p"].to_collection()[0].type_name(), "Patient");
        assert_eq!(bindings["j"], BoundValue::Json(json!({"system": "phone"})));

        let echoed = bindings["j"].to_parameter("j");
        assert_eq!(echoed.extension[0].url, JSON_VALUE_EXTENSION_URL);
    }

    #[test]
    fn invalid_json_value_is_rejected() {
        let node = variables(vec![Parameter::new("j").with_extension(Extension::new(
            JSON_VALUE_EXTENSION_URL,
            ElementValue::string("{nope"),
        ))]);
        assert!(matches!(
            bind_variables(&[&node]),
            Err(OperationError::InvalidParameterValue { .. })
        ));
    }
}
