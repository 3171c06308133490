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

//! `Parameters` resource wire model
//!
//! A [`Parameter`] keeps its `value[x]` as an [`ElementValue`] (type code plus
//! raw JSON), so the same tree can carry any primitive or complex FHIR type
//! without a generated type per release.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use thiserror::Error;

/// Extension carrying a resource or complex value serialized as JSON text
pub const JSON_VALUE_EXTENSION_URL: &str = "http://fhir.forms-lab.com/StructureDefinition/json-value";

/// Token matched against extension URLs when looking for out-of-band JSON
pub const JSON_VALUE_URL_TOKEN: &str = "json-value";

/// FHIR primitive type codes, as they appear after the `value` prefix
const PRIMITIVE_TYPE_CODES: &[&str] = &[
    "Base64Binary",
    "Boolean",
    "Canonical",
    "Code",
    "Date",
    "DateTime",
    "Decimal",
    "Id",
    "Instant",
    "Integer",
    "Integer64",
    "Markdown",
    "Oid",
    "PositiveInt",
    "String",
    "Time",
    "UnsignedInt",
    "Uri",
    "Url",
    "Uuid",
];

/// A typed `value[x]`: the type code (`String`, `HumanName`, ...) and its JSON
#[derive(Debug, Clone, PartialEq)]
pub struct ElementValue {
    pub type_code: String,
    pub value: JsonValue,
}

impl ElementValue {
    pub fn new(type_code: impl Into<String>, value: JsonValue) -> Self {
        Self {
            type_code: type_code.into(),
            value,
        }
    }

    pub fn string(value: impl Into<String>) -> Self {
        Self::new("String", JsonValue::String(value.into()))
    }

    pub fn boolean(value: bool) -> Self {
        Self::new("Boolean", JsonValue::Bool(value))
    }

    pub fn integer(value: i64) -> Self {
        Self::new("Integer", JsonValue::from(value))
    }

    /// JSON key for this value, e.g. `valueString`
    pub fn key(&self) -> String {
        format!("value{}", self.type_code)
    }

    pub fn is_primitive(&self) -> bool {
        PRIMITIVE_TYPE_CODES.contains(&self.type_code.as_str())
    }

    /// FHIR type name: lower-case first letter for primitives (`dateTime`)
    pub fn type_name(&self) -> String {
        if !self.is_primitive() {
            return self.type_code.clone();
        }
        let mut chars = self.type_code.chars();
        match chars.next() {
            Some(first) => first.to_lowercase().chain(chars).collect(),
            None => String::new(),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        self.value.as_str()
    }

    /// Textual form of a primitive value
    pub fn to_text(&self) -> Option<String> {
        if !self.is_primitive() {
            return None;
        }
        match &self.value {
            JsonValue::String(text) => Some(text.clone()),
            JsonValue::Bool(b) => Some(b.to_string()),
            JsonValue::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

/// Removes the first `value[x]` entry from a flattened JSON object.
fn take_value(fields: &mut Map<String, JsonValue>) -> Option<ElementValue> {
    let key = fields.keys().find(|key| is_value_key(key))?.clone();
    let value = fields.remove(&key)?;
    Some(ElementValue::new(&key["value".len()..], value))
}

fn is_value_key(key: &str) -> bool {
    key.strip_prefix("value")
        .and_then(|suffix| suffix.chars().next())
        .is_some_and(char::is_uppercase)
}

fn put_value(fields: &mut Map<String, JsonValue>, value: Option<ElementValue>) {
    if let Some(value) = value {
        fields.insert(value.key(), value.value);
    }
}

/// Extension `(url, value[x])` attached to a parameter
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "ExtensionRepr", into = "ExtensionRepr")]
pub struct Extension {
    pub url: String,
    pub value: Option<ElementValue>,
    pub extension: Vec<Extension>,
}

impl Extension {
    pub fn new(url: impl Into<String>, value: ElementValue) -> Self {
        Self {
            url: url.into(),
            value: Some(value),
            extension: Vec::new(),
        }
    }

    /// `json-value` extension holding `json` as compact text
    pub fn json_value(json: &JsonValue) -> Self {
        Self::new(JSON_VALUE_EXTENSION_URL, ElementValue::string(json.to_string()))
    }

    pub fn value_str(&self) -> Option<&str> {
        self.value.as_ref().and_then(ElementValue::as_str)
    }

    pub fn is_json_value(&self) -> bool {
        self.url.contains(JSON_VALUE_URL_TOKEN)
    }
}

#[derive(Serialize, Deserialize)]
struct ExtensionRepr {
    #[serde(default)]
    url: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    extension: Vec<Extension>,
    #[serde(flatten)]
    fields: Map<String, JsonValue>,
}

impl From<ExtensionRepr> for Extension {
    fn from(mut repr: ExtensionRepr) -> Self {
        Self {
            url: repr.url,
            value: take_value(&mut repr.fields),
            extension: repr.extension,
        }
    }
}

impl From<Extension> for ExtensionRepr {
    fn from(extension: Extension) -> Self {
        let mut fields = Map::new();
        put_value(&mut fields, extension.value);
        Self {
            url: extension.url,
            extension: extension.extension,
            fields,
        }
    }
}

/// One node of the `Parameters.parameter` tree
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "ParameterRepr", into = "ParameterRepr")]
pub struct Parameter {
    pub name: String,
    pub value: Option<ElementValue>,
    pub resource: Option<JsonValue>,
    pub extension: Vec<Extension>,
    pub part: Vec<Parameter>,
}

/// Tagged view of how a parameter carries its value
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParameterEncoding<'a> {
    Scalar(&'a ElementValue),
    EmbeddedResource(&'a JsonValue),
    OutOfBand { url: &'a str, json: &'a str },
    Parts(&'a [Parameter]),
    Empty,
}

impl Parameter {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_value(mut self, value: ElementValue) -> Self {
        self.value = Some(value);
        self
    }

    pub fn with_string(self, value: impl Into<String>) -> Self {
        self.with_value(ElementValue::string(value))
    }

    pub fn with_resource(mut self, resource: JsonValue) -> Self {
        self.resource = Some(resource);
        self
    }

    pub fn with_extension(mut self, extension: Extension) -> Self {
        self.extension.push(extension);
        self
    }

    pub fn with_part(mut self, part: Parameter) -> Self {
        self.part.push(part);
        self
    }

    pub fn with_parts(mut self, parts: impl IntoIterator<Item = Parameter>) -> Self {
        self.part.extend(parts);
        self
    }

    /// First `json-value` extension carrying a string payload
    pub fn json_value_extension(&self) -> Option<&Extension> {
        self.extension
            .iter()
            .find(|ext| ext.is_json_value() && ext.value_str().is_some())
    }

    /// Encoding precedence: embedded resource, `value[x]`, out-of-band JSON, parts.
    pub fn encoding(&self) -> ParameterEncoding<'_> {
        if let Some(resource) = &self.resource {
            return ParameterEncoding::EmbeddedResource(resource);
        }
        if let Some(value) = &self.value {
            return ParameterEncoding::Scalar(value);
        }
        if let Some((ext, json)) = self
            .json_value_extension()
            .and_then(|ext| ext.value_str().map(|json| (ext, json)))
        {
            return ParameterEncoding::OutOfBand { url: &ext.url, json };
        }
        if !self.part.is_empty() {
            return ParameterEncoding::Parts(&self.part);
        }
        ParameterEncoding::Empty
    }

    pub fn value_str(&self) -> Option<&str> {
        self.value.as_ref().and_then(ElementValue::as_str)
    }
}

#[derive(Serialize, Deserialize)]
struct ParameterRepr {
    #[serde(default)]
    name: String,
    #[serde(flatten)]
    fields: Map<String, JsonValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    resource: Option<JsonValue>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    extension: Vec<Extension>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    part: Vec<Parameter>,
}

impl From<ParameterRepr> for Parameter {
    fn from(mut repr: ParameterRepr) -> Self {
        Self {
            name: repr.name,
            value: take_value(&mut repr.fields),
            resource: repr.resource,
            extension: repr.extension,
            part: repr.part,
        }
    }
}

impl From<Parameter> for ParameterRepr {
    fn from(parameter: Parameter) -> Self {
        let mut fields = Map::new();
        put_value(&mut fields, parameter.value);
        Self {
            name: parameter.name,
            fields,
            resource: parameter.resource,
            extension: parameter.extension,
            part: parameter.part,
        }
    }
}

/// Reasons a request body is not a usable `Parameters` resource
#[derive(Debug, Error)]
pub enum ParametersError {
    #[error("request body is not valid Parameters JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("expected a Parameters resource but got '{0}'")]
    WrongResourceType(String),
}

/// `Parameters` resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParametersResource {
    pub resource_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameter: Vec<Parameter>,
}

impl Default for ParametersResource {
    fn default() -> Self {
        Self::new()
    }
}

impl ParametersResource {
    pub const RESOURCE_TYPE: &'static str = "Parameters";

    pub fn new() -> Self {
        Self {
            resource_type: Self::RESOURCE_TYPE.to_string(),
            id: None,
            parameter: Vec::new(),
        }
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, ParametersError> {
        let parameters: Self = serde_json::from_slice(bytes)?;
        if parameters.resource_type != Self::RESOURCE_TYPE {
            return Err(ParametersError::WrongResourceType(parameters.resource_type));
        }
        Ok(parameters)
    }

    pub fn push(&mut self, parameter: Parameter) {
        self.parameter.push(parameter);
    }
}
