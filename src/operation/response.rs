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

//! Builds the output `Parameters` envelope

use super::driver::{EvaluationInputs, ResultEntry};
use crate::engine::value::decimal_to_json;
use crate::engine::{FhirPathValue, TraceEntry};
use crate::model::{ElementValue, Extension, FhirRelease, Parameter, ResponseEnvelope};
use serde_json::Value as JsonValue;

/// Optional analysis output echoed in the `parameters` entry
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParseDiagnostics {
    pub parse_debug_tree: Option<String>,
    pub expected_return_type: Option<String>,
    pub parse_debug: Option<String>,
}

/// Renders `results` for `release`: the `parameters` echo entry first, then
/// one `result` entry per evaluation call.
pub fn assemble(
    release: FhirRelease,
    evaluator: &str,
    inputs: &EvaluationInputs,
    results: &[ResultEntry],
    diagnostics: &ParseDiagnostics,
) -> ResponseEnvelope {
    let mut envelope = release.new_envelope();
    envelope.push(parameters_entry(evaluator, inputs, diagnostics));
    for result in results {
        envelope.push(result_entry(result));
    }
    envelope
}

fn parameters_entry(evaluator: &str, inputs: &EvaluationInputs, diagnostics: &ParseDiagnostics) -> Parameter {
    let mut entry = Parameter::new("parameters").with_part(Parameter::new("evaluator").with_string(evaluator));
    if let Some(tree) = &diagnostics.parse_debug_tree {
        entry = entry.with_part(Parameter::new("parseDebugTree").with_string(tree.as_str()));
    }
    entry = entry.with_part(Parameter::new("expression").with_string(inputs.expression.as_str()));
    if let Some(context) = inputs.context_expression() {
        entry = entry.with_part(Parameter::new("context").with_string(context));
    }
    entry = entry.with_part(Parameter::new("resource").with_resource(inputs.resource.json().clone()));
    if !inputs.variables.is_empty() {
        let variables = inputs
            .variables
            .iter()
            .map(|(name, value)| value.to_parameter(name));
        entry = entry.with_part(Parameter::new("variables").with_parts(variables));
    }
    if let Some(return_type) = &diagnostics.expected_return_type {
        entry = entry.with_part(Parameter::new("expectedReturnType").with_string(return_type.as_str()));
    }
    if let Some(debug) = &diagnostics.parse_debug {
        entry = entry.with_part(Parameter::new("parseDebug").with_string(debug.as_str()));
    }
    entry
}

fn result_entry(result: &ResultEntry) -> Parameter {
    let mut entry = Parameter::new("result");
    if let Some(path) = &result.context_path {
        entry = entry.with_string(path.as_str());
    }
    entry
        .with_parts(result.values.iter().map(value_part))
        .with_parts(result.traces.iter().map(trace_part))
}

fn trace_part(trace: &TraceEntry) -> Parameter {
    Parameter::new("trace")
        .with_string(trace.label.as_str())
        .with_parts(trace.values.iter().map(value_part))
}

/// One produced value: primitives inline, everything else as `json-value`.
pub fn value_part(value: &FhirPathValue) -> Parameter {
    let element = match value {
        FhirPathValue::Boolean(b) => ElementValue::boolean(*b),
        FhirPathValue::Integer(i) => ElementValue::integer(*i),
        FhirPathValue::Decimal(d) => ElementValue::new("Decimal", decimal_to_json(d)),
        FhirPathValue::String(s) => ElementValue::string(s.as_str()),
        FhirPathValue::Date(s) => ElementValue::new("Date", JsonValue::String(s.clone())),
        FhirPathValue::DateTime(s) => ElementValue::new("DateTime", JsonValue::String(s.clone())),
        FhirPathValue::Time(s) => ElementValue::new("Time", JsonValue::String(s.clone())),
        FhirPathValue::Quantity { .. } | FhirPathValue::Resource(_) => {
            return Parameter::new(value.type_name()).with_extension(Extension::json_value(&value.to_json()));
        }
    };
    Parameter::new(value.type_name()).with_value(element)
}
