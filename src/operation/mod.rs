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

//! `$fhirpath` operation family
//!
//! Translates a request `Parameters` tree into evaluation inputs, drives the
//! engine and assembles the response envelope. Everything here is synchronous
//! and per-request; the HTTP layer decides where it runs.

pub mod cancellation;
pub mod definition;
pub mod driver;
pub mod error;
pub mod navigator;
pub mod resolver;
pub mod response;
pub mod variables;

pub use cancellation::{CancelOnDrop, Cancellation};
pub use driver::{EvaluationInputs, ResultEntry};
pub use error::{ExpressionRole, OperationError, OperationResult};
pub use variables::{BoundValue, VariableBindings};

use crate::engine::FhirPathEngine;
use crate::model::{FhirRelease, Parameter, ParametersResource, ResponseEnvelope};
use navigator::{find_all, find_first, find_string};
use response::ParseDiagnostics;
use tracing::debug;

/// An invocable operation code and the release it evaluates against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperationRoute {
    pub code: &'static str,
    pub release: FhirRelease,
}

/// Routing table of the operation family
pub const OPERATIONS: &[OperationRoute] = &[
    OperationRoute {
        code: "fhirpath",
        release: FhirRelease::R4,
    },
    OperationRoute {
        code: "fhirpath-r4",
        release: FhirRelease::R4,
    },
    OperationRoute {
        code: "fhirpath-r4b",
        release: FhirRelease::R4B,
    },
    OperationRoute {
        code: "fhirpath-r5",
        release: FhirRelease::R5,
    },
];

pub fn release_for(code: &str) -> Option<FhirRelease> {
    OPERATIONS.iter().find(|op| op.code == code).map(|op| op.release)
}

/// Reads and normalizes the request parameters for `release`.
pub fn extract_inputs(tree: &[Parameter], release: FhirRelease) -> OperationResult<EvaluationInputs> {
    let expression = required_string(tree, "expression")?;
    let context = optional_string(tree, "context")?;

    let resource_node = find_first(tree, "resource").ok_or_else(|| OperationError::missing("resource"))?;
    let resource = resolver::resolve_resource(resource_node, release)?;

    let variables = variables::bind_variables(&find_all(tree, "variables"))?;
    let terminology_server = find_string(tree, "terminologyserver").map(str::to_string);

    Ok(EvaluationInputs {
        expression,
        context,
        resource,
        variables,
        terminology_server,
    })
}

fn required_string(tree: &[Parameter], name: &str) -> OperationResult<String> {
    optional_string(tree, name)?.ok_or_else(|| OperationError::missing(name))
}

fn optional_string(tree: &[Parameter], name: &str) -> OperationResult<Option<String>> {
    let Some(node) = find_first(tree, name) else {
        return Ok(None);
    };
    match &node.value {
        None => Ok(None),
        Some(value) => value
            .as_str()
            .map(|text| Some(text.to_string()))
            .ok_or_else(|| OperationError::invalid(name, format!("expected a string but got value{}", value.type_code))),
    }
}

/// Runs one `$fhirpath` invocation end to end.
pub fn invoke(
    engine: &FhirPathEngine,
    release: FhirRelease,
    request: &ParametersResource,
    cancellation: &Cancellation,
) -> OperationResult<ResponseEnvelope> {
    let inputs = extract_inputs(&request.parameter, release)?;
    debug!(
        %release,
        expression = %inputs.expression,
        context = inputs.context_expression(),
        variables = inputs.variables.len(),
        "evaluating"
    );
    let results = driver::evaluate(engine, &inputs, cancellation)?;
    Ok(response::assemble(
        release,
        &engine.label(),
        &inputs,
        &results,
        &ParseDiagnostics::default(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ElementValue;
    use serde_json::json;
    use std::sync::Arc;

    fn request(parameters: Vec<Parameter>) -> ParametersResource {
        ParametersResource {
            parameter: parameters,
            ..ParametersResource::new()
        }
    }

    fn patient() -> Parameter {
        Parameter::new("resource").with_resource(json!({
            "resourceType": "Patient",
            "name": [{"given": ["Alice"]}]
        }))
    }

    #[test]
    fn route_table() {
        assert_eq!(release_for("fhirpath"), Some(FhirRelease::R4));
        assert_eq!(release_for("fhirpath-r4b"), Some(FhirRelease::R4B));
        assert_eq!(release_for("fhirpath-r5"), Some(FhirRelease::R5));
        assert_eq!(release_for("fhirpath-r6"), None);
    }

    #[test]
    fn expression_and_resource_are_required() {
        let err = extract_inputs(&[patient()], FhirRelease::R4).unwrap_err();
        assert_eq!(err, OperationError::missing("expression"));

        let err = extract_inputs(&[Parameter::new("expression").with_string("name")], FhirRelease::R4).unwrap_err();
        assert_eq!(err, OperationError::missing("resource"));

        let err = extract_inputs(&[Parameter::new("expression"), patient()], FhirRelease::R4).unwrap_err();
        assert_eq!(err, OperationError::missing("expression"));
    }

    #[test]
    fn non_string_expression_is_invalid() {
        let tree = [
            Parameter::new("expression").with_value(ElementValue::integer(1)),
            patient(),
        ];
        assert!(matches!(
            extract_inputs(&tree, FhirRelease::R4),
            Err(OperationError::InvalidParameterValue { .. })
        ));
    }

    #[test]
    fn collects_optional_inputs() {
        let tree = [
            Parameter::new("expression").with_string("given"),
            Parameter::new("context").with_string("name"),
            patient(),
            Parameter::new("terminologyserver").with_string("https://tx.example.org/fhir"),
            Parameter::new("variables").with_part(Parameter::new("v").with_string("x")),
        ];
        let inputs = extract_inputs(&tree, FhirRelease::R4).unwrap();
        assert_eq!(inputs.context_expression(), Some("name"));
        assert_eq!(inputs.terminology_server.as_deref(), Some("https://tx.example.org/fhir"));
        assert_eq!(inputs.variables.len(), 1);
    }

    #[test]
    fn invoke_labels_the_evaluator_with_the_release() {
        let engine = FhirPathEngine::new(Arc::new(FhirRelease::R4B.model()));
        let envelope = invoke(
            &engine,
            FhirRelease::R4B,
            &request(vec![Parameter::new("expression").with_string("name.given"), patient()]),
            &Cancellation::new(),
        )
        .unwrap();
        let evaluator = envelope.parameters.parameter[0].part[0].value_str().unwrap();
        assert!(evaluator.starts_with("octofhir-fhirpath-lab-"));
        assert!(evaluator.ends_with(" (R4B)"));
        assert_eq!(envelope.parameters.parameter[1].part[0].value_str(), Some("Alice"));
    }
}
