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

//! OperationDefinition and CapabilityStatement for capability discovery

use super::{OPERATIONS, release_for};
use crate::model::FhirRelease;
use serde::Serialize;

const DEFAULT_BASE_URL: &str = "http://localhost";

/// FHIR OperationDefinition resource describing one `$fhirpath` variant
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationDefinition {
    pub resource_type: &'static str,
    pub id: String,
    pub name: &'static str,
    pub status: &'static str,
    pub kind: &'static str,
    pub description: String,
    pub code: String,
    pub system: bool,
    #[serde(rename = "type")]
    pub type_level: bool,
    pub instance: bool,
    pub parameter: Vec<OperationParameter>,
}

/// Input or output parameter of an operation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OperationParameter {
    pub name: &'static str,
    #[serde(rename = "use")]
    pub use_: ParameterUse,
    pub min: u32,
    pub max: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub documentation: Option<&'static str>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub param_type: Option<&'static str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub part: Vec<OperationParameter>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterUse {
    In,
    Out,
}

impl OperationParameter {
    fn new(
        use_: ParameterUse,
        name: &'static str,
        min: u32,
        max: &'static str,
        param_type: Option<&'static str>,
        documentation: &'static str,
    ) -> Self {
        Self {
            name,
            use_,
            min,
            max,
            documentation: Some(documentation),
            param_type,
            part: Vec::new(),
        }
    }

    fn input(name: &'static str, min: u32, max: &'static str, param_type: Option<&'static str>, doc: &'static str) -> Self {
        Self::new(ParameterUse::In, name, min, max, param_type, doc)
    }

    fn output(name: &'static str, min: u32, max: &'static str, param_type: Option<&'static str>, doc: &'static str) -> Self {
        Self::new(ParameterUse::Out, name, min, max, param_type, doc)
    }

    fn with_parts(mut self, parts: Vec<OperationParameter>) -> Self {
        self.part = parts;
        self
    }
}

const STRING: Option<&str> = Some("string");
const RESOURCE: Option<&str> = Some("Resource");

/// Definition of the operation invoked as `$<code>`, or `None` for an unknown code
pub fn operation_definition(code: &str) -> Option<OperationDefinition> {
    let release = release_for(code)?;
    Some(OperationDefinition {
        resource_type: "OperationDefinition",
        id: code.to_string(),
        name: "FHIRPath Evaluate",
        status: "active",
        kind: "operation",
        description: format!(
            "Evaluates a FHIRPath expression against a FHIR {release} ({}) resource",
            release.fhir_version()
        ),
        code: code.to_string(),
        system: true,
        type_level: false,
        instance: false,
        parameter: parameters(),
    })
}

fn parameters() -> Vec<OperationParameter> {
    use OperationParameter as P;

    let variables_in = P::input("variables", 0, "*", None, "Variables to bind; provide one or more named variables.")
        .with_parts(vec![
            P::input("name", 1, "1", STRING, "Variable name to bind."),
            P::input(
                "value[x]",
                0,
                "1",
                None,
                "Variable value using appropriate value[x] in Parameters (any FHIR type or Resource).",
            ),
        ]);

    let variables_out = P::output("variables", 0, "*", None, "Echo of variables passed to the evaluation.")
        .with_parts(vec![
            P::output("name", 1, "1", STRING, "Variable name."),
            P::output("value[x]", 0, "1", None, "Variable value using appropriate value[x] (any FHIR type or Resource)."),
        ]);

    let parameters_out = P::output("parameters", 1, "1", None, "Input parameters and evaluation metadata.")
        .with_parts(vec![
            P::output("evaluator", 1, "1", STRING, "Engine and version label, e.g. 'octofhir-fhirpath-lab-0.1.0 (R4)'."),
            P::output("parseDebugTree", 0, "1", STRING, "Parser debug AST (JSON as string)."),
            P::output("expression", 1, "1", STRING, "The expression that was executed."),
            P::output("context", 0, "1", STRING, "The context expression used, if any."),
            P::output("resource", 1, "1", RESOURCE, "The resource used as evaluation input."),
            variables_out,
            P::output("expectedReturnType", 0, "1", STRING, "Optional static analysis expected return type."),
            P::output("parseDebug", 0, "1", STRING, "Optional unformatted parser debug messages."),
        ]);

    let result_out = P::output(
        "result",
        0,
        "*",
        None,
        "Results for each context item. The parameter valueString identifies the context (e.g. 'name[0]'). \
         Parts hold the evaluated values named by datatype and optional 'trace' parts with traced values.",
    )
    .with_parts(vec![P::output(
        "trace",
        0,
        "*",
        STRING,
        "Trace output; valueString carries the trace label. Child parts contain traced values named by datatype.",
    )]);

    vec![
        P::input("expression", 1, "1", STRING, "FHIRPath expression to execute."),
        P::input("context", 0, "1", STRING, "Context expression to select focus items within the resource."),
        variables_in,
        P::input(
            "resource",
            1,
            "1",
            RESOURCE,
            "Resource to evaluate against. Alternatively provide it as JSON text in a \
             http://fhir.forms-lab.com/StructureDefinition/json-value extension.",
        ),
        P::input("terminologyserver", 0, "1", STRING, "Terminology server base URL. Accepted but not used."),
        parameters_out,
        result_out,
        P::output(
            "debug-trace",
            0,
            "*",
            None,
            "Step-by-step execution trace per context. Not produced by this server.",
        ),
    ]
}

/// Base URL with trailing slashes removed, defaulting to `http://localhost`
pub fn canonical_base(base_url: &str) -> String {
    let trimmed = base_url.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        DEFAULT_BASE_URL.to_string()
    } else {
        trimmed.to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CapabilityStatement {
    pub resource_type: &'static str,
    pub status: &'static str,
    pub kind: &'static str,
    pub date: String,
    pub fhir_version: &'static str,
    pub format: Vec<&'static str>,
    pub software: Software,
    pub implementation: Implementation,
    pub rest: Vec<RestComponent>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Software {
    pub name: &'static str,
    pub version: &'static str,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Implementation {
    pub description: &'static str,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RestComponent {
    pub mode: &'static str,
    pub operation: Vec<OperationReference>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OperationReference {
    pub name: String,
    pub definition: String,
}

/// CapabilityStatement listing every operation with its canonical definition URL
pub fn capability_statement(base_url: &str) -> CapabilityStatement {
    let base = canonical_base(base_url);
    let operation = OPERATIONS
        .iter()
        .map(|op| OperationReference {
            name: op.code.to_string(),
            definition: format!("{base}/OperationDefinition/{}", op.code),
        })
        .collect();

    CapabilityStatement {
        resource_type: "CapabilityStatement",
        status: "active",
        kind: "instance",
        date: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
        fhir_version: FhirRelease::R4.fhir_version(),
        format: vec!["json"],
        software: Software {
            name: env!("CARGO_PKG_NAME"),
            version: env!("CARGO_PKG_VERSION"),
        },
        implementation: Implementation {
            description: "FHIRPath Lab operations server",
            url: base,
        },
        rest: vec![RestComponent {
            mode: "server",
            operation,
        }],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn known_codes_have_definitions() {
        for code in ["fhirpath", "fhirpath-r4", "fhirpath-r4b", "fhirpath-r5"] {
            let definition = operation_definition(code).unwrap();
            assert_eq!(definition.code, code);
            assert_eq!(definition.id, code);
        }
        assert!(operation_definition("fhirpath-r6").is_none());
    }

    #[test]
    fn description_names_the_release() {
        let r4b = operation_definition("fhirpath-r4b").unwrap();
        assert_eq!(
            r4b.description,
            "Evaluates a FHIRPath expression against a FHIR R4B (4.3.0) resource"
        );
        assert!(operation_definition("fhirpath").unwrap().description.contains("R4 (4.0.1)"));
        assert_eq!(capability_statement("").fhir_version, "4.0.1");
    }

    #[test]
    fn definition_is_deterministic() {
        assert_eq!(operation_definition("fhirpath-r5"), operation_definition("fhirpath-r5"));
    }

    #[test]
    fn declares_inputs_and_outputs() {
        let json = serde_json::to_value(operation_definition("fhirpath").unwrap()).unwrap();
        let parameters = json["parameter"].as_array().unwrap();
        let summary: Vec<_> = parameters
            .iter()
            .map(|p| (p["name"].as_str().unwrap(), p["use"].as_str().unwrap(), p["max"].as_str().unwrap()))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("expression", "in", "1"),
                ("context", "in", "1"),
                ("variables", "in", "*"),
                ("resource", "in", "1"),
                ("terminologyserver", "in", "1"),
                ("parameters", "out", "1"),
                ("result", "out", "*"),
                ("debug-trace", "out", "*"),
            ]
        );
        assert_eq!(parameters[3]["type"], json!("Resource"));
        assert_eq!(parameters[3]["min"], json!(1));
        assert_eq!(parameters[2]["part"][0]["name"], json!("name"));
        assert_eq!(parameters[6]["part"][0]["name"], json!("trace"));
    }

    #[test]
    fn base_url_is_canonicalized() {
        assert_eq!(canonical_base(""), "http://localhost");
        assert_eq!(canonical_base("https://lab.example.org//"), "https://lab.example.org");
    }

    #[test]
    fn capability_statement_lists_operations() {
        let statement = capability_statement("https://lab.example.org/");
        let operations = &statement.rest[0].operation;
        assert_eq!(operations.len(), 4);
        assert_eq!(
            operations[2].definition,
            "https://lab.example.org/OperationDefinition/fhirpath-r4b"
        );
        assert_eq!(statement.implementation.url, "https://lab.example.org");
    }
}
