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

//! OperationOutcome resource

use serde::{Deserialize, Serialize};

/// Coding system for the error kind attached to each issue
pub const ERROR_KIND_SYSTEM: &str = "urn:octofhir:fhirpath-lab:error";

/// OperationOutcome response for errors
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationOutcome {
    #[serde(rename = "resourceType")]
    pub resource_type: String,
    pub issue: Vec<OperationOutcomeIssue>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationOutcomeIssue {
    /// `fatal`, `error`, `warning` or `information`
    pub severity: String,
    /// Issue type code, e.g. `processing`
    pub code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<CodeableConcept>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnostics: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeableConcept {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub coding: Vec<Coding>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Coding {
    pub system: String,
    pub code: String,
}

impl OperationOutcome {
    /// Single `fatal`/`processing` issue tagged with an error kind code
    pub fn fatal(kind: &str, message: &str) -> Self {
        Self::single("fatal", "processing", kind, message)
    }

    pub fn single(severity: &str, code: &str, kind: &str, message: &str) -> Self {
        Self {
            resource_type: "OperationOutcome".to_string(),
            issue: vec![OperationOutcomeIssue {
                severity: severity.to_string(),
                code: code.to_string(),
                details: Some(CodeableConcept {
                    coding: vec![Coding {
                        system: ERROR_KIND_SYSTEM.to_string(),
                        code: kind.to_string(),
                    }],
                    text: Some(message.to_string()),
                }),
                diagnostics: Some(message.to_string()),
            }],
        }
    }

    /// Error kind code of the first issue
    pub fn kind(&self) -> Option<&str> {
        self.issue
            .first()?
            .details
            .as_ref()?
            .coding
            .iter()
            .find(|coding| coding.system == ERROR_KIND_SYSTEM)
            .map(|coding| coding.code.as_str())
    }
}
