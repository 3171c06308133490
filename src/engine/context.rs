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

//! Evaluation environment
//!
//! An [`EvaluationContext`] carries everything an evaluation call can see
//! besides its input collection: the root resource, the `%context` item, the
//! user variables and the trace sink. It is built once per call and passed
//! down by reference.

use super::trace::{NoOpTraceProvider, SharedTraceProvider};
use super::value::{Collection, FhirPathValue};
use rustc_hash::FxHashMap;
use std::sync::Arc;

pub type VariableMap = FxHashMap<String, Collection>;

/// Environment names that user variables cannot override
pub const RESERVED_VARIABLES: &[&str] = &["resource", "rootResource", "context", "ucum", "sct", "loinc"];

pub fn is_reserved_variable(name: &str) -> bool {
    RESERVED_VARIABLES.contains(&name)
}

#[derive(Clone)]
pub struct EvaluationContext {
    resource: Collection,
    context: Collection,
    variables: Arc<VariableMap>,
    tracer: SharedTraceProvider,
}

impl EvaluationContext {
    /// Environment rooted at `resource`, which is also the initial `%context`.
    pub fn new(resource: FhirPathValue) -> Self {
        let resource = Collection::single(resource);
        Self {
            context: resource.clone(),
            resource,
            variables: Arc::new(VariableMap::default()),
            tracer: Arc::new(NoOpTraceProvider),
        }
    }

    pub fn with_context(mut self, context: Collection) -> Self {
        self.context = context;
        self
    }

    pub fn with_variables(mut self, variables: Arc<VariableMap>) -> Self {
        self.variables = variables;
        self
    }

    pub fn with_tracer(mut self, tracer: SharedTraceProvider) -> Self {
        self.tracer = tracer;
        self
    }

    pub fn resource(&self) -> &Collection {
        &self.resource
    }

    pub fn tracer(&self) -> &SharedTraceProvider {
        &self.tracer
    }

    /// Resolves `%name`
    pub fn resolve_variable(&self, name: &str) -> Option<Collection> {
        match name {
            "resource" | "rootResource" => Some(self.resource.clone()),
            "context" => Some(self.context.clone()),
            "ucum" => Some(Collection::single(FhirPathValue::string("http://unitsofmeasure.org"))),
            "sct" => Some(Collection::single(FhirPathValue::string("http://snomed.info/sct"))),
            "loinc" => Some(Collection::single(FhirPathValue::string("http://loinc.org"))),
            other => self.variables.get(other).cloned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn patient() -> FhirPathValue {
        FhirPathValue::from_json(&json!({"resourceType": "Patient", "id": "p1"}), None).unwrap()
    }

    #[test]
    fn resource_and_context_default_to_root() {
        let ctx = EvaluationContext::new(patient());
        assert_eq!(ctx.resolve_variable("resource"), ctx.resolve_variable("context"));
        assert_eq!(ctx.resolve_variable("rootResource").map(|c| c.len()), Some(1));
    }

    #[test]
    fn user_variables_do_not_shadow_environment() {
        let mut variables = VariableMap::default();
        variables.insert("resource".to_string(), Collection::single(FhirPathValue::string("shadow")));
        variables.insert("v".to_string(), Collection::single(FhirPathValue::string("testMe")));
        let ctx = EvaluationContext::new(patient()).with_variables(Arc::new(variables));

        assert_eq!(ctx.resolve_variable("resource").unwrap()[0].type_name(), "Patient");
        assert_eq!(
            ctx.resolve_variable("v"),
            Some(Collection::single(FhirPathValue::string("testMe")))
        );
        assert_eq!(ctx.resolve_variable("missing"), None);
        assert!(is_reserved_variable("ucum"));
    }
}
