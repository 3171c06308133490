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

//! Model provider seam between the evaluator and a FHIR release

/// Release-specific type knowledge used during navigation
pub trait ModelProvider: Send + Sync {
    /// Label of the release this provider describes, e.g. `R4`
    fn release_label(&self) -> &str;

    /// Whether `name` is a resource type of this release
    fn is_resource_type(&self, name: &str) -> bool;

    /// Declared type of a property, when it is known regardless of the parent
    fn element_type(&self, property: &str) -> Option<&'static str>;
}

/// Provider without release knowledge. Objects are typed only by `resourceType`.
#[derive(Debug, Default, Clone, Copy)]
pub struct EmptyModelProvider;

impl ModelProvider for EmptyModelProvider {
    fn release_label(&self) -> &str {
        "none"
    }

    fn is_resource_type(&self, _name: &str) -> bool {
        false
    }

    fn element_type(&self, _property: &str) -> Option<&'static str> {
        None
    }
}
