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

//! FHIR wire model: `Parameters`, `OperationOutcome` and release strategies

pub mod outcome;
pub mod parameters;
pub mod release;

pub use outcome::OperationOutcome;
pub use parameters::{
    ElementValue, Extension, JSON_VALUE_EXTENSION_URL, Parameter, ParameterEncoding, ParametersError,
    ParametersResource,
};
pub use release::{DecodeError, FhirRelease, ReleaseModel, ResponseEnvelope, TypedResource};
