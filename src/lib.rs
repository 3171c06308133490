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

//! FHIRPath Lab operations server
//!
//! Implements the `$fhirpath` operation family used by the FHIRPath Lab web
//! client: a request `Parameters` resource carrying an expression, an optional
//! context expression, variables and a resource is evaluated against FHIR R4,
//! R4B or R5 and answered with a `Parameters` resource of results and traces.

pub mod engine;
pub mod model;
pub mod operation;
pub mod server;

// Re-export main types
pub use engine::{EvaluationContext, FhirPathEngine, FhirPathError, FhirPathValue};
pub use model::{FhirRelease, OperationOutcome, Parameter, ParametersResource, ResponseEnvelope};
pub use operation::{Cancellation, OperationError, invoke};
pub use server::{ServerConfig, create_app, start_server};
