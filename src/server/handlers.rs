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

//! Request handlers

use crate::model::{FhirRelease, ParametersResource};
use crate::operation::{self, Cancellation, OperationError, definition};
use crate::server::AppState;
use crate::server::error::{FHIR_JSON, ServerError, ServerResult, fhir_json};
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{StatusCode, Uri},
    response::Response,
};
use tracing::{debug, warn};

/// `POST /$<code>`: evaluates the request against `release`.
///
/// Evaluation runs on the blocking pool. If the client goes away the handler
/// future is dropped, which flips the cancellation flag for the worker.
pub async fn invoke_operation(state: AppState, release: FhirRelease, body: Bytes) -> ServerResult<Response> {
    let request = ParametersResource::from_slice(&body)
        .map_err(|e| OperationError::MalformedRequest(format!("malformed request: {e}")))?;

    let cancellation = Cancellation::new();
    let guard = cancellation.guard();
    let registry = state.registry.clone();

    let outcome = tokio::task::spawn_blocking(move || {
        let engine = registry
            .engine(release)
            .ok_or_else(|| ServerError::Internal(format!("no engine for release {release}")))?;
        operation::invoke(engine, release, &request, &cancellation).map_err(ServerError::from)
    })
    .await;
    guard.disarm();

    let envelope = match outcome {
        Ok(result) => result?,
        Err(join_error) => return Err(ServerError::Internal(join_error.to_string())),
    };

    debug!(%release, parameters = envelope.parameters.parameter.len(), "operation complete");
    Ok(fhir_json(StatusCode::OK, &envelope.content_type(), &envelope.parameters))
}

/// `GET /metadata`
pub async fn metadata_handler(State(state): State<AppState>) -> Response {
    let statement = definition::capability_statement(&state.base_url);
    fhir_json(StatusCode::OK, FHIR_JSON, &statement)
}

/// `GET /OperationDefinition/{code}`
pub async fn operation_definition_handler(Path(code): Path<String>) -> ServerResult<Response> {
    let definition =
        definition::operation_definition(&code).ok_or_else(|| ServerError::UnknownOperation { code })?;
    Ok(fhir_json(StatusCode::OK, FHIR_JSON, &definition))
}

/// Anything not in the routing table
pub async fn fallback_handler(uri: Uri) -> ServerError {
    warn!(path = %uri.path(), "no route");
    ServerError::NotFound {
        path: uri.path().to_string(),
    }
}
