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

//! Error handling for the HTTP layer

use crate::model::OperationOutcome;
use crate::operation::OperationError;
use axum::{
    Json,
    http::{HeaderValue, StatusCode, header::CONTENT_TYPE},
    response::{IntoResponse, Response},
};
use thiserror::Error;

/// Media type of every FHIR JSON body the server emits without a release
pub const FHIR_JSON: &str = "application/fhir+json";

/// Server-specific errors
#[derive(Error, Debug)]
pub enum ServerError {
    #[error(transparent)]
    Operation(#[from] OperationError),

    #[error("unknown operation '{code}'")]
    UnknownOperation { code: String },

    #[error("no route for {path}")]
    NotFound { path: String },

    #[error("internal server error: {0}")]
    Internal(String),
}

impl ServerError {
    /// Status, OperationOutcome issue code and error kind for this error
    fn classify(&self) -> (StatusCode, &'static str, &'static str) {
        match self {
            ServerError::Operation(OperationError::Cancelled) => {
                (StatusCode::SERVICE_UNAVAILABLE, "timeout", "cancelled")
            }
            ServerError::Operation(error) => (StatusCode::BAD_REQUEST, "processing", error.kind()),
            ServerError::UnknownOperation { .. } => (StatusCode::NOT_FOUND, "not-supported", "unknown-operation"),
            ServerError::NotFound { .. } => (StatusCode::NOT_FOUND, "not-found", "not-found"),
            ServerError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "exception", "internal"),
        }
    }

    pub fn to_outcome(&self) -> OperationOutcome {
        match self {
            ServerError::Operation(error) => error.to_outcome(),
            other => {
                let (_, code, kind) = other.classify();
                OperationOutcome::single("error", code, kind, &other.to_string())
            }
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, _, _) = self.classify();
        fhir_json(status, FHIR_JSON, &self.to_outcome())
    }
}

/// Serializes `body` as JSON with an explicit FHIR content type
pub fn fhir_json<T: serde::Serialize>(status: StatusCode, content_type: &str, body: &T) -> Response {
    let mut response = (status, Json(body)).into_response();
    if let Ok(value) = HeaderValue::from_str(content_type) {
        response.headers_mut().insert(CONTENT_TYPE, value);
    }
    response
}

/// Result type for server operations
pub type ServerResult<T> = Result<T, ServerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_follow_error_class() {
        let missing = ServerError::from(OperationError::missing("resource")).into_response();
        assert_eq!(missing.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            missing.headers().get(CONTENT_TYPE).and_then(|v| v.to_str().ok()),
            Some(FHIR_JSON)
        );

        let cancelled = ServerError::from(OperationError::Cancelled).into_response();
        assert_eq!(cancelled.status(), StatusCode::SERVICE_UNAVAILABLE);

        let unknown = ServerError::UnknownOperation {
            code: "fhirpath-r6".to_string(),
        };
        assert_eq!(unknown.to_outcome().kind(), Some("unknown-operation"));
        assert_eq!(unknown.into_response().status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn operation_errors_keep_their_kind() {
        let error = ServerError::from(OperationError::MalformedRequest("bad body".to_string()));
        let outcome = error.to_outcome();
        assert_eq!(outcome.kind(), Some("malformed-request"));
        assert_eq!(outcome.issue[0].diagnostics.as_deref(), Some("bad body"));
    }
}
