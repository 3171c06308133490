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

//! Resolves the `resource` parameter into a release-typed resource

use super::error::{OperationError, OperationResult};
use super::navigator::extensions_of;
use crate::model::parameters::JSON_VALUE_URL_TOKEN;
use crate::model::{DecodeError, FhirRelease, Parameter, TypedResource};
use serde_json::Value as JsonValue;
use tracing::debug;

const MISSING_OR_INVALID: &str = "resource parameter missing or invalid";

/// Obtains the resource carried by `node` for `release`.
///
/// An inline resource wins over a `json-value` extension. Inline payloads
/// that do not decode fall through to the extension; an extension that does
/// not decode is an error.
pub fn resolve_resource(node: &Parameter, release: FhirRelease) -> OperationResult<TypedResource> {
    if let Some(inline) = &node.resource {
        match decode_inline(inline, release) {
            Ok(resource) => return Ok(resource),
            Err(reason) => debug!(%release, %reason, "inline resource not usable, checking extensions"),
        }
    }

    let out_of_band = extensions_of(node, Some(JSON_VALUE_URL_TOKEN))
        .into_iter()
        .find_map(|ext| ext.value_str());
    if let Some(json) = out_of_band {
        return release.decode_resource_str(json).map_err(|e| {
            OperationError::ResourceDecodeError(format!(
                "failed to decode resource from json-value extension: {e}"
            ))
        });
    }

    Err(OperationError::ResourceDecodeError(MISSING_OR_INVALID.to_string()))
}

fn decode_inline(inline: &JsonValue, release: FhirRelease) -> Result<TypedResource, DecodeError> {
    match inline {
        // Raw resource JSON embedded as text
        JsonValue::String(text) => release.decode_resource_str(text),
        other => release.decode_resource(other),
    }
}
