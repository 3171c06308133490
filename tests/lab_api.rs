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

//! End-to-end tests of the `$fhirpath` HTTP surface

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Method, Request, StatusCode, header},
};
use octofhir_fhirpath_lab::server::{AppState, ServerConfig, ServerRegistry, create_app};
use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use tower::ServiceExt;

fn app() -> Router {
    let config = ServerConfig::default();
    create_app(AppState::new(ServerRegistry::new(), "https://lab.example.org/fhir/"), &config)
}

struct Reply {
    status: StatusCode,
    content_type: Option<String>,
    headers: axum::http::HeaderMap,
    body: Value,
}

async fn send(request: Request<Body>) -> Reply {
    let response = app().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    Reply {
        status,
        content_type,
        headers,
        body,
    }
}

async fn post(path: &str, body: Value) -> Reply {
    let request = Request::builder()
        .uri(path)
        .method(Method::POST)
        .header(header::CONTENT_TYPE, "application/fhir+json")
        .body(Body::from(body.to_string()))
        .unwrap();
    send(request).await
}

fn patient() -> Value {
    json!({
        "resourceType": "Patient",
        "id": "example",
        "name": [
            {"use": "official", "given": ["Alice", "Mary"], "family": "Smith"},
            {"use": "nickname", "given": ["Jim"]}
        ]
    })
}

fn request(expression: &str, context: Option<&str>, resource: Value) -> Value {
    let mut parameter = vec![json!({"name": "expression", "valueString": expression})];
    if let Some(context) = context {
        parameter.push(json!({"name": "context", "valueString": context}));
    }
    parameter.push(json!({"name": "resource", "resource": resource}));
    json!({"resourceType": "Parameters", "parameter": parameter})
}

fn results(body: &Value) -> Vec<&Value> {
    body["parameter"]
        .as_array()
        .unwrap()
        .iter()
        .filter(|p| p["name"] == "result")
        .collect()
}

fn echo_part<'a>(body: &'a Value, name: &str) -> Option<&'a Value> {
    body["parameter"][0]["part"]
        .as_array()?
        .iter()
        .find(|part| part["name"] == name)
}

#[tokio::test]
async fn evaluates_expression_without_context() {
    let reply = post("/$fhirpath", request("Patient.name.given.first()", None, patient())).await;

    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.content_type.as_deref(), Some("application/fhir+json; fhirVersion=4.0"));
    assert_eq!(reply.body["resourceType"], "Parameters");
    assert_eq!(reply.body["parameter"][0]["name"], "parameters");

    let results = results(&reply.body);
    assert_eq!(results.len(), 1);
    assert!(results[0].get("valueString").is_none());
    assert_eq!(
        results[0]["part"],
        json!([{"name": "string", "valueString": "Alice"}])
    );

    let evaluator = echo_part(&reply.body, "evaluator").unwrap();
    assert!(evaluator["valueString"].as_str().unwrap().ends_with("(R4)"));
    assert_eq!(
        echo_part(&reply.body, "expression").unwrap()["valueString"],
        "Patient.name.given.first()"
    );
    assert!(echo_part(&reply.body, "context").is_none());
}

#[tokio::test]
async fn context_expression_produces_one_result_per_item() {
    let reply = post("/$fhirpath", request("given.first()", Some("name"), patient())).await;

    assert_eq!(reply.status, StatusCode::OK);
    let results = results(&reply.body);
    assert_eq!(results.len(), 2);
    assert_eq!(results[0]["valueString"], "name[0]");
    assert_eq!(results[0]["part"], json!([{"name": "string", "valueString": "Alice"}]));
    assert_eq!(results[1]["valueString"], "name[1]");
    assert_eq!(results[1]["part"], json!([{"name": "string", "valueString": "Jim"}]));
    assert_eq!(echo_part(&reply.body, "context").unwrap()["valueString"], "name");
}

#[tokio::test]
async fn variables_are_bound_and_echoed() {
    let mut body = request("%v", None, patient());
    body["parameter"]
        .as_array_mut()
        .unwrap()
        .push(json!({"name": "variables", "part": [{"name": "v", "valueString": "testMe"}]}));

    let reply = post("/$fhirpath-r4", body).await;

    assert_eq!(reply.status, StatusCode::OK);
    let results = results(&reply.body);
    assert_eq!(results[0]["part"], json!([{"name": "string", "valueString": "testMe"}]));
    assert_eq!(
        echo_part(&reply.body, "variables").unwrap()["part"],
        json!([{"name": "v", "valueString": "testMe"}])
    );
}

#[tokio::test]
async fn traces_stay_with_their_context_item() {
    let reply = post(
        "/$fhirpath",
        request("given.first().trace('trc')", Some("name"), patient()),
    )
    .await;

    let results = results(&reply.body);
    assert_eq!(results.len(), 2);
    let traces = |result: &Value| -> Vec<Value> {
        result["part"]
            .as_array()
            .unwrap()
            .iter()
            .filter(|part| part["name"] == "trace")
            .cloned()
            .collect()
    };
    assert_eq!(
        traces(results[0]),
        vec![json!({"name": "trace", "valueString": "trc", "part": [{"name": "string", "valueString": "Alice"}]})]
    );
    assert_eq!(
        traces(results[1]),
        vec![json!({"name": "trace", "valueString": "trc", "part": [{"name": "string", "valueString": "Jim"}]})]
    );
}

#[tokio::test]
async fn resources_are_returned_as_json_value_extensions() {
    let bundle = json!({
        "resourceType": "Bundle",
        "type": "collection",
        "entry": [{"resource": {"resourceType": "Patient", "id": "p1"}}]
    });
    let reply = post("/$fhirpath", request("Bundle.entry.resource.ofType(Patient)", None, bundle)).await;

    assert_eq!(reply.status, StatusCode::OK);
    let results = results(&reply.body);
    let part = &results[0]["part"][0];
    assert_eq!(part["name"], "Patient");
    let extension = &part["extension"][0];
    assert!(extension["url"].as_str().unwrap().ends_with("json-value"));
    let embedded: Value = serde_json::from_str(extension["valueString"].as_str().unwrap()).unwrap();
    assert_eq!(embedded, json!({"resourceType": "Patient", "id": "p1"}));
}

#[tokio::test]
async fn release_routes_label_their_release() {
    for (path, label, mime) in [
        ("/$fhirpath-r4b", "(R4B)", "application/fhir+json; fhirVersion=4.3"),
        ("/$fhirpath-r5", "(R5)", "application/fhir+json; fhirVersion=5.0"),
    ] {
        let reply = post(path, request("Patient.id", None, patient())).await;
        assert_eq!(reply.status, StatusCode::OK, "{path}");
        assert_eq!(reply.content_type.as_deref(), Some(mime));
        let evaluator = echo_part(&reply.body, "evaluator").unwrap()["valueString"]
            .as_str()
            .unwrap()
            .to_string();
        assert!(evaluator.ends_with(label), "{evaluator}");
    }
}

#[tokio::test]
async fn missing_expression_is_an_operation_outcome() {
    let body = json!({
        "resourceType": "Parameters",
        "parameter": [{"name": "resource", "resource": patient()}]
    });
    let reply = post("/$fhirpath", body).await;

    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert_eq!(reply.content_type.as_deref(), Some("application/fhir+json"));
    assert_eq!(reply.body["resourceType"], "OperationOutcome");
    let issue = &reply.body["issue"][0];
    assert_eq!(issue["severity"], "fatal");
    assert_eq!(issue["code"], "processing");
    assert_eq!(issue["diagnostics"], "missing 'expression' parameter");
    assert_eq!(issue["details"]["coding"][0]["code"], "missing-parameter");
}

#[tokio::test]
async fn parse_errors_name_the_expression() {
    let reply = post("/$fhirpath", request("Patient.name.(", None, patient())).await;

    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    let diagnostics = reply.body["issue"][0]["diagnostics"].as_str().unwrap();
    assert!(diagnostics.starts_with("expression parse error"), "{diagnostics}");
}

#[tokio::test]
async fn malformed_body_is_rejected() {
    let request = Request::builder()
        .uri("/$fhirpath")
        .method(Method::POST)
        .body(Body::from("{not json"))
        .unwrap();
    let reply = send(request).await;

    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert_eq!(reply.body["issue"][0]["details"]["coding"][0]["code"], "malformed-request");
}

#[tokio::test]
async fn preflight_for_allowed_origin() {
    let request = Request::builder()
        .uri("/$fhirpath")
        .method(Method::OPTIONS)
        .header(header::ORIGIN, "https://FHIRPATH-LAB.com")
        .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
        .body(Body::empty())
        .unwrap();
    let reply = send(request).await;

    assert_eq!(reply.status, StatusCode::NO_CONTENT);
    assert_eq!(reply.body, Value::Null);
    let get = |name: header::HeaderName| reply.headers.get(name).and_then(|v| v.to_str().ok()).map(str::to_string);
    assert_eq!(
        get(header::ACCESS_CONTROL_ALLOW_ORIGIN).as_deref(),
        Some("https://fhirpath-lab.com")
    );
    assert_eq!(get(header::VARY).as_deref(), Some("Origin"));
    assert_eq!(get(header::ACCESS_CONTROL_ALLOW_HEADERS).as_deref(), Some("Content-Type"));
    assert_eq!(get(header::ACCESS_CONTROL_ALLOW_METHODS).as_deref(), Some("POST, OPTIONS"));
}

#[tokio::test]
async fn other_origins_get_no_cors_headers() {
    let request = Request::builder()
        .uri("/$fhirpath")
        .method(Method::POST)
        .header(header::ORIGIN, "https://evil.example.com")
        .body(Body::from(request("Patient.id", None, patient()).to_string()))
        .unwrap();
    let reply = send(request).await;

    assert_eq!(reply.status, StatusCode::OK);
    assert!(reply.headers.get(header::ACCESS_CONTROL_ALLOW_ORIGIN).is_none());
    assert!(reply.headers.get(header::ACCESS_CONTROL_ALLOW_METHODS).is_none());
}

#[tokio::test]
async fn metadata_lists_operation_definitions() {
    let request = Request::builder().uri("/metadata").body(Body::empty()).unwrap();
    let reply = send(request).await;

    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["resourceType"], "CapabilityStatement");
    let operations = reply.body["rest"][0]["operation"].as_array().unwrap();
    assert_eq!(operations.len(), 4);
    assert_eq!(
        operations[0]["definition"],
        "https://lab.example.org/fhir/OperationDefinition/fhirpath"
    );
}

#[tokio::test]
async fn operation_definition_lookup() {
    let request = Request::builder()
        .uri("/OperationDefinition/fhirpath-r5")
        .body(Body::empty())
        .unwrap();
    let reply = send(request).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["resourceType"], "OperationDefinition");
    assert_eq!(reply.body["code"], "fhirpath-r5");

    let request = Request::builder()
        .uri("/OperationDefinition/fhirpath-r6")
        .body(Body::empty())
        .unwrap();
    let reply = send(request).await;
    assert_eq!(reply.status, StatusCode::NOT_FOUND);
    assert_eq!(reply.body["issue"][0]["details"]["coding"][0]["code"], "unknown-operation");
}

#[tokio::test]
async fn unknown_routes_are_not_found() {
    let reply = post("/$fhirpath-r6", request("Patient.id", None, patient())).await;
    assert_eq!(reply.status, StatusCode::NOT_FOUND);
    assert_eq!(reply.body["resourceType"], "OperationOutcome");
}
