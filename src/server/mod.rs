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

//! HTTP server for the FHIRPath Lab operations
//!
//! Routes:
//! - `POST /$fhirpath`, `/$fhirpath-r4`, `/$fhirpath-r4b`, `/$fhirpath-r5`
//! - `GET /metadata`
//! - `GET /OperationDefinition/{code}`
//!
//! Every route goes through the allow-listed CORS middleware.

pub mod config;
pub mod cors;
pub mod error;
pub mod handlers;
pub mod registry;

pub use config::{ServerConfig, resolve_listen_address};
pub use error::{ServerError, ServerResult};
pub use registry::ServerRegistry;

use crate::operation::OPERATIONS;
use axum::{
    Router,
    body::Bytes,
    extract::{DefaultBodyLimit, State},
    middleware,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::{catch_panic::CatchPanicLayer, trace::TraceLayer};
use tracing::info;

/// State shared by all handlers
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<ServerRegistry>,
    pub base_url: Arc<str>,
}

impl AppState {
    pub fn new(registry: ServerRegistry, base_url: &str) -> Self {
        Self {
            registry: Arc::new(registry),
            base_url: Arc::from(base_url),
        }
    }
}

/// Start the FHIRPath Lab server and serve until Ctrl-C
pub async fn start_server(config: ServerConfig) -> anyhow::Result<()> {
    let registry = ServerRegistry::new();
    info!(releases = registry.release_count(), "engine registry initialized");

    let state = AppState::new(registry, &config.base_url);
    let app = create_app(state, &config);

    let addr = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("server stopped");
    Ok(())
}

/// Create the application router
pub fn create_app(state: AppState, config: &ServerConfig) -> Router {
    let mut app = Router::new();

    for operation in OPERATIONS {
        let release = operation.release;
        app = app.route(
            &format!("/${}", operation.code),
            post(move |State(state): State<AppState>, body: Bytes| {
                handlers::invoke_operation(state, release, body)
            }),
        );
    }

    app.route("/metadata", get(handlers::metadata_handler))
        .route("/OperationDefinition/{code}", get(handlers::operation_definition_handler))
        .fallback(handlers::fallback_handler)
        .layer(DefaultBodyLimit::max(config.max_payload_size()))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(cors::cors_middleware))
        .layer(CatchPanicLayer::new())
        .with_state(state)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
