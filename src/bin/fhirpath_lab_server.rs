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
//! Serves `$fhirpath`, `$fhirpath-r4`, `$fhirpath-r4b` and `$fhirpath-r5`.

use clap::Parser;
use octofhir_fhirpath_lab::server::{ServerConfig, resolve_listen_address, start_server};
use std::process;
use tracing_subscriber::EnvFilter;

/// Stack for runtime and blocking-pool threads; evaluation recurses over the expression tree
const WORKER_STACK_SIZE: usize = 8 * 1024 * 1024;

#[derive(Parser)]
#[command(name = "fhirpath-lab-server")]
#[command(about = "FHIRPath Lab evaluation server for FHIR R4, R4B and R5")]
#[command(version)]
#[command(author = "OctoFHIR Team <funyloony@gmail.com>")]
struct Cli {
    /// Listen address, `host:port` or `:port`. Falls back to PORT, then :3001
    #[arg(long)]
    addr: Option<String>,

    /// Public base URL used in canonical OperationDefinition URLs
    #[arg(long, env = "FHIRPATH_LAB_BASE_URL", default_value = "")]
    base_url: String,

    /// Maximum request body size in MB
    #[arg(long, default_value_t = 60)]
    max_body_size_mb: u64,
}

fn main() {
    human_panic::setup_panic!();

    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let port = std::env::var("PORT").ok();
    let config = ServerConfig {
        listen_address: resolve_listen_address(cli.addr.as_deref(), port.as_deref()),
        base_url: cli.base_url,
        max_body_size_mb: cli.max_body_size_mb,
    };

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_stack_size(WORKER_STACK_SIZE)
        .build();
    let runtime = match runtime {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Error: failed to start async runtime: {e}");
            process::exit(1);
        }
    };

    if let Err(e) = runtime.block_on(start_server(config)) {
        tracing::error!("server error: {e:#}");
        process::exit(1);
    }
}
