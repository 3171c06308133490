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

//! Shared engine registry
//!
//! One [`FhirPathEngine`] per supported release, built once at startup and
//! shared by every request.

use crate::engine::FhirPathEngine;
use crate::model::FhirRelease;
use rustc_hash::FxHashMap;
use std::sync::Arc;
use tracing::info;

#[derive(Clone)]
pub struct ServerRegistry {
    engines: FxHashMap<FhirRelease, FhirPathEngine>,
}

impl ServerRegistry {
    pub fn new() -> Self {
        let mut engines = FxHashMap::default();
        for &release in FhirRelease::all() {
            let engine = FhirPathEngine::new(Arc::new(release.model()));
            info!(%release, evaluator = %engine.label(), "engine ready");
            engines.insert(release, engine);
        }
        Self { engines }
    }

    pub fn engine(&self, release: FhirRelease) -> Option<&FhirPathEngine> {
        self.engines.get(&release)
    }

    pub fn release_count(&self) -> usize {
        self.engines.len()
    }
}

impl Default for ServerRegistry {
    fn default() -> Self {
        Self::new()
    }
}
