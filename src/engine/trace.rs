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

//! Trace provider abstraction for the `trace()` function
//!
//! The evaluator hands every `trace(label)` call to the provider attached to
//! the evaluation context:
//! - [`NoOpTraceProvider`] discards everything
//! - [`CollectingTraceProvider`] keeps entries for one evaluation call so
//!   they can be returned alongside its results

use super::value::Collection;
use parking_lot::Mutex;
use std::sync::Arc;

/// Receives values passed through `trace()`
pub trait TraceProvider: Send + Sync {
    /// Called once per `trace()` invocation with the traced collection
    fn trace(&self, label: &str, values: &Collection);
}

pub type SharedTraceProvider = Arc<dyn TraceProvider>;

/// Values emitted under one trace label
#[derive(Debug, Clone, PartialEq)]
pub struct TraceEntry {
    pub label: String,
    pub values: Collection,
}

pub struct NoOpTraceProvider;

impl TraceProvider for NoOpTraceProvider {
    fn trace(&self, _label: &str, _values: &Collection) {}
}

/// Collects trace output for a single evaluation call.
///
/// Repeated calls with the same label append to that label's entry; entries
/// keep the order in which their label was first seen. Values are cloned at
/// call time.
#[derive(Default)]
pub struct CollectingTraceProvider {
    entries: Mutex<Vec<TraceEntry>>,
}

impl CollectingTraceProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    pub fn entries(&self) -> Vec<TraceEntry> {
        self.entries.lock().clone()
    }

    pub fn take_entries(&self) -> Vec<TraceEntry> {
        std::mem::take(&mut *self.entries.lock())
    }
}

impl TraceProvider for CollectingTraceProvider {
    fn trace(&self, label: &str, values: &Collection) {
        tracing::trace!(label, count = values.len(), "trace() called");
        let mut entries = self.entries.lock();
        match entries.iter_mut().find(|entry| entry.label == label) {
            Some(entry) => entry.values.extend(values.clone()),
            None => entries.push(TraceEntry {
                label: label.to_string(),
                values: values.clone(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::value::FhirPathValue;

    #[test]
    fn collects_entries_per_label_in_first_seen_order() {
        let provider = CollectingTraceProvider::new();
        provider.trace("b", &Collection::single(FhirPathValue::Integer(1)));
        provider.trace("a", &Collection::single(FhirPathValue::Integer(2)));
        provider.trace("b", &Collection::single(FhirPathValue::Integer(3)));

        let entries = provider.take_entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].label, "b");
        assert_eq!(
            entries[0].values.to_vec(),
            vec![FhirPathValue::Integer(1), FhirPathValue::Integer(3)]
        );
        assert_eq!(entries[1].label, "a");
        assert!(provider.entries().is_empty());
    }

    #[test]
    fn recorded_values_do_not_follow_later_changes() {
        let provider = CollectingTraceProvider::new();
        let mut values = Collection::single(FhirPathValue::string("x"));
        provider.trace("t", &values);
        values.push(FhirPathValue::string("y"));
        assert_eq!(provider.entries()[0].values.len(), 1);
    }

    #[test]
    fn noop_provider_accepts_calls() {
        NoOpTraceProvider.trace("ignored", &Collection::empty());
    }
}
