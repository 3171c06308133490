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

//! FHIRPath expression engine
//!
//! A compact tree-walking implementation: [`tokenizer`] and [`parser`] turn
//! text into an [`ExpressionNode`], [`FhirPathEngine::evaluate`] walks it
//! against JSON resources. The engine holds no per-call state and can be
//! shared across threads.

pub mod ast;
pub mod context;
pub mod error;
mod evaluator;
mod functions;
mod operators;
pub mod parser;
pub mod provider;
pub mod tokenizer;
pub mod trace;
pub mod value;

pub use ast::ExpressionNode;
pub use context::{EvaluationContext, VariableMap};
pub use error::{FhirPathError, Result};
pub use provider::{EmptyModelProvider, ModelProvider};
pub use trace::{CollectingTraceProvider, SharedTraceProvider, TraceEntry, TraceProvider};
pub use value::{Collection, FhirPathValue, FhirResource};

use evaluator::Evaluator;
use std::sync::Arc;

/// Name and version reported as the evaluator label
pub const ENGINE_LABEL: &str = concat!(env!("CARGO_PKG_NAME"), "-", env!("CARGO_PKG_VERSION"));

/// Reentrant FHIRPath engine bound to one model provider
#[derive(Clone)]
pub struct FhirPathEngine {
    model: Arc<dyn ModelProvider>,
}

impl FhirPathEngine {
    pub fn new(model: Arc<dyn ModelProvider>) -> Self {
        Self { model }
    }

    pub fn model(&self) -> &Arc<dyn ModelProvider> {
        &self.model
    }

    /// `"<engine> (<release>)"`
    pub fn label(&self) -> String {
        format!("{} ({})", ENGINE_LABEL, self.model.release_label())
    }

    pub fn parse(&self, expression: &str) -> Result<ExpressionNode> {
        parser::parse_expression(expression)
    }

    /// Evaluates `ast` with `input` as the focus.
    pub fn evaluate(
        &self,
        ast: &ExpressionNode,
        input: Collection,
        context: &EvaluationContext,
    ) -> Result<Collection> {
        Evaluator::new(self.model.as_ref(), context).evaluate_root(ast, input)
    }

    /// Parses and evaluates against the context's root resource.
    pub fn evaluate_expression(&self, expression: &str, context: &EvaluationContext) -> Result<Collection> {
        let ast = self.parse(expression)?;
        self.evaluate(&ast, context.resource().clone(), context)
    }
}

impl Default for FhirPathEngine {
    fn default() -> Self {
        Self::new(Arc::new(EmptyModelProvider))
    }
}
