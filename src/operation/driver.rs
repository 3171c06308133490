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

//! Evaluation driver
//!
//! Parses the main expression (and the context expression, when given),
//! evaluates the context once against the resource and then the main
//! expression once per context item. Every evaluation call gets its own
//! trace collector. Any failure aborts the whole request.

use super::cancellation::Cancellation;
use super::error::{ExpressionRole, OperationError, OperationResult};
use super::variables::VariableBindings;
use crate::engine::context::is_reserved_variable;
use crate::engine::{
    CollectingTraceProvider, Collection, EvaluationContext, ExpressionNode, FhirPathEngine, FhirPathError,
    TraceEntry, VariableMap,
};
use crate::model::TypedResource;
use std::sync::Arc;
use tracing::{debug, warn};

/// Normalized inputs of one `$fhirpath` invocation
#[derive(Debug, Clone)]
pub struct EvaluationInputs {
    pub expression: String,
    pub context: Option<String>,
    pub resource: TypedResource,
    pub variables: VariableBindings,
    /// Accepted for compatibility, not used for evaluation
    pub terminology_server: Option<String>,
}

impl EvaluationInputs {
    /// Trimmed context expression, when present and not blank
    pub fn context_expression(&self) -> Option<&str> {
        self.context.as_deref().map(str::trim).filter(|context| !context.is_empty())
    }
}

/// Output of one evaluation call
#[derive(Debug, Clone, PartialEq)]
pub struct ResultEntry {
    /// `<context>[<index>]`, absent without a context expression
    pub context_path: Option<String>,
    pub values: Collection,
    pub traces: Vec<TraceEntry>,
}

/// Runs the evaluation protocol for `inputs`.
pub fn evaluate(
    engine: &FhirPathEngine,
    inputs: &EvaluationInputs,
    cancellation: &Cancellation,
) -> OperationResult<Vec<ResultEntry>> {
    if inputs.expression.trim().is_empty() {
        debug!("blank expression, nothing to evaluate");
        return Ok(Vec::new());
    }

    let main = engine
        .parse(&inputs.expression)
        .map_err(|e| parse_error(ExpressionRole::Main, e))?;
    let context = match inputs.context_expression() {
        Some(text) => {
            let ast = engine
                .parse(text)
                .map_err(|e| parse_error(ExpressionRole::Context, e))?;
            Some((text, ast))
        }
        None => None,
    };

    let root = Collection::single(inputs.resource.to_value());
    let environment = EvaluationContext::new(inputs.resource.to_value())
        .with_variables(Arc::new(variable_map(&inputs.variables)));

    let Some((context_text, context_ast)) = context else {
        ensure_active(cancellation)?;
        return Ok(vec![evaluate_call(engine, &main, root, environment, None)?]);
    };

    let items = engine
        .evaluate(&context_ast, root, &environment)
        .map_err(|e| evaluation_error(ExpressionRole::Context, e))?;
    debug!(context = context_text, items = items.len(), "context expression evaluated");

    let mut results = Vec::with_capacity(items.len());
    for (index, item) in items.into_iter().enumerate() {
        ensure_active(cancellation)?;
        let focus = Collection::single(item);
        let item_environment = environment.clone().with_context(focus.clone());
        let context_path = format!("{context_text}[{index}]");
        results.push(evaluate_call(
            engine,
            &main,
            focus,
            item_environment,
            Some(context_path),
        )?);
    }
    Ok(results)
}

fn evaluate_call(
    engine: &FhirPathEngine,
    expression: &ExpressionNode,
    focus: Collection,
    environment: EvaluationContext,
    context_path: Option<String>,
) -> OperationResult<ResultEntry> {
    let tracer = CollectingTraceProvider::shared();
    let environment = environment.with_tracer(tracer.clone());
    let values = engine
        .evaluate(expression, focus, &environment)
        .map_err(|e| evaluation_error(ExpressionRole::Main, e))?;
    Ok(ResultEntry {
        context_path,
        values,
        traces: tracer.take_entries(),
    })
}

fn variable_map(bindings: &VariableBindings) -> VariableMap {
    let mut variables = VariableMap::default();
    for (name, value) in bindings {
        if is_reserved_variable(name) {
            warn!(variable = %name, "ignoring request variable that shadows an environment variable");
            continue;
        }
        variables.insert(name.clone(), value.to_collection());
    }
    variables
}

fn ensure_active(cancellation: &Cancellation) -> OperationResult<()> {
    if cancellation.is_cancelled() {
        debug!("request cancelled, stopping evaluation");
        return Err(OperationError::Cancelled);
    }
    Ok(())
}

fn parse_error(role: ExpressionRole, error: FhirPathError) -> OperationError {
    OperationError::ParseError {
        role,
        message: error.to_string(),
    }
}

fn evaluation_error(role: ExpressionRole, error: FhirPathError) -> OperationError {
    OperationError::EvaluationError {
        role,
        message: error.to_string(),
    }
}
