//! Structural checks of hook remainders at load time.
//!
//! PreExec and PostExec only run per request, so without this pass a typo in
//! a response block would surface on the first matching request. Nothing is
//! evaluated here: fields are matched against the stage schemas, and every
//! expression is checked for unknown functions, wrong arity and variables
//! that are not in scope for its stage.

use tracing::instrument;

use super::hooks::HookDefinition;
use super::post_exec::POST_EXEC;
use super::pre_exec::PRE_EXEC;
use super::schema::{block_path, extract, join_path, Content, Mode, Schema};
use crate::ast::Expression;
use crate::error::Diagnostics;
use crate::eval::EvalError;
use crate::function::FunctionRegistry;
use crate::response::ResponseKind;

/// Variables populated before PreExec.
pub const REQUEST_VARIABLES: [&str; 4] = ["request", "payload", "headers", "params"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scope {
    Request,
    /// `result` is available too.
    Executed,
}

impl Scope {
    fn contains(self, variable: &str) -> bool {
        REQUEST_VARIABLES.contains(&variable) || (self == Scope::Executed && variable == "result")
    }
}

struct Validator<'a> {
    registry: &'a FunctionRegistry,
    diagnostics: Diagnostics,
}

impl Validator<'_> {
    fn check_content(&mut self, content: &Content, schema: &Schema, path: &str, scope: Scope) {
        for attribute in &content.attributes {
            self.check_expression(&attribute.expr, &join_path(path, &attribute.name), scope);
        }

        for block in &content.blocks {
            let Some(body_schema) = schema
                .blocks
                .iter()
                .find(|b| b.kind == block.kind)
                .and_then(|b| b.body)
            else {
                continue;
            };
            let scope = if block.kind == ResponseKind::Unsatisfied.block_name() {
                Scope::Request
            } else {
                scope
            };
            let path = block_path(path, block);
            let (inner, _) = extract(
                &block.body,
                body_schema,
                &path,
                Mode::Full,
                &mut self.diagnostics,
            );
            self.check_content(&inner, body_schema, &path, scope);
        }
    }

    fn check_expression(&mut self, expr: &Expression, path: &str, scope: Scope) {
        for (function, arity) in expr.calls() {
            if let Err(e) = self.registry.check_call(function, arity) {
                self.diagnostics.push(path, e);
            }
        }
        for variable in expr.variables() {
            if !scope.contains(variable) {
                self.diagnostics
                    .push(path, EvalError::UnknownVariable(variable.to_string()));
            }
        }
    }
}

/// Returns every structural problem of `hook`; empty when it is loadable.
#[instrument(level = "debug", skip_all, fields(hook = %hook.id))]
pub fn validate_hook(hook: &HookDefinition, registry: &FunctionRegistry) -> Diagnostics {
    let path = format!("hook[{:?}]", hook.id);
    let mut validator = Validator {
        registry,
        diagnostics: Diagnostics::new(),
    };

    let (pre_exec, rest) = extract(
        &hook.remainder,
        &PRE_EXEC,
        &path,
        Mode::Partial,
        &mut validator.diagnostics,
    );
    validator.check_content(&pre_exec, &PRE_EXEC, &path, Scope::Request);

    let (post_exec, _) = extract(
        &rest,
        &POST_EXEC,
        &path,
        Mode::Full,
        &mut validator.diagnostics,
    );
    validator.check_content(&post_exec, &POST_EXEC, &path, Scope::Executed);

    validator.diagnostics
}
