//! Hook Expression Evaluation
//!
//! Attribute values in a hook definition stay unevaluated until the stage
//! that owns them runs. This module turns those [`crate::ast::Expression`]s
//! into [`Value`]s.
//!
//! # Core Components
//!
//! ## Expression Evaluator
//! Resolves literals, templates, variable traversals, lists, objects and
//! function calls. Function calls go through the context's
//! [`crate::function::FunctionRegistry`], which checks the signature before
//! invoking the implementation.
//!
//! ## Evaluation Context
//! Per-request state: the variables visible to expressions (`request`,
//! `payload`, `headers`, `params`, and `result` once the task has run), the
//! request [`Lookups`] read by `header`, `payload` and `param`, and the
//! [`Clock`] used by `since`.
//!
//! # Evaluation Pipeline
//!
//! 1. A stage decoder picks an attribute expression out of a body
//! 2. The context evaluates it, calling functions as they are reached
//! 3. The decoder converts the resulting [`Value`] into its field type
//! 4. Values committed by one stage are visible to every later stage

pub mod context;
pub mod expression;

pub use context::{Clock, EvaluationContext, FixedClock, Lookups, SystemClock};
pub use expression::{EvalError, EvalResult, ExpressionEvaluator, Value, ValueKind};
