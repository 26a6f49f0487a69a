//! # hookdecl: declarative webhook hooks
//!
//! hookdecl evaluates hook documents: rules that decide whether an incoming
//! webhook request may trigger a task, what the task is, and what to answer.
//!
//! ```text
//! hook "deploy" {
//!   request { content_type = "application/json" }
//!   constraints = [
//!     eq(header("x-signature"), sha256(payload, getenv("DEPLOY_SECRET"))),
//!     match("^refs/heads/main$", payload("ref")),
//!   ]
//!   task { cmd = ["deploy.sh", payload("head_commit.id")] }
//!   response {
//!     success { body = result.CombinedOutput }
//!   }
//! }
//! ```
//!
//! ## Processing Pipeline
//!
//! ```text
//! Source → Parser → Server → Hooks → Validation        (once, at load)
//! Request → PreExec → Gate → Executor → PostExec → Response   (per request)
//! ```
//!
//! ### Parsing
//!
//! The [`parser`] turns the document into an [`ast::Body`] tree. Attribute
//! values stay unevaluated [`ast::Expression`]s.
//!
//! ### Staged Decoding
//!
//! The [`decoder`] resolves the tree in ordered stages, each one decoding
//! only the fields it owns and handing the rest on as a remainder. PreExec
//! sees the request, PostExec additionally sees the task `result`.
//!
//! ### Evaluation
//!
//! Expressions are evaluated by [`eval`] against a per-request
//! [`eval::EvaluationContext`], which resolves variables and dispatches calls
//! to the immutable [`function::FunctionRegistry`].
//!
//! ### Gate, Execution and Response
//!
//! The [`gate`] reduces constraints to a [`gate::Verdict`]. Only a satisfied
//! request reaches the [`executor`]; the [`response`] block is then selected
//! from the verdict and the task result.
//!
//! [`pipeline::Service`] ties the stages together.

pub mod ast;
pub mod config;
pub mod decoder;
pub mod error;
pub mod eval;
pub mod executor;
pub mod function;
pub mod gate;
pub mod parser;
pub mod pipeline;
pub mod request;
pub mod response;

// Re-exports
pub use error::*;
pub use eval::{EvaluationContext, Value};
pub use pipeline::{EvaluationFailure, Outcome, Service};

#[cfg(test)]
mod tests {
    use tracing_subscriber::{EnvFilter, FmtSubscriber};

    #[ctor::ctor]
    fn init_tests() {
        let subscriber = FmtSubscriber::builder()
            .with_env_filter(EnvFilter::from_default_env())
            .finish();
        tracing::subscriber::set_global_default(subscriber)
            .expect("Failed to set tracing subscriber");
    }
}
