//! Staged decoding of hook documents.
//!
//! A document is resolved in four ordered stages. Each stage decodes only the
//! fields it owns and hands the rest of the body on as a remainder:
//!
//! 1. [`Stage::Server`]: listener attributes; the hook blocks stay opaque.
//! 2. [`Stage::Hooks`]: one [`HookDefinition`] per `hook "id"` block with
//!    its optional `request` shape.
//! 3. [`Stage::PreExec`]: per request, with `request`, `payload`, `headers`
//!    and `params` in scope: constraints and the task.
//! 4. [`Stage::PostExec`]: after the gate (and the task, when it ran): the
//!    selected response block only.
//!
//! Every stage fails atomically with all of its field diagnostics.

pub mod hooks;
pub mod post_exec;
pub mod pre_exec;
pub mod schema;
pub mod server;
pub mod validate;

pub use hooks::{decode_hooks, HookDefinition};
pub use post_exec::{decode_post_exec, PostExecConfig, ResponseSpec};
pub use pre_exec::{
    decode_pre_exec, CreateFile, PassFile, PassFileSource, PreExecConfig, TaskSpec,
};
pub use server::{decode_server, ServerConfig};
pub use validate::validate_hook;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
pub enum Stage {
    Server,
    Hooks,
    PreExec,
    PostExec,
}
