//! Load-time and per-request orchestration of the decode stages.
//!
//! [`Service::load`] runs the Server and Hooks stages once and validates every
//! hook. [`Service::handle`] then evaluates one request against one hook:
//!
//! ```text
//! PreExec -> gate -> (task, only when satisfied) -> PostExec -> response
//! ```
//!
//! PreExec and PostExec run on the blocking pool since `readfile` does file
//! I/O. The context is moved in and handed back so `result` can be added
//! between the two stages.

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::decoder::{
    decode_hooks, decode_post_exec, decode_pre_exec, decode_server, validate_hook,
    HookDefinition, PreExecConfig, ServerConfig, Stage,
};
use crate::error::{DecodeError, Diagnostic, Diagnostics};
use crate::eval::{Clock, EvaluationContext, SystemClock};
use crate::executor::{ExecutionResult, TaskExecutor};
use crate::function::FunctionRegistry;
use crate::gate::{self, Verdict};
use crate::parser::parse_document;
use crate::request::RequestData;
use crate::response::{RenderedResponse, ResponseKind};
use crate::{Error, InternalResult};

/// Everything a completed request evaluation produced.
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    pub hook_id: String,
    pub request_id: Uuid,
    pub verdict: Verdict,
    pub pre_exec: PreExecConfig,
    /// `None` when the gate denied and the task never ran.
    pub result: Option<ExecutionResult>,
    pub response: RenderedResponse,
}

/// A request evaluation that stopped at a failed stage.
///
/// Output committed by earlier stages is kept for diagnostics; the failed
/// stage's partial output is discarded.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("hook {hook_id:?}, request {request_id}: {error}")]
pub struct EvaluationFailure {
    pub hook_id: String,
    pub request_id: Uuid,
    pub error: DecodeError,
    pub pre_exec: Option<PreExecConfig>,
    pub result: Option<ExecutionResult>,
}

impl EvaluationFailure {
    pub fn stage(&self) -> Stage {
        self.error.stage
    }

    pub fn diagnostics(&self) -> impl Iterator<Item = &Diagnostic> {
        self.error.diagnostics.iter()
    }
}

/// A loaded hook document, ready to evaluate requests concurrently.
#[derive(Debug)]
pub struct Service {
    server: ServerConfig,
    hooks: HashMap<String, Arc<HookDefinition>>,
    functions: Arc<FunctionRegistry>,
    clock: Arc<dyn Clock>,
}

impl Service {
    /// Parses `source` and runs every load-time stage. Any problem is fatal.
    pub fn load(source: &str, config: &EngineConfig) -> InternalResult<Self> {
        let body = parse_document(source)?;
        let functions = FunctionRegistry::standard(config.debug);
        // nothing request-derived exists yet
        let context = EvaluationContext::new(functions.clone());

        let server = decode_server(&body, &context)?;
        debug!(ip = ?server.ip, port = ?server.port, "decoded server stage");
        let definitions = decode_hooks(&server.remainder, &context)?;

        let mut diagnostics = Diagnostics::new();
        for hook in &definitions {
            diagnostics.extend(validate_hook(hook, &functions));
        }
        diagnostics.finish(Stage::Hooks, ())?;

        let hooks: HashMap<_, _> = definitions
            .into_iter()
            .map(|hook| (hook.id.clone(), Arc::new(hook)))
            .collect();
        info!(hooks = hooks.len(), functions = functions.len(), "service loaded");

        Ok(Self {
            server,
            hooks,
            functions,
            clock: Arc::new(SystemClock),
        })
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn server(&self) -> &ServerConfig {
        &self.server
    }

    pub fn functions(&self) -> &Arc<FunctionRegistry> {
        &self.functions
    }

    pub fn hook(&self, id: &str) -> Option<&Arc<HookDefinition>> {
        self.hooks.get(id)
    }

    pub fn hook_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.hooks.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    /// Evaluates one request against the hook `hook_id`.
    ///
    /// The executor is called at most once, and only when the gate admits
    /// the request.
    pub async fn handle(
        &self,
        hook_id: &str,
        request: RequestData,
        executor: &dyn TaskExecutor,
    ) -> InternalResult<Outcome> {
        let hook = self
            .hooks
            .get(hook_id)
            .cloned()
            .ok_or_else(|| Error::UnknownHook(hook_id.to_string()))?;
        let context =
            EvaluationContext::new(self.functions.clone()).with_clock(self.clock.clone());
        let span = info_span!("request", hook = %hook.id, request_id = %context.id());

        evaluate(hook, context, request, executor)
            .instrument(span)
            .await
    }
}

async fn evaluate(
    hook: Arc<HookDefinition>,
    mut context: EvaluationContext,
    request: RequestData,
    executor: &dyn TaskExecutor,
) -> InternalResult<Outcome> {
    let request_id = context.id();
    let path = format!("hook[{:?}]", hook.id);
    let failure = |error: DecodeError,
                   pre_exec: Option<PreExecConfig>,
                   result: Option<ExecutionResult>| EvaluationFailure {
        hook_id: hook.id.clone(),
        request_id,
        error,
        pre_exec,
        result,
    };

    match request.lookups(hook.request.as_ref()) {
        Ok(lookups) => context = context.with_lookups(lookups),
        Err(reason) => {
            let mut diagnostics = Diagnostics::new();
            diagnostics.push("request.payload", reason);
            let error = DecodeError {
                stage: Stage::PreExec,
                diagnostics,
            };
            warn!(%error, "request rejected");
            return Err(failure(error, None, None).into());
        }
    }
    context.set_variable("request", request.request_value());
    context.set_variable("payload", request.payload.as_str().into());
    context.set_variable("headers", request.headers_value());
    context.set_variable("params", request.params_value());

    let (mut context, pre_exec) = {
        let hook = hook.clone();
        let path = path.clone();
        blocking(move || {
            let pre_exec = decode_pre_exec(&hook.remainder, &path, &context);
            (context, pre_exec)
        })
        .await?
    };
    let pre_exec = match pre_exec {
        Ok(pre_exec) => pre_exec,
        Err(error) => {
            warn!(%error, "pre-exec stage failed");
            return Err(failure(error, None, None).into());
        }
    };

    let verdict = gate::evaluate(pre_exec.constraints.as_deref());
    info!(%verdict, "constraints evaluated");

    let result = if verdict.is_satisfied() {
        Some(executor.execute(&pre_exec.task).await)
    } else {
        None
    };
    let kind = ResponseKind::select(verdict, result.as_ref());

    if let Some(result) = &result {
        context.set_variable("result", result.to_value());
    }
    let (pre_exec, post_exec) = blocking(move || {
        let post_exec = decode_post_exec(&pre_exec.remainder, &path, kind, &context);
        (pre_exec, post_exec)
    })
    .await?;
    let post_exec = match post_exec {
        Ok(post_exec) => post_exec,
        Err(error) => {
            warn!(%error, "post-exec stage failed");
            return Err(failure(error, Some(pre_exec), result).into());
        }
    };

    let response = RenderedResponse::render(kind, post_exec.response);
    info!(kind = %kind, status = response.status_code, "request evaluated");
    Ok(Outcome {
        hook_id: hook.id.clone(),
        request_id,
        verdict,
        pre_exec,
        result,
        response,
    })
}

async fn blocking<T, F>(f: F) -> InternalResult<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| Error::internal(format!("Decode task failed: {}", e)))
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::TimeZone;

    use super::*;
    use crate::eval::FixedClock;
    use crate::executor::MockTaskExecutor;
    use pretty_assertions::assert_eq;

    const DOCUMENT: &str = r#"
        port = 9000

        hook "echo" {
          task { cmd = ["echo", "ok"] }
          response {
            success { body = "${eq(result.exit_code, 0)}" }
          }
        }

        hook "signed" {
          request { content_type = "application/json" }
          constraints = [
            eq(header("x-signature"), sha256(payload("body"), "secret")),
          ]
          task { cmd = ["deploy.sh", payload("body")] }
          response {
            success { body = "deployed: ${result.CombinedOutput}" }
            error { body = "failed with ${result.exit_code}" }
            unsatisfied_constraints {
              status_code = 403
              body = "bad signature"
            }
          }
        }

        hook "network" {
          constraints = [cidr("10.0.0.0/8", request.remote_ip)]
          task { cmd = ["true"] }
        }

        hook "broken" {
          constraints = [cidr("not-a-cidr", "1.2.3.4")]
          task { cmd = ["true"] }
        }

        hook "fresh" {
          constraints = [lt(since(header("date")), duration("5m"))]
          task { cmd = ["true"] }
          response {
            success { status_code = result.CombinedOutput }
          }
        }
    "#;

    const SIGNATURE: &str = "88aab3ede8d3adf94d26ab90d3bafd4a2083070c3bcce9c014ee04a443847c0b";

    fn service() -> Service {
        let clock = FixedClock(chrono::Utc.with_ymd_and_hms(2019, 9, 20, 14, 10, 0).unwrap());
        Service::load(DOCUMENT, &EngineConfig::default())
            .unwrap()
            .with_clock(Arc::new(clock))
    }

    fn request(headers: &[(&str, &str)], payload: &str) -> RequestData {
        RequestData {
            method: "POST".to_string(),
            remote_ip: "10.1.2.3".to_string(),
            headers: headers
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<BTreeMap<_, _>>(),
            payload: payload.to_string(),
            ..RequestData::default()
        }
    }

    fn executor(result: ExecutionResult) -> MockTaskExecutor {
        let mut executor = MockTaskExecutor::new();
        executor
            .expect_execute()
            .times(1)
            .returning(move |_| result.clone());
        executor
    }

    fn never_executes() -> MockTaskExecutor {
        let mut executor = MockTaskExecutor::new();
        executor.expect_execute().never();
        executor
    }

    fn evaluation_failure(err: Error) -> EvaluationFailure {
        match err {
            Error::Evaluation(failure) => *failure,
            other => panic!("expected an evaluation failure, got {}", other),
        }
    }

    #[tokio::test]
    async fn test_no_constraints_runs_task() {
        let mut executor = MockTaskExecutor::new();
        executor
            .expect_execute()
            .withf(|task| task.cmd == ["echo", "ok"])
            .times(1)
            .returning(|_| ExecutionResult::success(7, "ok\n"));

        let outcome = service()
            .handle("echo", request(&[], ""), &executor)
            .await
            .unwrap();
        assert_eq!(outcome.verdict, Verdict::Satisfied);
        assert_eq!(outcome.pre_exec.constraints, None);
        assert_eq!(outcome.response.kind, ResponseKind::Success);
        assert_eq!(outcome.response.status_code, 200);
        assert_eq!(outcome.response.body, "true");
    }

    #[tokio::test]
    async fn test_signature_mismatch_never_runs_task() {
        let outcome = service()
            .handle(
                "signed",
                request(&[("X-Signature", "deadbeef")], r#"{"body":"hello"}"#),
                &never_executes(),
            )
            .await
            .unwrap();
        assert_eq!(outcome.verdict, Verdict::Unsatisfied);
        assert_eq!(outcome.result, None);
        assert_eq!(outcome.response.kind, ResponseKind::Unsatisfied);
        assert_eq!(outcome.response.status_code, 403);
        assert_eq!(outcome.response.body, "bad signature");
    }

    #[tokio::test]
    async fn test_signature_match_runs_task() {
        let executor = executor(ExecutionResult::success(9, "done"));
        let outcome = service()
            .handle(
                "signed",
                request(&[("X-Signature", SIGNATURE)], r#"{"body":"hello"}"#),
                &executor,
            )
            .await
            .unwrap();
        assert_eq!(outcome.pre_exec.task.cmd, vec!["deploy.sh", "hello"]);
        assert_eq!(outcome.response.body, "deployed: done");
        assert_eq!(outcome.result.unwrap().pid, 9);
    }

    #[tokio::test]
    async fn test_failed_task_selects_error_response() {
        let executor = executor(ExecutionResult {
            exit_code: 2,
            error: true,
            pid: 9,
            combined_output: "boom".to_string(),
        });
        let outcome = service()
            .handle(
                "signed",
                request(&[("x-signature", SIGNATURE)], r#"{"body":"hello"}"#),
                &executor,
            )
            .await
            .unwrap();
        assert_eq!(outcome.response.kind, ResponseKind::Error);
        assert_eq!(outcome.response.status_code, 500);
        assert_eq!(outcome.response.body, "failed with 2");
    }

    #[tokio::test]
    async fn test_cidr_constraints() {
        let outcome = service()
            .handle("network", request(&[], ""), &executor(ExecutionResult::default()))
            .await
            .unwrap();
        assert_eq!(outcome.pre_exec.constraints, Some(vec![true]));

        let mut outside = request(&[], "");
        outside.remote_ip = "192.168.1.1".to_string();
        let outcome = service()
            .handle("network", outside, &never_executes())
            .await
            .unwrap();
        assert_eq!(outcome.verdict, Verdict::Unsatisfied);
        assert_eq!(outcome.response.body, "Hook rules were not satisfied.");
    }

    #[tokio::test]
    async fn test_function_failure_aborts_pre_exec() {
        let err = service()
            .handle("broken", request(&[], ""), &never_executes())
            .await
            .unwrap_err();
        let failure = evaluation_failure(err);
        assert_eq!(failure.stage(), Stage::PreExec);
        assert_eq!(failure.pre_exec, None);
        let paths: Vec<&str> = failure.diagnostics().map(|d| d.path.as_str()).collect();
        assert_eq!(paths, vec!["hook[\"broken\"].constraints[0]"]);
    }

    #[tokio::test]
    async fn test_invalid_json_payload() {
        let err = service()
            .handle("signed", request(&[], "{not json"), &never_executes())
            .await
            .unwrap_err();
        let failure = evaluation_failure(err);
        assert_eq!(failure.stage(), Stage::PreExec);
        assert_eq!(
            failure.diagnostics().next().map(|d| d.path.as_str()),
            Some("request.payload")
        );
    }

    #[tokio::test]
    async fn test_post_exec_failure_keeps_committed_stages() {
        let executor = executor(ExecutionResult::success(3, "not a status"));
        let err = service()
            .handle(
                "fresh",
                request(&[("Date", "Fri, 20 Sep 2019 14:09:11 GMT")], ""),
                &executor,
            )
            .await
            .unwrap_err();
        let failure = evaluation_failure(err);
        assert_eq!(failure.stage(), Stage::PostExec);
        assert_eq!(failure.pre_exec.unwrap().constraints, Some(vec![true]));
        assert_eq!(failure.result.unwrap().pid, 3);
    }

    #[tokio::test]
    async fn test_since_reads_service_clock() {
        // 49s before the fixed clock passes, a day-old date does not
        let stale = service()
            .handle(
                "fresh",
                request(&[("Date", "Thu, 19 Sep 2019 14:09:11 GMT")], ""),
                &never_executes(),
            )
            .await
            .unwrap();
        assert_eq!(stale.verdict, Verdict::Unsatisfied);
    }

    #[tokio::test]
    async fn test_unknown_hook() {
        let err = service()
            .handle("missing", request(&[], ""), &never_executes())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UnknownHook(id) if id == "missing"));
    }

    #[tokio::test]
    async fn test_concurrent_requests_share_service() {
        let service = service();
        let first = executor(ExecutionResult::success(1, ""));
        let second = never_executes();
        let (a, b) = tokio::join!(
            service.handle("network", request(&[], ""), &first),
            service.handle("signed", request(&[], r#"{"body":"x"}"#), &second),
        );
        let (a, b) = (a.unwrap(), b.unwrap());
        assert_ne!(a.request_id, b.request_id);
        assert_eq!(a.verdict, Verdict::Satisfied);
        assert_eq!(b.verdict, Verdict::Unsatisfied);
    }

    #[test]
    fn test_load() {
        let service = service();
        assert_eq!(service.server().port, Some(9000));
        assert_eq!(
            service.hook_ids(),
            vec!["broken", "echo", "fresh", "network", "signed"]
        );
        assert!(service.hook("signed").unwrap().request.is_some());
    }

    #[test]
    fn test_load_errors() {
        let config = EngineConfig::default();
        let cases = [
            ("port = ", "Parse error"),
            ("port = \"http\"", "Server stage"),
            ("hook \"a\" {\n task { cmd = [\"x\"] }\n}\nhook \"a\" {\n task { cmd = [\"x\"] }\n}", "duplicate hook id"),
            ("hook \"a\" {\n task { cmd = [nope()] }\n}", "unknown function"),
            ("hook \"a\" {\n constraints = [true]\n}", "missing required block"),
        ];
        for (source, expected) in cases {
            let err = Service::load(source, &config).unwrap_err();
            assert!(err.to_string().contains(expected), "{}: {}", source, err);
        }
    }
}
