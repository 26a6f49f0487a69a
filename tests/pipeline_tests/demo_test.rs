use std::collections::BTreeMap;

use hookdecl::config::EngineConfig;
use hookdecl::executor::ExecutionResult;
use hookdecl::gate::Verdict;
use hookdecl::response::ResponseKind;
use hookdecl::Service;
use pretty_assertions::assert_eq;

use super::{demo_request, RecordingExecutor, DEMO_HOOKS};

fn service() -> Service {
    Service::load(DEMO_HOOKS, &EngineConfig::default()).expect("demo document loads")
}

#[test]
fn it_loads_demo_document() {
    let service = service();
    let server = service.server();
    assert_eq!(server.ip.as_deref(), Some("0.0.0.0"));
    assert_eq!(server.port, Some(9000));
    assert_eq!(server.secure, Some(false));
    assert_eq!(server.http_methods, Some(vec!["POST".to_string()]));
    assert_eq!(service.hook_ids(), vec!["deploy", "volume"]);
}

#[tokio::test]
async fn it_runs_deploy_hook() {
    let executor = RecordingExecutor::new(ExecutionResult::success(4242, "deploying\n"));
    let outcome = service()
        .handle("deploy", demo_request(), &executor)
        .await
        .unwrap();

    assert_eq!(outcome.verdict, Verdict::Satisfied);
    assert_eq!(
        outcome.pre_exec.constraints,
        Some(vec![true, true, true, true, true])
    );
    assert_eq!(executor.calls(), 1);

    let task = executor.tasks.lock().unwrap()[0].clone();
    assert_eq!(task.cmd[0], "/bin/sh");
    let env = task.env_vars.unwrap();
    assert_eq!(env["COMMIT"], "abcdf");
    assert_eq!(env["PUSHER"], "jqp@foo.br");
    let file = task.create_file.unwrap();
    assert_eq!(file.filename, "payload.json");
    assert_eq!(file.content, demo_request().payload.into_bytes());
    assert_eq!(file.envname.as_deref(), Some("PAYLOAD_FILE"));

    assert_eq!(outcome.response.kind, ResponseKind::Success);
    assert_eq!(outcome.response.status_code, 200);
    assert_eq!(outcome.response.body, "deployed abcdf: deploying\n");
    assert_eq!(
        outcome.response.headers,
        BTreeMap::from([("X-Hook".to_string(), "deploy".to_string())])
    );
}

#[tokio::test]
async fn it_rejects_tampered_signature() {
    let mut request = demo_request();
    request
        .headers
        .insert("X-Signature".to_string(), "0".repeat(64));

    let executor = RecordingExecutor::new(ExecutionResult::default());
    let outcome = service()
        .handle("deploy", request, &executor)
        .await
        .unwrap();

    assert_eq!(executor.calls(), 0);
    assert_eq!(outcome.verdict, Verdict::Unsatisfied);
    assert_eq!(outcome.result, None);
    assert_eq!(outcome.response.kind, ResponseKind::Unsatisfied);
    assert_eq!(outcome.response.status_code, 403);
    assert_eq!(outcome.response.body, "rejected request from 1.2.3.4");
}

#[tokio::test]
async fn it_renders_error_response_from_result() {
    let executor = RecordingExecutor::new(ExecutionResult {
        exit_code: 1,
        error: true,
        pid: 17,
        combined_output: "no space left".to_string(),
    });
    let outcome = service()
        .handle("deploy", demo_request(), &executor)
        .await
        .unwrap();

    assert_eq!(outcome.response.kind, ResponseKind::Error);
    assert_eq!(outcome.response.status_code, 500);
    assert_eq!(outcome.response.content_type, "application/json");
    let body: serde_json::Value = serde_json::from_str(&outcome.response.body).unwrap();
    assert_eq!(
        body,
        serde_json::json!({
            "CombinedOutput": "no space left",
            "error": true,
            "exit_code": 1,
            "pid": 17,
        })
    );
}

#[tokio::test]
async fn it_compares_payload_numbers() {
    let executor = RecordingExecutor::new(ExecutionResult::success(1, ""));
    let outcome = service()
        .handle("volume", demo_request(), &executor)
        .await
        .unwrap();
    assert_eq!(outcome.pre_exec.task.cmd, vec!["echo", "volume 80 -> 50"]);
    // no response block: defaults apply
    assert_eq!(outcome.response.status_code, 200);
    assert_eq!(outcome.response.body, "");

    let mut louder = demo_request();
    louder.payload = r#"{"previousVolume": 10, "newVolume": 50}"#.to_string();
    let outcome = service()
        .handle("volume", louder, &executor)
        .await
        .unwrap();
    assert_eq!(outcome.verdict, Verdict::Unsatisfied);
    assert_eq!(outcome.response.body, "Hook rules were not satisfied.");
    assert_eq!(executor.calls(), 1);
}
