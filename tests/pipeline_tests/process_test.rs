use hookdecl::config::{EngineConfig, ExecutorConfig};
use hookdecl::executor::ProcessExecutor;
use hookdecl::response::ResponseKind;
use hookdecl::Service;

use super::{demo_request, DEMO_HOOKS};

#[tokio::test]
async fn it_runs_demo_task_as_process() {
    let dir = tempfile::tempdir().unwrap();
    let config = EngineConfig {
        debug: true,
        executor: ExecutorConfig {
            file_dir: Some(dir.path().to_path_buf()),
            ..ExecutorConfig::default()
        },
    };
    let service = Service::load(DEMO_HOOKS, &config).unwrap();
    let executor = ProcessExecutor::new(config.executor.clone());

    let outcome = service
        .handle("deploy", demo_request(), &executor)
        .await
        .unwrap();

    let result = outcome.result.unwrap();
    assert_eq!(result.exit_code, 0, "{}", result.combined_output);
    assert!(result.pid > 0);
    assert_eq!(outcome.response.kind, ResponseKind::Success);

    let mut lines = outcome.response.body.lines();
    assert_eq!(
        lines.next(),
        Some("deployed abcdf: deploying abcdf for jqp@foo.br")
    );
    assert_eq!(lines.next().map(str::trim), Some("154"));
    // create_file without keep is cleaned up
    assert!(!dir.path().join("payload.json").exists());
}

#[tokio::test]
async fn it_reports_missing_program_as_error_response() {
    let source = r#"
        hook "missing" {
          task { cmd = ["/nonexistent/hookdecl/deploy"] }
        }
    "#;
    let service = Service::load(source, &EngineConfig::default()).unwrap();
    let outcome = service
        .handle("missing", demo_request(), &ProcessExecutor::default())
        .await
        .unwrap();

    let result = outcome.result.unwrap();
    assert!(result.error);
    assert_eq!(result.exit_code, -1);
    assert_eq!(outcome.response.kind, ResponseKind::Error);
    assert_eq!(
        outcome.response.body,
        "Error occurred while executing the hook's command."
    );
}
