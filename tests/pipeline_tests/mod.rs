mod demo_test;
#[cfg(unix)]
mod process_test;

use std::sync::Mutex;

use async_trait::async_trait;
use hookdecl::decoder::TaskSpec;
use hookdecl::executor::{ExecutionResult, TaskExecutor};
use hookdecl::request::RequestData;

pub const DEMO_HOOKS: &str = include_str!("../../demos/hooks.hcl");
pub const DEMO_REQUEST: &str = include_str!("../../demos/request.json");

pub fn demo_request() -> RequestData {
    serde_json::from_str(DEMO_REQUEST).expect("demo request fixture")
}

/// Records every task it is asked to run and answers with a fixed result.
pub struct RecordingExecutor {
    result: ExecutionResult,
    pub tasks: Mutex<Vec<TaskSpec>>,
}

impl RecordingExecutor {
    pub fn new(result: ExecutionResult) -> Self {
        Self {
            result,
            tasks: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.tasks.lock().unwrap().len()
    }
}

#[async_trait]
impl TaskExecutor for RecordingExecutor {
    async fn execute(&self, task: &TaskSpec) -> ExecutionResult {
        self.tasks.lock().unwrap().push(task.clone());
        self.result.clone()
    }
}
