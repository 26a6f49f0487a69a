//! The task-execution seam and its `tokio::process` implementation.
//!
//! Executor failures are data: whatever goes wrong while running a task ends
//! up in [`ExecutionResult::error`] and drives response selection, it never
//! aborts the pipeline.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info, instrument, warn};

use crate::config::ExecutorConfig;
use crate::decoder::TaskSpec;
use crate::eval::Value;
use crate::{Error, InternalResult};

/// What a task run reports back. Exposed to PostExec as `result`.
#[derive(Debug, Clone, PartialEq, Eq, Default, serde::Serialize)]
pub struct ExecutionResult {
    pub exit_code: i32,
    pub error: bool,
    pub pid: u32,
    #[serde(rename = "CombinedOutput")]
    pub combined_output: String,
}

impl ExecutionResult {
    pub fn success(pid: u32, combined_output: impl Into<String>) -> Self {
        Self {
            exit_code: 0,
            error: false,
            pid,
            combined_output: combined_output.into(),
        }
    }

    /// The task never produced an exit status.
    pub fn not_run(reason: impl ToString) -> Self {
        Self {
            exit_code: -1,
            error: true,
            pid: 0,
            combined_output: reason.to_string(),
        }
    }

    pub fn failed(&self) -> bool {
        self.error || self.exit_code != 0
    }

    pub fn to_value(&self) -> Value {
        Value::Map(BTreeMap::from([
            ("exit_code".to_string(), Value::Integer(self.exit_code.into())),
            ("error".to_string(), Value::Boolean(self.error)),
            ("pid".to_string(), Value::Integer(self.pid.into())),
            (
                "CombinedOutput".to_string(),
                Value::String(self.combined_output.clone()),
            ),
        ]))
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    /// Runs `task` once.
    async fn execute(&self, task: &TaskSpec) -> ExecutionResult;
}

#[derive(Debug)]
struct MaterializedFile {
    path: PathBuf,
    keep: bool,
}

/// Runs tasks as child processes.
#[derive(Debug, Clone, Default)]
pub struct ProcessExecutor {
    config: ExecutorConfig,
}

impl ProcessExecutor {
    pub fn new(config: ExecutorConfig) -> Self {
        Self { config }
    }

    fn file_dir(&self, task: &TaskSpec) -> PathBuf {
        match (&task.workdir, &self.config.file_dir) {
            (Some(workdir), _) => PathBuf::from(workdir),
            (None, Some(dir)) => dir.clone(),
            (None, None) => std::env::temp_dir(),
        }
    }

    async fn run(
        &self,
        task: &TaskSpec,
        files: &mut Vec<MaterializedFile>,
    ) -> InternalResult<ExecutionResult> {
        let (program, args) = task
            .cmd
            .split_first()
            .ok_or_else(|| Error::internal("task has no command"))?;

        let mut command = Command::new(program);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if !self.config.inherit_env {
            command.env_clear();
        }
        if let Some(workdir) = &task.workdir {
            command.current_dir(workdir);
        }
        if let Some(env_vars) = &task.env_vars {
            command.envs(env_vars);
        }

        let dir = self.file_dir(task);
        if let Some(pass_file) = &task.pass_file {
            let path = materialize(&dir, &pass_file.filename, &pass_file.content).await?;
            if let Some(envname) = &pass_file.envname {
                command.env(envname, &path);
            }
            files.push(MaterializedFile {
                path,
                keep: pass_file.keep,
            });
        }
        if let Some(create_file) = &task.create_file {
            let path = materialize(&dir, &create_file.filename, &create_file.content).await?;
            if let Some(envname) = &create_file.envname {
                command.env(envname, &path);
            }
            files.push(MaterializedFile {
                path,
                keep: create_file.keep,
            });
        }

        let child = command.spawn()?;
        let pid = child.id().unwrap_or_default();
        debug!(pid, "task started");

        let output = match self.config.timeout {
            Some(timeout) => match tokio::time::timeout(timeout, child.wait_with_output()).await {
                Ok(output) => output?,
                Err(_) => {
                    warn!(pid, ?timeout, "task timed out and was killed");
                    return Ok(ExecutionResult {
                        pid,
                        ..ExecutionResult::not_run(format!("task timed out after {:?}", timeout))
                    });
                }
            },
            None => child.wait_with_output().await?,
        };

        let mut combined_output = String::from_utf8_lossy(&output.stdout).into_owned();
        combined_output.push_str(&String::from_utf8_lossy(&output.stderr));
        let exit_code = output.status.code().unwrap_or(-1);
        Ok(ExecutionResult {
            exit_code,
            error: !output.status.success(),
            pid,
            combined_output,
        })
    }
}

#[async_trait]
impl TaskExecutor for ProcessExecutor {
    #[instrument(level = "info", skip_all, fields(cmd = ?task.cmd))]
    async fn execute(&self, task: &TaskSpec) -> ExecutionResult {
        let mut files = Vec::new();
        let result = match self.run(task, &mut files).await {
            Ok(result) => result,
            Err(e) => {
                warn!(error = %e, "task could not be run");
                ExecutionResult::not_run(e)
            }
        };

        for file in files.iter().filter(|f| !f.keep) {
            if let Err(e) = tokio::fs::remove_file(&file.path).await {
                warn!(path = %file.path.display(), error = %e, "failed to remove task file");
            }
        }

        info!(
            exit_code = result.exit_code,
            error = result.error,
            pid = result.pid,
            "task finished"
        );
        result
    }
}

async fn materialize(dir: &Path, filename: &str, content: &[u8]) -> InternalResult<PathBuf> {
    let path = dir.join(filename);
    tokio::fs::write(&path, content).await?;
    debug!(path = %path.display(), bytes = content.len(), "wrote task file");
    Ok(path)
}
