//! The public surface used by the tool-dispatch layer: validates inputs the
//! way `context::validate_prompt`/`validate_working_directory` do, then
//! implements the foreground-timeout → background-promotion protocol on top
//! of the [`pool::WorkerPool`].

use std::path::PathBuf;
use std::time::Duration;

use rmcp::model::CallToolResult;

use crate::config::Config;
use crate::error::ExecError;
use crate::pool::{PoolOutcome, WorkerPool};
use crate::response;
use crate::runner::languages::Language;
use crate::runner::{ExecutionResult, RunSpec};
use crate::task_store::{Task, TaskStore};

/// A raw `execute`/`bash` request, prior to language normalization.
pub struct ExecuteRequest {
    pub source: String,
    pub language_tag: Option<String>,
    pub is_shell: bool,
    pub working_directory: String,
    pub run_in_background: bool,
}

pub struct Executor {
    cfg: Config,
    pool: std::sync::Arc<WorkerPool>,
    task_store: TaskStore,
}

impl Executor {
    pub fn new(cfg: Config, pool: std::sync::Arc<WorkerPool>, task_store: TaskStore) -> Self {
        Self { cfg, pool, task_store }
    }

    /// Validate, dispatch, and format the caller-facing result for one
    /// `execute`/`bash` invocation.
    pub async fn execute(&self, req: ExecuteRequest) -> CallToolResult {
        if let Err(e) = self.validate(&req) {
            return response::format_error(&e.user_message());
        }

        let language = match normalize_language(req.language_tag.as_deref(), req.is_shell) {
            Ok(lang) => lang,
            Err(tag) => return response::format_result(&unsupported_language_result(&tag)),
        };

        let task_id = self
            .task_store
            .create_task(req.source.clone(), language.tag().to_string(), req.working_directory.clone())
            .await;

        let spec = RunSpec {
            source: req.source,
            language,
            working_directory: PathBuf::from(&req.working_directory),
        };

        let ceiling = if req.run_in_background {
            Duration::ZERO
        } else {
            self.cfg.foreground_ceiling
        };

        match self.pool.execute(spec, task_id, ceiling).await {
            Ok(PoolOutcome::Completed(result)) => {
                self.task_store.delete_task(task_id).await;
                response::format_result(&result)
            }
            Ok(PoolOutcome::Promoted) => response::format_promotion(task_id),
            Err(e) => {
                self.task_store.delete_task(task_id).await;
                response::format_error(&e.user_message())
            }
        }
    }

    /// `process_status` — a snapshot of one tracked task.
    pub async fn get_task_status(&self, task_id: u64) -> Result<Task, ExecError> {
        self.task_store.get_task(task_id).await.ok_or(ExecError::TaskNotFound(task_id))
    }

    /// `process_close` — release a finished (or abandoned) background task.
    pub async fn close_task(&self, task_id: u64) -> Result<(), ExecError> {
        if self.task_store.delete_task(task_id).await {
            Ok(())
        } else {
            Err(ExecError::TaskNotFound(task_id))
        }
    }

    fn validate(&self, req: &ExecuteRequest) -> Result<(), ExecError> {
        if req.source.trim().is_empty() {
            return Err(ExecError::Validation("code must not be empty".to_string()));
        }
        if req.working_directory.trim().is_empty() {
            return Err(ExecError::Validation("workingDirectory must not be empty".to_string()));
        }
        Ok(())
    }
}

/// Normalize a free-form language tag: unrecognized tags for non-shell
/// requests fail with the tag itself, so the caller can turn it into an
/// execution result rather than a validation error.
pub fn normalize_language(tag: Option<&str>, is_shell: bool) -> Result<Language, String> {
    if is_shell {
        return Ok(Language::Bash);
    }
    let tag = tag.unwrap_or("auto");
    Language::parse(tag).ok_or_else(|| tag.to_string())
}

/// Produce the immediate failure shape for an unknown language, without
/// ever touching the task store or the pool.
pub fn unsupported_language_result(tag: &str) -> ExecutionResult {
    ExecutionResult {
        success: false,
        exit_code: 1,
        stdout: String::new(),
        stderr: String::new(),
        execution_time_ms: 0,
        error: Some(format!("Unsupported runtime: {tag}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shell_requests_always_normalize_to_bash() {
        assert!(matches!(normalize_language(Some("sh"), true), Ok(Language::Bash)));
        assert!(matches!(normalize_language(None, true), Ok(Language::Bash)));
    }

    #[test]
    fn non_shell_auto_and_typescript_map_to_nodejs() {
        assert!(matches!(normalize_language(Some("auto"), false), Ok(Language::Nodejs)));
        assert!(matches!(normalize_language(Some("typescript"), false), Ok(Language::Nodejs)));
        assert!(matches!(normalize_language(None, false), Ok(Language::Nodejs)));
    }

    #[test]
    fn unknown_language_is_an_error_not_a_panic() {
        assert!(normalize_language(Some("cobol"), false).is_err());
    }
}
