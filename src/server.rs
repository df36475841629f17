use std::sync::Arc;

use rmcp::handler::server::router::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::{CallToolResult, Content, Implementation, ServerCapabilities, ServerInfo};
use rmcp::{ErrorData as McpError, ServerHandler, tool, tool_handler, tool_router};

use crate::config::Config;
use crate::executor::{Executor, ExecuteRequest as ExecExecuteRequest};
use crate::pool::WorkerPool;
use crate::task_store::TaskStore;
use crate::tools::bash::BashRequest;
use crate::tools::execute::ExecuteRequest;
use crate::tools::process_close::ProcessCloseRequest;
use crate::tools::process_status::ProcessStatusRequest;
use crate::tools::sleep::SleepRequest;

#[derive(Clone)]
pub struct CodeforgeServer {
    executor: Arc<Executor>,
    tool_router: ToolRouter<Self>,
}

#[tool_router]
impl CodeforgeServer {
    pub fn new(config: Config) -> Self {
        let task_store = TaskStore::with_config(&config);
        task_store.spawn_eviction_sweep();
        let pool = WorkerPool::new(config.clone(), task_store.clone());
        let executor = Arc::new(Executor::new(config, pool, task_store));
        Self {
            executor,
            tool_router: Self::tool_router(),
        }
    }

    #[tool(
        name = "execute",
        description = "Run a source snippet in an isolated child process (nodejs, typescript, python, deno, go, rust, c, cpp, java). Short jobs return output inline; long ones are backgrounded automatically — poll with process_status."
    )]
    async fn execute(&self, Parameters(req): Parameters<ExecuteRequest>) -> Result<CallToolResult, McpError> {
        Ok(self
            .executor
            .execute(ExecExecuteRequest {
                source: req.code,
                language_tag: req.language,
                is_shell: false,
                working_directory: req.working_directory,
                run_in_background: req.run_in_background,
            })
            .await)
    }

    #[cfg(not(windows))]
    #[tool(
        name = "bash",
        description = "Run one or more shell commands (array joined with &&) in an isolated child process. Same dispatch and backgrounding behaviour as execute."
    )]
    async fn bash(&self, Parameters(req): Parameters<BashRequest>) -> Result<CallToolResult, McpError> {
        Ok(self
            .executor
            .execute(ExecExecuteRequest {
                source: req.commands.into_script(),
                language_tag: req.language,
                is_shell: true,
                working_directory: req.working_directory,
                run_in_background: req.run_in_background,
            })
            .await)
    }

    #[tool(
        name = "process_status",
        description = "Fetch the current status, timestamps, and (if finished) result of a backgrounded or promoted task.",
        annotations(read_only_hint = true)
    )]
    async fn process_status(
        &self,
        Parameters(req): Parameters<ProcessStatusRequest>,
    ) -> Result<CallToolResult, McpError> {
        match self.executor.get_task_status(req.task_id).await {
            Ok(task) => Ok(CallToolResult::success(vec![Content::text(format_task_snapshot(&task))])),
            Err(e) => Err(McpError::invalid_params(e.user_message(), None)),
        }
    }

    #[tool(
        name = "process_close",
        description = "Release a tracked task's record. Safe to call on a still-running task; it keeps running, only the record is dropped."
    )]
    async fn process_close(
        &self,
        Parameters(req): Parameters<ProcessCloseRequest>,
    ) -> Result<CallToolResult, McpError> {
        match self.executor.close_task(req.task_id).await {
            Ok(()) => Ok(CallToolResult::success(vec![Content::text(format!(
                "task_{} closed",
                req.task_id
            ))])),
            Err(e) => Err(McpError::invalid_params(e.user_message(), None)),
        }
    }

    #[tool(
        name = "sleep",
        description = "Block for up to 295 seconds, e.g. to give a just-backgrounded task time to produce output before polling process_status."
    )]
    async fn sleep(&self, Parameters(req): Parameters<SleepRequest>) -> Result<CallToolResult, McpError> {
        let duration = req.clamped_duration();
        tokio::time::sleep(duration).await;
        Ok(CallToolResult::success(vec![Content::text(format!(
            "slept {}ms",
            duration.as_millis()
        ))]))
    }
}

fn format_task_snapshot(task: &crate::task_store::Task) -> String {
    let mut out = format!(
        "task_{} | status: {:?} | created_at: {}",
        task.id, task.status, task.created_at
    );
    if let Some(started) = task.started_at {
        out.push_str(&format!(" | started_at: {started}"));
    }
    if let Some(completed) = task.completed_at {
        out.push_str(&format!(" | completed_at: {completed}"));
    }
    if let Some(result) = &task.result {
        out.push_str(&format!(
            "\nExit code: {} | {}ms | stdout: {}B, stderr: {}B",
            result.exit_code,
            result.execution_time_ms,
            result.stdout.len(),
            result.stderr.len(),
        ));
        if let Some(reason) = &result.error {
            out.push_str(&format!("\nError: {reason}"));
        }
        out.push_str(&format!("\n[STDOUT]\n{}", result.stdout));
        out.push_str(&format!("\n[STDERR]\n{}", result.stderr));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::bash::Commands;
    use std::time::Duration;

    fn test_server() -> CodeforgeServer {
        let config = Config {
            hard_ceiling: Duration::from_secs(5),
            foreground_ceiling: Duration::from_secs(5),
            sigterm_timeout: Duration::from_millis(200),
            output_flush_interval: Duration::from_millis(20),
            ..Config::default()
        };
        CodeforgeServer::new(config)
    }

    fn text_of(result: &CallToolResult) -> String {
        result
            .content
            .iter()
            .filter_map(|c| c.as_text().map(|t| t.text.clone()))
            .collect::<Vec<_>>()
            .join("\n")
    }

    #[tokio::test]
    async fn bash_tool_joins_command_array_and_runs_them() {
        let server = test_server();
        let result = server
            .bash(Parameters(BashRequest {
                working_directory: std::env::temp_dir().to_string_lossy().into_owned(),
                commands: Commands::Many(vec!["echo a".to_string(), "echo b".to_string()]),
                language: None,
                run_in_background: false,
            }))
            .await
            .unwrap();

        assert_eq!(result.is_error, Some(false));
        assert!(text_of(&result).contains("a\nb\n"));
    }

    #[tokio::test]
    async fn execute_tool_runs_nodejs_inline() {
        let server = test_server();
        let result = server
            .execute(Parameters(ExecuteRequest {
                working_directory: std::env::temp_dir().to_string_lossy().into_owned(),
                code: "console.log('hi')".to_string(),
                language: Some("nodejs".to_string()),
                run_in_background: false,
            }))
            .await
            .unwrap();

        assert_eq!(result.is_error, Some(false));
        assert!(text_of(&result).contains("[STDOUT]\nhi\n"));
    }

    #[tokio::test]
    async fn process_status_and_process_close_round_trip_a_backgrounded_task() {
        let server = test_server();
        let exec_result = server
            .execute(Parameters(ExecuteRequest {
                working_directory: std::env::temp_dir().to_string_lossy().into_owned(),
                code: "sleep 2".to_string(),
                language: None,
                run_in_background: true,
            }))
            .await
            .unwrap();
        let text = text_of(&exec_result);
        let task_id: u64 = text
            .split("task_")
            .nth(1)
            .unwrap()
            .split(')')
            .next()
            .unwrap()
            .parse()
            .unwrap();

        let status = server
            .process_status(Parameters(ProcessStatusRequest { task_id }))
            .await
            .unwrap();
        assert_eq!(status.is_error, Some(false));
        assert!(text_of(&status).contains(&format!("task_{task_id}")));

        let closed = server
            .process_close(Parameters(ProcessCloseRequest { task_id }))
            .await
            .unwrap();
        assert!(text_of(&closed).contains("closed"));

        let after_close = server.process_status(Parameters(ProcessStatusRequest { task_id })).await;
        assert!(after_close.is_err());
    }

    #[tokio::test]
    async fn sleep_tool_blocks_for_roughly_the_requested_duration() {
        let server = test_server();
        let start = std::time::Instant::now();
        let result = server.sleep(Parameters(SleepRequest { milliseconds: 50 })).await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(50));
        assert!(text_of(&result).contains("slept"));
    }
}

#[tool_handler]
impl ServerHandler for CodeforgeServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            server_info: Implementation {
                name: "codeforge".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                ..Default::default()
            },
            instructions: Some(
                "Codeforge: runs source snippets and shell commands in isolated child \
                 processes.\n\n\
                 Tools:\n\
                 - `execute`: run code (nodejs, typescript, python, deno, go, rust, c, cpp, java).\n\
                 - `bash`: run shell commands (non-Windows only).\n\
                 - `process_status`: poll a backgrounded task by id.\n\
                 - `process_close`: release a task record.\n\
                 - `sleep`: block briefly, e.g. before the first poll of a long task.\n\n\
                 Jobs that don't finish within the foreground ceiling are automatically \
                 backgrounded; the response carries a task id to poll with `process_status`."
                    .into(),
            ),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}
