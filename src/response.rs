//! Formats an [`ExecutionResult`] into the tool-call text: a one-line header
//! (exit code, elapsed time, stream sizes) followed by `[STDOUT]`/`[STDERR]`
//! sections, wrapped in the MCP `{content, isError}` shape.

use rmcp::model::{CallToolResult, Content};

use crate::runner::ExecutionResult;

/// Build the caller-facing `CallToolResult` for a synchronously completed
/// job. `isError` is set whenever the run didn't succeed: non-zero exit or a surfaced
/// `error` string is an error result, even though the child ran to
/// completion.
pub fn format_result(result: &ExecutionResult) -> CallToolResult {
    let text = format_text(result);
    if result.success {
        CallToolResult::success(vec![Content::text(text)])
    } else {
        CallToolResult::error(vec![Content::text(text)])
    }
}

fn format_text(result: &ExecutionResult) -> String {
    let mut out = format!(
        "Exit code: {} | {}ms | stdout: {}B, stderr: {}B",
        result.exit_code,
        result.execution_time_ms,
        result.stdout.len(),
        result.stderr.len(),
    );
    if let Some(reason) = &result.error {
        out.push_str(&format!("\nError: {reason}"));
    }
    out.push_str(&format!("\n[STDOUT]\n{}", result.stdout));
    out.push_str(&format!("\n[STDERR]\n{}", result.stderr));
    out
}

/// The promotion message returned when the foreground
/// ceiling elapses before the child completes.
pub fn format_promotion(task_id: u64) -> CallToolResult {
    CallToolResult::success(vec![Content::text(format!(
        "Process backgrounded (ID: task_{task_id}). Check status with process_status tool or resource task://{task_id}"
    ))])
}

/// A validation/structural failure that never became a task.
pub fn format_error(message: &str) -> CallToolResult {
    CallToolResult::error(vec![Content::text(message.to_string())])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok_result() -> ExecutionResult {
        ExecutionResult {
            success: true,
            exit_code: 0,
            stdout: "hi\n".to_string(),
            stderr: String::new(),
            execution_time_ms: 12,
            error: None,
        }
    }

    #[test]
    fn success_text_contains_stdout_and_exit_code() {
        let text = format_text(&ok_result());
        assert!(text.contains("Exit code: 0"));
        assert!(text.contains("[STDOUT]\nhi\n"));
    }

    #[test]
    fn nonzero_exit_is_marked_as_error() {
        let mut r = ok_result();
        r.success = false;
        r.exit_code = 7;
        let result = format_result(&r);
        assert_eq!(result.is_error, Some(true));
    }

    #[test]
    fn successful_run_is_not_marked_as_error() {
        let result = format_result(&ok_result());
        assert_eq!(result.is_error, Some(false));
    }
}
