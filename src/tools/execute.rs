use schemars::JsonSchema;
use serde::Deserialize;

/// Run a source snippet in an isolated child process.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct ExecuteRequest {
    /// Directory the child process runs in.
    pub working_directory: String,
    /// Source text to execute.
    pub code: String,
    /// Runtime to dispatch to. Defaults to "auto" (nodejs).
    pub language: Option<String>,
    /// Skip the foreground wait and return a task id immediately.
    #[serde(default)]
    pub run_in_background: bool,
}
