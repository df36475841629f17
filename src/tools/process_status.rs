use schemars::JsonSchema;
use serde::Deserialize;

/// Fetch the current snapshot of a tracked task.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct ProcessStatusRequest {
    pub task_id: u64,
}
