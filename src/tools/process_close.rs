use schemars::JsonSchema;
use serde::Deserialize;

/// Release a tracked task's record, whether finished or still running.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct ProcessCloseRequest {
    pub task_id: u64,
}
