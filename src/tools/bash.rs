use schemars::JsonSchema;
use serde::Deserialize;

/// One or several shell commands; an array is joined with `&&` before it
/// reaches the runner.
#[derive(Debug, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum Commands {
    One(String),
    Many(Vec<String>),
}

impl Commands {
    pub fn into_script(self) -> String {
        match self {
            Self::One(s) => s,
            Self::Many(parts) => parts.join(" && "),
        }
    }
}

/// Run one or more shell commands. Non-Windows only.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct BashRequest {
    pub working_directory: String,
    pub commands: Commands,
    /// Shell alias; always normalizes to bash regardless of value.
    pub language: Option<String>,
    #[serde(default)]
    pub run_in_background: bool,
}
