use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::config::LanguageBinaries;

/// Supported execution languages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Nodejs,
    Typescript,
    Python,
    Deno,
    Bash,
    Go,
    Rust,
    C,
    Cpp,
    Java,
}

impl Language {
    /// Parse a free-form tag, applying the facade's normalization rules
    /// (`typescript`/`auto` collapse to `nodejs` for non-shell requests).
    pub fn parse(tag: &str) -> Option<Self> {
        match tag.to_ascii_lowercase().as_str() {
            "nodejs" | "node" | "js" | "javascript" => Some(Self::Nodejs),
            "typescript" | "ts" | "auto" => Some(Self::Nodejs),
            "python" | "py" => Some(Self::Python),
            "deno" => Some(Self::Deno),
            "bash" | "sh" | "zsh" => Some(Self::Bash),
            "go" | "golang" => Some(Self::Go),
            "rust" | "rs" => Some(Self::Rust),
            "c" => Some(Self::C),
            "cpp" | "c++" | "cxx" => Some(Self::Cpp),
            "java" => Some(Self::Java),
            _ => None,
        }
    }

    pub fn tag(&self) -> &'static str {
        match self {
            Self::Nodejs => "nodejs",
            Self::Typescript => "typescript",
            Self::Python => "python",
            Self::Deno => "deno",
            Self::Bash => "bash",
            Self::Go => "go",
            Self::Rust => "rust",
            Self::C => "c",
            Self::Cpp => "cpp",
            Self::Java => "java",
        }
    }

    /// How source text becomes a child command.
    pub fn dispatch(&self, bins: &LanguageBinaries) -> Strategy {
        match self {
            Self::Nodejs | Self::Typescript => Strategy::Inline {
                interpreter: bins.node.clone(),
                flag: "-e".to_string(),
            },
            Self::Python => Strategy::Inline {
                interpreter: bins.python.clone(),
                flag: "-c".to_string(),
            },
            Self::Deno => Strategy::File {
                interpreter: bins.deno.clone(),
                interpreter_args: vec!["run".to_string(), "--allow-all".to_string()],
                filename: "code.ts".to_string(),
                prelude: String::new(),
            },
            Self::Bash => Strategy::File {
                interpreter: bins.bash.clone(),
                interpreter_args: vec![],
                filename: "script.sh".to_string(),
                prelude: "set -e\n".to_string(),
            },
            Self::Go => Strategy::Run {
                interpreter: bins.go.clone(),
                interpreter_args: vec!["run".to_string()],
                filename: "code.go".to_string(),
            },
            Self::Rust => Strategy::CompileRun {
                source_filename: "code.rs".to_string(),
                compile: vec![bins.rustc.clone(), "-O".to_string(), "-o".to_string()],
                binary_name: "code".to_string(),
            },
            Self::C => Strategy::CompileRun {
                source_filename: "code.c".to_string(),
                compile: vec![bins.cc.clone(), "-O2".to_string(), "-o".to_string()],
                binary_name: "code".to_string(),
            },
            Self::Cpp => Strategy::CompileRun {
                source_filename: "code.cpp".to_string(),
                compile: vec![bins.cxx.clone(), "-O2".to_string(), "-o".to_string()],
                binary_name: "code".to_string(),
            },
            Self::Java => Strategy::CompileRun {
                source_filename: "Main.java".to_string(),
                compile: vec![bins.javac.clone()],
                binary_name: "Main".to_string(),
            },
        }
    }

    /// Wrap user source into a full `Main.java` body, the one language that
    /// needs the source reshaped before it becomes a compilable file.
    pub fn wrap_source(&self, source: &str) -> String {
        match self {
            Self::Java => format!(
                "public class Main {{\n    public static void main(String[] args) throws Exception {{\n{source}\n    }}\n}}\n"
            ),
            _ => source.to_string(),
        }
    }
}

/// How source text becomes a child command for a given language.
#[derive(Debug, Clone)]
pub enum Strategy {
    /// Source passed inline as an interpreter argument (`node -e <code>`).
    Inline { interpreter: String, flag: String },
    /// Source written to a file, then the file is run as-is.
    File {
        interpreter: String,
        interpreter_args: Vec<String>,
        filename: String,
        prelude: String,
    },
    /// Source written to a file and run via a compile-and-run tool (`go run`).
    Run {
        interpreter: String,
        interpreter_args: Vec<String>,
        filename: String,
    },
    /// Source written to a file, compiled, then the produced binary is run
    /// with a fresh deadline.
    CompileRun {
        source_filename: String,
        compile: Vec<String>,
        binary_name: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_normalizes_typescript_and_auto_to_nodejs() {
        assert_eq!(Language::parse("typescript"), Some(Language::Nodejs));
        assert_eq!(Language::parse("auto"), Some(Language::Nodejs));
        assert_eq!(Language::parse("TypeScript"), Some(Language::Nodejs));
    }

    #[test]
    fn parse_shell_aliases_map_to_bash() {
        assert_eq!(Language::parse("bash"), Some(Language::Bash));
        assert_eq!(Language::parse("sh"), Some(Language::Bash));
        assert_eq!(Language::parse("zsh"), Some(Language::Bash));
    }

    #[test]
    fn parse_unknown_returns_none() {
        assert_eq!(Language::parse("cobol"), None);
    }

    #[test]
    fn java_wraps_source_in_main_method() {
        let wrapped = Language::Java.wrap_source("System.out.println(1);");
        assert!(wrapped.contains("class Main"));
        assert!(wrapped.contains("public static void main"));
        assert!(wrapped.contains("System.out.println(1);"));
    }

    #[test]
    fn non_java_leaves_source_untouched() {
        assert_eq!(Language::Python.wrap_source("print(1)"), "print(1)");
    }
}
