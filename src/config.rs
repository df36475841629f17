use std::env;
use std::time::Duration;

/// Process-wide tunables, loaded once at startup from the environment —
/// everything here has a default and nothing is required to start.
#[derive(Debug, Clone)]
pub struct Config {
    /// Fixed worker slot count (default 4). Never grows.
    pub pool_size: usize,
    /// Queue capacity before `Execute` fails fast (default 100).
    pub max_queue: usize,
    /// Foreground ceiling before promotion to background (default 15s).
    pub foreground_ceiling: Duration,
    /// Hard ceiling for promoted/background jobs (default 24h).
    pub hard_ceiling: Duration,
    /// Grace period between SIGTERM and SIGKILL (default 5s).
    pub sigterm_timeout: Duration,
    /// Health-check sweep interval (default 30s).
    pub health_check_interval: Duration,
    /// Age after which a running job is considered stuck (default 1h).
    pub max_worker_age: Duration,
    /// Task eviction sweep interval (default 5 min).
    pub eviction_interval: Duration,
    /// How long a terminal task remains readable (default 30 min).
    pub max_task_age: Duration,
    /// Hard cap on tracked tasks (default 1000).
    pub max_tasks: usize,
    /// Cap on bytes across all `output_log` chunks per task (default 100 KiB).
    pub max_task_output: usize,
    /// Cap on bytes per stream in a final result (default 10 MiB).
    pub max_stream_buffer: usize,
    /// Output coalescing window (default 200ms).
    pub output_flush_interval: Duration,
    /// Per-language interpreter/compiler binaries, overridable for testing
    /// or non-standard installs.
    pub binaries: LanguageBinaries,
}

/// Executable names used to build child commands. Overridable via env vars
/// so tests (and unusual hosts) can point at stand-ins without touching PATH.
#[derive(Debug, Clone)]
pub struct LanguageBinaries {
    pub node: String,
    pub python: String,
    pub deno: String,
    pub bash: String,
    pub go: String,
    pub rustc: String,
    pub cc: String,
    pub cxx: String,
    pub javac: String,
    pub java: String,
}

impl Default for LanguageBinaries {
    fn default() -> Self {
        Self {
            node: env_or("CODEFORGE_NODE_BIN", "node"),
            python: env_or("CODEFORGE_PYTHON_BIN", "python3"),
            deno: env_or("CODEFORGE_DENO_BIN", "deno"),
            bash: env_or("CODEFORGE_BASH_BIN", "bash"),
            go: env_or("CODEFORGE_GO_BIN", "go"),
            rustc: env_or("CODEFORGE_RUSTC_BIN", "rustc"),
            cc: env_or("CODEFORGE_CC_BIN", "cc"),
            cxx: env_or("CODEFORGE_CXX_BIN", "c++"),
            javac: env_or("CODEFORGE_JAVAC_BIN", "javac"),
            java: env_or("CODEFORGE_JAVA_BIN", "java"),
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_usize(key: &str, default: usize) -> usize {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_millis(key: &str, default_ms: u64) -> Duration {
    Duration::from_millis(
        env::var(key)
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(default_ms),
    )
}

impl Default for Config {
    fn default() -> Self {
        Self {
            pool_size: env_usize("CODEFORGE_POOL_SIZE", 4),
            max_queue: env_usize("CODEFORGE_MAX_QUEUE", 100),
            foreground_ceiling: env_millis("CODEFORGE_FOREGROUND_CEILING_MS", 15_000),
            hard_ceiling: env_millis("CODEFORGE_HARD_CEILING_MS", 24 * 3_600_000),
            sigterm_timeout: env_millis("CODEFORGE_SIGTERM_TIMEOUT_MS", 5_000),
            health_check_interval: env_millis("CODEFORGE_HEALTH_CHECK_MS", 30_000),
            max_worker_age: env_millis("CODEFORGE_MAX_WORKER_AGE_MS", 3_600_000),
            eviction_interval: env_millis("CODEFORGE_EVICTION_INTERVAL_MS", 5 * 60_000),
            max_task_age: env_millis("CODEFORGE_MAX_TASK_AGE_MS", 30 * 60_000),
            max_tasks: env_usize("CODEFORGE_MAX_TASKS", 1000),
            max_task_output: env_usize("CODEFORGE_MAX_TASK_OUTPUT", 100 * 1024),
            max_stream_buffer: env_usize("CODEFORGE_MAX_STREAM_BUFFER", 10 * 1024 * 1024),
            output_flush_interval: env_millis("CODEFORGE_OUTPUT_FLUSH_MS", 200),
            binaries: LanguageBinaries::default(),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        // SAFETY: test-only, no other test in this process races these vars.
        for k in [
            "CODEFORGE_POOL_SIZE",
            "CODEFORGE_MAX_QUEUE",
            "CODEFORGE_FOREGROUND_CEILING_MS",
        ] {
            unsafe { env::remove_var(k) };
        }
        let cfg = Config::from_env();
        assert_eq!(cfg.pool_size, 4);
        assert_eq!(cfg.max_queue, 100);
        assert_eq!(cfg.foreground_ceiling, Duration::from_secs(15));
        assert_eq!(cfg.hard_ceiling, Duration::from_secs(24 * 3600));
        assert_eq!(cfg.max_tasks, 1000);
        assert_eq!(cfg.max_task_output, 100 * 1024);
        assert_eq!(cfg.max_stream_buffer, 10 * 1024 * 1024);
    }
}
