//! Canonical record of background/promoted task state and buffered live
//! output: a lock protecting a shared in-memory map, keyed by task id.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::sync::Mutex;

use crate::config::Config;
use crate::runner::OutputStream;

/// Hard cap on bytes across all `output_log` chunks for one task, used as
/// the fallback when a `TaskStore` is built without an explicit `Config`
/// (e.g. in unit tests exercising the store in isolation).
pub const MAX_TASK_OUTPUT: usize = 100 * 1024;
/// How long a terminal task remains readable after completion.
pub const MAX_TASK_AGE: Duration = Duration::from_secs(30 * 60);
/// Hard cap on tracked tasks; oldest terminal tasks are evicted past this.
pub const MAX_TASKS: usize = 1000;
/// Eviction sweep cadence.
pub const EVICTION_INTERVAL: Duration = Duration::from_secs(5 * 60);

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// One buffered live-output chunk, captured while a task is running.
#[derive(Debug, Clone)]
pub struct OutputChunk {
    pub at_ms: u64,
    pub stream: OutputStream,
    pub data: String,
}

/// Final outcome recorded on a task once it reaches a terminal state.
#[derive(Debug, Clone)]
pub struct TaskResult {
    pub success: bool,
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub execution_time_ms: u64,
    pub error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Task {
    pub id: u64,
    pub status: TaskStatus,
    pub source: String,
    pub language: String,
    pub working_directory: String,
    pub created_at: u64,
    pub started_at: Option<u64>,
    pub completed_at: Option<u64>,
    pub result: Option<TaskResult>,
    pub output_log: Vec<OutputChunk>,
    output_log_bytes: usize,
}

impl Task {
    fn new(id: u64, source: String, language: String, working_directory: String) -> Self {
        Self {
            id,
            status: TaskStatus::Pending,
            source,
            language,
            working_directory,
            created_at: now_ms(),
            started_at: None,
            completed_at: None,
            result: None,
            output_log: Vec::new(),
            output_log_bytes: 0,
        }
    }
}

static NEXT_TASK_ID: AtomicU64 = AtomicU64::new(1);

struct Inner {
    tasks: HashMap<u64, Task>,
    shutting_down: bool,
}

/// The subset of `Config` the store needs, so callers that only care about
/// task bookkeeping (tests, mostly) don't have to build a full `Config`.
#[derive(Debug, Clone, Copy)]
struct Bounds {
    max_task_output: usize,
    max_task_age: Duration,
    max_tasks: usize,
    eviction_interval: Duration,
}

impl Default for Bounds {
    fn default() -> Self {
        Self {
            max_task_output: MAX_TASK_OUTPUT,
            max_task_age: MAX_TASK_AGE,
            max_tasks: MAX_TASKS,
            eviction_interval: EVICTION_INTERVAL,
        }
    }
}

impl From<&Config> for Bounds {
    fn from(cfg: &Config) -> Self {
        Self {
            max_task_output: cfg.max_task_output,
            max_task_age: cfg.max_task_age,
            max_tasks: cfg.max_tasks,
            eviction_interval: cfg.eviction_interval,
        }
    }
}

/// Thread-safe store of all tasks tracked for the process lifetime.
#[derive(Clone)]
pub struct TaskStore {
    inner: Arc<Mutex<Inner>>,
    bounds: Bounds,
}

impl Default for TaskStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskStore {
    /// Build a store with the library defaults.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                tasks: HashMap::new(),
                shutting_down: false,
            })),
            bounds: Bounds::default(),
        }
    }

    /// Build a store whose eviction/output bounds follow `cfg`, so the
    /// `CODEFORGE_MAX_TASK_OUTPUT`/`CODEFORGE_MAX_TASK_AGE_MS`/
    /// `CODEFORGE_MAX_TASKS`/`CODEFORGE_EVICTION_INTERVAL_MS` overrides take
    /// effect.
    pub fn with_config(cfg: &Config) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                tasks: HashMap::new(),
                shutting_down: false,
            })),
            bounds: Bounds::from(cfg),
        }
    }

    /// Allocate a new id and insert a `pending` record.
    pub async fn create_task(&self, source: String, language: String, working_directory: String) -> u64 {
        let id = NEXT_TASK_ID.fetch_add(1, Ordering::Relaxed);
        let task = Task::new(id, source, language, working_directory);
        self.inner.lock().await.tasks.insert(id, task);
        id
    }

    pub async fn start_task(&self, id: u64) {
        let mut guard = self.inner.lock().await;
        if let Some(task) = guard.tasks.get_mut(&id) {
            task.status = TaskStatus::Running;
            task.started_at = Some(now_ms());
        }
    }

    pub async fn complete_task(&self, id: u64, result: TaskResult) {
        self.finish_task(id, TaskStatus::Completed, result).await;
    }

    pub async fn fail_task(&self, id: u64, reason: impl Into<String>) {
        let result = TaskResult {
            success: false,
            exit_code: 1,
            stdout: String::new(),
            stderr: String::new(),
            execution_time_ms: 0,
            error: Some(reason.into()),
        };
        self.finish_task(id, TaskStatus::Failed, result).await;
    }

    async fn finish_task(&self, id: u64, status: TaskStatus, result: TaskResult) {
        let mut guard = self.inner.lock().await;
        if let Some(task) = guard.tasks.get_mut(&id) {
            task.status = status;
            task.completed_at = Some(now_ms());
            task.result = Some(result);
        }
    }

    /// Append one output chunk. Silently dropped once the task is terminal,
    /// and the accumulated log is trimmed down to half of `MAX_TASK_OUTPUT`
    /// once it exceeds the cap.
    pub async fn append_output(&self, id: u64, stream: OutputStream, data: String) {
        let mut guard = self.inner.lock().await;
        let Some(task) = guard.tasks.get_mut(&id) else {
            return;
        };
        if task.status.is_terminal() {
            return;
        }
        task.output_log_bytes += data.len();
        task.output_log.push(OutputChunk {
            at_ms: now_ms(),
            stream,
            data,
        });

        if task.output_log_bytes > self.bounds.max_task_output {
            let target = self.bounds.max_task_output / 2;
            while task.output_log_bytes > target {
                let Some(oldest) = task.output_log.first() else {
                    break;
                };
                task.output_log_bytes -= oldest.data.len();
                task.output_log.remove(0);
            }
        }
    }

    /// Atomically drain and return everything buffered since the last call.
    pub async fn read_and_clear_output(&self, id: u64) -> Vec<OutputChunk> {
        let mut guard = self.inner.lock().await;
        let Some(task) = guard.tasks.get_mut(&id) else {
            return Vec::new();
        };
        task.output_log_bytes = 0;
        std::mem::take(&mut task.output_log)
    }

    pub async fn get_task(&self, id: u64) -> Option<Task> {
        self.inner.lock().await.tasks.get(&id).cloned()
    }

    pub async fn delete_task(&self, id: u64) -> bool {
        self.inner.lock().await.tasks.remove(&id).is_some()
    }

    /// Fail every non-terminal task with a shutdown reason and mark the
    /// store closed. Further mutation calls on tracked ids become no-ops.
    pub async fn shutdown(&self) {
        let ids: Vec<u64> = {
            let mut guard = self.inner.lock().await;
            guard.shutting_down = true;
            guard
                .tasks
                .iter()
                .filter(|(_, t)| !t.status.is_terminal())
                .map(|(id, _)| *id)
                .collect()
        };
        for id in ids {
            self.fail_task(id, "Process shutting down").await;
        }
    }

    /// Evict terminal tasks older than `MAX_TASK_AGE`, then evict the
    /// oldest-completed-first until `|tasks| <= MAX_TASKS`.
    pub async fn evict(&self) {
        let mut guard = self.inner.lock().await;
        let now = now_ms();
        let max_age_ms = self.bounds.max_task_age.as_millis() as u64;

        guard.tasks.retain(|_, task| {
            if let Some(completed_at) = task.completed_at {
                if task.status.is_terminal() && now.saturating_sub(completed_at) > max_age_ms {
                    return false;
                }
            }
            true
        });

        if guard.tasks.len() > self.bounds.max_tasks {
            let mut terminal_ids: Vec<(u64, u64)> = guard
                .tasks
                .iter()
                .filter(|(_, t)| t.status.is_terminal())
                .map(|(id, t)| (*id, t.completed_at.unwrap_or(0)))
                .collect();
            terminal_ids.sort_by_key(|(_, completed_at)| *completed_at);

            let overflow = guard.tasks.len() - self.bounds.max_tasks;
            for (id, _) in terminal_ids.into_iter().take(overflow) {
                guard.tasks.remove(&id);
            }
        }
    }

    /// Spawn the periodic eviction sweep. Returns its `JoinHandle` so the
    /// caller can abort it on shutdown.
    pub fn spawn_eviction_sweep(&self) -> tokio::task::JoinHandle<()> {
        let store = self.clone();
        let interval_duration = self.bounds.eviction_interval;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(interval_duration);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                store.evict().await;
            }
        })
    }
}
