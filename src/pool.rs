//! Owns the fixed set of runner slots, queues excess work, enforces the
//! foreground-ceiling/promotion race, and re-spawns slots that crash or go
//! stale. The crash-detection/respawn loop and the cutoff-vs-completion race
//! are built around a `JoinSet` plus a `tokio::select!` racing results
//! against a deadline, with a `TaskId → slot` side map for attributing
//! which slot a `JoinSet` event belongs to.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::task::{AbortHandle, Id as TaskId, JoinSet};

use crate::config::Config;
use crate::error::ExecError;
use crate::runner::{self, ExecutionResult, OutputStream, RunSpec};
use crate::task_store::{TaskResult, TaskStore};

/// One unit of work handed from the facade to a slot.
pub struct Job {
    pub spec: RunSpec,
    pub task_id: u64,
    respond_to: oneshot::Sender<ExecutionResult>,
}

/// What `WorkerPool::execute` resolved to.
pub enum PoolOutcome {
    /// The child finished before the foreground ceiling elapsed.
    Completed(ExecutionResult),
    /// The foreground ceiling elapsed first; the job keeps running under
    /// the hard ceiling and its final result lands in the `TaskStore`.
    Promoted,
}

#[derive(Default)]
struct SlotShared {
    started_at: Mutex<Option<Instant>>,
    task_id: Mutex<Option<u64>>,
}

struct SlotEntry {
    shared: Arc<SlotShared>,
    abort: AbortHandle,
}

/// Fixed-size pool of runner slots fed by a bounded queue.
pub struct WorkerPool {
    queue_tx: mpsc::Sender<Job>,
    shutting_down: Arc<AtomicBool>,
    driver: Mutex<Option<tokio::task::JoinHandle<()>>>,
    pool_size: usize,
}

impl WorkerPool {
    /// Construct the pool and spawn its `N` slots plus the driver task that
    /// supervises crash/respawn and the health-check sweep.
    pub fn new(cfg: Config, task_store: TaskStore) -> Arc<Self> {
        let (queue_tx, queue_rx) = mpsc::channel(cfg.max_queue.max(1));
        let queue_rx = Arc::new(Mutex::new(queue_rx));
        let shutting_down = Arc::new(AtomicBool::new(false));

        let pool_size = cfg.pool_size;
        let driver = tokio::spawn(run_driver(cfg, task_store, queue_rx, pool_size, shutting_down.clone()));

        Arc::new(Self {
            queue_tx,
            shutting_down,
            driver: Mutex::new(Some(driver)),
            pool_size,
        })
    }

    /// Enqueue `spec` bound to `task_id`, racing its completion against
    /// `foreground_ceiling`. A ceiling of `Duration::ZERO` promotes
    /// immediately — the shape `run_in_background` requests use.
    pub async fn execute(
        &self,
        spec: RunSpec,
        task_id: u64,
        foreground_ceiling: Duration,
    ) -> Result<PoolOutcome, ExecError> {
        if self.shutting_down.load(Ordering::SeqCst) {
            return Err(ExecError::PoolShuttingDown);
        }
        if self.pool_size == 0 {
            return Err(ExecError::NoWorkers);
        }

        let (tx, rx) = oneshot::channel();
        let job = Job {
            spec,
            task_id,
            respond_to: tx,
        };

        self.queue_tx.try_send(job).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => ExecError::QueueOverflow,
            mpsc::error::TrySendError::Closed(_) => ExecError::PoolShuttingDown,
        })?;

        tokio::select! {
            biased;
            result = rx => Ok(result.map(PoolOutcome::Completed).unwrap_or(PoolOutcome::Promoted)),
            _ = tokio::time::sleep(foreground_ceiling) => Ok(PoolOutcome::Promoted),
        }
    }

    /// Cancel all timers and tear down every slot (dropping the driver's
    /// `JoinSet` aborts every in-flight child). Callers are expected to also
    /// call `TaskStore::shutdown` to finalize any job this left in-flight.
    pub async fn shutdown(&self) {
        self.shutting_down.store(true, Ordering::SeqCst);
        if let Some(driver) = self.driver.lock().await.take() {
            driver.abort();
            let _ = driver.await;
        }
    }
}

async fn run_driver(
    cfg: Config,
    task_store: TaskStore,
    queue_rx: Arc<Mutex<mpsc::Receiver<Job>>>,
    pool_size: usize,
    shutting_down: Arc<AtomicBool>,
) {
    let mut set: JoinSet<usize> = JoinSet::new();
    let mut id_to_slot: HashMap<TaskId, usize> = HashMap::new();
    let mut slots: HashMap<usize, SlotEntry> = HashMap::new();

    for slot_id in 0..pool_size {
        spawn_slot(slot_id, &cfg, &task_store, &queue_rx, &mut set, &mut id_to_slot, &mut slots);
    }

    let mut health_timer = tokio::time::interval(cfg.health_check_interval);
    health_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;

            joined = set.join_next_with_id() => {
                let Some(joined) = joined else { break };
                let (task_id, slot_id) = match joined {
                    Ok((task_id, slot_id)) => (task_id, slot_id),
                    Err(join_err) => {
                        let task_id = join_err.id();
                        let Some(slot_id) = id_to_slot.remove(&task_id) else { continue };
                        (task_id, slot_id)
                    }
                };
                id_to_slot.remove(&task_id);
                slots.remove(&slot_id);
                if !shutting_down.load(Ordering::SeqCst) {
                    spawn_slot(slot_id, &cfg, &task_store, &queue_rx, &mut set, &mut id_to_slot, &mut slots);
                }
            }

            _ = health_timer.tick() => {
                let stale: Vec<(usize, u64)> = {
                    let mut found = Vec::new();
                    for (slot_id, entry) in &slots {
                        let started_at = *entry.shared.started_at.lock().await;
                        let task_id = *entry.shared.task_id.lock().await;
                        if let (Some(started), Some(task_id)) = (started_at, task_id)
                            && started.elapsed() > cfg.max_worker_age
                        {
                            found.push((*slot_id, task_id));
                        }
                    }
                    found
                };
                for (slot_id, task_id) in stale {
                    if let Some(entry) = slots.get(&slot_id) {
                        entry.abort.abort();
                    }
                    task_store.fail_task(task_id, "Worker timeout — killed by health check").await;
                }
            }
        }
    }
}

fn spawn_slot(
    slot_id: usize,
    cfg: &Config,
    task_store: &TaskStore,
    queue_rx: &Arc<Mutex<mpsc::Receiver<Job>>>,
    set: &mut JoinSet<usize>,
    id_to_slot: &mut HashMap<TaskId, usize>,
    slots: &mut HashMap<usize, SlotEntry>,
) {
    let shared = Arc::new(SlotShared::default());
    let abort = set.spawn(run_slot(
        slot_id,
        queue_rx.clone(),
        shared.clone(),
        cfg.clone(),
        task_store.clone(),
    ));
    id_to_slot.insert(abort.id(), slot_id);
    slots.insert(slot_id, SlotEntry { shared, abort });
}

async fn run_slot(
    slot_id: usize,
    queue_rx: Arc<Mutex<mpsc::Receiver<Job>>>,
    shared: Arc<SlotShared>,
    cfg: Config,
    task_store: TaskStore,
) -> usize {
    loop {
        let job = {
            let mut guard = queue_rx.lock().await;
            guard.recv().await
        };
        let Some(job) = job else {
            return slot_id;
        };

        *shared.started_at.lock().await = Some(Instant::now());
        *shared.task_id.lock().await = Some(job.task_id);

        task_store.start_task(job.task_id).await;
        let result = run_one_job(&job.spec, &cfg, job.task_id, &task_store).await;

        *shared.started_at.lock().await = None;
        *shared.task_id.lock().await = None;

        match &result.error {
            Some(reason) => task_store.fail_task(job.task_id, reason.clone()).await,
            None => task_store.complete_task(job.task_id, to_task_result(&result)).await,
        }

        let _ = job.respond_to.send(result);
    }
}

async fn run_one_job(spec: &RunSpec, cfg: &Config, task_id: u64, task_store: &TaskStore) -> ExecutionResult {
    let (otx, mut orx) = mpsc::unbounded_channel::<(OutputStream, String)>();
    let store = task_store.clone();
    let drain = tokio::spawn(async move {
        while let Some((stream, data)) = orx.recv().await {
            store.append_output(task_id, stream, data).await;
        }
    });

    let result = runner::spawn_and_run(spec, cfg.hard_ceiling, cfg, move |stream, data| {
        let _ = otx.send((stream, data.to_string()));
    })
    .await;

    let _ = drain.await;
    result
}

fn to_task_result(result: &ExecutionResult) -> TaskResult {
    TaskResult {
        success: result.success,
        exit_code: result.exit_code,
        stdout: result.stdout.clone(),
        stderr: result.stderr.clone(),
        execution_time_ms: result.execution_time_ms,
        error: result.error.clone(),
    }
}
