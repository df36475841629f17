//! Integration tests for `pool::WorkerPool`: the foreground-ceiling/
//! promotion race, queue overflow, and shutdown finalization.

use std::path::PathBuf;
use std::time::Duration;

use codeforge::config::Config;
use codeforge::pool::{PoolOutcome, WorkerPool};
use codeforge::runner::languages::Language;
use codeforge::runner::RunSpec;
use codeforge::task_store::TaskStore;

fn test_config(pool_size: usize, max_queue: usize) -> Config {
    Config {
        pool_size,
        max_queue,
        hard_ceiling: Duration::from_secs(10),
        sigterm_timeout: Duration::from_millis(200),
        output_flush_interval: Duration::from_millis(20),
        health_check_interval: Duration::from_millis(50),
        max_worker_age: Duration::from_millis(300),
        ..Config::default()
    }
}

fn bash_spec(source: &str) -> RunSpec {
    RunSpec {
        source: source.to_string(),
        language: Language::Bash,
        working_directory: PathBuf::from(std::env::temp_dir()),
    }
}

#[tokio::test]
async fn fast_job_completes_synchronously_before_ceiling() {
    let store = TaskStore::new();
    let pool = WorkerPool::new(test_config(2, 10), store.clone());
    let task_id = store.create_task("echo hi".into(), "bash".into(), "/tmp".into()).await;

    let outcome = pool
        .execute(bash_spec("echo hi"), task_id, Duration::from_secs(5))
        .await
        .unwrap();

    match outcome {
        PoolOutcome::Completed(result) => {
            assert!(result.success);
            assert_eq!(result.stdout, "hi\n");
        }
        PoolOutcome::Promoted => panic!("expected synchronous completion"),
    }
}

#[tokio::test]
async fn slow_job_is_promoted_when_ceiling_elapses() {
    let store = TaskStore::new();
    let pool = WorkerPool::new(test_config(2, 10), store.clone());
    let task_id = store
        .create_task("sleep 2; echo done".into(), "bash".into(), "/tmp".into())
        .await;

    let outcome = pool
        .execute(bash_spec("sleep 2; echo done"), task_id, Duration::from_millis(100))
        .await
        .unwrap();

    assert!(matches!(outcome, PoolOutcome::Promoted));

    // The job keeps running under the hard ceiling; give it time to finish
    // and land its final result in the task store.
    tokio::time::sleep(Duration::from_secs(3)).await;
    let task = store.get_task(task_id).await.unwrap();
    assert!(matches!(task.status, codeforge::task_store::TaskStatus::Completed));
    assert_eq!(task.result.unwrap().stdout, "done\n");
}

#[tokio::test]
async fn run_in_background_ceiling_zero_promotes_immediately() {
    let store = TaskStore::new();
    let pool = WorkerPool::new(test_config(1, 10), store.clone());
    let task_id = store.create_task("echo hi".into(), "bash".into(), "/tmp".into()).await;

    let outcome = pool.execute(bash_spec("echo hi"), task_id, Duration::ZERO).await.unwrap();
    assert!(matches!(outcome, PoolOutcome::Promoted));
}

#[tokio::test]
async fn queue_overflow_fails_fast() {
    let store = TaskStore::new();
    // One slot, one queue slot: fill both deterministically, then the third
    // submission must overflow.
    let pool = WorkerPool::new(test_config(1, 1), store.clone());

    let task_a = store.create_task("sleep 2".into(), "bash".into(), "/tmp".into()).await;
    let outcome_a = pool
        .execute(bash_spec("sleep 2"), task_a, Duration::ZERO)
        .await
        .unwrap();
    assert!(matches!(outcome_a, PoolOutcome::Promoted));

    // Wait for the single slot to actually pick up job A.
    for _ in 0..50 {
        if matches!(
            store.get_task(task_a).await.unwrap().status,
            codeforge::task_store::TaskStatus::Running
        ) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    let task_b = store.create_task("sleep 2".into(), "bash".into(), "/tmp".into()).await;
    let outcome_b = pool
        .execute(bash_spec("sleep 2"), task_b, Duration::ZERO)
        .await
        .unwrap();
    assert!(matches!(outcome_b, PoolOutcome::Promoted), "job B should queue behind A");

    let task_c = store.create_task("sleep 2".into(), "bash".into(), "/tmp".into()).await;
    let result_c = pool.execute(bash_spec("sleep 2"), task_c, Duration::ZERO).await;
    assert!(matches!(result_c, Err(codeforge::error::ExecError::QueueOverflow)));
}

#[tokio::test]
async fn health_check_kills_stuck_slot_and_fails_its_task() {
    let store = TaskStore::new();
    let pool = WorkerPool::new(test_config(1, 10), store.clone());
    let task_id = store
        .create_task("sleep 30".into(), "bash".into(), "/tmp".into())
        .await;

    // Promote immediately so the test doesn't block on the foreground race;
    // the job keeps running under the pool's health check.
    let outcome = pool.execute(bash_spec("sleep 30"), task_id, Duration::ZERO).await.unwrap();
    assert!(matches!(outcome, PoolOutcome::Promoted));

    // max_worker_age=300ms, health_check_interval=50ms: give it a few sweeps.
    tokio::time::sleep(Duration::from_millis(800)).await;

    let task = store.get_task(task_id).await.unwrap();
    assert!(matches!(task.status, codeforge::task_store::TaskStatus::Failed));
    assert_eq!(
        task.result.unwrap().error.as_deref(),
        Some("Worker timeout — killed by health check")
    );
}

#[tokio::test]
async fn shutdown_stops_accepting_new_work() {
    let store = TaskStore::new();
    let pool = WorkerPool::new(test_config(1, 10), store.clone());
    pool.shutdown().await;

    let task_id = store.create_task("echo hi".into(), "bash".into(), "/tmp".into()).await;
    let result = pool.execute(bash_spec("echo hi"), task_id, Duration::from_secs(1)).await;
    assert!(matches!(result, Err(codeforge::error::ExecError::PoolShuttingDown)));
}

#[tokio::test]
async fn zero_sized_pool_fails_fast_with_no_workers() {
    let store = TaskStore::new();
    let pool = WorkerPool::new(test_config(0, 10), store.clone());
    let task_id = store.create_task("echo hi".into(), "bash".into(), "/tmp".into()).await;

    let result = pool.execute(bash_spec("echo hi"), task_id, Duration::from_secs(1)).await;
    assert!(matches!(result, Err(codeforge::error::ExecError::NoWorkers)));
}
