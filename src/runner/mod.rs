//! Spawns and drives exactly one child process per job.
//!
//! One call to [`spawn_and_run`] owns one job end to end: it resolves the
//! job's [`languages::Language`] dispatch strategy, materializes source into
//! a [`tempdir::TempJobDir`], runs the child (or compile-then-run pair) to
//! completion or deadline, and always resolves with an [`ExecutionResult`] —
//! this module never returns `Err` to its caller, matching the propagation
//! policy that the Pool only rejects for structural reasons.

pub mod languages;
mod process;
pub mod tempdir;

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

pub use process::OutputStream;

use crate::config::Config;
use languages::{Language, Strategy};

/// One unit of work handed to the runner by the Pool.
#[derive(Debug, Clone)]
pub struct RunSpec {
    pub source: String,
    pub language: Language,
    pub working_directory: PathBuf,
}

/// Final outcome of a job, whether it ran to completion, failed internally,
/// or was killed for exceeding its deadline.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub success: bool,
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub execution_time_ms: u64,
    pub error: Option<String>,
}

impl ExecutionResult {
    fn internal_failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            exit_code: 1,
            stdout: String::new(),
            stderr: String::new(),
            execution_time_ms: 0,
            error: Some(error.into()),
        }
    }
}

/// Run `job` to completion or until `deadline` elapses, streaming coalesced
/// output chunks to `on_output` as they arrive.
pub async fn spawn_and_run(
    job: &RunSpec,
    deadline: Duration,
    cfg: &Config,
    mut on_output: impl FnMut(OutputStream, &str) + Send,
) -> ExecutionResult {
    let start = Instant::now();

    let tmp = match tempdir::TempJobDir::create().await {
        Ok(t) => t,
        Err(e) => return ExecutionResult::internal_failure(format!("failed to create scratch directory: {e}")),
    };

    let strategy = job.language.dispatch(&cfg.binaries);
    let result = run_strategy(job, &strategy, tmp.path(), deadline, cfg, &mut on_output).await;

    match result {
        Ok(mut r) => {
            r.execution_time_ms = start.elapsed().as_millis() as u64;
            r
        }
        Err(e) => ExecutionResult::internal_failure(e),
    }
    // `tmp` drops here regardless of outcome, removing the scratch directory.
}

async fn run_strategy(
    job: &RunSpec,
    strategy: &Strategy,
    tmp: &Path,
    deadline: Duration,
    cfg: &Config,
    on_output: &mut (impl FnMut(OutputStream, &str) + Send),
) -> Result<ExecutionResult, String> {
    match strategy {
        Strategy::Inline { interpreter, flag } => {
            let mut cmd = process::base_command(interpreter);
            cmd.current_dir(&job.working_directory)
                .arg(flag)
                .arg(&job.source);
            run_single(cmd, deadline, cfg, on_output).await
        }

        Strategy::File {
            interpreter,
            interpreter_args,
            filename,
            prelude,
        } => {
            let path = tmp.join(filename);
            let contents = format!("{prelude}{}", job.source);
            tokio::fs::write(&path, contents)
                .await
                .map_err(|e| format!("failed to write script file: {e}"))?;

            let mut cmd = process::base_command(interpreter);
            cmd.current_dir(&job.working_directory)
                .args(interpreter_args)
                .arg(&path);
            run_single(cmd, deadline, cfg, on_output).await
        }

        Strategy::Run {
            interpreter,
            interpreter_args,
            filename,
        } => {
            let path = tmp.join(filename);
            tokio::fs::write(&path, &job.source)
                .await
                .map_err(|e| format!("failed to write source file: {e}"))?;

            let mut cmd = process::base_command(interpreter);
            cmd.current_dir(&job.working_directory)
                .args(interpreter_args)
                .arg(&path);
            run_single(cmd, deadline, cfg, on_output).await
        }

        Strategy::CompileRun {
            source_filename,
            compile,
            binary_name,
        } => {
            run_compile_then_run(job, source_filename, compile, binary_name, tmp, deadline, cfg, on_output).await
        }
    }
}

async fn run_single(
    cmd: tokio::process::Command,
    deadline: Duration,
    cfg: &Config,
    on_output: &mut (impl FnMut(OutputStream, &str) + Send),
) -> Result<ExecutionResult, String> {
    let out = process::run_with_deadline(
        cmd,
        deadline,
        cfg.sigterm_timeout,
        cfg.output_flush_interval,
        cfg.max_stream_buffer,
        on_output,
    )
    .await
    .map_err(|e| format!("failed to run child process: {e}"))?;

    Ok(from_child_output(out, None))
}

#[allow(clippy::too_many_arguments)]
async fn run_compile_then_run(
    job: &RunSpec,
    source_filename: &str,
    compile: &[String],
    binary_name: &str,
    tmp: &Path,
    deadline: Duration,
    cfg: &Config,
    on_output: &mut (impl FnMut(OutputStream, &str) + Send),
) -> Result<ExecutionResult, String> {
    let source_path = tmp.join(source_filename);
    let wrapped = job.language.wrap_source(&job.source);
    tokio::fs::write(&source_path, wrapped)
        .await
        .map_err(|e| format!("failed to write source file: {e}"))?;

    let binary_path = tmp.join(binary_name);

    let mut compile_cmd = process::base_command(&compile[0]);
    compile_cmd.current_dir(tmp);
    if compile.len() > 1 {
        compile_cmd.args(&compile[1..]);
        compile_cmd.arg(&binary_path);
    }
    compile_cmd.arg(&source_path);

    let compile_out = process::run_with_deadline(
        compile_cmd,
        deadline,
        cfg.sigterm_timeout,
        cfg.output_flush_interval,
        cfg.max_stream_buffer,
        &mut *on_output,
    )
    .await
    .map_err(|e| format!("failed to run compiler: {e}"))?;

    if compile_out.exit_code != 0 || compile_out.timed_out {
        return Ok(from_child_output(compile_out, None));
    }

    let run_cmd = if matches!(job.language, Language::Java) {
        let mut c = process::base_command(&cfg.binaries.java);
        c.arg("-cp").arg(tmp).arg(binary_name);
        c
    } else {
        process::base_command(&binary_path.to_string_lossy())
    };
    let mut run_cmd = run_cmd;
    run_cmd.current_dir(&job.working_directory);

    let run_out = process::run_with_deadline(
        run_cmd,
        deadline,
        cfg.sigterm_timeout,
        cfg.output_flush_interval,
        cfg.max_stream_buffer,
        on_output,
    )
    .await
    .map_err(|e| format!("failed to run compiled program: {e}"))?;

    let compile_stderr = String::from_utf8_lossy(&compile_out.stderr).into_owned();
    Ok(from_child_output(run_out, Some(compile_stderr)))
}

fn from_child_output(out: process::ChildOutput, compile_stderr: Option<String>) -> ExecutionResult {
    let stdout = String::from_utf8_lossy(&out.stdout).into_owned();
    let mut stderr = String::from_utf8_lossy(&out.stderr).into_owned();
    if let Some(prefix) = compile_stderr.filter(|s| !s.is_empty()) {
        stderr = format!("{prefix}{stderr}");
    }

    let success = !out.timed_out && out.exit_code == 0;
    let error = if out.timed_out {
        Some("Execution exceeded deadline".to_string())
    } else {
        None
    };

    ExecutionResult {
        success,
        exit_code: out.exit_code,
        stdout,
        stderr,
        execution_time_ms: 0,
        error,
    }
}
