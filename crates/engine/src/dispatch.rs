// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-locality workers.
//!
//! Each dispatched job gets one worker task that runs the payload and
//! reports a single [`Completion`] back to the loop. Cancellation
//! arrives through the job's token: local tasks observe it at their
//! next await, thread work is abandoned, child processes get SIGTERM
//! with a short grace before SIGKILL.

use crate::runtime::{Completion, Outcome};
use gig_core::{CallArgs, CommandSpec, Job, JobFn, JobId, WebAppSpec, Work};
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use serde_json::Value;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;

/// How long a signalled child may linger before SIGKILL.
const KILL_GRACE: Duration = Duration::from_secs(2);
/// Upper bound on one TCP liveness probe.
const PROBE_TIMEOUT: Duration = Duration::from_millis(500);

pub(crate) fn spawn_worker(job: &Job, call: CallArgs, tx: UnboundedSender<Completion>) {
    let id = job.id().clone();
    let token = job.cancel_token();
    let Some(work) = job.work() else {
        let _ = tx.send(Completion {
            job: id,
            outcome: Outcome::Failed("job has no callable".to_string()),
        });
        return;
    };
    match work {
        Work::Local(f) => {
            tokio::spawn(run_local(f, call, token, id, tx));
        }
        Work::Thread(f) => {
            tokio::spawn(run_thread(f, call, token, id, tx));
        }
        Work::Process(cmd) => {
            tokio::spawn(run_process(cmd, call, token, id, tx));
        }
        Work::WebApp(app) => {
            tokio::spawn(run_webapp(app, call, token, id, tx));
        }
    }
}

fn outcome_from(result: Result<Value, String>) -> Outcome {
    match result {
        Ok(value) => Outcome::Done(value),
        Err(msg) => Outcome::Failed(msg),
    }
}

async fn run_local(
    f: JobFn,
    call: CallArgs,
    token: CancellationToken,
    id: JobId,
    tx: UnboundedSender<Completion>,
) {
    let outcome = tokio::select! {
        _ = token.cancelled() => Outcome::Cancelled,
        result = f.call(call) => outcome_from(result),
    };
    let _ = tx.send(Completion { job: id, outcome });
}

async fn run_thread(
    f: JobFn,
    call: CallArgs,
    token: CancellationToken,
    id: JobId,
    tx: UnboundedSender<Completion>,
) {
    let handle = tokio::task::spawn_blocking(move || f.call_blocking(call));
    let outcome = tokio::select! {
        // Best effort: the blocking call keeps running, its result is
        // dropped when it eventually returns.
        _ = token.cancelled() => Outcome::Cancelled,
        joined = handle => match joined {
            Ok(result) => outcome_from(result),
            Err(e) => Outcome::Failed(format!("worker thread panicked: {e}")),
        },
    };
    let _ = tx.send(Completion { job: id, outcome });
}

fn build_command(cmd: &CommandSpec, call: &CallArgs) -> Command {
    let mut command = Command::new(&cmd.program);
    command
        .args(cmd.argv(call))
        .envs(cmd.env.iter().cloned())
        .stdin(Stdio::null())
        .kill_on_drop(true);
    if let Some(dir) = &cmd.cwd {
        command.current_dir(dir);
    }
    command
}

async fn run_process(
    cmd: CommandSpec,
    call: CallArgs,
    token: CancellationToken,
    id: JobId,
    tx: UnboundedSender<Completion>,
) {
    let mut command = build_command(&cmd, &call);
    command.stdout(Stdio::piped()).stderr(Stdio::piped());

    let mut child = match command.spawn() {
        Ok(child) => child,
        Err(e) => {
            let _ = tx.send(Completion {
                job: id,
                outcome: Outcome::Failed(format!("failed to spawn {}: {e}", cmd.program)),
            });
            return;
        }
    };
    let stdout = read_pipe(child.stdout.take());
    let stderr = read_pipe(child.stderr.take());

    let outcome = tokio::select! {
        _ = token.cancelled() => {
            terminate(&mut child).await;
            Outcome::Cancelled
        }
        status = child.wait() => match status {
            Ok(status) => {
                let out = stdout.await.unwrap_or_default();
                let err = stderr.await.unwrap_or_default();
                if status.success() {
                    Outcome::Done(Value::String(out.trim_end().to_string()))
                } else {
                    Outcome::Failed(describe_exit(status, &err))
                }
            }
            Err(e) => Outcome::Failed(format!("wait on {} failed: {e}", cmd.program)),
        },
    };
    let _ = tx.send(Completion { job: id, outcome });
}

async fn run_webapp(
    app: WebAppSpec,
    call: CallArgs,
    token: CancellationToken,
    id: JobId,
    tx: UnboundedSender<Completion>,
) {
    let mut command = build_command(&app.command, &call);
    command.stdout(Stdio::null()).stderr(Stdio::null());

    let mut child = match command.spawn() {
        Ok(child) => child,
        Err(e) => {
            let _ = tx.send(Completion {
                job: id,
                outcome: Outcome::Failed(format!(
                    "failed to spawn {}: {e}",
                    app.command.program
                )),
            });
            return;
        }
    };

    let mut missed = 0u32;
    let outcome = loop {
        tokio::select! {
            _ = token.cancelled() => {
                terminate(&mut child).await;
                break Outcome::Cancelled;
            }
            status = child.wait() => {
                break Outcome::Failed(match status {
                    Ok(status) => format!("webapp exited: {status}"),
                    Err(e) => format!("wait on {} failed: {e}", app.command.program),
                });
            }
            _ = tokio::time::sleep(app.check_delta) => {
                if probe(&app.host, app.port).await {
                    missed = 0;
                } else {
                    missed += 1;
                    if missed > app.max_missed_probes {
                        terminate(&mut child).await;
                        break Outcome::Failed(format!(
                            "port {}:{} not responding",
                            app.host, app.port
                        ));
                    }
                }
            }
        }
    };
    let _ = tx.send(Completion { job: id, outcome });
}

async fn probe(host: &str, port: u16) -> bool {
    let connect = tokio::net::TcpStream::connect((host, port));
    matches!(tokio::time::timeout(PROBE_TIMEOUT, connect).await, Ok(Ok(_)))
}

fn read_pipe<R>(pipe: Option<R>) -> tokio::task::JoinHandle<String>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = String::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_string(&mut buf).await;
        }
        buf
    })
}

/// SIGTERM first so the child can clean up; SIGKILL when it lingers.
async fn terminate(child: &mut Child) {
    if let Some(pid) = child.id() {
        let _ = kill(Pid::from_raw(pid as i32), Signal::SIGTERM);
        if tokio::time::timeout(KILL_GRACE, child.wait()).await.is_ok() {
            return;
        }
        tracing::warn!(pid, "child ignored SIGTERM, killing");
    }
    let _ = child.start_kill();
    let _ = child.wait().await;
}

fn describe_exit(status: std::process::ExitStatus, stderr: &str) -> String {
    let stderr = stderr.trim();
    if stderr.is_empty() {
        format!("command failed: {status}")
    } else {
        format!("command failed: {status}: {stderr}")
    }
}
